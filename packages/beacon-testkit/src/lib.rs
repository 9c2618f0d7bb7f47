//! Disposable Postgres databases and Qdrant collections for integration tests.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, sync::Mutex, time::Duration};

use qdrant_client::{
	Qdrant,
	qdrant::{CreateCollectionBuilder, Distance, VectorParamsBuilder},
};
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::time;
use uuid::Uuid;

pub const PG_DSN_ENV: &str = "BEACON_PG_DSN";
pub const QDRANT_URL_ENV: &str = "BEACON_QDRANT_URL";

const ADMIN_DATABASES: [&str; 2] = ["postgres", "template1"];
const QDRANT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TestDatabase {
	name: String,
	dsn: String,
	admin_options: PgConnectOptions,
	collections: Mutex<Vec<String>>,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Failed to parse {PG_DSN_ENV}: {err}.")))?;
		let (admin_options, mut admin_conn) = connect_admin(&base_options).await?;
		let name = format!("beacon_test_{}", Uuid::new_v4().simple());

		admin_conn
			.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create test database: {err}.")))?;

		let dsn = base_options.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin_options, collections: Mutex::new(Vec::new()) })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	/// Returns a collection name unique to this database and remembers it for cleanup.
	pub fn collection_name(&self, prefix: &str) -> String {
		let collection = format!("{prefix}_{}", self.name);

		self.collections.lock().unwrap_or_else(|err| err.into_inner()).push(collection.clone());

		collection
	}

	pub async fn cleanup(self) -> Result<()> {
		let collections =
			self.collections.lock().unwrap_or_else(|err| err.into_inner()).clone();
		let qdrant_result = drop_qdrant_collections(&collections).await;

		drop_database(&self.name, &self.admin_options).await?;

		qdrant_result
	}
}

pub fn env_dsn() -> Option<String> {
	env::var(PG_DSN_ENV).ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var(QDRANT_URL_ENV).ok()
}

/// Creates a single-vector collection so points can be upserted and their payloads patched.
pub async fn create_collection(qdrant_url: &str, collection: &str, dim: u64) -> Result<Qdrant> {
	let client = Qdrant::from_url(qdrant_url)
		.build()
		.map_err(|err| Error::Message(format!("Failed to build Qdrant client: {err}.")))?;

	time::timeout(
		QDRANT_TIMEOUT,
		client.create_collection(
			CreateCollectionBuilder::new(collection)
				.vectors_config(VectorParamsBuilder::new(dim, Distance::Cosine)),
		),
	)
	.await
	.map_err(|_| Error::Message("Qdrant create_collection timed out.".to_string()))?
	.map_err(|err| Error::Message(format!("Failed to create Qdrant collection: {err}.")))?;

	Ok(client)
}

async fn connect_admin(
	base_options: &PgConnectOptions,
) -> Result<(PgConnectOptions, PgConnection)> {
	let mut last_err = None;

	for database in ADMIN_DATABASES {
		let options = base_options.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => {
				last_err = Some(err);
			},
		}
	}

	Err(Error::Message(format!("Failed to connect to an admin database: {last_err:?}.")))
}

async fn drop_database(name: &str, admin_options: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(admin_options).await.map_err(|err| {
		Error::Message(format!("Failed to connect to admin database for cleanup: {err}."))
	})?;
	let _ = sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await;

	sqlx::query(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str())
		.execute(&mut conn)
		.await
		.map_err(|err| Error::Message(format!("Failed to drop test database: {err}.")))?;

	Ok(())
}

async fn drop_qdrant_collections(collections: &[String]) -> Result<()> {
	if collections.is_empty() {
		return Ok(());
	}

	let Some(qdrant_url) = env_qdrant_url() else {
		eprintln!("Skipping Qdrant cleanup; set {QDRANT_URL_ENV} to delete test collections.");

		return Ok(());
	};
	let client = Qdrant::from_url(&qdrant_url)
		.build()
		.map_err(|err| Error::Message(format!("Failed to build Qdrant client: {err}.")))?;

	for collection in collections {
		match time::timeout(QDRANT_TIMEOUT, client.delete_collection(collection.clone())).await {
			Ok(Ok(_)) => {},
			Ok(Err(err)) => eprintln!("Failed to delete Qdrant collection {collection:?}: {err}."),
			Err(_) => eprintln!("Timed out deleting Qdrant collection {collection:?}."),
		}
	}

	Ok(())
}
