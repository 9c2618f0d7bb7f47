pub mod worker;

mod error;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use beacon_service::PermissionSyncService;
use beacon_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = beacon_cli::VERSION,
	rename_all = "kebab",
	styles = beacon_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = beacon_config::load(&args.config)?;
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;
	let sync =
		PermissionSyncService::new(Arc::new(db.clone()), Arc::new(qdrant), config.permission_sync);
	let state = worker::WorkerState { db, sync, settings: config.worker };

	worker::run_worker(state).await?;

	Ok(())
}
