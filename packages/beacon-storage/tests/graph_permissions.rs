use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use beacon_storage::{db::Db, graph, outbox};

async fn test_db() -> Option<(beacon_testkit::TestDatabase, Db)> {
	let Some(base_dsn) = beacon_testkit::env_dsn() else {
		eprintln!("Skipping storage tests; set BEACON_PG_DSN to run this test.");

		return None;
	};
	let test_db = beacon_testkit::TestDatabase::new(&base_dsn)
		.await
		.expect("Failed to create test database.");
	let cfg = beacon_config::Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	Some((test_db, db))
}

async fn insert_record(db: &Db, record_id: &str, tenant_id: &str, virtual_record_id: Option<&str>) {
	sqlx::query(
		"\
INSERT INTO records (record_id, tenant_id, record_name, record_type, virtual_record_id)
VALUES ($1, $2, $3, 'FILE', $4)",
	)
	.bind(record_id)
	.bind(tenant_id)
	.bind(format!("{record_id}.pdf"))
	.bind(virtual_record_id)
	.execute(&db.pool)
	.await
	.expect("Failed to insert record.");
}

async fn grant(db: &Db, tenant_id: &str, kind: &str, principal_id: &str, record_id: &str) {
	sqlx::query(
		"\
INSERT INTO permission_edges (edge_id, tenant_id, principal_kind, principal_id, record_id, role)
VALUES ($1, $2, $3, $4, $5, 'READER')",
	)
	.bind(Uuid::new_v4())
	.bind(tenant_id)
	.bind(kind)
	.bind(principal_id)
	.bind(record_id)
	.execute(&db.pool)
	.await
	.expect("Failed to insert permission edge.");
}

async fn add_member(db: &Db, tenant_id: &str, group_id: &str, user_id: &str) {
	sqlx::query("INSERT INTO group_members (tenant_id, group_id, user_id) VALUES ($1, $2, $3)")
		.bind(tenant_id)
		.bind(group_id)
		.bind(user_id)
		.execute(&db.pool)
		.await
		.expect("Failed to insert group member.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set BEACON_PG_DSN to run."]
async fn resolves_direct_and_group_derived_principals() {
	let Some((test_db, db)) = test_db().await else {
		return;
	};

	insert_record(&db, "r1", "org-1", Some("v1")).await;
	insert_record(&db, "r2", "org-1", None).await;
	grant(&db, "org-1", graph::PRINCIPAL_USER, "alice", "r1").await;
	grant(&db, "org-1", graph::PRINCIPAL_GROUP, "eng", "r1").await;
	grant(&db, "org-1", graph::PRINCIPAL_GROUP, "eng", "r2").await;
	add_member(&db, "org-1", "eng", "bob").await;
	add_member(&db, "org-1", "eng", "carol").await;
	add_member(&db, "org-2", "eng", "mallory").await;

	let record = graph::get_record(&db.pool, "r1")
		.await
		.expect("Failed to load record.")
		.expect("Record must exist.");

	assert_eq!(record.virtual_record_id.as_deref(), Some("v1"));
	assert!(graph::get_record(&db.pool, "missing").await.expect("Lookup failed.").is_none());

	let principals =
		graph::get_record_permissions(&db.pool, "r1", "org-1").await.expect("Lookup failed.");

	assert_eq!(principals, vec!["alice", "bob", "carol", "eng"]);

	let records = graph::records_for_group(&db.pool, "eng", "org-1").await.expect("Lookup failed.");

	assert_eq!(records, vec!["r1", "r2"]);
	assert!(
		graph::records_for_group(&db.pool, "eng", "org-3")
			.await
			.expect("Lookup failed.")
			.is_empty()
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set BEACON_PG_DSN to run."]
async fn outbox_claims_once_and_records_failures() {
	let Some((test_db, db)) = test_db().await else {
		return;
	};
	let outbox_id = outbox::enqueue(&db, outbox::KIND_GROUP, "eng", "org-1")
		.await
		.expect("Failed to enqueue job.");
	let now = OffsetDateTime::now_utc();
	let job = outbox::claim_next(&db, now, Duration::seconds(30))
		.await
		.expect("Failed to claim job.")
		.expect("A job must be ready.");

	assert_eq!(job.outbox_id, outbox_id);
	assert_eq!(job.kind, outbox::KIND_GROUP);
	assert!(
		outbox::claim_next(&db, now, Duration::seconds(30))
			.await
			.expect("Failed to claim job.")
			.is_none(),
		"a leased job must not be claimed twice"
	);

	outbox::mark_failed(&db, outbox_id, 1, "graph unavailable", now, now)
		.await
		.expect("Failed to mark job failed.");

	let failed = outbox::get(&db, outbox_id).await.expect("Lookup failed.").expect("Job exists.");

	assert_eq!(failed.status, "FAILED");
	assert_eq!(failed.attempts, 1);
	assert_eq!(failed.last_error.as_deref(), Some("graph unavailable"));

	outbox::mark_done(&db, outbox_id, now).await.expect("Failed to mark job done.");

	assert!(
		outbox::claim_next(&db, now + Duration::minutes(5), Duration::seconds(30))
			.await
			.expect("Failed to claim job.")
			.is_none()
	);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set BEACON_PG_DSN to run."]
async fn enqueue_rejects_unknown_kind() {
	let Some((test_db, db)) = test_db().await else {
		return;
	};

	assert!(outbox::enqueue(&db, "USER", "alice", "org-1").await.is_err());

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
