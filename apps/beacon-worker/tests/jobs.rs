use std::{
	collections::HashMap,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use beacon_service::{
	AclIndex, BoxFuture, Error, GraphRecord, PayloadFilter, PermissionGraph,
	PermissionSyncService, Result,
};
use beacon_storage::{models::PermissionSyncJob, outbox};
use beacon_worker::worker;

/// Records prefixed with `gone` do not exist; every other record lives in tenant `acme`.
struct StubGraph {
	groups: HashMap<String, Vec<String>>,
}
impl PermissionGraph for StubGraph {
	fn get_record<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<Option<GraphRecord>>> {
		Box::pin(async move {
			if record_id.starts_with("gone") {
				return Ok(None);
			}

			Ok(Some(GraphRecord {
				record_id: record_id.to_string(),
				tenant_id: "acme".to_string(),
				content_id: Some(format!("vr-{record_id}")),
			}))
		})
	}

	fn get_record_permissions<'a>(
		&'a self,
		_record_id: &'a str,
		_tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { Ok(vec!["alice".to_string()]) })
	}

	fn records_for_group<'a>(
		&'a self,
		group_id: &'a str,
		_tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			self.groups.get(group_id).cloned().ok_or_else(|| Error::Storage {
				message: format!("Graph unavailable for group {group_id}."),
			})
		})
	}
}

#[derive(Default)]
struct CountingIndex {
	calls: AtomicUsize,
}
impl AclIndex for CountingIndex {
	fn set_payload<'a>(
		&'a self,
		_filter: &'a PayloadFilter,
		_patch: &'a Map<String, Value>,
		_key: Option<&'a str>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Ok(())
		})
	}
}

fn service(index: Arc<CountingIndex>) -> PermissionSyncService {
	let groups = HashMap::from([
		("eng".to_string(), vec!["r1".to_string(), "r2".to_string()]),
		("ops".to_string(), vec!["r3".to_string(), "gone-1".to_string()]),
	]);

	PermissionSyncService::new(
		Arc::new(StubGraph { groups }),
		index,
		beacon_config::PermissionSync::default(),
	)
}

fn job(kind: &str, target_id: &str) -> PermissionSyncJob {
	let now = OffsetDateTime::now_utc();

	PermissionSyncJob {
		outbox_id: Uuid::new_v4(),
		kind: kind.to_string(),
		target_id: target_id.to_string(),
		tenant_id: "acme".to_string(),
		status: "PENDING".to_string(),
		attempts: 0,
		last_error: None,
		available_at: now,
		created_at: now,
		updated_at: now,
	}
}

#[tokio::test]
async fn record_job_pushes_acl() {
	let index = Arc::new(CountingIndex::default());
	let sync = service(index.clone());

	worker::run_job(&sync, &job(outbox::KIND_RECORD, "r1")).await.expect("Record job failed.");

	assert_eq!(index.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn record_job_fails_for_missing_record() {
	let sync = service(Arc::new(CountingIndex::default()));
	let err = worker::run_job(&sync, &job(outbox::KIND_RECORD, "gone-7"))
		.await
		.expect_err("Missing record must fail the job.");

	assert!(err.to_string().contains("gone-7"));
}

#[tokio::test]
async fn group_job_syncs_every_affected_record() {
	let index = Arc::new(CountingIndex::default());
	let sync = service(index.clone());

	worker::run_job(&sync, &job(outbox::KIND_GROUP, "eng")).await.expect("Group job failed.");

	assert_eq!(index.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn group_job_fails_when_any_record_fails() {
	let index = Arc::new(CountingIndex::default());
	let sync = service(index.clone());
	let err = worker::run_job(&sync, &job(outbox::KIND_GROUP, "ops"))
		.await
		.expect_err("Partial group sync must fail the job.");

	assert!(err.to_string().contains("1 of 2"));
	assert_eq!(index.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn group_job_fails_when_traversal_fails() {
	let sync = service(Arc::new(CountingIndex::default()));
	let result = worker::run_job(&sync, &job(outbox::KIND_GROUP, "unknown")).await;

	assert!(matches!(result, Err(beacon_worker::Error::Service(_))));
}

#[tokio::test]
async fn unknown_kind_is_rejected() {
	let sync = service(Arc::new(CountingIndex::default()));
	let result = worker::run_job(&sync, &job("TEAM", "t1")).await;

	assert!(matches!(result, Err(beacon_worker::Error::Validation(_))));
}
