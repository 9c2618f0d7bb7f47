//! Pushes the authoritative record ACL from the permission graph into the search index payload.
//!
//! Every operation is best effort. Failures are logged and counted, never raised, so the graph
//! mutation that triggered a sync is never blocked by it.

use std::{collections::HashMap, sync::Arc};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{AclIndex, Error, PayloadFilter, PermissionGraph, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
	pub success_count: usize,
	pub failed_count: usize,
	pub failed_record_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupSyncReport {
	pub success: usize,
	pub failed: usize,
	pub affected_record_count: usize,
}

#[derive(Clone)]
pub struct PermissionSyncService {
	graph: Arc<dyn PermissionGraph>,
	acl: Arc<dyn AclIndex>,
	settings: Arc<beacon_config::PermissionSync>,
}
impl PermissionSyncService {
	pub fn new(
		graph: Arc<dyn PermissionGraph>,
		acl: Arc<dyn AclIndex>,
		settings: beacon_config::PermissionSync,
	) -> Self {
		Self { graph, acl, settings: Arc::new(settings) }
	}

	pub fn default_concurrency_limit(&self) -> usize {
		self.settings.concurrency_limit
	}

	/// Rewrites the ACL field on every indexed point of one record. Returns `false` on any
	/// failure, including a missing record or a record without a content identifier.
	pub async fn sync_record_permissions(
		&self,
		record_id: &str,
		tenant_id: &str,
		content_id: Option<&str>,
	) -> bool {
		match self.push_record_acl(record_id, tenant_id, content_id).await {
			Ok(principal_count) => {
				tracing::debug!(
					record_id = %record_id,
					tenant_id = %tenant_id,
					principal_count,
					"Record permissions synced."
				);

				true
			},
			Err(err) => {
				tracing::error!(
					record_id = %record_id,
					tenant_id = %tenant_id,
					error = %err,
					"Record permission sync failed."
				);

				false
			},
		}
	}

	/// Syncs every record with at most `concurrency_limit` syncs in flight. Each record's outcome
	/// is tallied independently and the call returns only after all of them resolved.
	pub async fn sync_multiple_records(
		&self,
		record_ids: &[String],
		tenant_id: &str,
		concurrency_limit: usize,
	) -> SyncReport {
		let gate = Arc::new(Semaphore::new(concurrency_limit.max(1)));
		let mut tasks = JoinSet::new();
		let mut task_records = HashMap::with_capacity(record_ids.len());
		let mut report = SyncReport::default();

		for record_id in record_ids {
			// Waiting here also bounds how many tasks exist at once.
			let Ok(permit) = gate.clone().acquire_owned().await else {
				report.failed_record_ids.push(record_id.clone());

				continue;
			};
			let service = self.clone();
			let task_record_id = record_id.clone();
			let task_tenant_id = tenant_id.to_string();
			let handle = tasks.spawn(async move {
				let _permit = permit;

				service.sync_record_permissions(&task_record_id, &task_tenant_id, None).await
			});

			task_records.insert(handle.id(), record_id.clone());
		}

		while let Some(joined) = tasks.join_next_with_id().await {
			match joined {
				Ok((_, true)) => report.success_count += 1,
				Ok((task_id, false)) =>
					if let Some(record_id) = task_records.remove(&task_id) {
						report.failed_record_ids.push(record_id);
					},
				Err(err) => {
					tracing::error!(error = %err, "Permission sync task did not complete.");

					if let Some(record_id) = task_records.remove(&err.id()) {
						report.failed_record_ids.push(record_id);
					}
				},
			}
		}

		report.failed_record_ids.sort();

		report.failed_count = report.failed_record_ids.len();

		tracing::info!(
			tenant_id = %tenant_id,
			total = record_ids.len(),
			success = report.success_count,
			failed = report.failed_count,
			"Batch permission sync finished."
		);

		report
	}

	/// Re-syncs every record the group holds a permission edge to.
	pub async fn sync_group_permission_change(
		&self,
		group_id: &str,
		tenant_id: &str,
	) -> GroupSyncReport {
		match self.affected_records(group_id, tenant_id).await {
			Ok(record_ids) => self.sync_records_for_group(group_id, tenant_id, &record_ids).await,
			Err(err) => {
				tracing::error!(
					group_id = %group_id,
					tenant_id = %tenant_id,
					error = %err,
					"Failed to resolve records affected by group change."
				);

				GroupSyncReport::default()
			},
		}
	}

	/// One-hop traversal from the group to the records it can read.
	pub async fn affected_records(&self, group_id: &str, tenant_id: &str) -> Result<Vec<String>> {
		self.graph.records_for_group(group_id, tenant_id).await
	}

	pub async fn sync_records_for_group(
		&self,
		group_id: &str,
		tenant_id: &str,
		record_ids: &[String],
	) -> GroupSyncReport {
		if record_ids.is_empty() {
			tracing::debug!(group_id = %group_id, "Group change affects no records.");

			return GroupSyncReport::default();
		}

		let limit = self.settings.concurrency_limit;
		let report = self.sync_multiple_records(record_ids, tenant_id, limit).await;

		GroupSyncReport {
			success: report.success_count,
			failed: report.failed_count,
			affected_record_count: record_ids.len(),
		}
	}

	async fn push_record_acl(
		&self,
		record_id: &str,
		tenant_id: &str,
		content_id: Option<&str>,
	) -> Result<usize> {
		let content_id = match content_id.map(str::trim).filter(|id| !id.is_empty()) {
			Some(content_id) => content_id.to_string(),
			None => self.resolve_content_id(record_id, tenant_id).await?,
		};
		let principals = self.graph.get_record_permissions(record_id, tenant_id).await?;
		let principal_count = principals.len();
		let filter = PayloadFilter::must(self.settings.content_id_field.clone(), content_id);
		let mut patch = Map::new();

		patch.insert(self.settings.acl_field.clone(), Value::from(principals));

		self.acl.set_payload(&filter, &patch, self.settings.acl_payload_key.as_deref()).await?;

		Ok(principal_count)
	}

	async fn resolve_content_id(&self, record_id: &str, tenant_id: &str) -> Result<String> {
		let record = self.graph.get_record(record_id).await?.ok_or_else(|| Error::NotFound {
			message: format!("Record {record_id} does not exist."),
		})?;

		if record.tenant_id != tenant_id {
			return Err(Error::NotFound {
				message: format!("Record {record_id} does not belong to tenant {tenant_id}."),
			});
		}

		record.content_id.filter(|id| !id.trim().is_empty()).ok_or_else(|| Error::NotFound {
			message: format!("Record {record_id} has no content identifier."),
		})
	}
}
