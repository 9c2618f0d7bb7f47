pub mod auth;
pub mod bridge;
pub mod frames;
pub mod permission_sync;
pub mod registry;
pub mod session;
pub mod time_serde;

mod error;

pub use auth::{AuthRejection, Authenticator, Principal};
pub use bridge::{EventBridge, StatusChange};
pub use error::{Error, Result};
pub use frames::{
	EventType, InboundCommand, InboundFrame, OutboundFrame, RecordEventFrame, RecordEventPayload,
	SubscriptionAction,
};
pub use permission_sync::{GroupSyncReport, PermissionSyncService, SyncReport};
pub use registry::{ConnectionRegistry, RegistryStats};
pub use session::{Session, SessionState};

use std::{collections::HashMap, future::Future, pin::Pin};

use serde_json::{Map, Value};

use beacon_storage::{db::Db, graph, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outbound half of one client stream. Implementations must preserve send order.
pub trait FrameSink
where
	Self: Send + Sync,
{
	fn send_text<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Configuration provider used to resolve secrets such as the JWT signing key.
pub trait SecretProvider
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<String>>>;
}

/// Read side of the authoritative permission graph.
pub trait PermissionGraph
where
	Self: Send + Sync,
{
	fn get_record<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<Option<GraphRecord>>>;

	fn get_record_permissions<'a>(
		&'a self,
		record_id: &'a str,
		tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<String>>>;

	fn records_for_group<'a>(
		&'a self,
		group_id: &'a str,
		tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// Search index holding the denormalized ACL copy.
pub trait AclIndex
where
	Self: Send + Sync,
{
	/// Merges `patch` into every point matched by `filter`, optionally under the nested `key`.
	fn set_payload<'a>(
		&'a self,
		filter: &'a PayloadFilter,
		patch: &'a Map<String, Value>,
		key: Option<&'a str>,
	) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRecord {
	pub record_id: String,
	pub tenant_id: String,
	pub content_id: Option<String>,
}

/// Conjunction of exact keyword matches on payload fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadFilter {
	pub must: Vec<(String, String)>,
}
impl PayloadFilter {
	pub fn must(field: impl Into<String>, value: impl Into<String>) -> Self {
		Self { must: vec![(field.into(), value.into())] }
	}
}

/// Secret provider backed by the `[secrets]` table of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigSecrets {
	values: HashMap<String, String>,
}
impl ConfigSecrets {
	pub fn new(values: HashMap<String, String>) -> Self {
		Self { values }
	}
}

impl SecretProvider for ConfigSecrets {
	fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(async move { Ok(self.values.get(path).cloned()) })
	}
}

impl PermissionGraph for Db {
	fn get_record<'a>(&'a self, record_id: &'a str) -> BoxFuture<'a, Result<Option<GraphRecord>>> {
		Box::pin(async move {
			let record = graph::get_record(&self.pool, record_id).await?;

			Ok(record.map(|record| GraphRecord {
				record_id: record.record_id,
				tenant_id: record.tenant_id,
				content_id: record.virtual_record_id,
			}))
		})
	}

	fn get_record_permissions<'a>(
		&'a self,
		record_id: &'a str,
		tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			Ok(graph::get_record_permissions(&self.pool, record_id, tenant_id).await?)
		})
	}

	fn records_for_group<'a>(
		&'a self,
		group_id: &'a str,
		tenant_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(
			async move { Ok(graph::records_for_group(&self.pool, group_id, tenant_id).await?) },
		)
	}
}

impl AclIndex for QdrantStore {
	fn set_payload<'a>(
		&'a self,
		filter: &'a PayloadFilter,
		patch: &'a Map<String, Value>,
		key: Option<&'a str>,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let filter = QdrantStore::match_filter(&filter.must);

			Ok(QdrantStore::set_payload(self, filter, patch.clone(), key).await?)
		})
	}
}
