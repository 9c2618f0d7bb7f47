use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub security: Security,
	#[serde(default)]
	pub secrets: HashMap<String, String>,
	#[serde(default)]
	pub permission_sync: PermissionSync,
	#[serde(default)]
	pub worker: Worker,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
	/// Upper bound on one outbound frame send before the client is dropped.
	#[serde(default = "default_send_timeout_ms")]
	pub send_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Security {
	pub bind_localhost_only: bool,
	/// Key looked up through the secret provider to obtain the JWT signing secret.
	pub jwt_secret_path: String,
	#[serde(default = "default_jwt_algorithm")]
	pub jwt_algorithm: String,
}

/// Where the denormalized ACL lives inside each indexed point's payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PermissionSync {
	pub concurrency_limit: usize,
	pub content_id_field: String,
	pub acl_field: String,
	/// Optional nested payload object the ACL field is written into.
	pub acl_payload_key: Option<String>,
}
impl Default for PermissionSync {
	fn default() -> Self {
		Self {
			concurrency_limit: 10,
			content_id_field: "virtualRecordId".to_string(),
			acl_field: "permissions".to_string(),
			acl_payload_key: Some("metadata".to_string()),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Worker {
	pub poll_interval_ms: u64,
	pub claim_lease_seconds: i64,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			poll_interval_ms: 500,
			claim_lease_seconds: 30,
			base_backoff_ms: 500,
			max_backoff_ms: 30_000,
		}
	}
}

fn default_send_timeout_ms() -> u64 {
	5_000
}

fn default_jwt_algorithm() -> String {
	"HS256".to_string()
}
