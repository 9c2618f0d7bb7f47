use std::{sync::Arc, time::Duration};

use beacon_config::Config;
use beacon_service::{
	AclIndex, Authenticator, ConfigSecrets, ConnectionRegistry, EventBridge, PermissionGraph,
	PermissionSyncService, SecretProvider,
};
use beacon_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub registry: Arc<ConnectionRegistry>,
	pub authenticator: Arc<Authenticator>,
	pub bridge: Arc<EventBridge>,
	pub permission_sync: Arc<PermissionSyncService>,
}
impl AppState {
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;
		let secrets = ConfigSecrets::new(config.secrets.clone());

		Self::with_components(&config, Arc::new(secrets), Arc::new(db), Arc::new(qdrant))
	}

	/// Wires the service layer around explicit collaborators. The registry is created here and
	/// shared by every component that needs it.
	pub fn with_components(
		config: &Config,
		secrets: Arc<dyn SecretProvider>,
		graph: Arc<dyn PermissionGraph>,
		acl: Arc<dyn AclIndex>,
	) -> color_eyre::Result<Self> {
		let send_timeout = Duration::from_millis(config.service.send_timeout_ms);
		let registry = Arc::new(ConnectionRegistry::with_send_timeout(send_timeout));
		let authenticator = Authenticator::new(secrets, &config.security)?;
		let bridge = EventBridge::new(registry.clone());
		let permission_sync =
			PermissionSyncService::new(graph, acl, config.permission_sync.clone());

		Ok(Self {
			registry,
			authenticator: Arc::new(authenticator),
			bridge: Arc::new(bridge),
			permission_sync: Arc::new(permission_sync),
		})
	}
}
