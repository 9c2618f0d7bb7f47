mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, PermissionSync, Postgres, Qdrant, Security, Service, Storage, Worker};

use std::{fs, path::Path};

pub const SUPPORTED_JWT_ALGORITHMS: [&str; 3] = ["HS256", "HS384", "HS512"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	parse(&raw).map_err(|err| match err {
		Error::ParseConfig { source, .. } =>
			Error::ParseConfig { path: path.to_path_buf(), source },
		other => other,
	})
}

pub fn parse(raw: &str) -> Result<Config> {
	let mut cfg: Config = toml::from_str(raw)
		.map_err(|err| Error::ParseConfig { path: Default::default(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.qdrant.url", &cfg.storage.qdrant.url),
		("storage.qdrant.collection", &cfg.storage.qdrant.collection),
		("security.jwt_secret_path", &cfg.security.jwt_secret_path),
		("permission_sync.content_id_field", &cfg.permission_sync.content_id_field),
		("permission_sync.acl_field", &cfg.permission_sync.acl_field),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.service.send_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "service.send_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if !SUPPORTED_JWT_ALGORITHMS.contains(&cfg.security.jwt_algorithm.as_str()) {
		return Err(Error::Validation {
			message: "security.jwt_algorithm must be one of HS256, HS384, or HS512.".to_string(),
		});
	}
	if cfg.permission_sync.concurrency_limit == 0 {
		return Err(Error::Validation {
			message: "permission_sync.concurrency_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.claim_lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.claim_lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.base_backoff_ms <= 0 {
		return Err(Error::Validation {
			message: "worker.base_backoff_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.base_backoff_ms > cfg.worker.max_backoff_ms {
		return Err(Error::Validation {
			message: "worker.base_backoff_ms must not exceed worker.max_backoff_ms.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.permission_sync
		.acl_payload_key
		.as_deref()
		.map(|key| key.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.permission_sync.acl_payload_key = None;
	}

	cfg.security.jwt_algorithm = cfg.security.jwt_algorithm.trim().to_ascii_uppercase();
}
