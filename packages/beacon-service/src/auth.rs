//! Bearer token validation for notification connections.

use std::{str::FromStr, sync::Arc};

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};

use crate::{Error, Result, SecretProvider};

const USER_CLAIMS: &[&str] = &["user_id", "userId"];
const TENANT_CLAIMS: &[&str] = &["tenant_id", "org_id", "orgId", "tenantId"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
	pub user_id: String,
	pub tenant_id: String,
}

/// Why a connection attempt was refused. Each cause maps to its own close code and no detail is
/// sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
	MissingToken,
	InvalidToken,
	IncompleteClaims,
	SecretUnavailable,
}
impl AuthRejection {
	pub const fn close_code(self) -> u16 {
		match self {
			Self::MissingToken => 4001,
			Self::InvalidToken => 4002,
			Self::IncompleteClaims => 4003,
			Self::SecretUnavailable => 1011,
		}
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::MissingToken => "missing_token",
			Self::InvalidToken => "invalid_token",
			Self::IncompleteClaims => "incomplete_claims",
			Self::SecretUnavailable => "secret_unavailable",
		}
	}
}

pub struct Authenticator {
	secrets: Arc<dyn SecretProvider>,
	secret_path: String,
	algorithm: Algorithm,
}
impl Authenticator {
	pub fn new(
		secrets: Arc<dyn SecretProvider>,
		security: &beacon_config::Security,
	) -> Result<Self> {
		let algorithm = Algorithm::from_str(security.jwt_algorithm.trim()).map_err(|_| {
			Error::InvalidRequest {
				message: format!("Unsupported JWT algorithm {}.", security.jwt_algorithm),
			}
		})?;

		if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
			return Err(Error::InvalidRequest {
				message: format!("JWT algorithm {algorithm:?} is not a shared-secret algorithm."),
			});
		}

		Ok(Self { secrets, secret_path: security.jwt_secret_path.clone(), algorithm })
	}

	/// Validates signature, algorithm and expiry, then extracts the user and tenant claims.
	///
	/// A secret that cannot be resolved rejects the connection.
	pub async fn authenticate(&self, token: Option<&str>) -> Result<Principal, AuthRejection> {
		let Some(token) = token.map(str::trim).filter(|token| !token.is_empty()) else {
			return Err(AuthRejection::MissingToken);
		};
		let secret = match self.secrets.get(&self.secret_path).await {
			Ok(Some(secret)) if !secret.is_empty() => secret,
			Ok(_) => {
				tracing::error!(path = %self.secret_path, "JWT secret is not configured.");

				return Err(AuthRejection::SecretUnavailable);
			},
			Err(err) => {
				tracing::error!(error = %err, "Failed to resolve JWT secret.");

				return Err(AuthRejection::SecretUnavailable);
			},
		};
		let validation = Validation::new(self.algorithm);
		let decoded = jsonwebtoken::decode::<Map<String, Value>>(
			token,
			&DecodingKey::from_secret(secret.as_bytes()),
			&validation,
		)
		.map_err(|err| {
			tracing::debug!(error = %err, "Rejected bearer token.");

			AuthRejection::InvalidToken
		})?;
		let claims = decoded.claims;
		let (Some(user_id), Some(tenant_id)) =
			(claim(&claims, USER_CLAIMS), claim(&claims, TENANT_CLAIMS))
		else {
			return Err(AuthRejection::IncompleteClaims);
		};

		Ok(Principal { user_id, tenant_id })
	}
}

fn claim(claims: &Map<String, Value>, names: &[&str]) -> Option<String> {
	names.iter().find_map(|name| match claims.get(*name) {
		Some(Value::String(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
		_ => None,
	})
}
