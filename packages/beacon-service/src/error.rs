pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
	#[error("Secret error: {message}")]
	Secret { message: String },
	#[error("Transport error: {message}")]
	Transport { message: String },
	#[error("Serialization error: {message}")]
	Serialization { message: String },
}
impl From<beacon_storage::Error> for Error {
	fn from(err: beacon_storage::Error) -> Self {
		match err {
			beacon_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			beacon_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			beacon_storage::Error::NotFound(message) => Self::NotFound { message },
			beacon_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Serialization { message: err.to_string() }
	}
}
