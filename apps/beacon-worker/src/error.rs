pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Message(String),
	#[error("{0}")]
	Validation(String),
	#[error(transparent)]
	Storage(#[from] beacon_storage::Error),
	#[error(transparent)]
	Service(#[from] beacon_service::Error),
}
