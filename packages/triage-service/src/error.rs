pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error ({kind}): {message}")]
	Provider { kind: String, message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Vector index error: {message}")]
	VectorIndex { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<triage_storage::Error> for Error {
	fn from(err: triage_storage::Error) -> Self {
		match err {
			triage_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			triage_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			triage_storage::Error::NotFound(message) => Self::NotFound { message },
			triage_storage::Error::Qdrant(inner) => Self::VectorIndex { message: inner.to_string() },
		}
	}
}

impl From<triage_providers::Error> for Error {
	fn from(err: triage_providers::Error) -> Self {
		Self::Provider { kind: err.kind().to_string(), message: err.to_string() }
	}
}
