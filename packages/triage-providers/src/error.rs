pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Provider request timed out.")]
	Timeout,
	#[error("Provider rate limited the request.")]
	RateLimited,
	#[error("Provider rejected the credentials.")]
	Auth,
	#[error("Provider unavailable: {message}")]
	Unavailable { message: String },
	#[error("Invalid provider response: {message}")]
	InvalidResponse { message: String },
	#[error("Invalid provider config: {message}")]
	InvalidConfig { message: String },
}
impl Error {
	/// Transient faults worth another attempt. Validation-class faults and bad
	/// credentials are not.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Timeout | Self::RateLimited | Self::Unavailable { .. })
	}

	pub fn kind(&self) -> &'static str {
		match self {
			Self::Timeout => "TIMEOUT",
			Self::RateLimited => "RATE_LIMITED",
			Self::Auth => "AUTH",
			Self::Unavailable { .. } => "UNAVAILABLE",
			Self::InvalidResponse { .. } => "INVALID_RESPONSE",
			Self::InvalidConfig { .. } => "INVALID_CONFIG",
		}
	}
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			return Self::Timeout;
		}
		if let Some(status) = err.status() {
			return match status.as_u16() {
				429 => Self::RateLimited,
				401 | 403 => Self::Auth,
				_ => Self::Unavailable { message: err.to_string() },
			};
		}

		Self::Unavailable { message: err.to_string() }
	}
}

impl From<reqwest::header::InvalidHeaderName> for Error {
	fn from(err: reqwest::header::InvalidHeaderName) -> Self {
		Self::InvalidConfig { message: err.to_string() }
	}
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
	fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
		Self::InvalidConfig { message: err.to_string() }
	}
}
