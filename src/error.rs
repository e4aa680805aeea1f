//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the collection engine.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Redis(#[from] redis::RedisError),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Cache unavailable: {0}")]
	CacheUnavailable(String),
	#[error("Source declaration '{name}' invalid: {reason}")]
	Declaration { name: String, reason: String },
	#[error("Network error calling {url}: {reason}")]
	Network { url: String, reason: String },
	#[error("Malformed payload from {origin}: {reason}")]
	Parse { origin: String, reason: String },
	#[error("Rate limited by {url}")]
	RateLimited { url: String, retry_after: Option<u64> },
	#[error("Request timed out after {elapsed_ms} ms: {url}")]
	Timeout { url: String, elapsed_ms: u64 },
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	UpstreamStatus { status: reqwest::StatusCode, url: String, body: Option<String> },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Whether the fetch retry loop is allowed to try again after this error.
	///
	/// Terminal 4xx responses fail fast; 429 is the exception because the
	/// upstream expects the caller to back off and retry.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::UpstreamStatus { status, .. } =>
				!status.is_client_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS,
			Self::RateLimited { .. } | Self::Timeout { .. } | Self::Network { .. } => true,
			Self::Reqwest(err) => err.is_timeout() || err.is_connect() || err.is_request(),
			Self::Io(_) | Self::Redis(_) => true,
			Self::CacheUnavailable(_)
			| Self::Declaration { .. }
			| Self::Parse { .. }
			| Self::Serde(_)
			| Self::Url(_)
			| Self::Validation { .. } => false,
		}
	}

	/// Map the error to the HTTP status the read handlers surface to clients.
	pub fn http_status(&self) -> u16 {
		match self {
			Self::Validation { .. } => 400,
			Self::RateLimited { .. } => 429,
			Self::Network { .. } => 502,
			Self::CacheUnavailable(_) => 503,
			Self::Timeout { .. } => 504,
			Self::UpstreamStatus { status, .. }
				if *status == reqwest::StatusCode::TOO_MANY_REQUESTS =>
				429,
			Self::Reqwest(err) if err.is_timeout() => 504,
			Self::Reqwest(err) if err.is_connect() => 502,
			_ => 500,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn upstream(status: u16) -> Error {
		Error::UpstreamStatus {
			status: reqwest::StatusCode::from_u16(status).expect("status"),
			url: "https://upstream.example/feed".into(),
			body: None,
		}
	}

	#[test]
	fn client_errors_are_terminal_except_rate_limits() {
		assert!(!upstream(400).is_retryable());
		assert!(!upstream(404).is_retryable());
		assert!(upstream(429).is_retryable());
		assert!(upstream(500).is_retryable());
		assert!(upstream(503).is_retryable());
	}

	#[test]
	fn error_kinds_map_to_handler_statuses() {
		let timeout = Error::Timeout { url: "https://upstream.example".into(), elapsed_ms: 30_000 };
		let network =
			Error::Network { url: "https://upstream.example".into(), reason: "refused".into() };

		assert_eq!(timeout.http_status(), 504);
		assert_eq!(network.http_status(), 502);
		assert_eq!(Error::CacheUnavailable("not configured".into()).http_status(), 503);
		assert_eq!(
			Error::Validation { field: "lamin", reason: "must be numeric".into() }.http_status(),
			400
		);
		assert_eq!(upstream(500).http_status(), 500);
	}
}
