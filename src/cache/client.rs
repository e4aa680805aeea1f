//! Backend-agnostic cache client façade.

// crates.io
use serde::{Serialize, de::DeserializeOwned};
// self
use crate::{
	_prelude::*,
	cache::backend::{Backend, DirectBackend, RestBackend},
	config::{CacheConfig, CacheMode},
};

/// One buffered write for [`CacheClient::pipeline`].
#[derive(Clone, Debug)]
pub struct CacheWrite {
	/// Destination key.
	pub key: String,
	/// Serialized value.
	pub value: String,
	/// TTL in seconds; `None` persists without expiry (metadata keys).
	pub ttl_secs: Option<u64>,
}
impl CacheWrite {
	/// Serialize a value to JSON for a TTL-bounded write.
	pub fn json<T>(key: impl Into<String>, value: &T, ttl_secs: u64) -> Result<Self>
	where
		T: Serialize,
	{
		Ok(Self { key: key.into(), value: serde_json::to_string(value)?, ttl_secs: Some(ttl_secs) })
	}

	/// A raw string write without expiry.
	pub fn forever(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self { key: key.into(), value: value.into(), ttl_secs: None }
	}
}

/// Façade over the configured cache backend.
///
/// An uninitialized client (no backend configured or initialization failed)
/// degrades open: reads return absent, writes surface an explicit error.
/// Safe for concurrent callers; same-key writes are last-writer-wins at the
/// server.
#[derive(Clone, Debug)]
pub struct CacheClient {
	inner: Option<Backend>,
}
impl CacheClient {
	/// Select and initialize a backend per configuration.
	///
	/// Direct mode with a configured URL picks the direct backend; otherwise
	/// the REST backend when configured. Initialization failure logs and
	/// leaves the client uninitialized rather than aborting startup.
	pub async fn connect(config: &CacheConfig) -> Self {
		if config.mode == CacheMode::Direct
			&& let Some(url) = &config.redis_url
		{
			match DirectBackend::connect(url).await {
				Ok(backend) => {
					tracing::info!("cache: direct backend connected");

					return Self { inner: Some(Backend::Direct(backend)) };
				},
				Err(err) => {
					tracing::error!(error = %err, "cache: direct backend initialization failed");

					return Self::uninitialized();
				},
			}
		}

		if let (Some(base), Some(token)) = (&config.rest_url, &config.rest_token) {
			match RestBackend::new(base, token) {
				Ok(backend) => {
					tracing::info!("cache: rest backend configured");

					return Self { inner: Some(Backend::Rest(backend)) };
				},
				Err(err) => {
					tracing::error!(error = %err, "cache: rest backend initialization failed");

					return Self::uninitialized();
				},
			}
		}

		tracing::warn!("cache: no backend configured; reads absent, writes will fail");

		Self::uninitialized()
	}

	/// A client with no backend.
	pub fn uninitialized() -> Self {
		Self { inner: None }
	}

	/// A client over an explicit backend (tests and custom wiring).
	pub fn with_backend(backend: Backend) -> Self {
		Self { inner: Some(backend) }
	}

	/// Whether a backend was initialized.
	pub fn is_initialized(&self) -> bool {
		self.inner.is_some()
	}

	/// Read and JSON-decode a key; absent on miss or when uninitialized.
	pub async fn get<T>(&self, key: &str) -> Result<Option<T>>
	where
		T: DeserializeOwned,
	{
		match self.get_raw(key).await? {
			None => Ok(None),
			Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|err| Error::Parse {
				origin: format!("cache:{key}"),
				reason: format!("Stored value is not valid JSON for the requested type: {err}."),
			}),
		}
	}

	/// Read a key's raw stored string.
	pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
		match &self.inner {
			None => Ok(None),
			Some(backend) => backend.get(key).await,
		}
	}

	/// Serialize to JSON and write with a TTL.
	pub async fn set<T>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()>
	where
		T: Serialize,
	{
		let raw = serde_json::to_string(value)?;

		self.set_raw(key, &raw, Some(ttl_secs)).await
	}

	/// Serialize to JSON and write without expiry.
	pub async fn set_forever<T>(&self, key: &str, value: &T) -> Result<()>
	where
		T: Serialize,
	{
		let raw = serde_json::to_string(value)?;

		self.set_raw(key, &raw, None).await
	}

	/// Write a raw string value.
	pub async fn set_raw(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
		match &self.inner {
			None => Err(Error::CacheUnavailable("No cache backend configured.".into())),
			Some(backend) => backend.set(key, value, ttl_secs).await,
		}
	}

	/// Group independent writes into one round trip.
	pub async fn pipeline(&self, writes: Vec<CacheWrite>) -> Result<()> {
		match &self.inner {
			None => Err(Error::CacheUnavailable("No cache backend configured.".into())),
			Some(backend) => backend.pipeline(&writes).await,
		}
	}

	/// Enumerate keys matching a glob pattern.
	///
	/// Only the health surface uses this, bounded to the
	/// `kaos:meta:*:status` pattern.
	pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
		match &self.inner {
			None => Ok(Vec::new()),
			Some(backend) => backend.keys(pattern).await,
		}
	}

	/// Probe backend liveness.
	pub async fn ping(&self) -> bool {
		match &self.inner {
			None => false,
			Some(backend) => backend.ping().await.is_ok(),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn uninitialized_client_degrades_open() {
		let cache = CacheClient::uninitialized();

		assert!(!cache.is_initialized());
		assert_eq!(cache.get_raw("kaos:seismic:day").await.expect("read"), None);
		assert!(cache.set_raw("kaos:seismic:day", "{}", Some(60)).await.is_err());
		assert!(!cache.ping().await);
		assert!(cache.keys("kaos:meta:*:status").await.expect("keys").is_empty());
	}
}
