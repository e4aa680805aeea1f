//! Read-path cache-aside helper.
//!
//! Returns cached data when present, otherwise invokes the fetcher at most
//! once and populates the key in the background. No single-flight guard:
//! concurrent misses may each fetch; both results overwrite the key and the
//! last writer wins, which is acceptable because fetchers are idempotent
//! reads.

// std
use std::future::Future;
// crates.io
use serde::{Serialize, de::DeserializeOwned};
// self
use crate::{_prelude::*, cache::client::CacheClient};

/// Where the returned data came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
	/// Served from the cache.
	Cache,
	/// Fetched from upstream on a miss.
	Fetch,
}
impl Source {
	/// Header-friendly label.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Cache => "cache",
			Self::Fetch => "fetch",
		}
	}
}

/// Data labelled with its origin.
#[derive(Clone, Debug)]
pub struct Sourced<T> {
	/// The payload.
	pub data: T,
	/// Cache hit or fresh fetch.
	pub source: Source,
}

/// Return `key`'s cached value if fresh, else fetch, populate, and label.
///
/// The write on a miss is fire-and-forget: a cache failure is logged and
/// never breaks the response. An uninitialized cache degrades open by
/// fetching directly.
pub async fn cache_aside<T, F, Fut>(
	cache: &CacheClient,
	key: &str,
	ttl_secs: u64,
	fetch: F,
) -> Result<Sourced<T>>
where
	T: Serialize + DeserializeOwned,
	F: FnOnce() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	if !cache.is_initialized() {
		return Ok(Sourced { data: fetch().await?, source: Source::Fetch });
	}

	match cache.get::<T>(key).await {
		Ok(Some(data)) => return Ok(Sourced { data, source: Source::Cache }),
		Ok(None) => {},
		Err(err) => {
			tracing::warn!(key, error = %err, "cache-aside read failed; falling through to fetch");
		},
	}

	let data = fetch().await?;

	match serde_json::to_string(&data) {
		Ok(raw) => {
			let cache = cache.clone();
			let key = key.to_string();

			tokio::spawn(async move {
				if let Err(err) = cache.set_raw(&key, &raw, Some(ttl_secs)).await {
					tracing::warn!(key, error = %err, "cache-aside background write failed");
				}
			});
		},
		Err(err) => {
			tracing::warn!(key, error = %err, "cache-aside serialization failed; not cached");
		},
	}

	Ok(Sourced { data, source: Source::Fetch })
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	#[tokio::test]
	async fn uninitialized_cache_degrades_open() {
		let cache = CacheClient::uninitialized();
		let calls = AtomicUsize::new(0);
		let result = cache_aside(&cache, "kaos:weather:current:41.2:-8.6", 300, || async {
			calls.fetch_add(1, Ordering::SeqCst);

			Ok(serde_json::json!({"temp": 21.5}))
		})
		.await
		.expect("cache-aside");

		assert_eq!(result.source, Source::Fetch);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn fetch_errors_propagate() {
		let cache = CacheClient::uninitialized();
		let result: Result<Sourced<serde_json::Value>> =
			cache_aside(&cache, "kaos:weather:current:0.0:0.0", 300, || async {
				Err(Error::Timeout { url: "https://upstream.example".into(), elapsed_ms: 30_000 })
			})
			.await;

		assert!(matches!(result, Err(Error::Timeout { .. })));
	}
}
