//! Machinery shared by push-based stream collectors (lightning, APRS).
//!
//! A stream collector holds a persistent upstream connection for the life of
//! the process: it either has an open connection or a pending reconnect, and
//! is never quiescent. Received records accumulate in an in-memory buffer
//! that is periodically snapshotted into the cache and periodically evicted
//! down to a retention window.

// std
use std::collections::HashMap;
// crates.io
use rand::Rng;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
// self
use crate::{
	_prelude::*,
	collector::{CollectContext, Descriptor, Status, write_metadata},
};

/// Default interval between buffer snapshots written to the cache.
pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(10);
/// Interval between retention sweeps.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
/// Baseline delay before reconnecting a dropped connection.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
/// Consecutive reconnect failures after which the collector reports `error`
/// instead of `degraded`.
pub const RECONNECT_ERROR_THRESHOLD: u32 = 3;

/// Capability implemented by stream collectors.
#[async_trait::async_trait]
pub trait StreamCollect: Send + Sync {
	/// The collector's immutable configuration.
	fn descriptor(&self) -> &Descriptor;

	/// Run until [`Self::stop`] is called: hold the connection, persist the
	/// buffer on a timer, evict stale records.
	async fn start(&self, ctx: CollectContext);

	/// Signal the collector to cancel persistence, cleanup, and reconnects,
	/// and close its connection.
	fn stop(&self);
}

/// Cooperative shutdown flag shared between `start()` and `stop()`.
#[derive(Clone, Debug)]
pub struct StreamControl {
	tx: watch::Sender<bool>,
}
impl StreamControl {
	/// A control in the running state.
	pub fn new() -> Self {
		let (tx, _) = watch::channel(false);

		Self { tx }
	}

	/// Request shutdown; observers wake at their next await point.
	pub fn stop(&self) {
		let _ = self.tx.send(true);
	}

	/// Whether shutdown was requested.
	pub fn is_stopped(&self) -> bool {
		*self.tx.borrow()
	}

	/// Subscribe for shutdown notification.
	pub fn subscribe(&self) -> watch::Receiver<bool> {
		self.tx.subscribe()
	}
}
impl Default for StreamControl {
	fn default() -> Self {
		Self::new()
	}
}

/// In-memory record buffer keyed by the record's natural identity.
///
/// Single writer (the socket reader) and single reader (the persistence
/// timer) are serialized through the mutex.
#[derive(Debug)]
pub struct StreamBuffer<K, V> {
	inner: Mutex<HashMap<K, V>>,
}
impl<K, V> StreamBuffer<K, V>
where
	K: Eq + std::hash::Hash,
	V: Clone,
{
	/// An empty buffer.
	pub fn new() -> Self {
		Self { inner: Mutex::new(HashMap::new()) }
	}

	/// Insert or update a record.
	pub async fn upsert(&self, key: K, value: V) {
		self.inner.lock().await.insert(key, value);
	}

	/// Number of buffered records.
	pub async fn len(&self) -> usize {
		self.inner.lock().await.len()
	}

	/// Whether the buffer holds no records.
	pub async fn is_empty(&self) -> bool {
		self.inner.lock().await.is_empty()
	}

	/// Snapshot the buffer as a list sorted by `time_of` descending, so
	/// readers see a stable ordering per snapshot.
	pub async fn snapshot_sorted(&self, time_of: impl Fn(&V) -> i64) -> Vec<V> {
		let mut records: Vec<V> = self.inner.lock().await.values().cloned().collect();

		records.sort_by_key(|record| std::cmp::Reverse(time_of(record)));

		records
	}

	/// Drop records older than `cutoff_ms` (unix milliseconds) and return how
	/// many were evicted.
	pub async fn evict_older_than(&self, cutoff_ms: i64, time_of: impl Fn(&V) -> i64) -> usize {
		let mut inner = self.inner.lock().await;
		let before = inner.len();

		inner.retain(|_, record| time_of(record) >= cutoff_ms);

		before - inner.len()
	}
}
impl<K, V> Default for StreamBuffer<K, V>
where
	K: Eq + std::hash::Hash,
	V: Clone,
{
	fn default() -> Self {
		Self::new()
	}
}

/// Persist a buffer snapshot to the collector's payload key and refresh the
/// metadata keys.
///
/// Connection state feeds the reported status: a held connection is `ok`, a
/// pending reconnect is `degraded`, and repeated reconnect failures are
/// `error`.
pub(crate) async fn persist_snapshot<T>(
	ctx: &CollectContext,
	descriptor: &Descriptor,
	records: &[T],
	connected: bool,
	reconnect_failures: u32,
) where
	T: Serialize,
{
	let name = &descriptor.name;

	if let Err(err) = ctx.store(&descriptor.key, &records, descriptor.ttl_secs).await {
		tracing::warn!(collector = %name, error = %err, "stream snapshot write failed");
	} else {
		tracing::debug!(collector = %name, records = records.len(), "stream snapshot persisted");
	}

	let status = if connected {
		Status::Ok
	} else if reconnect_failures < RECONNECT_ERROR_THRESHOLD {
		Status::Degraded
	} else {
		Status::Error
	};

	write_metadata(&ctx.cache, name, status, Utc::now(), reconnect_failures).await;
}

/// Pick a connection URL, rotating randomly over the configured list to
/// spread load across upstream hosts.
pub(crate) fn pick_url(urls: &[String]) -> Option<&str> {
	if urls.is_empty() {
		return None;
	}

	let index = rand::rng().random_range(0..urls.len());

	Some(&urls[index])
}

/// Reconnect delay: the 5 s baseline plus up to one extra second of jitter.
pub(crate) fn reconnect_delay() -> Duration {
	RECONNECT_BACKOFF + Duration::from_millis(rand::rng().random_range(0..1_000))
}
