//! Collector abstraction: descriptors, run state, health status, and the
//! interval run harness.

pub mod stream;

// std
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
// crates.io
use serde::Serialize;
use tokio::time;
// self
use crate::{
	_prelude::*,
	cache::client::{CacheClient, CacheWrite},
	fetch::Fetcher,
	keys,
};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
/// Consecutive failures at which a collector's status becomes `error`.
pub const ERROR_THRESHOLD: u32 = 3;

/// Immutable per-collector configuration.
#[derive(Clone, Debug)]
pub struct Descriptor {
	/// Unique collector name; log field and metadata key infix.
	pub name: String,
	/// Primary payload key (or key pattern for multi-key collectors).
	pub key: String,
	/// Payload TTL in seconds.
	pub ttl_secs: u64,
	/// Execution period for interval collectors; absent for stream kinds.
	pub period: Option<Duration>,
	/// Additional attempts after the initial `collect()` call.
	pub retry_attempts: u32,
	/// Base retry delay; attempt `k` waits `base * 2^k`.
	pub retry_base_delay: Duration,
}
impl Descriptor {
	/// Descriptor for a timer-driven collector.
	///
	/// Enforces `ttl >= 1.5 * period` so a transiently failing collector
	/// still serves stale-but-present data until the next success.
	pub fn interval(
		name: impl Into<String>,
		key: impl Into<String>,
		ttl_secs: u64,
		period: Duration,
	) -> Result<Self> {
		let descriptor = Self {
			name: name.into(),
			key: key.into(),
			ttl_secs,
			period: Some(period),
			retry_attempts: DEFAULT_RETRY_ATTEMPTS,
			retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}

	/// Descriptor for a push-based stream collector.
	pub fn stream(name: impl Into<String>, key: impl Into<String>, ttl_secs: u64) -> Self {
		Self {
			name: name.into(),
			key: key.into(),
			ttl_secs,
			period: None,
			retry_attempts: DEFAULT_RETRY_ATTEMPTS,
			retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
		}
	}

	/// Override the retry policy.
	pub fn with_retry(mut self, attempts: u32, base_delay: Duration) -> Self {
		self.retry_attempts = attempts;
		self.retry_base_delay = base_delay;

		self
	}

	/// Validate the descriptor invariants.
	pub fn validate(&self) -> Result<()> {
		if self.name.is_empty() {
			return Err(Error::Validation {
				field: "descriptor.name",
				reason: "Must not be empty.".into(),
			});
		}
		if self.ttl_secs == 0 {
			return Err(Error::Validation {
				field: "descriptor.ttl_secs",
				reason: "Must be at least 1.".into(),
			});
		}
		if let Some(period) = self.period {
			// ttl >= 1.5 * period, in integer milliseconds
			if self.ttl_secs * 1_000 * 2 < period.as_millis() as u64 * 3 {
				return Err(Error::Validation {
					field: "descriptor.ttl_secs",
					reason: format!(
						"TTL {}s must be at least 1.5x the {}ms period.",
						self.ttl_secs,
						period.as_millis()
					),
				});
			}
		}

		Ok(())
	}
}

/// Health status derived from a collector's consecutive error count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
	/// Last run succeeded.
	Ok,
	/// One or two consecutive failures; stale data still covers the gap.
	Degraded,
	/// Three or more consecutive failures.
	Error,
}
impl Status {
	/// Status for a consecutive error count.
	pub fn from_error_count(consecutive_errors: u32) -> Self {
		match consecutive_errors {
			0 => Self::Ok,
			n if n < ERROR_THRESHOLD => Self::Degraded,
			_ => Self::Error,
		}
	}

	/// Metadata value written to the cache.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Ok => "ok",
			Self::Degraded => "degraded",
			Self::Error => "error",
		}
	}
}

/// Mutable per-collector runtime state, shared with the scheduler's status
/// view.
#[derive(Debug, Default)]
pub struct RunState {
	is_running: AtomicBool,
	consecutive_errors: AtomicU32,
	last_run_ms: AtomicI64,
}
impl RunState {
	/// Current consecutive error count.
	pub fn consecutive_errors(&self) -> u32 {
		self.consecutive_errors.load(Ordering::Acquire)
	}

	/// Whether a run is currently in flight.
	pub fn is_running(&self) -> bool {
		self.is_running.load(Ordering::Acquire)
	}

	/// Timestamp of the most recent run, if any.
	pub fn last_run(&self) -> Option<DateTime<Utc>> {
		match self.last_run_ms.load(Ordering::Acquire) {
			0 => None,
			ms => DateTime::from_timestamp_millis(ms),
		}
	}
}

/// Shared dependencies handed to every `collect()` call.
#[derive(Clone, Debug)]
pub struct CollectContext {
	/// The shared cache client.
	pub cache: CacheClient,
	/// The shared outbound HTTP fetcher.
	pub fetcher: Fetcher,
}
impl CollectContext {
	/// Store a payload under a key with a TTL; used directly by multi-key
	/// collectors.
	pub async fn store<T>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()>
	where
		T: Serialize,
	{
		self.cache.set(key, value, ttl_secs).await
	}
}

/// Capability implemented by every interval collector.
#[async_trait::async_trait]
pub trait Collect: Send + Sync {
	/// The collector's immutable configuration.
	fn descriptor(&self) -> &Descriptor;

	/// Fetch, transform, and store one snapshot.
	///
	/// Single-key collectors typically store via [`CollectContext::store`]
	/// with `descriptor().key`; multi-key collectors store each key
	/// themselves.
	async fn collect(&self, ctx: &CollectContext) -> Result<()>;
}

/// Pairs a collector with its runtime state and owns the run harness.
pub struct CollectorHandle {
	collector: Box<dyn Collect>,
	state: Arc<RunState>,
}
impl CollectorHandle {
	/// Wrap a collector.
	pub fn new(collector: Box<dyn Collect>) -> Self {
		Self { collector, state: Arc::new(RunState::default()) }
	}

	/// The collector's name.
	pub fn name(&self) -> &str {
		&self.collector.descriptor().name
	}

	/// The collector's descriptor.
	pub fn descriptor(&self) -> &Descriptor {
		self.collector.descriptor()
	}

	/// Shared runtime state for the scheduler's status view.
	pub fn state(&self) -> Arc<RunState> {
		self.state.clone()
	}

	/// Execute one guarded run: retry the collection, update the error
	/// bookkeeping, and write the metadata keys.
	///
	/// Failures never propagate to the scheduler; the next tick tries again.
	pub async fn run(&self, ctx: &CollectContext) {
		let name = self.name();

		if self
			.state
			.is_running
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			tracing::warn!(collector = name, "previous run still in flight; skipping tick");

			return;
		}

		let started = Instant::now();
		let result = self.collect_with_retry(ctx).await;
		let now = Utc::now();

		self.state.last_run_ms.store(now.timestamp_millis(), Ordering::Release);

		let consecutive_errors = match result {
			Ok(()) => {
				self.state.consecutive_errors.store(0, Ordering::Release);
				tracing::info!(
					collector = name,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"collection complete"
				);

				0
			},
			Err(err) => {
				let errors = self.state.consecutive_errors.fetch_add(1, Ordering::AcqRel) + 1;

				tracing::error!(
					collector = name,
					consecutive_errors = errors,
					error = %err,
					"collection failed"
				);

				errors
			},
		};

		let status = Status::from_error_count(consecutive_errors);

		write_metadata(&ctx.cache, name, status, now, consecutive_errors).await;
		self.state.is_running.store(false, Ordering::Release);
	}

	async fn collect_with_retry(&self, ctx: &CollectContext) -> Result<()> {
		let descriptor = self.collector.descriptor();
		let mut attempt = 0_u32;

		loop {
			match self.collector.collect(ctx).await {
				Ok(()) => return Ok(()),
				Err(err) => {
					if attempt >= descriptor.retry_attempts || !err.is_retryable() {
						return Err(err);
					}

					let delay = descriptor.retry_base_delay * 2_u32.pow(attempt);

					tracing::warn!(
						collector = %descriptor.name,
						attempt = attempt + 1,
						?delay,
						error = %err,
						"collection attempt failed; retrying"
					);
					time::sleep(delay).await;

					attempt += 1;
				},
			}
		}
	}
}

/// Write the three metadata keys for a collector, without TTL.
///
/// Metadata writes never fail a run; errors are logged and swallowed.
pub(crate) async fn write_metadata(
	cache: &CacheClient,
	name: &str,
	status: Status,
	last_run: DateTime<Utc>,
	error_count: u32,
) {
	let writes = vec![
		CacheWrite::forever(keys::meta_status(name), status.as_str()),
		CacheWrite::forever(keys::meta_last_run(name), last_run.timestamp_millis().to_string()),
		CacheWrite::forever(keys::meta_error_count(name), error_count.to_string()),
	];

	if let Err(err) = cache.pipeline(writes).await {
		tracing::warn!(collector = name, error = %err, "metadata write failed");
	}
}
