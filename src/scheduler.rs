//! Drives interval collectors on per-collector periods and supervises stream
//! collectors for the process lifetime.

// crates.io
use serde::Serialize;
use tokio::{sync::watch, time};
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, CollectorHandle, RunState, stream::StreamCollect},
};

/// One entry of the scheduler's in-memory job table.
#[derive(Clone, Debug, Serialize)]
pub struct JobStatus {
	/// Collector name.
	pub name: String,
	/// `interval` or `stream`.
	pub kind: &'static str,
	/// Execution period in milliseconds; absent for stream collectors.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub period_ms: Option<u64>,
	/// Timestamp of the most recent run.
	pub last_run: Option<DateTime<Utc>>,
	/// Whether a run is currently in flight.
	pub is_running: bool,
}

/// In-memory scheduler view consumed by the health surface.
#[derive(Clone, Debug, Serialize)]
pub struct SchedulerStatus {
	/// Whether the scheduler has been started and not yet stopped.
	pub running: bool,
	/// Job table, interval collectors first.
	pub jobs: Vec<JobStatus>,
}

struct IntervalJob {
	handle: Arc<CollectorHandle>,
	state: Arc<RunState>,
}

/// Owns the collector set and their worker tasks.
///
/// Non-overlap per collector is the collector handle's own re-entrancy
/// guard; the scheduler does not double-gate, and missed ticks are never
/// backlogged.
pub struct Scheduler {
	ctx: CollectContext,
	interval: Vec<IntervalJob>,
	streams: Vec<Arc<dyn StreamCollect>>,
	running: watch::Sender<bool>,
}
impl Scheduler {
	/// An empty scheduler over the shared context.
	pub fn new(ctx: CollectContext) -> Self {
		let (running, _) = watch::channel(false);

		Self { ctx, interval: Vec::new(), streams: Vec::new(), running }
	}

	/// Register an interval collector.
	pub fn register(&mut self, collector: Box<dyn Collect>) {
		let handle = CollectorHandle::new(collector);

		tracing::info!(collector = handle.name(), "registered interval collector");

		let state = handle.state();

		self.interval.push(IntervalJob { handle: Arc::new(handle), state });
	}

	/// Register a stream collector.
	pub fn register_stream(&mut self, collector: Arc<dyn StreamCollect>) {
		tracing::info!(collector = %collector.descriptor().name, "registered stream collector");
		self.streams.push(collector);
	}

	/// Number of registered collectors (interval + stream).
	pub fn len(&self) -> usize {
		self.interval.len() + self.streams.len()
	}

	/// Whether no collectors are registered.
	pub fn is_empty(&self) -> bool {
		self.interval.is_empty() && self.streams.is_empty()
	}

	/// Whether the scheduler is running.
	pub fn is_running(&self) -> bool {
		*self.running.borrow()
	}

	/// Start one worker task per interval collector (first run immediate,
	/// then period-paced) and launch every stream collector.
	pub fn start(&self) {
		if self.running.send_replace(true) {
			tracing::warn!("scheduler already running");

			return;
		}

		tracing::info!(
			interval = self.interval.len(),
			streams = self.streams.len(),
			"scheduler starting"
		);

		for job in &self.interval {
			let handle = job.handle.clone();
			let ctx = self.ctx.clone();
			let mut running = self.running.subscribe();

			tokio::spawn(async move {
				let period = handle.descriptor().period.unwrap_or(Duration::from_secs(60));

				loop {
					if !*running.borrow() {
						break;
					}

					let started = Instant::now();

					handle.run(&ctx).await;

					let elapsed = started.elapsed();

					if elapsed > period {
						tracing::warn!(
							collector = handle.name(),
							elapsed_ms = elapsed.as_millis() as u64,
							period_ms = period.as_millis() as u64,
							"run overran its period; skipping catch-up"
						);
					}

					let wait = period.saturating_sub(elapsed);

					tokio::select! {
						_ = time::sleep(wait) => {},
						_ = running.changed() => {},
					}
				}

				tracing::debug!(collector = handle.name(), "worker exited");
			});
		}

		for stream in &self.streams {
			let stream = stream.clone();
			let ctx = self.ctx.clone();

			tokio::spawn(async move {
				stream.start(ctx).await;
				tracing::debug!(collector = %stream.descriptor().name, "stream collector exited");
			});
		}
	}

	/// Signal workers to exit at their next wake and stop stream collectors.
	///
	/// In-flight `collect()` calls are not awaited; they complete on their
	/// own and find `running == false` before the next tick.
	pub fn stop(&self) {
		if !self.running.send_replace(false) {
			return;
		}

		tracing::info!("scheduler stopping");

		for stream in &self.streams {
			stream.stop();
		}
	}

	/// The in-memory job table for the health surface.
	pub fn status(&self) -> SchedulerStatus {
		let running = self.is_running();
		let mut jobs: Vec<JobStatus> = self
			.interval
			.iter()
			.map(|job| JobStatus {
				name: job.handle.name().to_string(),
				kind: "interval",
				period_ms: job.handle.descriptor().period.map(|p| p.as_millis() as u64),
				last_run: job.state.last_run(),
				is_running: job.state.is_running(),
			})
			.collect();

		jobs.extend(self.streams.iter().map(|stream| JobStatus {
			name: stream.descriptor().name.clone(),
			kind: "stream",
			period_ms: None,
			last_run: None,
			is_running: running,
		}));

		SchedulerStatus { running, jobs }
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::{CacheClient, Fetcher, collector::Descriptor};

	struct Counting {
		descriptor: Descriptor,
		runs: Arc<AtomicU32>,
	}
	#[async_trait::async_trait]
	impl Collect for Counting {
		fn descriptor(&self) -> &Descriptor {
			&self.descriptor
		}

		async fn collect(&self, _: &CollectContext) -> Result<()> {
			self.runs.fetch_add(1, Ordering::SeqCst);

			Ok(())
		}
	}

	fn ctx() -> CollectContext {
		CollectContext {
			cache: CacheClient::uninitialized(),
			fetcher: Fetcher::new().expect("fetcher"),
		}
	}

	#[tokio::test]
	async fn first_run_is_immediate_and_pacing_continues() {
		let runs = Arc::new(AtomicU32::new(0));
		let mut scheduler = Scheduler::new(ctx());

		scheduler.register(Box::new(Counting {
			descriptor: Descriptor::interval(
				"counting",
				"kaos:counting:global",
				600,
				Duration::from_millis(50),
			)
			.expect("descriptor"),
			runs: runs.clone(),
		}));
		scheduler.start();

		tokio::time::sleep(Duration::from_millis(120)).await;
		scheduler.stop();

		let observed = runs.load(Ordering::SeqCst);

		assert!((2..=4).contains(&observed), "expected 2..=4 runs, got {observed}");

		tokio::time::sleep(Duration::from_millis(80)).await;

		assert_eq!(runs.load(Ordering::SeqCst), observed, "runs continued after stop");
	}

	#[tokio::test]
	async fn status_reports_the_job_table() {
		let mut scheduler = Scheduler::new(ctx());

		scheduler.register(Box::new(Counting {
			descriptor: Descriptor::interval(
				"counting",
				"kaos:counting:global",
				600,
				Duration::from_secs(60),
			)
			.expect("descriptor"),
			runs: Arc::new(AtomicU32::new(0)),
		}));

		let status = scheduler.status();

		assert!(!status.running);
		assert_eq!(status.jobs.len(), 1);
		assert_eq!(status.jobs[0].name, "counting");
		assert_eq!(status.jobs[0].period_ms, Some(60_000));
		assert!(status.jobs[0].last_run.is_none());
	}
}
