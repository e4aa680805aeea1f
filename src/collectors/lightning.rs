//! Global lightning strikes over a persistent WebSocket feed.
//!
//! The upstream frame is a loosely structured text blob; extraction finds
//! the `"lat"` and `"lon"` markers and parses the first numeric substring
//! after each. Strikes accumulate in a rolling 30 minute window that is
//! snapshotted to the cache every 10 seconds.

// std
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
// crates.io
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time;
use tokio_tungstenite::{connect_async, tungstenite::Message};
// self
use crate::{
	_prelude::*,
	collector::{
		CollectContext, Descriptor,
		stream::{
			CLEANUP_INTERVAL, DEFAULT_PERSIST_INTERVAL, StreamBuffer, StreamCollect,
			StreamControl, persist_snapshot, pick_url, reconnect_delay,
		},
	},
	keys,
};

const DEFAULT_URLS: [&str; 3] =
	["wss://ws1.blitzortung.org/", "wss://ws7.blitzortung.org/", "wss://ws8.blitzortung.org/"];
const SUBSCRIBE_FRAME: &str = "{\"a\":111}";
const TTL_SECS: u64 = 60;
const RETENTION: Duration = Duration::from_secs(30 * 60);

/// One lightning strike in the rolling window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Strike {
	/// Latitude in degrees.
	pub lat: f64,
	/// Longitude in degrees.
	pub lon: f64,
	/// Strike time in unix milliseconds.
	pub time_ms: i64,
}

/// Natural identity of a strike: coarse position and a one second bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StrikeKey {
	lat_decis: i32,
	lon_decis: i32,
	time_s: i64,
}
impl StrikeKey {
	/// Bucket a strike to 0.1 degree cells and whole seconds.
	pub fn of(strike: &Strike) -> Self {
		Self {
			lat_decis: (strike.lat * 10.0).round() as i32,
			lon_decis: (strike.lon * 10.0).round() as i32,
			time_s: strike.time_ms.div_euclid(1_000),
		}
	}
}

/// Stream collector for the `kaos:lightning:global` rolling window.
pub struct LightningCollector {
	descriptor: Descriptor,
	urls: Arc<Vec<String>>,
	buffer: Arc<StreamBuffer<StrikeKey, Strike>>,
	control: StreamControl,
	connected: Arc<AtomicBool>,
	reconnect_failures: Arc<AtomicU32>,
}
impl LightningCollector {
	/// Collector against the default upstream host rotation.
	pub fn new() -> Self {
		Self::with_urls(DEFAULT_URLS.iter().map(|url| url.to_string()).collect())
	}

	/// Collector against custom WebSocket URLs (tests).
	pub fn with_urls(urls: Vec<String>) -> Self {
		Self {
			descriptor: Descriptor::stream("lightning", keys::lightning(), TTL_SECS),
			urls: Arc::new(urls),
			buffer: Arc::new(StreamBuffer::new()),
			control: StreamControl::new(),
			connected: Arc::new(AtomicBool::new(false)),
			reconnect_failures: Arc::new(AtomicU32::new(0)),
		}
	}

	async fn persist(&self, ctx: &CollectContext) {
		let records = self.buffer.snapshot_sorted(|strike| strike.time_ms).await;

		persist_snapshot(
			ctx,
			&self.descriptor,
			&records,
			self.connected.load(Ordering::Acquire),
			self.reconnect_failures.load(Ordering::Acquire),
		)
		.await;
	}
}
impl Default for LightningCollector {
	fn default() -> Self {
		Self::new()
	}
}
#[async_trait::async_trait]
impl StreamCollect for LightningCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn start(&self, ctx: CollectContext) {
		let reader = tokio::spawn(connection_loop(
			self.urls.clone(),
			self.buffer.clone(),
			self.control.clone(),
			self.connected.clone(),
			self.reconnect_failures.clone(),
		));
		let mut stopped = self.control.subscribe();
		let mut persist = time::interval(DEFAULT_PERSIST_INTERVAL);
		let mut cleanup = time::interval(CLEANUP_INTERVAL);

		loop {
			tokio::select! {
				changed = stopped.changed() => {
					if changed.is_err() || *stopped.borrow() {
						break;
					}
				},
				_ = persist.tick() => self.persist(&ctx).await,
				_ = cleanup.tick() => {
					let cutoff = Utc::now().timestamp_millis() - RETENTION.as_millis() as i64;
					let evicted = self.buffer.evict_older_than(cutoff, |strike| strike.time_ms).await;

					if evicted > 0 {
						tracing::debug!(evicted, "lightning: retention sweep");
					}
				},
			}
		}

		reader.abort();
	}

	fn stop(&self) {
		self.control.stop();
	}
}

async fn connection_loop(
	urls: Arc<Vec<String>>,
	buffer: Arc<StreamBuffer<StrikeKey, Strike>>,
	control: StreamControl,
	connected: Arc<AtomicBool>,
	reconnect_failures: Arc<AtomicU32>,
) {
	loop {
		if control.is_stopped() {
			return;
		}

		let Some(url) = pick_url(&urls) else {
			return;
		};

		match connect_async(url).await {
			Ok((mut socket, _)) => {
				reconnect_failures.store(0, Ordering::Release);
				connected.store(true, Ordering::Release);
				tracing::info!(url, "lightning: connected");

				if let Err(err) = socket.send(Message::Text(SUBSCRIBE_FRAME.to_string())).await {
					tracing::warn!(error = %err, "lightning: subscription send failed");
				}

				while let Some(message) = socket.next().await {
					if control.is_stopped() {
						let _ = socket.close(None).await;

						connected.store(false, Ordering::Release);

						return;
					}

					let frame = match message {
						Ok(Message::Text(frame)) => frame,
						Ok(Message::Binary(bytes)) =>
							match String::from_utf8(bytes) {
								Ok(frame) => frame,
								Err(_) => continue,
							},
						Ok(_) => continue,
						Err(err) => {
							tracing::warn!(error = %err, "lightning: read failed");

							break;
						},
					};

					if let Some(strike) = parse_strike(&frame) {
						buffer.upsert(StrikeKey::of(&strike), strike).await;
					}
				}

				connected.store(false, Ordering::Release);
				tracing::warn!("lightning: connection closed; reconnecting");
			},
			Err(err) => {
				reconnect_failures.fetch_add(1, Ordering::AcqRel);
				tracing::warn!(url, error = %err, "lightning: connect failed");
			},
		}

		if control.is_stopped() {
			return;
		}

		time::sleep(reconnect_delay()).await;
	}
}

/// Extract a strike from an upstream frame, rejecting coordinates outside
/// `[-90, 90] x [-180, 180]`.
pub fn parse_strike(frame: &str) -> Option<Strike> {
	let lat = number_after(frame, "\"lat\"")?;
	let lon = number_after(frame, "\"lon\"")?;

	if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
		return None;
	}

	let time_ms = number_after(frame, "\"time\"")
		.map(normalize_time_ms)
		.unwrap_or_else(|| Utc::now().timestamp_millis());

	Some(Strike { lat, lon, time_ms })
}

/// First numeric substring after a marker.
fn number_after(frame: &str, marker: &str) -> Option<f64> {
	let start = frame.find(marker)? + marker.len();
	let rest = &frame[start..];
	let begin = rest.find(|c: char| c.is_ascii_digit() || c == '-')?;
	let numeric: String = rest[begin..]
		.chars()
		.take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-' || *c == 'e' || *c == 'E')
		.collect();

	numeric.parse().ok()
}

/// The upstream reports nanoseconds; older frames carry seconds or
/// milliseconds. Normalize to unix milliseconds by magnitude.
fn normalize_time_ms(raw: f64) -> i64 {
	if raw > 1e14 {
		(raw / 1e6) as i64
	} else if raw > 1e11 {
		raw as i64
	} else {
		(raw * 1_000.0) as i64
	}
}
