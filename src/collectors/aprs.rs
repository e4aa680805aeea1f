//! APRS station positions over a persistent APRS-IS TCP connection.
//!
//! The gateway is line-oriented: a login line buys a filtered feed, `#`
//! lines are server chatter, and everything else is a packet. Only
//! uncompressed position reports are decoded; stations are keyed by
//! callsign and kept for a one hour window.

// std
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
// crates.io
use serde::{Deserialize, Serialize};
use tokio::{
	io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
	net::TcpStream,
	time,
};
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

const DEFAULT_HOSTS: [&str; 2] = ["rotate.aprs2.net:14580", "euro.aprs2.net:14580"];
const LOGIN_LINE: &str = "user KAOS pass -1 vers kaos-worker 0.4 filter t/p\r\n";
const TTL_SECS: u64 = 300;
const RETENTION: Duration = Duration::from_secs(60 * 60);

/// One APRS station in the rolling window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AprsStation {
	/// Station callsign (with SSID).
	pub callsign: String,
	/// Latitude in degrees.
	pub lat: f64,
	/// Longitude in degrees.
	pub lon: f64,
	/// APRS symbol table and code.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub symbol: Option<String>,
	/// Free-text comment trailing the position.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub comment: Option<String>,
	/// Unix milliseconds when the report was received.
	pub time_ms: i64,
}

/// Stream collector for the `kaos:aprs:global` rolling window.
pub struct AprsCollector {
	descriptor: Descriptor,
	hosts: Arc<Vec<String>>,
	buffer: Arc<StreamBuffer<String, AprsStation>>,
	control: StreamControl,
	connected: Arc<AtomicBool>,
	reconnect_failures: Arc<AtomicU32>,
}
impl AprsCollector {
	/// Collector against the default gateway rotation.
	pub fn new() -> Self {
		Self::with_hosts(DEFAULT_HOSTS.iter().map(|host| host.to_string()).collect())
	}

	/// Collector against custom gateway hosts (tests).
	pub fn with_hosts(hosts: Vec<String>) -> Self {
		Self {
			descriptor: Descriptor::stream("aprs", keys::aprs(), TTL_SECS),
			hosts: Arc::new(hosts),
			buffer: Arc::new(StreamBuffer::new()),
			control: StreamControl::new(),
			connected: Arc::new(AtomicBool::new(false)),
			reconnect_failures: Arc::new(AtomicU32::new(0)),
		}
	}

	async fn persist(&self, ctx: &CollectContext) {
		let records = self.buffer.snapshot_sorted(|station| station.time_ms).await;

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
impl Default for AprsCollector {
	fn default() -> Self {
		Self::new()
	}
}
#[async_trait::async_trait]
impl StreamCollect for AprsCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn start(&self, ctx: CollectContext) {
		let reader = tokio::spawn(connection_loop(
			self.hosts.clone(),
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
					let evicted =
						self.buffer.evict_older_than(cutoff, |station| station.time_ms).await;

					if evicted > 0 {
						tracing::debug!(evicted, "aprs: retention sweep");
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
	hosts: Arc<Vec<String>>,
	buffer: Arc<StreamBuffer<String, AprsStation>>,
	control: StreamControl,
	connected: Arc<AtomicBool>,
	reconnect_failures: Arc<AtomicU32>,
) {
	loop {
		if control.is_stopped() {
			return;
		}

		let Some(host) = pick_url(&hosts) else {
			return;
		};

		match TcpStream::connect(host).await {
			Ok(mut stream) => {
				if let Err(err) = stream.write_all(LOGIN_LINE.as_bytes()).await {
					tracing::warn!(host, error = %err, "aprs: login failed");
				} else {
					reconnect_failures.store(0, Ordering::Release);
					connected.store(true, Ordering::Release);
					tracing::info!(host, "aprs: connected");

					let mut lines = BufReader::new(stream).lines();

					loop {
						if control.is_stopped() {
							connected.store(false, Ordering::Release);

							return;
						}

						match lines.next_line().await {
							Ok(Some(line)) => {
								if let Some(station) = parse_position(&line) {
									buffer.upsert(station.callsign.clone(), station).await;
								}
							},
							Ok(None) => break,
							Err(err) => {
								tracing::warn!(error = %err, "aprs: read failed");

								break;
							},
						}
					}

					connected.store(false, Ordering::Release);
					tracing::warn!("aprs: connection closed; reconnecting");
				}
			},
			Err(err) => {
				reconnect_failures.fetch_add(1, Ordering::AcqRel);
				tracing::warn!(host, error = %err, "aprs: connect failed");
			},
		}

		if control.is_stopped() {
			return;
		}

		time::sleep(reconnect_delay()).await;
	}
}

/// Decode an uncompressed APRS position report; anything else returns
/// `None`.
pub fn parse_position(line: &str) -> Option<AprsStation> {
	if line.starts_with('#') {
		return None;
	}

	let (callsign, rest) = line.split_once('>')?;
	let (_, info) = rest.split_once(':')?;
	let mut chars = info.chars();
	let packet_type = chars.next()?;
	// timestamped reports carry seven timestamp characters before the
	// position field
	let body = match packet_type {
		'!' | '=' => info.get(1..)?,
		'/' | '@' => info.get(8..)?,
		_ => return None,
	};

	if body.len() < 19 {
		return None;
	}

	let lat = parse_coordinate(body.get(..8)?, false)?;
	let symbol_table = body.get(8..9)?;
	let lon = parse_coordinate(body.get(9..18)?, true)?;
	let symbol_code = body.get(18..19)?;
	let comment = body.get(19..).map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

	if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
		return None;
	}

	Some(AprsStation {
		callsign: callsign.trim().to_string(),
		lat,
		lon,
		symbol: Some(format!("{symbol_table}{symbol_code}")),
		comment,
		time_ms: Utc::now().timestamp_millis(),
	})
}

/// Degrees-minutes notation: `ddmm.mmN` latitude, `dddmm.mmW` longitude.
fn parse_coordinate(field: &str, is_lon: bool) -> Option<f64> {
	let deg_len = if is_lon { 3 } else { 2 };
	let hemisphere = field.chars().last()?;
	let body = field.get(..field.len() - 1)?;
	let degrees: f64 = body.get(..deg_len)?.parse().ok()?;
	let minutes: f64 = body.get(deg_len..)?.parse().ok()?;
	let value = degrees + minutes / 60.0;

	match (hemisphere, is_lon) {
		('N', false) => Some(value),
		('S', false) => Some(-value),
		('E', true) => Some(value),
		('W', true) => Some(-value),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn uncompressed_position_reports_decode() {
		let line = "CT1ABC-9>APRS,TCPIP*:!3849.52N/00910.15W>Lisboa mobile";
		let station = parse_position(line).expect("station");

		assert_eq!(station.callsign, "CT1ABC-9");
		assert!((station.lat - 38.8253).abs() < 1e-3);
		assert!((station.lon - -9.1691).abs() < 1e-3);
		assert_eq!(station.symbol.as_deref(), Some("/>"));
		assert_eq!(station.comment.as_deref(), Some("Lisboa mobile"));
	}

	#[test]
	fn timestamped_reports_skip_the_timestamp_field() {
		let line = "CT2XYZ>APRS:@092345z3849.52N/00910.15W_wx station";
		let station = parse_position(line).expect("station");

		assert_eq!(station.callsign, "CT2XYZ");
		assert!((station.lat - 38.8253).abs() < 1e-3);
	}

	#[test]
	fn chatter_and_non_position_packets_are_ignored() {
		assert!(parse_position("# aprsc 2.1.15-gc67551b").is_none());
		assert!(parse_position("CT1ABC>APRS::CT2XYZ   :message text").is_none());
		assert!(parse_position("CT1ABC>APRS:>status only").is_none());
	}

	#[test]
	fn southern_and_western_hemispheres_negate() {
		assert_eq!(parse_coordinate("3000.00S", false), Some(-30.0));
		assert_eq!(parse_coordinate("04530.00W", true), Some(-45.5));
		assert_eq!(parse_coordinate("3000.00E", false), None);
	}
}
