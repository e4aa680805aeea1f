//! Public KiwiSDR receiver directory with compact storage records.

// crates.io
use serde::{Deserialize, Serialize};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
	keys,
};

const DEFAULT_URL: &str = "https://rx.linkfanel.net/kiwisdr_com.json";
const TTL_SECS: u64 = 5_400;
const PERIOD: Duration = Duration::from_secs(2_700);

/// Public station record served by the read API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Station {
	/// Station display name.
	pub name: String,
	/// Receiver URL.
	pub url: String,
	/// Latitude in degrees.
	pub lat: f64,
	/// Longitude in degrees.
	pub lon: f64,
	/// Connected users.
	pub users: Option<u32>,
	/// User slot capacity.
	pub users_max: Option<u32>,
	/// Antenna description.
	pub antenna: Option<String>,
	/// Reported signal-to-noise ratio in dB.
	pub snr: Option<f64>,
}

/// Storage-side compact record: optional fields omitted, coordinates rounded
/// to three decimals, SNR to a whole dB.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompactStation {
	/// Station display name.
	pub name: String,
	/// Receiver URL.
	pub url: String,
	/// Latitude rounded to three decimals.
	pub lat: f64,
	/// Longitude rounded to three decimals.
	pub lon: f64,
	/// Connected users.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub users: Option<u32>,
	/// User slot capacity.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub users_max: Option<u32>,
	/// Antenna description.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub antenna: Option<String>,
	/// Signal-to-noise ratio in whole dB.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub snr: Option<i64>,
}

/// Compact a public record for storage.
pub fn compact(station: &Station) -> CompactStation {
	CompactStation {
		name: station.name.clone(),
		url: station.url.clone(),
		lat: round3(station.lat),
		lon: round3(station.lon),
		users: station.users,
		users_max: station.users_max,
		antenna: station.antenna.clone(),
		snr: station.snr.map(|v| v.round() as i64),
	}
}

/// Expand a compact record back to the public shape.
pub fn expand(station: &CompactStation) -> Station {
	Station {
		name: station.name.clone(),
		url: station.url.clone(),
		lat: station.lat,
		lon: station.lon,
		users: station.users,
		users_max: station.users_max,
		antenna: station.antenna.clone(),
		snr: station.snr.map(|v| v as f64),
	}
}

fn round3(value: f64) -> f64 {
	(value * 1_000.0).round() / 1_000.0
}

/// Collector for the `kaos:kiwisdr:stations` feed.
pub struct KiwisdrCollector {
	descriptor: Descriptor,
	url: String,
}
impl KiwisdrCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_url(DEFAULT_URL)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("kiwisdr", keys::kiwisdr(), TTL_SECS, PERIOD)?,
			url: url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for KiwisdrCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let entries: Vec<Value> = ctx.fetcher.get_json(&self.url, &FetchOptions::default()).await?;
		let stations: Vec<CompactStation> = entries
			.iter()
			.filter_map(parse_entry)
			.map(|station| compact(&station))
			.collect();

		if stations.is_empty() {
			return Err(Error::Parse {
				origin: self.url.clone(),
				reason: "Directory contained no stations with usable coordinates.".into(),
			});
		}

		tracing::debug!(stations = stations.len(), "kiwisdr directory fetched");
		ctx.store(&keys::kiwisdr(), &stations, TTL_SECS).await
	}
}

/// Decode one directory entry; the upstream serializes most numerics as
/// strings and coordinates as a `"(lat, lon)"` pair.
fn parse_entry(entry: &Value) -> Option<Station> {
	let name = entry.get("name").and_then(Value::as_str)?.to_string();
	let url = entry.get("url").and_then(Value::as_str)?.to_string();
	let (lat, lon) = parse_gps(entry.get("gps").and_then(Value::as_str)?)?;

	Some(Station {
		name,
		url,
		lat,
		lon,
		users: parse_number(entry.get("users")),
		users_max: parse_number(entry.get("users_max")),
		antenna: entry
			.get("antenna")
			.and_then(Value::as_str)
			.filter(|s| !s.is_empty())
			.map(str::to_string),
		snr: parse_snr(entry.get("snr")),
	})
}

/// Parse a `"(lat, lon)"` coordinate pair, rejecting out-of-range values.
fn parse_gps(raw: &str) -> Option<(f64, f64)> {
	let trimmed = raw.trim().trim_start_matches('(').trim_end_matches(')');
	let mut parts = trimmed.splitn(2, ',');
	let lat: f64 = parts.next()?.trim().parse().ok()?;
	let lon: f64 = parts.next()?.trim().parse().ok()?;

	if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
		return None;
	}

	Some((lat, lon))
}

fn parse_number(value: Option<&Value>) -> Option<u32> {
	match value? {
		Value::Number(n) => n.as_u64().map(|n| n as u32),
		Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

/// The SNR field carries `"overall,hf"`; the overall figure is kept.
fn parse_snr(value: Option<&Value>) -> Option<f64> {
	match value? {
		Value::Number(n) => n.as_f64(),
		Value::String(s) => s.split(',').next()?.trim().parse().ok(),
		_ => None,
	}
}
