//! Active fire detections parsed from FIRMS-style CSV area exports.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
	keys,
};

const DEFAULT_BASE_URL: &str = "https://firms.modaps.eosdis.nasa.gov/api/area/csv";
const TTL_SECS: u64 = 1_200;
const PERIOD: Duration = Duration::from_secs(600);
/// Day windows maintained per source.
pub const DAY_WINDOWS: [u8; 2] = [1, 7];

/// Detection sources the collector maintains.
pub const SOURCES: [FireSource; 2] = [FireSource::Viirs, FireSource::Modis];

/// Satellite instrument family a detection came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireSource {
	/// VIIRS S-NPP near-real-time.
	Viirs,
	/// MODIS near-real-time.
	Modis,
}
impl FireSource {
	/// Key infix and query value.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Viirs => "viirs",
			Self::Modis => "modis",
		}
	}

	/// Upstream product identifier.
	pub fn product(&self) -> &'static str {
		match self {
			Self::Viirs => "VIIRS_SNPP_NRT",
			Self::Modis => "MODIS_NRT",
		}
	}

	/// Parse a key infix or query value.
	pub fn parse(value: &str) -> Option<Self> {
		match value {
			"viirs" => Some(Self::Viirs),
			"modis" => Some(Self::Modis),
			_ => None,
		}
	}
}

/// One fire detection in the stored payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FireDetection {
	/// Latitude in degrees.
	pub lat: f64,
	/// Longitude in degrees.
	pub lon: f64,
	/// Brightness temperature in Kelvin.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub brightness: Option<f64>,
	/// Fire radiative power in MW.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub frp: Option<f64>,
	/// Acquisition date (`YYYY-MM-DD`).
	pub acq_date: String,
	/// Acquisition time (`HHMM`).
	pub acq_time: String,
	/// Detection confidence as reported upstream.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub confidence: Option<String>,
	/// Day or night overpass flag.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub daynight: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirmsRow {
	latitude: f64,
	longitude: f64,
	#[serde(default)]
	bright_ti4: Option<f64>,
	#[serde(default)]
	brightness: Option<f64>,
	acq_date: String,
	acq_time: String,
	#[serde(default)]
	confidence: Option<String>,
	#[serde(default)]
	frp: Option<f64>,
	#[serde(default)]
	daynight: Option<String>,
}

/// Multi-key collector for the `kaos:fires:{source}:{days}` feeds.
pub struct FiresCollector {
	descriptor: Descriptor,
	base_url: String,
	api_key: String,
}
impl FiresCollector {
	/// Collector against the default upstream.
	pub fn new(api_key: impl Into<String>) -> Result<Self> {
		Self::with_base_url(DEFAULT_BASE_URL, api_key)
	}

	/// Collector against a custom upstream base (tests).
	pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval(
				"fires",
				keys::fires("{source}", 1),
				TTL_SECS,
				PERIOD,
			)?,
			base_url: base_url.into(),
			api_key: api_key.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for FiresCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let options = FetchOptions::with_timeout(Duration::from_secs(60));

		for source in SOURCES {
			for days in DAY_WINDOWS {
				let url = format!(
					"{}/{}/{}/world/{days}",
					self.base_url,
					self.api_key,
					source.product()
				);
				let body = ctx.fetcher.get_text(&url, &options).await?;
				let detections = parse_csv(&body).map_err(|reason| Error::Parse {
					origin: format!("{}/{}/world/{days}", self.base_url, source.product()),
					reason,
				})?;

				tracing::debug!(
					source = source.as_str(),
					days,
					detections = detections.len(),
					"fire detections parsed"
				);
				ctx.store(&keys::fires(source.as_str(), days), &detections, TTL_SECS).await?;
			}
		}

		Ok(())
	}
}

/// Parse a FIRMS CSV export; rows with unusable coordinates are dropped with
/// a warning rather than failing the batch.
fn parse_csv(body: &str) -> std::result::Result<Vec<FireDetection>, String> {
	let mut reader = csv::Reader::from_reader(body.as_bytes());
	let mut detections = Vec::new();

	for row in reader.deserialize::<FirmsRow>() {
		let row = match row {
			Ok(row) => row,
			Err(err) => {
				tracing::warn!(error = %err, "skipping malformed fire detection row");

				continue;
			},
		};

		if !(-90.0..=90.0).contains(&row.latitude) || !(-180.0..=180.0).contains(&row.longitude) {
			continue;
		}

		detections.push(FireDetection {
			lat: row.latitude,
			lon: row.longitude,
			brightness: row.bright_ti4.or(row.brightness),
			frp: row.frp,
			acq_date: row.acq_date,
			acq_time: row.acq_time,
			confidence: row.confidence,
			daynight: row.daynight,
		});
	}

	if detections.is_empty() && body.lines().count() <= 1 {
		return Err("CSV export contained no detection rows".into());
	}

	Ok(detections)
}
