//! Global forecast grids: seven scalar layers plus the wind vector field,
//! produced from one upstream grid response.

// std
use std::collections::HashMap;
// crates.io
use serde::Deserialize;
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
	grid::{GridHeader, RasterGrid, VectorGrid},
	keys,
};

const DEFAULT_URL: &str = "https://api.open-meteo.com/v1/gfs-grid/global.json";
const TTL_SECS: u64 = 5_400;
const PERIOD: Duration = Duration::from_secs(3_600);

/// Layers the collector maintains, one payload key each.
pub const LAYERS: [&str; 8] = [
	"temperature",
	"humidity",
	"precipitation",
	"cloud-cover",
	"cape",
	"fire-weather",
	"uv-index",
	"wind",
];

// (upstream variable, layer key, unit, display name)
const SCALAR_LAYERS: [(&str, &str, &str, &str); 6] = [
	("temperature_2m", "temperature", "°C", "temperature"),
	("relative_humidity_2m", "humidity", "%", "relative-humidity"),
	("precipitation", "precipitation", "mm", "precipitation"),
	("cloud_cover", "cloud-cover", "%", "cloud-cover"),
	("cape", "cape", "J/kg", "cape"),
	("uv_index", "uv-index", "", "uv-index"),
];

#[derive(Debug, Deserialize)]
struct GfsPayload {
	header: GridHeader,
	variables: HashMap<String, Vec<Option<f64>>>,
}

/// Multi-key collector for the `kaos:gfs:*` layer grids.
pub struct GfsCollector {
	descriptor: Descriptor,
	url: String,
}
impl GfsCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_url(DEFAULT_URL)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("gfs", keys::gfs("{layer}"), TTL_SECS, PERIOD)?,
			url: url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for GfsCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let options = FetchOptions::with_timeout(Duration::from_secs(60));
		let payload: GfsPayload = ctx.fetcher.get_json(&self.url, &options).await?;

		for (variable, layer, unit, name) in SCALAR_LAYERS {
			let data = variable_of(&payload, variable, &self.url)?;
			let grid = RasterGrid::new(payload.header, data, unit, name)?;

			ctx.store(&keys::gfs(layer), &grid, TTL_SECS).await?;
		}

		let temperature = variable_of(&payload, "temperature_2m", &self.url)?;
		let humidity = variable_of(&payload, "relative_humidity_2m", &self.url)?;
		let fire = RasterGrid::new(
			payload.header,
			angstrom_index(&temperature, &humidity),
			"",
			"fire-weather",
		)?;

		ctx.store(&keys::gfs("fire-weather"), &fire, TTL_SECS).await?;

		let u = variable_of(&payload, "wind_u_10m", &self.url)?;
		let v = variable_of(&payload, "wind_v_10m", &self.url)?;
		let wind = VectorGrid::new(payload.header, u, v, "m/s", "wind-10m")?;

		ctx.store(&keys::gfs("wind"), &wind, TTL_SECS).await?;
		tracing::debug!(
			nx = payload.header.nx,
			ny = payload.header.ny,
			layers = LAYERS.len(),
			"gfs layers stored"
		);

		Ok(())
	}
}

fn variable_of(payload: &GfsPayload, variable: &str, url: &str) -> Result<Vec<Option<f64>>> {
	payload.variables.get(variable).cloned().ok_or_else(|| Error::Parse {
		origin: url.to_string(),
		reason: format!("Upstream grid is missing the '{variable}' variable."),
	})
}

/// Angström fire danger index: `B = R/20 + (27 - T)/10`, lower meaning
/// higher danger. Cells missing either input stay missing.
fn angstrom_index(temperature: &[Option<f64>], humidity: &[Option<f64>]) -> Vec<Option<f64>> {
	temperature
		.iter()
		.zip(humidity.iter())
		.map(|(t, r)| match (t, r) {
			(Some(t), Some(r)) => Some(r / 20.0 + (27.0 - t) / 10.0),
			_ => None,
		})
		.collect()
}
