//! Oceanographic grids: surface currents, significant wave height, and sea
//! surface temperature.

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

const CURRENTS_URL: &str = "https://coastwatch.noaa.gov/erddap/griddap/oscar_currents.json";
const WAVES_URL: &str = "https://coastwatch.noaa.gov/erddap/griddap/ww3_global.json";
const SST_URL: &str = "https://coastwatch.noaa.gov/erddap/griddap/sst_global.json";
const TTL_SECS: u64 = 5_400;
const PERIOD: Duration = Duration::from_secs(3_600);

#[derive(Debug, Deserialize)]
struct OceanPayload {
	header: GridHeader,
	variables: HashMap<String, Vec<Option<f64>>>,
}
impl OceanPayload {
	fn variable(&self, name: &str, url: &str) -> Result<Vec<Option<f64>>> {
		self.variables.get(name).cloned().ok_or_else(|| Error::Parse {
			origin: url.to_string(),
			reason: format!("Upstream grid is missing the '{name}' variable."),
		})
	}
}

/// Collector for the `kaos:ocean-currents:global` vector grid.
///
/// Currents ship at the upstream's full resolution; the payload is not
/// downsampled.
pub struct OceanCurrentsCollector {
	descriptor: Descriptor,
	url: String,
}
impl OceanCurrentsCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_url(CURRENTS_URL)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval(
				"ocean-currents",
				keys::ocean_currents(),
				TTL_SECS,
				PERIOD,
			)?,
			url: url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for OceanCurrentsCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let options = FetchOptions::with_timeout(Duration::from_secs(60));
		let payload: OceanPayload = ctx.fetcher.get_json(&self.url, &options).await?;
		let u = payload.variable("u", &self.url)?;
		let v = payload.variable("v", &self.url)?;
		let grid = VectorGrid::new(payload.header, u, v, "m/s", "ocean-currents")?;

		ctx.store(&keys::ocean_currents(), &grid, TTL_SECS).await
	}
}

/// Collector for the `kaos:waves:global` raster.
pub struct WavesCollector {
	descriptor: Descriptor,
	url: String,
}
impl WavesCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_url(WAVES_URL)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("waves", keys::waves(), TTL_SECS, PERIOD)?,
			url: url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for WavesCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let options = FetchOptions::with_timeout(Duration::from_secs(60));
		let payload: OceanPayload = ctx.fetcher.get_json(&self.url, &options).await?;
		let swh = payload.variable("swh", &self.url)?;
		let grid = RasterGrid::new(payload.header, swh, "m", "significant-wave-height")?;

		ctx.store(&keys::waves(), &grid, TTL_SECS).await
	}
}

/// Collector for the `kaos:sst:global` raster.
pub struct SstCollector {
	descriptor: Descriptor,
	url: String,
}
impl SstCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_url(SST_URL)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("sst", keys::sst(), TTL_SECS, PERIOD)?,
			url: url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for SstCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let options = FetchOptions::with_timeout(Duration::from_secs(60));
		let payload: OceanPayload = ctx.fetcher.get_json(&self.url, &options).await?;
		let sst = payload.variable("sst", &self.url)?;
		let grid = RasterGrid::new(payload.header, sst, "°C", "sea-surface-temperature")?;

		ctx.store(&keys::sst(), &grid, TTL_SECS).await
	}
}
