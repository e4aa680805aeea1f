//! Total electron content grid, binned from upstream point samples.

// crates.io
use serde::Deserialize;
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
	grid::{GridHeader, RasterGrid},
	keys,
};

const DEFAULT_URL: &str = "https://services.swpc.noaa.gov/products/ustec/ustec_total.json";
const TTL_SECS: u64 = 1_200;
const PERIOD: Duration = Duration::from_secs(600);
// 5 x 2.5 degree global mesh, the native resolution of the upstream maps
const HEADER: GridHeader =
	GridHeader { nx: 73, ny: 71, lo1: -180.0, la1: 87.5, dx: 5.0, dy: 2.5 };

#[derive(Debug, Deserialize)]
struct TecPayload {
	/// `[lon, lat, tec]` triples.
	samples: Vec<[f64; 3]>,
}

/// Collector for the `kaos:tec:global` raster.
pub struct TecCollector {
	descriptor: Descriptor,
	url: String,
}
impl TecCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_url(DEFAULT_URL)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("tec", keys::tec(), TTL_SECS, PERIOD)?,
			url: url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for TecCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let payload: TecPayload =
			ctx.fetcher.get_json(&self.url, &FetchOptions::default()).await?;
		let grid = bin_samples(&payload.samples)?;

		tracing::debug!(samples = payload.samples.len(), "tec samples binned");
		ctx.store(&keys::tec(), &grid, TTL_SECS).await
	}
}

/// Bin `[lon, lat, tec]` samples into the fixed global mesh; cells without a
/// sample stay missing.
fn bin_samples(samples: &[[f64; 3]]) -> Result<RasterGrid> {
	let mut data = vec![None; HEADER.nx * HEADER.ny];

	for [lon, lat, tec] in samples {
		let Some((yi, xi)) = cell_of(*lat, *lon) else {
			continue;
		};

		data[HEADER.index(yi, xi)] = Some(*tec);
	}

	RasterGrid::new(HEADER, data, "TECU", "total-electron-content")
}

fn cell_of(lat: f64, lon: f64) -> Option<(usize, usize)> {
	if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
		return None;
	}

	let xi = ((lon - HEADER.lo1) / HEADER.dx).round() as isize;
	let yi = ((HEADER.la1 - lat) / HEADER.dy).round() as isize;

	if (0..HEADER.nx as isize).contains(&xi) && (0..HEADER.ny as isize).contains(&yi) {
		Some((yi as usize, xi as usize))
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn samples_land_in_their_nearest_cell() {
		let grid = bin_samples(&[[-180.0, 87.5, 12.0], [0.0, 0.0, 7.5]]).expect("grid");

		assert_eq!(grid.get(0, 0), Some(12.0));
		assert_eq!(grid.get(35, 36), Some(7.5));
		assert_eq!(grid.data.iter().flatten().count(), 2);
	}

	#[test]
	fn out_of_range_samples_are_dropped() {
		let grid = bin_samples(&[[200.0, 10.0, 3.0], [0.0, 95.0, 3.0]]).expect("grid");

		assert_eq!(grid.data.iter().flatten().count(), 0);
	}
}
