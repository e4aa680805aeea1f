//! Air quality grid, interpolated from station measurements by inverse
//! distance weighting.

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

const DEFAULT_URL: &str = "https://api.openaq.org/v3/parameters/2/latest?limit=1000";
const API_KEY_HEADER: &str = "X-API-Key";
const TTL_SECS: u64 = 1_200;
const PERIOD: Duration = Duration::from_secs(600);
// 2 degree global mesh; finer meshes add little over the station density
const HEADER: GridHeader =
	GridHeader { nx: 181, ny: 91, lo1: -180.0, la1: 90.0, dx: 2.0, dy: 2.0 };
const IDW_POWER: f64 = 2.0;
const IDW_RADIUS_KM: f64 = 500.0;
const EARTH_RADIUS_KM: f64 = 6_371.0;

/// One station measurement used for interpolation.
#[derive(Clone, Copy, Debug)]
pub struct Measurement {
	/// Station latitude.
	pub lat: f64,
	/// Station longitude.
	pub lon: f64,
	/// Measured value (PM2.5 µg/m³).
	pub value: f64,
}

#[derive(Debug, Deserialize)]
struct AirQualityPayload {
	results: Vec<StationResult>,
}

#[derive(Debug, Deserialize)]
struct StationResult {
	coordinates: Option<Coordinates>,
	value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Coordinates {
	latitude: f64,
	longitude: f64,
}

/// Collector for the `kaos:air-quality:global` raster.
pub struct AirQualityCollector {
	descriptor: Descriptor,
	url: String,
	api_key: String,
}
impl AirQualityCollector {
	/// Collector against the default upstream.
	pub fn new(api_key: impl Into<String>) -> Result<Self> {
		Self::with_url(DEFAULT_URL, api_key)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("air-quality", keys::air_quality(), TTL_SECS, PERIOD)?,
			url: url.into(),
			api_key: api_key.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for AirQualityCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let options = FetchOptions::default();
		let response = ctx
			.fetcher
			.send(&self.url, &options, || {
				ctx.fetcher.client().get(&self.url).header(API_KEY_HEADER, &self.api_key)
			})
			.await?;
		let payload: AirQualityPayload = response.json().await.map_err(|err| Error::Parse {
			origin: self.url.clone(),
			reason: format!("JSON decode failed: {err}."),
		})?;
		let measurements: Vec<Measurement> = payload
			.results
			.iter()
			.filter_map(|result| {
				let coordinates = result.coordinates.as_ref()?;
				let value = result.value?;

				if value < 0.0 {
					return None;
				}

				Some(Measurement {
					lat: coordinates.latitude,
					lon: coordinates.longitude,
					value,
				})
			})
			.collect();

		if measurements.is_empty() {
			return Err(Error::Parse {
				origin: self.url.clone(),
				reason: "No usable station measurements in response.".into(),
			});
		}

		let grid = interpolate(&measurements)?;

		tracing::debug!(stations = measurements.len(), "air quality interpolated");
		ctx.store(&keys::air_quality(), &grid, TTL_SECS).await
	}
}

/// Inverse-distance-weighted interpolation onto the global mesh. Cells with
/// no station within the radius stay missing.
pub fn interpolate(measurements: &[Measurement]) -> Result<RasterGrid> {
	let mut data = Vec::with_capacity(HEADER.nx * HEADER.ny);

	for yi in 0..HEADER.ny {
		for xi in 0..HEADER.nx {
			let lat = HEADER.lat_of(yi);
			let lon = HEADER.lon_of(xi);
			let mut weighted = 0.0;
			let mut weights = 0.0;
			let mut exact = None;

			for measurement in measurements {
				let distance = haversine_km(lat, lon, measurement.lat, measurement.lon);

				if distance > IDW_RADIUS_KM {
					continue;
				}
				if distance < 1.0 {
					exact = Some(measurement.value);

					break;
				}

				let weight = 1.0 / distance.powf(IDW_POWER);

				weighted += weight * measurement.value;
				weights += weight;
			}

			data.push(match (exact, weights > 0.0) {
				(Some(value), _) => Some(value),
				(None, true) => Some(weighted / weights),
				(None, false) => None,
			});
		}
	}

	RasterGrid::new(HEADER, data, "µg/m³", "pm25")
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
	let d_lat = (lat2 - lat1).to_radians();
	let d_lon = (lon2 - lon1).to_radians();
	let a = (d_lat / 2.0).sin().powi(2)
		+ lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

	2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn cells_near_a_station_take_its_value() {
		let grid =
			interpolate(&[Measurement { lat: 0.0, lon: 0.0, value: 42.0 }]).expect("grid");

		// (yi=45, xi=90) is exactly (0, 0)
		assert_eq!(grid.get(45, 90), Some(42.0));
		// the antipode is far outside the radius
		assert_eq!(grid.get(45, 0), None);
	}

	#[test]
	fn interpolation_blends_between_stations() {
		let grid = interpolate(&[
			Measurement { lat: 0.0, lon: -2.0, value: 10.0 },
			Measurement { lat: 0.0, lon: 2.0, value: 30.0 },
		])
		.expect("grid");
		let between = grid.get(45, 90).expect("cell");

		assert!((10.0..=30.0).contains(&between));
	}

	#[test]
	fn haversine_matches_known_distances() {
		// one degree of longitude at the equator is ~111 km
		let distance = haversine_km(0.0, 0.0, 0.0, 1.0);

		assert!((distance - 111.2).abs() < 1.0, "got {distance}");
	}
}
