//! Read-side HTTP API serving the worker-owned cache keys.
//!
//! Handlers validate input, read the relevant key, and expand compact
//! records on the way out. A missing worker-owned key is a 503: the frontend
//! treats it as "data unavailable, try later" and polls.

pub mod weather;

// crates.io
use axum::{
	Json, Router,
	extract::{Path, Query, State},
	http::{StatusCode, header},
	response::{IntoResponse, Response},
	routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
// self
use crate::{
	_prelude::*,
	cache::client::CacheClient,
	collectors::{
		aircraft::{self, CompactAircraft},
		aprs::AprsStation,
		fires::FireSource,
		gfs,
		kiwisdr::{self, CompactStation},
	},
	fetch::Fetcher,
	keys,
};

const DEFAULT_OWM_BASE_URL: &str = "https://api.openweathermap.org";
const NO_CACHE: (header::HeaderName, &str) = (header::CACHE_CONTROL, "no-cache");

/// Shared state for the read API handlers.
#[derive(Clone)]
pub struct ApiState {
	/// The shared cache client.
	pub cache: CacheClient,
	/// The shared outbound fetcher (cache-aside handlers).
	pub fetcher: Fetcher,
	/// OpenWeatherMap API key for the weather handlers.
	pub owm_api_key: Option<String>,
	/// OpenWeatherMap base URL; overridable for tests.
	pub owm_base_url: String,
}
impl ApiState {
	/// State against the default weather upstream.
	pub fn new(cache: CacheClient, fetcher: Fetcher, owm_api_key: Option<String>) -> Self {
		Self { cache, fetcher, owm_api_key, owm_base_url: DEFAULT_OWM_BASE_URL.into() }
	}

	/// Point the weather handlers at a custom upstream (tests).
	pub fn with_owm_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.owm_base_url = base_url.into();

		self
	}
}

/// Build the read API router (CORS open to any origin).
pub fn router(state: ApiState) -> Router {
	Router::new()
		.route("/api/seismic", get(seismic))
		.route("/api/lightning", get(lightning))
		.route("/api/aircraft", get(aircraft_handler))
		.route("/api/aprs", get(aprs_handler))
		.route("/api/kiwisdr", get(kiwisdr_handler))
		.route("/api/space-weather", get(space_weather))
		.route("/api/tec", get(tec))
		.route("/api/aurora", get(aurora))
		.route("/api/gdacs", get(gdacs))
		.route("/api/prociv", get(prociv))
		.route("/api/warnings", get(warnings))
		.route("/api/air-quality", get(air_quality))
		.route("/api/ocean-currents", get(ocean_currents))
		.route("/api/waves", get(waves))
		.route("/api/sst", get(sst))
		.route("/api/gfs/{layer}", get(gfs_layer))
		.route("/api/fires", get(fires))
		.route("/api/weather/current", get(weather::current))
		.route("/api/weather/tiles/{layer}/{z}/{x}/{y}", get(weather::tile))
		.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
		.with_state(state)
}

/// 400 with a single-line reason.
pub(crate) fn bad_request(reason: impl Into<String>) -> Response {
	(StatusCode::BAD_REQUEST, [NO_CACHE], Json(json!({"error": reason.into()}))).into_response()
}

/// 503 for a worker-owned key that is absent.
pub(crate) fn unavailable(feed: &str) -> Response {
	(
		StatusCode::SERVICE_UNAVAILABLE,
		[NO_CACHE],
		Json(json!({"error": format!("{feed} data unavailable - worker may not be running")})),
	)
		.into_response()
}

/// Map an engine error to its client-facing status.
pub(crate) fn error_response(err: &Error) -> Response {
	let status =
		StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

	(status, [NO_CACHE], Json(json!({"error": err.to_string()}))).into_response()
}

/// 200 JSON with the no-cache policy every feed uses.
pub(crate) fn ok_json<T: serde::Serialize>(value: &T) -> Response {
	(StatusCode::OK, [NO_CACHE], Json(value)).into_response()
}

async fn passthrough(state: &ApiState, key: &str, feed: &str) -> Response {
	match state.cache.get::<Value>(key).await {
		Ok(Some(value)) => ok_json(&value),
		Ok(None) => unavailable(feed),
		Err(err) => error_response(&err),
	}
}

/// Inclusive bounding box used by the aircraft and APRS handlers.
#[derive(Clone, Copy, Debug)]
pub struct BoundingBox {
	/// Minimum latitude.
	pub lamin: f64,
	/// Maximum latitude.
	pub lamax: f64,
	/// Minimum longitude.
	pub lomin: f64,
	/// Maximum longitude.
	pub lomax: f64,
}
impl BoundingBox {
	/// Whether a coordinate falls inside the box.
	pub fn contains(&self, lat: f64, lon: f64) -> bool {
		(self.lamin..=self.lamax).contains(&lat) && (self.lomin..=self.lomax).contains(&lon)
	}

	fn parse(params: &BboxParams) -> std::result::Result<Self, String> {
		let lamin = parse_f64("lamin", params.lamin.as_deref())?;
		let lamax = parse_f64("lamax", params.lamax.as_deref())?;
		let lomin = parse_f64("lomin", params.lomin.as_deref())?;
		let lomax = parse_f64("lomax", params.lomax.as_deref())?;

		if !(-90.0..=90.0).contains(&lamin) || !(-90.0..=90.0).contains(&lamax) {
			return Err("latitude bounds must be within [-90, 90]".into());
		}
		if !(-180.0..=180.0).contains(&lomin) || !(-180.0..=180.0).contains(&lomax) {
			return Err("longitude bounds must be within [-180, 180]".into());
		}
		if lamin > lamax || lomin > lomax {
			return Err("bounding box minimums must not exceed maximums".into());
		}

		Ok(Self { lamin, lamax, lomin, lomax })
	}
}

#[derive(Debug, Deserialize)]
struct BboxParams {
	lamin: Option<String>,
	lamax: Option<String>,
	lomin: Option<String>,
	lomax: Option<String>,
}
impl BboxParams {
	fn is_empty(&self) -> bool {
		self.lamin.is_none() && self.lamax.is_none() && self.lomin.is_none() && self.lomax.is_none()
	}
}

fn parse_f64(field: &str, raw: Option<&str>) -> std::result::Result<f64, String> {
	let raw = raw.ok_or_else(|| format!("{field} is required"))?;

	raw.parse::<f64>().map_err(|_| format!("{field} must be numeric"))
}

#[derive(Debug, Deserialize)]
struct SeismicParams {
	range: Option<String>,
	hours: Option<String>,
	#[serde(rename = "minMag")]
	min_mag: Option<String>,
}

async fn seismic(State(state): State<ApiState>, Query(params): Query<SeismicParams>) -> Response {
	let range = params.range.as_deref().unwrap_or("day");

	if !["day", "week", "month"].contains(&range) {
		return bad_request("range must be one of day, week, month");
	}

	let hours = match params.hours.as_deref() {
		None => None,
		Some(raw) => match raw.parse::<u32>() {
			Ok(hours) if (1..=744).contains(&hours) => Some(hours),
			_ => return bad_request("hours must be an integer in 1..=744"),
		},
	};
	let min_mag = match params.min_mag.as_deref() {
		None => 0.0,
		Some(raw) => match raw.parse::<f64>() {
			Ok(mag) if (0.0..=10.0).contains(&mag) => mag,
			_ => return bad_request("minMag must be within 0..=10"),
		},
	};
	let feed = match state.cache.get::<Value>(&keys::seismic(range)).await {
		Ok(Some(feed)) => feed,
		Ok(None) => return unavailable("Seismic"),
		Err(err) => return error_response(&err),
	};

	ok_json(&filter_seismic(feed, hours, min_mag, Utc::now()))
}

/// Filter a GeoJSON earthquake feed by magnitude and cutoff time, preserving
/// feature order.
fn filter_seismic(mut feed: Value, hours: Option<u32>, min_mag: f64, now: DateTime<Utc>) -> Value {
	let cutoff_ms = hours.map(|hours| now.timestamp_millis() - i64::from(hours) * 3_600_000);

	if let Some(features) = feed.get_mut("features").and_then(Value::as_array_mut) {
		features.retain(|feature| {
			let properties = &feature["properties"];
			let magnitude = properties.get("mag").and_then(Value::as_f64).unwrap_or(0.0);
			let time_ms = properties.get("time").and_then(Value::as_i64).unwrap_or(0);

			magnitude >= min_mag && cutoff_ms.is_none_or(|cutoff| time_ms >= cutoff)
		});
	}

	feed
}

async fn lightning(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::lightning(), "Lightning").await
}

async fn aircraft_handler(
	State(state): State<ApiState>,
	Query(params): Query<BboxParams>,
) -> Response {
	let bbox = match BoundingBox::parse(&params) {
		Ok(bbox) => bbox,
		Err(reason) => return bad_request(reason),
	};
	let records = match state.cache.get::<Vec<CompactAircraft>>(&keys::aircraft()).await {
		Ok(Some(records)) => records,
		Ok(None) => return unavailable("Aircraft"),
		Err(err) => return error_response(&err),
	};
	// filter compact records first; expansion only runs for records inside
	// the box
	let expanded: Vec<_> = records
		.iter()
		.filter(|record| bbox.contains(record.lat, record.lon))
		.map(aircraft::expand)
		.collect();

	ok_json(&expanded)
}

async fn aprs_handler(State(state): State<ApiState>, Query(params): Query<BboxParams>) -> Response {
	let bbox = if params.is_empty() {
		None
	} else {
		match BoundingBox::parse(&params) {
			Ok(bbox) => Some(bbox),
			Err(reason) => return bad_request(reason),
		}
	};
	let stations = match state.cache.get::<Vec<AprsStation>>(&keys::aprs()).await {
		Ok(Some(stations)) => stations,
		Ok(None) => return unavailable("APRS"),
		Err(err) => return error_response(&err),
	};
	let filtered: Vec<_> = stations
		.into_iter()
		.filter(|station| {
			bbox.is_none_or(|bbox| bbox.contains(station.lat, station.lon))
		})
		.collect();

	ok_json(&filtered)
}

async fn kiwisdr_handler(State(state): State<ApiState>) -> Response {
	let stations = match state.cache.get::<Vec<CompactStation>>(&keys::kiwisdr()).await {
		Ok(Some(stations)) => stations,
		Ok(None) => return unavailable("KiwiSDR"),
		Err(err) => return error_response(&err),
	};
	let expanded: Vec<_> = stations.iter().map(kiwisdr::expand).collect();

	ok_json(&expanded)
}

async fn space_weather(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::space_weather(), "Space weather").await
}

async fn tec(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::tec(), "TEC").await
}

async fn aurora(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::aurora(), "Aurora").await
}

async fn gdacs(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::gdacs(), "GDACS").await
}

async fn prociv(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::prociv(), "ProCiv").await
}

async fn warnings(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::warnings_ipma(), "Warnings").await
}

async fn air_quality(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::air_quality(), "Air quality").await
}

async fn ocean_currents(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::ocean_currents(), "Ocean currents").await
}

async fn waves(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::waves(), "Waves").await
}

async fn sst(State(state): State<ApiState>) -> Response {
	passthrough(&state, &keys::sst(), "SST").await
}

async fn gfs_layer(State(state): State<ApiState>, Path(layer): Path<String>) -> Response {
	if !gfs::LAYERS.contains(&layer.as_str()) {
		return bad_request(format!("layer must be one of {}", gfs::LAYERS.join(", ")));
	}

	passthrough(&state, &keys::gfs(&layer), "GFS").await
}

#[derive(Debug, Deserialize)]
struct FiresParams {
	source: Option<String>,
	days: Option<String>,
}

async fn fires(State(state): State<ApiState>, Query(params): Query<FiresParams>) -> Response {
	let source = match params.source.as_deref() {
		None => FireSource::Viirs,
		Some(raw) => match FireSource::parse(raw) {
			Some(source) => source,
			None => return bad_request("source must be one of viirs, modis"),
		},
	};
	let days = match params.days.as_deref() {
		None => 1,
		Some(raw) => match raw.parse::<u8>() {
			Ok(days) if crate::collectors::fires::DAY_WINDOWS.contains(&days) => days,
			_ => return bad_request("days must be 1 or 7"),
		},
	};

	passthrough(&state, &keys::fires(source.as_str(), days), "Fires").await
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn feed(entries: &[(f64, i64)], now: DateTime<Utc>) -> Value {
		let features: Vec<Value> = entries
			.iter()
			.map(|(mag, age_minutes)| {
				json!({
					"type": "Feature",
					"properties": {
						"mag": mag,
						"time": now.timestamp_millis() - age_minutes * 60_000
					}
				})
			})
			.collect();

		json!({"type": "FeatureCollection", "features": features})
	}

	#[test]
	fn seismic_filter_honors_magnitude_and_window() {
		let now = Utc::now();
		// magnitudes and ages mirror the documented end-to-end scenario
		let feed = feed(&[(1.2, 10), (2.6, 30), (3.5, 300), (5.9, 1_500)], now);
		let filtered = filter_seismic(feed, Some(6), 2.5, now);
		let magnitudes: Vec<f64> = filtered["features"]
			.as_array()
			.expect("features")
			.iter()
			.map(|feature| feature["properties"]["mag"].as_f64().expect("mag"))
			.collect();

		assert_eq!(magnitudes, vec![2.6, 3.5]);
	}

	#[test]
	fn seismic_filter_without_hours_keeps_old_events() {
		let now = Utc::now();
		let feed = feed(&[(5.9, 1_500)], now);
		let filtered = filter_seismic(feed, None, 0.0, now);

		assert_eq!(filtered["features"].as_array().expect("features").len(), 1);
	}

	#[test]
	fn bounding_box_parse_rejects_malformed_input() {
		let params = BboxParams {
			lamin: Some("37".into()),
			lamax: Some("42".into()),
			lomin: Some("-10".into()),
			lomax: Some("-7".into()),
		};
		let bbox = BoundingBox::parse(&params).expect("bbox");

		assert!(bbox.contains(40.5, -8.0));
		assert!(!bbox.contains(55.0, 10.0));

		let inverted = BboxParams {
			lamin: Some("42".into()),
			lamax: Some("37".into()),
			lomin: Some("-10".into()),
			lomax: Some("-7".into()),
		};

		assert!(BoundingBox::parse(&inverted).is_err());

		let missing = BboxParams { lamin: None, lamax: None, lomin: None, lomax: None };

		assert!(BoundingBox::parse(&missing).is_err());
	}
}
