//! Per-coordinate weather handlers backed by the cache-aside primitive.
//!
//! Keys are rounded to ~11 km so nearby requests share entries; responses
//! carry `X-Data-Source: cache|fetch`.

// crates.io
use axum::{
	Json,
	extract::{Path, Query, State},
	http::{StatusCode, header},
	response::{IntoResponse, Response},
};
use base64::prelude::*;
use serde::Deserialize;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	api::{ApiState, bad_request, error_response},
	cache::aside::cache_aside,
	fetch::FetchOptions,
	keys,
};

const CURRENT_TTL_SECS: u64 = 300;
const TILE_TTL_SECS: u64 = 600;
const DATA_SOURCE_HEADER: &str = "x-data-source";
/// Tile layers the proxy accepts.
pub const TILE_LAYERS: [&str; 5] =
	["clouds_new", "precipitation_new", "pressure_new", "wind_new", "temp_new"];

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentParams {
	lat: Option<String>,
	lon: Option<String>,
}

/// `GET /api/weather/current?lat&lon` — cache-aside over the provider JSON.
pub(crate) async fn current(
	State(state): State<ApiState>,
	Query(params): Query<CurrentParams>,
) -> Response {
	let Some(api_key) = state.owm_api_key.clone() else {
		return error_response(&Error::CacheUnavailable("Weather API key not configured.".into()));
	};
	let lat = match params.lat.as_deref().map(str::parse::<f64>) {
		Some(Ok(lat)) if (-90.0..=90.0).contains(&lat) => lat,
		_ => return bad_request("lat must be numeric within [-90, 90]"),
	};
	let lon = match params.lon.as_deref().map(str::parse::<f64>) {
		Some(Ok(lon)) if (-180.0..=180.0).contains(&lon) => lon,
		_ => return bad_request("lon must be numeric within [-180, 180]"),
	};
	let key = keys::weather_current(lat, lon);
	let url = format!(
		"{}/data/2.5/weather?lat={lat}&lon={lon}&appid={api_key}&units=metric",
		state.owm_base_url
	);
	let fetcher = state.fetcher.clone();
	let result = cache_aside(&state.cache, &key, CURRENT_TTL_SECS, || async move {
		fetcher.get_json::<Value>(&url, &FetchOptions::no_retry()).await
	})
	.await;

	match result {
		Ok(sourced) => (
			StatusCode::OK,
			[
				(header::CACHE_CONTROL, "no-cache"),
				(header::HeaderName::from_static(DATA_SOURCE_HEADER), sourced.source.as_str()),
			],
			Json(sourced.data),
		)
			.into_response(),
		Err(err) => error_response(&err),
	}
}

/// `GET /api/weather/tiles/{layer}/{z}/{x}/{y}` — PNG tile proxy with
/// cache-aside; tiles are stored base64-encoded.
pub(crate) async fn tile(
	State(state): State<ApiState>,
	Path((layer, z, x, y)): Path<(String, u8, u32, u32)>,
) -> Response {
	let Some(api_key) = state.owm_api_key.clone() else {
		return error_response(&Error::CacheUnavailable("Weather API key not configured.".into()));
	};

	if !TILE_LAYERS.contains(&layer.as_str()) {
		return bad_request(format!("layer must be one of {}", TILE_LAYERS.join(", ")));
	}
	if z > 12 {
		return bad_request("z must be within 0..=12");
	}

	let key = keys::weather_tile(&layer, z, x, y);
	let url =
		format!("{}/map/{layer}/{z}/{x}/{y}.png?appid={api_key}", state.owm_base_url);
	let fetcher = state.fetcher.clone();
	let result = cache_aside(&state.cache, &key, TILE_TTL_SECS, || async move {
		let bytes = fetcher.get_bytes(&url, &FetchOptions::no_retry()).await?;

		Ok(BASE64_STANDARD.encode(bytes))
	})
	.await;

	match result {
		Ok(sourced) => match BASE64_STANDARD.decode(&sourced.data) {
			Ok(bytes) => (
				StatusCode::OK,
				[
					(header::CONTENT_TYPE, "image/png"),
					(header::CACHE_CONTROL, "no-cache"),
					(
						header::HeaderName::from_static(DATA_SOURCE_HEADER),
						sourced.source.as_str(),
					),
				],
				bytes,
			)
				.into_response(),
			Err(err) => error_response(&Error::Parse {
				origin: format!("cache:{key}"),
				reason: format!("Stored tile is not valid base64: {err}."),
			}),
		},
		Err(err) => error_response(&err),
	}
}
