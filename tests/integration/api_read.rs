//! Read API behaviour over seeded cache state.

// std
use std::time::Duration;
// crates.io
use axum::{
	Router,
	body::Body,
	http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use super::support::memory_cache;
use kaos_worker::{
	CacheClient, Fetcher,
	api::{ApiState, router},
	collectors::aircraft::{Aircraft, compact},
	keys,
};

fn api(cache: CacheClient) -> Router {
	router(ApiState::new(cache, Fetcher::new().expect("fetcher"), None))
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
	let response = router
		.clone()
		.oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
		.await
		.expect("response");
	let status = response.status();
	let bytes = response.into_body().collect().await.expect("body").to_bytes();
	let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

	(status, body)
}

fn aircraft(icao24: &str, lat: f64, lon: f64) -> Aircraft {
	Aircraft {
		icao24: icao24.into(),
		callsign: Some(format!("{icao24}-CS")),
		origin_country: "Portugal".into(),
		last_contact: 1_722_000_000,
		lat,
		lon,
		baro_altitude: Some(10_000.0),
		on_ground: false,
		velocity: Some(220.0),
		heading: Some(90.0),
		vertical_rate: None,
		geo_altitude: None,
		squawk: None,
	}
}

#[tokio::test]
async fn missing_worker_key_is_a_503_with_the_documented_body() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;
	let api = api(cache);
	let (status, body) = get(&api, "/api/gdacs").await;

	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(body, json!({"error": "GDACS data unavailable - worker may not be running"}));
}

#[tokio::test]
async fn aircraft_filter_runs_on_compact_records_before_expansion() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;
	let records = vec![
		compact(&aircraft("aaa111", 40.5, -8.0)),
		compact(&aircraft("bbb222", 55.0, 10.0)),
		compact(&aircraft("ccc333", 38.0, -9.0)),
	];

	cache.set(&keys::aircraft(), &records, 120).await.expect("seed");

	let api = api(cache);
	let (status, body) =
		get(&api, "/api/aircraft?lamin=37&lamax=42&lomin=-10&lomax=-7").await;

	assert_eq!(status, StatusCode::OK);

	let list = body.as_array().expect("array");

	assert_eq!(list.len(), 2);
	// order preserved; expanded records carry the full public shape
	assert_eq!(list[0]["icao24"], json!("aaa111"));
	assert_eq!(list[1]["icao24"], json!("ccc333"));
	assert_eq!(list[0]["vertical_rate"], Value::Null);
	assert_eq!(list[0]["on_ground"], json!(false));
}

#[tokio::test]
async fn malformed_bounding_boxes_are_rejected() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;
	let api = api(cache);

	let (status, body) = get(&api, "/api/aircraft?lamin=abc&lamax=42&lomin=-10&lomax=-7").await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error"], json!("lamin must be numeric"));

	let (status, _) = get(&api, "/api/aircraft").await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn seismic_requests_filter_by_magnitude_and_window() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;
	let now_ms = chrono::Utc::now().timestamp_millis();
	let feature = |mag: f64, age_minutes: i64| {
		json!({
			"type": "Feature",
			"properties": {"mag": mag, "time": now_ms - age_minutes * 60_000}
		})
	};
	let feed = json!({
		"type": "FeatureCollection",
		"features": [feature(1.2, 10), feature(2.6, 30), feature(3.5, 300), feature(5.9, 1_500)]
	});

	cache.set(&keys::seismic("day"), &feed, 180).await.expect("seed");

	let api = api(cache);
	let (status, body) = get(&api, "/api/seismic?hours=6&minMag=2.5").await;

	assert_eq!(status, StatusCode::OK);

	let magnitudes: Vec<f64> = body["features"]
		.as_array()
		.expect("features")
		.iter()
		.map(|feature| feature["properties"]["mag"].as_f64().expect("mag"))
		.collect();

	assert_eq!(magnitudes, vec![2.6, 3.5]);

	let (status, body) = get(&api, "/api/seismic?hours=0").await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error"], json!("hours must be an integer in 1..=744"));
}

#[tokio::test]
async fn unknown_gfs_layers_are_rejected() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;
	let api = api(cache);
	let (status, _) = get(&api, "/api/gfs/vorticity").await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn weather_cache_aside_fetches_once_then_serves_from_cache() {
	let cache_server = MockServer::start().await;
	let owm = MockServer::start().await;
	let (cache, _) = memory_cache(&cache_server).await;

	Mock::given(method("GET"))
		.and(path("/data/2.5/weather"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"main": {"temp": 21.5}})))
		.expect(1)
		.mount(&owm)
		.await;

	let state = ApiState::new(cache, Fetcher::new().expect("fetcher"), Some("test-key".into()))
		.with_owm_base_url(owm.uri());
	let api = router(state);
	let first = api
		.clone()
		.oneshot(
			Request::builder()
				.uri("/api/weather/current?lat=41.17&lon=-8.62")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");

	assert_eq!(first.status(), StatusCode::OK);
	assert_eq!(
		first.headers().get("x-data-source").and_then(|value| value.to_str().ok()),
		Some("fetch")
	);

	// the populate write is fire-and-forget; give it a beat to land
	tokio::time::sleep(Duration::from_millis(200)).await;

	let second = api
		.clone()
		.oneshot(
			Request::builder()
				.uri("/api/weather/current?lat=41.17&lon=-8.62")
				.body(Body::empty())
				.expect("request"),
		)
		.await
		.expect("response");

	assert_eq!(second.status(), StatusCode::OK);
	assert_eq!(
		second.headers().get("x-data-source").and_then(|value| value.to_str().ok()),
		Some("cache")
	);

	owm.verify().await;
}

#[tokio::test]
async fn weather_requests_validate_coordinates() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;
	let state = ApiState::new(cache, Fetcher::new().expect("fetcher"), Some("test-key".into()));
	let api = router(state);
	let (status, body) = get(&api, "/api/weather/current?lat=95&lon=0").await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error"], json!("lat must be numeric within [-90, 90]"));
}
