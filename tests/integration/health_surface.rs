//! Health surface rollup over cache-backed collector metadata.

// std
use std::sync::Arc;
// crates.io
use axum::{
	Router,
	body::Body,
	http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::MockServer;
// self
use super::support::memory_cache;
use kaos_worker::{
	CacheClient, Fetcher, Scheduler,
	collector::CollectContext,
	health::{HealthState, router},
};

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

fn health_router(cache: CacheClient) -> Router {
	let ctx =
		CollectContext { cache: cache.clone(), fetcher: Fetcher::new().expect("fetcher") };

	router(HealthState {
		cache,
		scheduler: Arc::new(Scheduler::new(ctx)),
		started_at: tokio::time::Instant::now(),
	})
}

async fn seed_collector(cache: &CacheClient, name: &str, status: &str, errors: u32) {
	cache
		.set_raw(&format!("kaos:meta:{name}:status"), status, None)
		.await
		.expect("status");
	cache
		.set_raw(&format!("kaos:meta:{name}:last-run"), "1722000000000", None)
		.await
		.expect("last-run");
	cache
		.set_raw(&format!("kaos:meta:{name}:error-count"), &errors.to_string(), None)
		.await
		.expect("error-count");
}

#[tokio::test]
async fn rollup_reports_degraded_with_http_200() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;

	seed_collector(&cache, "x", "ok", 0).await;
	seed_collector(&cache, "y", "degraded", 2).await;
	seed_collector(&cache, "z", "error", 5).await;

	let router = health_router(cache);
	let (status, body) = get(&router, "/health").await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["status"], json!("degraded"));
	assert_eq!(body["redis"], json!("ok"));

	let collectors = body["collectors"].as_array().expect("collectors");

	assert_eq!(collectors.len(), 3);
	assert_eq!(collectors[2]["name"], json!("z"));
	assert_eq!(collectors[2]["status"], json!("error"));
	assert_eq!(collectors[2]["error_count"], json!(5));
	assert_eq!(body["scheduler"]["running"], json!(false));
}

#[tokio::test]
async fn rollup_is_healthy_when_every_collector_is_ok() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;

	seed_collector(&cache, "seismic", "ok", 0).await;

	let router = health_router(cache);
	let (status, body) = get(&router, "/health").await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["status"], json!("healthy"));
}

#[tokio::test]
async fn unreachable_cache_is_unhealthy_and_not_ready() {
	let router = health_router(CacheClient::uninitialized());
	let (status, body) = get(&router, "/health").await;

	assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
	assert_eq!(body["status"], json!("unhealthy"));

	let (status, _) = get(&router, "/ready").await;

	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

	let (status, _) = get(&router, "/live").await;

	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn ready_follows_the_cache_ping() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;
	let router = health_router(cache);
	let (status, body) = get(&router, "/ready").await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["ready"], json!(true));
}
