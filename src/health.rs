//! Health surface: liveness, readiness, and the per-collector rollup.

// crates.io
use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::get,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
// self
use crate::{_prelude::*, cache::client::CacheClient, keys, scheduler::Scheduler};

/// Shared state for the health handlers.
#[derive(Clone)]
pub struct HealthState {
	/// The shared cache client.
	pub cache: CacheClient,
	/// The scheduler whose job table is reported.
	pub scheduler: Arc<Scheduler>,
	/// Process start instant for the uptime field.
	pub started_at: Instant,
}

/// One collector entry in the health rollup, read from the metadata keys.
#[derive(Clone, Debug, Serialize)]
pub struct CollectorHealth {
	/// Collector name.
	pub name: String,
	/// `ok`, `degraded`, `error`, or `unknown` when the key is unreadable.
	pub status: String,
	/// Unix milliseconds of the last run.
	pub last_run: Option<i64>,
	/// Consecutive error count.
	pub error_count: Option<u32>,
}

/// Build the health router (CORS open to any origin).
pub fn router(state: HealthState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/ready", get(ready))
		.route("/live", get(live))
		.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
		.with_state(state)
}

async fn health(State(state): State<HealthState>) -> Response {
	let redis_ok = state.cache.ping().await;
	let collectors = collect_statuses(&state.cache).await;
	let rollup = rollup(redis_ok, &collectors);
	let status_code = match rollup {
		"unhealthy" => StatusCode::INTERNAL_SERVER_ERROR,
		_ => StatusCode::OK,
	};
	let body = json!({
		"status": rollup,
		"uptime": state.started_at.elapsed().as_secs(),
		"redis": if redis_ok { "ok" } else { "down" },
		"scheduler": state.scheduler.status(),
		"collectors": collectors,
	});

	(status_code, Json(body)).into_response()
}

async fn ready(State(state): State<HealthState>) -> Response {
	if state.cache.ping().await {
		(StatusCode::OK, Json(json!({"ready": true}))).into_response()
	} else {
		(StatusCode::SERVICE_UNAVAILABLE, Json(json!({"ready": false}))).into_response()
	}
}

async fn live() -> Response {
	(StatusCode::OK, Json(json!({"live": true}))).into_response()
}

/// Enumerate collector statuses from the `kaos:meta:*:status` keys.
async fn collect_statuses(cache: &CacheClient) -> Vec<CollectorHealth> {
	let status_keys = match cache.keys(keys::META_STATUS_PATTERN).await {
		Ok(keys) => keys,
		Err(err) => {
			tracing::warn!(error = %err, "health: metadata enumeration failed");

			return Vec::new();
		},
	};
	let mut collectors = Vec::with_capacity(status_keys.len());

	for status_key in status_keys {
		let Some(name) = keys::collector_of_status_key(&status_key) else {
			continue;
		};
		let status = cache
			.get_raw(&status_key)
			.await
			.ok()
			.flatten()
			.unwrap_or_else(|| "unknown".to_string());
		let last_run = cache
			.get_raw(&keys::meta_last_run(name))
			.await
			.ok()
			.flatten()
			.and_then(|raw| raw.parse().ok());
		let error_count = cache
			.get_raw(&keys::meta_error_count(name))
			.await
			.ok()
			.flatten()
			.and_then(|raw| raw.parse().ok());

		collectors.push(CollectorHealth { name: name.to_string(), status, last_run, error_count });
	}

	collectors.sort_by(|a, b| a.name.cmp(&b.name));

	collectors
}

/// Rollup policy: a failing cache ping is `unhealthy`; any collector off
/// `ok` is `degraded`; otherwise `healthy`.
fn rollup(redis_ok: bool, collectors: &[CollectorHealth]) -> &'static str {
	if !redis_ok {
		return "unhealthy";
	}
	if collectors.iter().any(|collector| collector.status != "ok") {
		return "degraded";
	}

	"healthy"
}
