//! Cache client behaviour over the REST backend.

// crates.io
use serde_json::json;
use wiremock::MockServer;
// self
use super::support::memory_cache;
use kaos_worker::cache::client::CacheWrite;

#[tokio::test]
async fn set_then_get_round_trips_json_values() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;

	assert_eq!(cache.get::<serde_json::Value>("kaos:tec:global").await.expect("miss"), None);

	cache.set("kaos:tec:global", &json!({"unit": "TECU"}), 1_200).await.expect("set");

	let value: Option<serde_json::Value> = cache.get("kaos:tec:global").await.expect("get");

	assert_eq!(value, Some(json!({"unit": "TECU"})));
}

#[tokio::test]
async fn ping_and_keys_use_the_command_protocol() {
	let server = MockServer::start().await;
	let (cache, _) = memory_cache(&server).await;

	assert!(cache.ping().await);

	cache.set_raw("kaos:meta:seismic:status", "ok", None).await.expect("status");
	cache.set_raw("kaos:meta:seismic:last-run", "1722000000000", None).await.expect("last-run");
	cache.set_raw("kaos:meta:aurora:status", "degraded", None).await.expect("status");

	let mut keys = cache.keys("kaos:meta:*:status").await.expect("keys");

	keys.sort();

	assert_eq!(keys, vec!["kaos:meta:aurora:status", "kaos:meta:seismic:status"]);
}

#[tokio::test]
async fn pipelines_apply_every_write() {
	let server = MockServer::start().await;
	let (cache, store) = memory_cache(&server).await;
	let writes = vec![
		CacheWrite::json("kaos:seismic:day", &json!({"features": []}), 180).expect("write"),
		CacheWrite::forever("kaos:meta:seismic:status", "ok"),
		CacheWrite::forever("kaos:meta:seismic:error-count", "0"),
	];

	cache.pipeline(writes).await.expect("pipeline");

	let stored = store.lock().expect("store");

	assert_eq!(stored.len(), 3);
	assert_eq!(stored.get("kaos:meta:seismic:status").map(String::as_str), Some("ok"));
}
