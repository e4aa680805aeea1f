//! Collector run harness behaviour against mock upstreams and the
//! in-memory cache endpoint.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use serde_json::{Value, json};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use super::support::memory_cache;
use kaos_worker::{
	CacheClient, CollectorHandle, Descriptor, Fetcher, Result,
	collector::{Collect, CollectContext},
	collectors::prociv::ProcivCollector,
	source::{Declaration, GenericCollector},
};

fn ctx(cache: CacheClient) -> CollectContext {
	CollectContext { cache, fetcher: Fetcher::new().expect("fetcher") }
}

#[tokio::test]
async fn successful_run_stores_payload_and_ok_metadata() {
	let upstream = MockServer::start().await;
	let cache_server = MockServer::start().await;
	let (cache, store) = memory_cache(&cache_server).await;

	Mock::given(method("GET"))
		.and(path("/occurrences"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"features": [{
				"attributes": {"OBJECTID": 1, "Natureza": "Incêndio Rural"},
				"geometry": {"x": -8.61, "y": 41.15}
			}]
		})))
		.mount(&upstream)
		.await;

	let collector =
		ProcivCollector::with_url(format!("{}/occurrences", upstream.uri())).expect("collector");
	let handle = CollectorHandle::new(Box::new(collector));
	let ctx = ctx(cache.clone());

	handle.run(&ctx).await;

	assert_eq!(handle.state().consecutive_errors(), 0);

	let payload: Vec<Value> =
		cache.get("kaos:prociv:ocorrencias").await.expect("read").expect("payload");

	assert_eq!(payload.len(), 1);
	assert_eq!(payload[0]["nature"], json!("Incêndio Rural"));

	let stored = store.lock().expect("store");

	assert_eq!(stored.get("kaos:meta:prociv:status").map(String::as_str), Some("ok"));
	assert_eq!(stored.get("kaos:meta:prociv:error-count").map(String::as_str), Some("0"));
	assert!(stored.contains_key("kaos:meta:prociv:last-run"));
}

#[tokio::test]
async fn terminal_failure_degrades_the_collector() {
	let upstream = MockServer::start().await;
	let cache_server = MockServer::start().await;
	let (cache, store) = memory_cache(&cache_server).await;

	Mock::given(method("GET"))
		.and(path("/occurrences"))
		.respond_with(ResponseTemplate::new(404))
		.expect(1)
		.mount(&upstream)
		.await;

	let collector =
		ProcivCollector::with_url(format!("{}/occurrences", upstream.uri())).expect("collector");
	let handle = CollectorHandle::new(Box::new(collector));
	let ctx = ctx(cache);

	handle.run(&ctx).await;

	assert_eq!(handle.state().consecutive_errors(), 1);

	let stored = store.lock().expect("store");

	assert_eq!(stored.get("kaos:meta:prociv:status").map(String::as_str), Some("degraded"));
	assert_eq!(stored.get("kaos:meta:prociv:error-count").map(String::as_str), Some("1"));
	assert!(!stored.contains_key("kaos:prociv:ocorrencias"));

	upstream.verify().await;
}

struct Slow {
	descriptor: Descriptor,
	calls: Arc<AtomicUsize>,
}
#[async_trait::async_trait]
impl Collect for Slow {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, _: &CollectContext) -> Result<()> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		tokio::time::sleep(Duration::from_millis(200)).await;

		Ok(())
	}
}

#[tokio::test]
async fn overlapping_runs_are_skipped() {
	let calls = Arc::new(AtomicUsize::new(0));
	let handle = Arc::new(CollectorHandle::new(Box::new(Slow {
		descriptor: Descriptor::interval("slow", "kaos:slow:global", 600, Duration::from_secs(60))
			.expect("descriptor"),
		calls: calls.clone(),
	})));
	let ctx = ctx(CacheClient::uninitialized());

	tokio::join!(handle.run(&ctx), handle.run(&ctx));

	assert_eq!(calls.load(Ordering::SeqCst), 1, "second tick must be skipped");
}

#[tokio::test]
async fn declared_source_fetches_reshapes_and_stores() {
	let upstream = MockServer::start().await;
	let cache_server = MockServer::start().await;
	let (cache, _) = memory_cache(&cache_server).await;

	Mock::given(method("GET"))
		.and(path("/events"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"data": {
				"rows": [
					{"meta": {"id": "a", "level": "red"}, "score": 3},
					{"meta": {"id": "b", "level": "green"}, "score": 1}
				]
			}
		})))
		.mount(&upstream)
		.await;

	let declaration: Declaration = serde_json::from_value(json!({
		"name": "alerts-mini",
		"fetch": {"url": format!("{}/events", upstream.uri())},
		"schedule": {"intervalMs": 60_000, "ttlSeconds": 300},
		"redis": {"key": "kaos:alerts-mini:events"},
		"transform": {
			"dataPath": "data.rows",
			"fields": {"meta.id": "id", "meta.level": "level"},
			"filter": {"level": "red"}
		}
	}))
	.expect("declaration");
	let handle =
		CollectorHandle::new(Box::new(GenericCollector::new(declaration).expect("collector")));
	let ctx = ctx(cache.clone());

	handle.run(&ctx).await;

	let payload: Vec<Value> =
		cache.get("kaos:alerts-mini:events").await.expect("read").expect("payload");

	assert_eq!(payload, vec![json!({"id": "a", "level": "red"})]);
}
