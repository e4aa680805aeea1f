//! Retry and classification behaviour of the outbound fetcher.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::{Duration, Instant},
};
// crates.io
use serde_json::json;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};
// self
use kaos_worker::{Error, Fetcher, fetch::FetchOptions};

#[tokio::test]
async fn transient_upstream_failures_are_retried_until_success() {
	let server = MockServer::start().await;
	let counter = Arc::new(AtomicUsize::new(0));
	let counter_handle = counter.clone();

	Mock::given(method("GET"))
		.and(path("/feed"))
		.respond_with(move |_: &wiremock::Request| {
			match counter_handle.fetch_add(1, Ordering::SeqCst) {
				0 | 1 => ResponseTemplate::new(500),
				_ => ResponseTemplate::new(200).set_body_json(json!({"ok": true})),
			}
		})
		.mount(&server)
		.await;

	let fetcher = Fetcher::new().expect("fetcher");
	let options = FetchOptions::default().retry(3, Duration::from_millis(20));
	let url = format!("{}/feed", server.uri());
	let body: serde_json::Value = fetcher.get_json(&url, &options).await.expect("fetch");

	assert_eq!(body, json!({"ok": true}));
	assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn backoff_doubles_and_attempts_stop_at_the_budget() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/feed"))
		.respond_with(ResponseTemplate::new(500))
		.expect(4)
		.mount(&server)
		.await;

	let fetcher = Fetcher::new().expect("fetcher");
	let options = FetchOptions::default().retry(3, Duration::from_millis(100));
	let url = format!("{}/feed", server.uri());
	let started = Instant::now();
	let result = fetcher.get_json::<serde_json::Value>(&url, &options).await;
	let elapsed = started.elapsed();

	assert!(matches!(result, Err(Error::UpstreamStatus { status, .. }) if status.as_u16() == 500));
	// delays of 100, 200, and 400 ms between the four attempts
	assert!(elapsed >= Duration::from_millis(700), "elapsed {elapsed:?}");
	assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");

	server.verify().await;
}

#[tokio::test]
async fn client_errors_are_terminal() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/feed"))
		.respond_with(ResponseTemplate::new(404).set_body_string("no such feed"))
		.expect(1)
		.mount(&server)
		.await;

	let fetcher = Fetcher::new().expect("fetcher");
	let options = FetchOptions::default().retry(3, Duration::from_millis(20));
	let url = format!("{}/feed", server.uri());
	let result = fetcher.get_json::<serde_json::Value>(&url, &options).await;

	match result {
		Err(Error::UpstreamStatus { status, body, .. }) => {
			assert_eq!(status.as_u16(), 404);
			assert_eq!(body.as_deref(), Some("no such feed"));
		},
		other => panic!("expected terminal 404, got {other:?}"),
	}

	server.verify().await;
}

#[tokio::test]
async fn rate_limits_surface_as_their_own_kind() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/feed"))
		.respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
		.mount(&server)
		.await;

	let fetcher = Fetcher::new().expect("fetcher");
	let options = FetchOptions::default().retry(1, Duration::from_millis(10));
	let url = format!("{}/feed", server.uri());
	let result = fetcher.get_json::<serde_json::Value>(&url, &options).await;

	match result {
		Err(Error::RateLimited { retry_after, .. }) => assert_eq!(retry_after, Some(30)),
		other => panic!("expected rate limit, got {other:?}"),
	}
}

#[tokio::test]
async fn timeouts_map_to_gateway_timeout() {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/feed"))
		.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
		.mount(&server)
		.await;

	let fetcher = Fetcher::new().expect("fetcher");
	let mut options = FetchOptions::no_retry();

	options.timeout = Duration::from_millis(100);

	let url = format!("{}/feed", server.uri());
	let result = fetcher.get_json::<serde_json::Value>(&url, &options).await;

	match result {
		Err(err @ Error::Timeout { .. }) => assert_eq!(err.http_status(), 504),
		other => panic!("expected timeout, got {other:?}"),
	}
}
