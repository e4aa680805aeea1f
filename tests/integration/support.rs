//! Shared fixtures: an in-memory Redis-compatible REST responder backed by
//! wiremock, so the cache protocol is exercised end to end without a server.

// std
use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};
// crates.io
use serde_json::{Value, json};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate, matchers::method};
// self
use kaos_worker::{
	CacheClient,
	cache::backend::{Backend, RestBackend},
};

/// Shared key/value map behind the mock REST endpoint.
pub type Store = Arc<Mutex<HashMap<String, String>>>;

struct CommandResponder {
	store: Store,
}
impl Respond for CommandResponder {
	fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
		let command: Value = match serde_json::from_slice(&request.body) {
			Ok(command) => command,
			Err(_) => return ResponseTemplate::new(400),
		};

		ResponseTemplate::new(200).set_body_json(execute(&self.store, &command))
	}
}

struct PipelineResponder {
	store: Store,
}
impl Respond for PipelineResponder {
	fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
		let commands: Vec<Value> = match serde_json::from_slice(&request.body) {
			Ok(commands) => commands,
			Err(_) => return ResponseTemplate::new(400),
		};
		let results: Vec<Value> =
			commands.iter().map(|command| execute(&self.store, command)).collect();

		ResponseTemplate::new(200).set_body_json(results)
	}
}

fn execute(store: &Store, command: &Value) -> Value {
	let parts: Vec<String> = command
		.as_array()
		.map(|parts| {
			parts
				.iter()
				.map(|part| match part {
					Value::String(s) => s.clone(),
					other => other.to_string(),
				})
				.collect()
		})
		.unwrap_or_default();
	let mut store = store.lock().expect("store lock");

	match parts.first().map(String::as_str) {
		Some("PING") => json!({"result": "PONG"}),
		Some("GET") => match parts.get(1).and_then(|key| store.get(key)) {
			Some(value) => json!({"result": value}),
			None => json!({"result": null}),
		},
		Some("SET") => match (parts.get(1), parts.get(2)) {
			(Some(key), Some(value)) => {
				store.insert(key.clone(), value.clone());

				json!({"result": "OK"})
			},
			_ => json!({"error": "SET requires a key and value"}),
		},
		Some("KEYS") => {
			let pattern = parts.get(1).cloned().unwrap_or_default();
			let mut matches: Vec<String> =
				store.keys().filter(|key| glob_match(&pattern, key)).cloned().collect();

			matches.sort();

			json!({"result": matches})
		},
		_ => json!({"error": "unsupported command"}),
	}
}

/// Single-`*` glob, enough for the `kaos:meta:*:status` pattern.
fn glob_match(pattern: &str, key: &str) -> bool {
	match pattern.split_once('*') {
		None => pattern == key,
		Some((prefix, suffix)) =>
			key.len() >= prefix.len() + suffix.len()
				&& key.starts_with(prefix)
				&& key.ends_with(suffix),
	}
}

/// Mount the in-memory cache endpoint and return a client over it together
/// with the backing store.
pub async fn memory_cache(server: &MockServer) -> (CacheClient, Store) {
	let store: Store = Arc::new(Mutex::new(HashMap::new()));

	Mock::given(method("POST"))
		.and(wiremock::matchers::path("/pipeline"))
		.respond_with(PipelineResponder { store: store.clone() })
		.mount(server)
		.await;
	Mock::given(method("POST"))
		.and(wiremock::matchers::path("/"))
		.respond_with(CommandResponder { store: store.clone() })
		.mount(server)
		.await;

	let backend = RestBackend::new(&server.uri(), "test-token").expect("backend");

	(CacheClient::with_backend(Backend::Rest(backend)), store)
}
