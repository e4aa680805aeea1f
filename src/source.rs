//! JSON-declared generic sources.
//!
//! Low-complexity feeds are added by dropping a declaration file into the
//! sources directory instead of writing a collector. Declarations are parsed
//! and validated eagerly at startup so a malformed file fails the boot, not
//! the first run. Hand-written collectors remain the path for feeds that
//! need real parsing.

// std
use std::{collections::HashMap, env, fs, path::Path};
// crates.io
use base64::prelude::*;
use serde::Deserialize;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
};

const SCHEMA_FILE: &str = "schema.json";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Supported authentication schemes for declared sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
	/// `Authorization: Bearer <env>`.
	Bearer,
	/// `Authorization: Basic base64(<env>)`.
	Basic,
	/// The configured header name carries the key verbatim.
	Apikey,
}

/// Authentication block of a declaration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSpec {
	/// Scheme selector.
	#[serde(rename = "type")]
	pub kind: AuthKind,
	/// Environment variable holding the credential.
	pub env_var: String,
	/// Header name for `apikey` auth.
	#[serde(default)]
	pub header: Option<String>,
}

/// Request block of a declaration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSpec {
	/// Upstream URL.
	pub url: String,
	/// HTTP method (`GET` or `POST`); defaults to GET.
	#[serde(default)]
	pub method: Option<String>,
	/// Extra request headers.
	#[serde(default)]
	pub headers: HashMap<String, String>,
	/// Per-attempt timeout in milliseconds.
	#[serde(default)]
	pub timeout: Option<u64>,
}

/// Cadence block of a declaration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
	/// Execution period in milliseconds.
	pub interval_ms: u64,
	/// Payload TTL in seconds.
	pub ttl_seconds: u64,
}

/// Destination block of a declaration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisSpec {
	/// Payload key the collector owns.
	pub key: String,
}

/// Reshaping block of a declaration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformSpec {
	/// Dotted path into the parsed JSON selecting the record container.
	#[serde(default)]
	pub data_path: Option<String>,
	/// Rename map from dotted source paths to output field names.
	#[serde(default)]
	pub fields: Option<HashMap<String, String>>,
	/// Equality predicates applied to the reshaped items.
	#[serde(default)]
	pub filter: Option<HashMap<String, Value>>,
}

/// One parsed source declaration.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
	/// Collector name.
	pub name: String,
	/// Disabled declarations are skipped entirely.
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Request description.
	pub fetch: FetchSpec,
	/// Cadence description.
	pub schedule: ScheduleSpec,
	/// Destination description.
	pub redis: RedisSpec,
	/// Optional reshaping description.
	#[serde(default)]
	pub transform: TransformSpec,
	/// Optional authentication description.
	#[serde(default)]
	pub auth: Option<AuthSpec>,
}
impl Declaration {
	/// Validate the declaration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if self.name.is_empty() {
			return self.invalid("name must not be empty");
		}
		if url::Url::parse(&self.fetch.url).is_err() {
			return self.invalid("fetch.url is not a valid URL");
		}
		if let Some(method) = self.fetch.method.as_deref()
			&& !matches!(method, "GET" | "POST")
		{
			return self.invalid("fetch.method must be GET or POST");
		}
		if self.schedule.interval_ms == 0 {
			return self.invalid("schedule.intervalMs must be positive");
		}
		if self.redis.key.is_empty() {
			return self.invalid("redis.key must not be empty");
		}
		if let Some(path) = self.transform.data_path.as_deref()
			&& !dotted_path_is_valid(path)
		{
			return self.invalid("transform.dataPath is a malformed dotted path");
		}
		if let Some(fields) = &self.transform.fields {
			for (source_path, output) in fields {
				if !dotted_path_is_valid(source_path) || output.is_empty() {
					return self.invalid("transform.fields contains a malformed entry");
				}
			}
		}
		if let Some(auth) = &self.auth {
			if auth.env_var.is_empty() {
				return self.invalid("auth.envVar must not be empty");
			}
			if auth.kind == AuthKind::Apikey && auth.header.as_deref().unwrap_or("").is_empty() {
				return self.invalid("auth.header is required for apikey auth");
			}
		}

		Ok(())
	}

	fn invalid(&self, reason: &str) -> Result<()> {
		Err(Error::Declaration { name: self.name.clone(), reason: reason.into() })
	}
}

/// Load and validate every enabled declaration in a directory.
///
/// Enumerates `*.json` files (skipping the schema file); any invalid
/// declaration fails startup with the offending file named.
pub fn load_dir(dir: &Path) -> Result<Vec<Declaration>> {
	let mut declarations = Vec::new();

	if !dir.is_dir() {
		tracing::info!(dir = %dir.display(), "no sources directory; skipping declared sources");

		return Ok(declarations);
	}

	let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;

	entries.sort_by_key(|entry| entry.file_name());

	for entry in entries {
		let path = entry.path();
		let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
			continue;
		};

		if !file_name.ends_with(".json") || file_name == SCHEMA_FILE {
			continue;
		}

		let raw = fs::read_to_string(&path)?;
		let declaration: Declaration =
			serde_json::from_str(&raw).map_err(|err| Error::Declaration {
				name: file_name.to_string(),
				reason: format!("JSON parse failed: {err}"),
			})?;

		declaration.validate()?;

		if !declaration.enabled {
			tracing::info!(source = %declaration.name, "declared source disabled; skipping");

			continue;
		}

		declarations.push(declaration);
	}

	Ok(declarations)
}

/// Collector generated from a [`Declaration`].
pub struct GenericCollector {
	declaration: Declaration,
	descriptor: Descriptor,
}
impl GenericCollector {
	/// Build the collector; descriptor invariants (TTL vs period) are
	/// enforced here, at startup.
	pub fn new(declaration: Declaration) -> Result<Self> {
		declaration.validate()?;

		let descriptor = Descriptor::interval(
			declaration.name.clone(),
			declaration.redis.key.clone(),
			declaration.schedule.ttl_seconds,
			Duration::from_millis(declaration.schedule.interval_ms),
		)?;

		Ok(Self { declaration, descriptor })
	}

	fn request_headers(&self) -> Vec<(String, String)> {
		let mut headers: Vec<(String, String)> = self
			.declaration
			.fetch
			.headers
			.iter()
			.map(|(name, value)| (name.clone(), value.clone()))
			.collect();

		if let Some(auth) = &self.declaration.auth {
			match env::var(&auth.env_var) {
				Ok(secret) =>
					if let Some(header) = auth_header(auth, &secret) {
						headers.push(header);
					},
				Err(_) => {
					tracing::warn!(
						source = %self.declaration.name,
						env_var = %auth.env_var,
						"auth env var missing; proceeding unauthenticated"
					);
				},
			}
		}

		headers
	}
}
#[async_trait::async_trait]
impl Collect for GenericCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let declaration = &self.declaration;
		let url = &declaration.fetch.url;
		let timeout = Duration::from_millis(declaration.fetch.timeout.unwrap_or(DEFAULT_TIMEOUT_MS));
		let options = FetchOptions::with_timeout(timeout);
		let headers = self.request_headers();
		let response = ctx
			.fetcher
			.send(url, &options, || {
				let mut builder = match declaration.fetch.method.as_deref() {
					Some("POST") => ctx.fetcher.client().post(url),
					_ => ctx.fetcher.client().get(url),
				};

				for (name, value) in &headers {
					builder = builder.header(name, value);
				}

				builder
			})
			.await?;
		let body: Value = response.json().await.map_err(|err| Error::Parse {
			origin: url.to_string(),
			reason: format!("JSON decode failed: {err}."),
		})?;
		let records = reshape(&body, &declaration.transform).map_err(|reason| Error::Parse {
			origin: url.to_string(),
			reason,
		})?;

		tracing::debug!(source = %declaration.name, records = records.len(), "declared source fetched");
		ctx.store(&declaration.redis.key, &records, declaration.schedule.ttl_seconds).await
	}
}

/// Apply `dataPath` extraction, field renaming, and equality filtering.
fn reshape(body: &Value, transform: &TransformSpec) -> std::result::Result<Vec<Value>, String> {
	let container = match transform.data_path.as_deref() {
		None => body,
		Some(path) =>
			dig(body, path).ok_or_else(|| format!("dataPath '{path}' not found in payload"))?,
	};
	let items: Vec<Value> = match container {
		Value::Array(items) => items.clone(),
		other => vec![other.clone()],
	};
	let mapped: Vec<Value> = match &transform.fields {
		None => items,
		Some(fields) => items
			.iter()
			.map(|item| {
				let mut out = serde_json::Map::new();

				for (source_path, output) in fields {
					if let Some(value) = dig(item, source_path) {
						out.insert(output.clone(), value.clone());
					}
				}

				Value::Object(out)
			})
			.collect(),
	};
	let filtered = match &transform.filter {
		None => mapped,
		Some(predicates) => mapped
			.into_iter()
			.filter(|item| {
				predicates.iter().all(|(path, expected)| dig(item, path) == Some(expected))
			})
			.collect(),
	};

	Ok(filtered)
}

/// Walk dotted segments into a JSON value.
fn dig<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
	path.split('.').try_fold(value, |current, segment| current.get(segment))
}

fn dotted_path_is_valid(path: &str) -> bool {
	!path.is_empty() && path.split('.').all(|segment| !segment.is_empty())
}

/// Build the auth header for a declaration given the resolved credential.
fn auth_header(auth: &AuthSpec, secret: &str) -> Option<(String, String)> {
	match auth.kind {
		AuthKind::Bearer => Some(("Authorization".into(), format!("Bearer {secret}"))),
		AuthKind::Basic =>
			Some(("Authorization".into(), format!("Basic {}", BASE64_STANDARD.encode(secret)))),
		AuthKind::Apikey => auth.header.clone().map(|header| (header, secret.to_string())),
	}
}

fn default_true() -> bool {
	true
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	fn declaration(raw: Value) -> Declaration {
		serde_json::from_value(raw).expect("declaration")
	}

	fn minimal() -> Value {
		json!({
			"name": "quakes-mini",
			"fetch": {"url": "https://upstream.example/feed.json"},
			"schedule": {"intervalMs": 60000, "ttlSeconds": 300},
			"redis": {"key": "kaos:quakes-mini:events"}
		})
	}

	#[test]
	fn dotted_paths_walk_nested_objects() {
		let body = json!({"data": {"items": [1, 2]}});

		assert_eq!(dig(&body, "data.items"), Some(&json!([1, 2])));
		assert_eq!(dig(&body, "data.missing"), None);
	}

	#[test]
	fn reshape_maps_fields_and_filters() {
		let body = json!({
			"result": {
				"events": [
					{"props": {"id": "a", "kind": "fire"}, "mag": 1.0},
					{"props": {"id": "b", "kind": "flood"}, "mag": 2.0}
				]
			}
		});
		let transform = TransformSpec {
			data_path: Some("result.events".into()),
			fields: Some(HashMap::from([
				("props.id".to_string(), "id".to_string()),
				("props.kind".to_string(), "kind".to_string()),
				("mag".to_string(), "magnitude".to_string()),
			])),
			filter: Some(HashMap::from([("kind".to_string(), json!("flood"))])),
		};
		let records = reshape(&body, &transform).expect("reshape");

		assert_eq!(records, vec![json!({"id": "b", "kind": "flood", "magnitude": 2.0})]);
	}

	#[test]
	fn reshape_coerces_a_single_object_to_one_record() {
		let body = json!({"kp": 4});
		let records = reshape(&body, &TransformSpec::default()).expect("reshape");

		assert_eq!(records.len(), 1);
	}

	#[test]
	fn missing_data_path_is_a_parse_failure() {
		let transform = TransformSpec { data_path: Some("no.such".into()), ..Default::default() };

		assert!(reshape(&json!({}), &transform).is_err());
	}

	#[test]
	fn apikey_auth_requires_a_header_name() {
		let mut raw = minimal();

		raw["auth"] = json!({"type": "apikey", "envVar": "SOME_KEY"});

		assert!(declaration(raw).validate().is_err());
	}

	#[test]
	fn unknown_auth_type_fails_at_parse_time() {
		let mut raw = minimal();

		raw["auth"] = json!({"type": "oauth2", "envVar": "SOME_KEY"});

		assert!(serde_json::from_value::<Declaration>(raw).is_err());
	}

	#[test]
	fn auth_headers_follow_the_scheme() {
		let bearer = AuthSpec { kind: AuthKind::Bearer, env_var: "K".into(), header: None };
		let basic = AuthSpec { kind: AuthKind::Basic, env_var: "K".into(), header: None };
		let apikey =
			AuthSpec { kind: AuthKind::Apikey, env_var: "K".into(), header: Some("X-Api-Key".into()) };

		assert_eq!(
			auth_header(&bearer, "secret"),
			Some(("Authorization".into(), "Bearer secret".into()))
		);
		assert_eq!(
			auth_header(&basic, "user:pass"),
			Some(("Authorization".into(), format!("Basic {}", BASE64_STANDARD.encode("user:pass"))))
		);
		assert_eq!(auth_header(&apikey, "secret"), Some(("X-Api-Key".into(), "secret".into())));
	}

	#[test]
	fn load_dir_skips_schema_and_disabled_files() {
		let dir = tempfile::tempdir().expect("tempdir");

		fs::write(dir.path().join("schema.json"), "{}").expect("schema");
		fs::write(dir.path().join("enabled.json"), minimal().to_string()).expect("enabled");

		let mut disabled = minimal();

		disabled["name"] = json!("disabled-source");
		disabled["enabled"] = json!(false);
		fs::write(dir.path().join("disabled.json"), disabled.to_string()).expect("disabled");

		let declarations = load_dir(dir.path()).expect("load");

		assert_eq!(declarations.len(), 1);
		assert_eq!(declarations[0].name, "quakes-mini");
	}

	#[test]
	fn load_dir_surfaces_invalid_declarations() {
		let dir = tempfile::tempdir().expect("tempdir");
		let mut invalid = minimal();

		invalid["transform"] = json!({"dataPath": "a..b"});
		fs::write(dir.path().join("bad.json"), invalid.to_string()).expect("write");

		assert!(matches!(load_dir(dir.path()), Err(Error::Declaration { .. })));
	}
}
