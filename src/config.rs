//! Environment-driven configuration loaded once at startup.

// std
use std::{collections::HashSet, env, path::PathBuf};
// crates.io
use tracing_subscriber::EnvFilter;
// self
use crate::_prelude::*;

const DISABLE_PREFIX: &str = "KAOS_DISABLE_";

/// Cache backend selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheMode {
	/// Direct TCP connection to a Redis-compatible server.
	Direct,
	/// HTTP/REST client for a managed Redis-compatible service.
	#[default]
	Rest,
}

/// Connection settings for the shared cache.
#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
	/// Requested backend; the effective backend also depends on which URLs
	/// are configured.
	pub mode: CacheMode,
	/// Redis connection URL for the direct backend.
	pub redis_url: Option<String>,
	/// Base URL of the REST backend.
	pub rest_url: Option<String>,
	/// Bearer token for the REST backend.
	pub rest_token: Option<String>,
}

/// OAuth client credentials for the aircraft feed.
#[derive(Clone, Debug)]
pub struct OpenSkyCredentials {
	/// OAuth2 client id.
	pub client_id: String,
	/// OAuth2 client secret.
	pub client_secret: String,
}

/// Process configuration resolved from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
	/// Cache backend settings.
	pub cache: CacheConfig,
	/// Port the read API listens on.
	pub api_port: u16,
	/// Port the health surface listens on.
	pub health_port: u16,
	/// Directory scanned for JSON source declarations.
	pub sources_dir: PathBuf,
	/// Collector names disabled via `KAOS_DISABLE_<NAME>` flags.
	pub disabled: HashSet<String>,
	/// NASA FIRMS API key for the fires collector.
	pub firms_api_key: Option<String>,
	/// API key for the air quality measurements provider.
	pub airq_api_key: Option<String>,
	/// OAuth credentials for the aircraft feed.
	pub opensky: Option<OpenSkyCredentials>,
	/// OpenWeatherMap API key used by the read-side weather handlers.
	pub owm_api_key: Option<String>,
}
impl Config {
	/// Load configuration from the environment (reading a `.env` file when
	/// present). Malformed values fail startup with the offending variable.
	pub fn from_env() -> Result<Self> {
		dotenvy::dotenv().ok();

		let cache = CacheConfig {
			mode: match env::var("KAOS_REDIS_MODE").ok().as_deref() {
				None | Some("rest") => CacheMode::Rest,
				Some("direct") => CacheMode::Direct,
				Some(other) =>
					return Err(Error::Validation {
						field: "KAOS_REDIS_MODE",
						reason: format!("Expected 'direct' or 'rest', got '{other}'."),
					}),
			},
			redis_url: non_empty(env::var("KAOS_REDIS_URL").ok()),
			rest_url: non_empty(env::var("KAOS_REDIS_REST_URL").ok()),
			rest_token: non_empty(env::var("KAOS_REDIS_REST_TOKEN").ok()),
		};
		let opensky = match (
			non_empty(env::var("KAOS_OPENSKY_CLIENT_ID").ok()),
			non_empty(env::var("KAOS_OPENSKY_CLIENT_SECRET").ok()),
		) {
			(Some(client_id), Some(client_secret)) =>
				Some(OpenSkyCredentials { client_id, client_secret }),
			(None, None) => None,
			_ =>
				return Err(Error::Validation {
					field: "KAOS_OPENSKY_CLIENT_ID",
					reason: "Client id and secret must be set together.".into(),
				}),
		};

		Ok(Self {
			cache,
			api_port: parse_port("KAOS_API_PORT", 8080)?,
			health_port: parse_port("KAOS_HEALTH_PORT", 8081)?,
			sources_dir: env::var("KAOS_SOURCES_DIR")
				.map(PathBuf::from)
				.unwrap_or_else(|_| PathBuf::from("sources")),
			disabled: disabled_from_env(env::vars())?,
			firms_api_key: non_empty(env::var("KAOS_FIRMS_API_KEY").ok()),
			airq_api_key: non_empty(env::var("KAOS_AIRQ_API_KEY").ok()),
			opensky,
			owm_api_key: non_empty(env::var("KAOS_OWM_API_KEY").ok()),
		})
	}

	/// Whether a collector was disabled via its `KAOS_DISABLE_<NAME>` flag.
	pub fn is_disabled(&self, name: &str) -> bool {
		self.disabled.contains(name)
	}
}

/// Install the global tracing subscriber honoring `KAOS_LOG` (falling back to
/// `RUST_LOG`, defaulting to `info`).
pub fn init_tracing() {
	let filter = env::var("KAOS_LOG")
		.or_else(|_| env::var("RUST_LOG"))
		.unwrap_or_else(|_| "info".to_string());

	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::new(filter))
		.with_target(false)
		.init();
}

fn parse_port(var: &'static str, default: u16) -> Result<u16> {
	match env::var(var) {
		Err(_) => Ok(default),
		Ok(raw) => raw.parse::<u16>().map_err(|_| Error::Validation {
			field: var,
			reason: format!("Expected a port number, got '{raw}'."),
		}),
	}
}

fn parse_flag(var: &str, raw: &str) -> Result<bool> {
	match raw.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" => Ok(true),
		"" | "0" | "false" | "no" => Ok(false),
		other => Err(Error::Validation {
			field: "KAOS_DISABLE_*",
			reason: format!("{var}: expected a boolean, got '{other}'."),
		}),
	}
}

fn disabled_from_env(vars: impl Iterator<Item = (String, String)>) -> Result<HashSet<String>> {
	let mut disabled = HashSet::new();

	for (var, value) in vars {
		let Some(suffix) = var.strip_prefix(DISABLE_PREFIX) else {
			continue;
		};

		if parse_flag(&var, &value)? {
			disabled.insert(suffix.to_ascii_lowercase().replace('_', "-"));
		}
	}

	Ok(disabled)
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn disable_flags_map_to_collector_names() {
		let vars = vec![
			("KAOS_DISABLE_SPACE_WEATHER".to_string(), "true".to_string()),
			("KAOS_DISABLE_AIRCRAFT".to_string(), "0".to_string()),
			("KAOS_REDIS_MODE".to_string(), "rest".to_string()),
		];
		let disabled = disabled_from_env(vars.into_iter()).expect("flags");

		assert!(disabled.contains("space-weather"));
		assert!(!disabled.contains("aircraft"));
		assert_eq!(disabled.len(), 1);
	}

	#[test]
	fn malformed_disable_flag_is_rejected() {
		let vars = vec![("KAOS_DISABLE_FIRES".to_string(), "maybe".to_string())];

		assert!(disabled_from_env(vars.into_iter()).is_err());
	}
}
