//! Cache backends: direct Redis connection and HTTP/REST client.
//!
//! Both backends expose the same operation set and are functionally
//! equivalent from the caller's viewpoint; the client façade picks one at
//! startup based on configuration.

// crates.io
use redis::AsyncCommands;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;
// self
use crate::{_prelude::*, cache::client::CacheWrite};

/// A single cache backend instance.
#[derive(Clone, Debug)]
pub enum Backend {
	/// TCP connection to a Redis-compatible server.
	Direct(DirectBackend),
	/// One HTTPS call per operation against a managed REST endpoint.
	Rest(RestBackend),
}
impl Backend {
	/// Read a key's stored string value.
	pub async fn get(&self, key: &str) -> Result<Option<String>> {
		match self {
			Self::Direct(backend) => backend.get(key).await,
			Self::Rest(backend) => backend.get(key).await,
		}
	}

	/// Write a string value, optionally bounded by a TTL in seconds.
	pub async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
		match self {
			Self::Direct(backend) => backend.set(key, value, ttl_secs).await,
			Self::Rest(backend) => backend.set(key, value, ttl_secs).await,
		}
	}

	/// Group independent writes into one round trip.
	pub async fn pipeline(&self, writes: &[CacheWrite]) -> Result<()> {
		match self {
			Self::Direct(backend) => backend.pipeline(writes).await,
			Self::Rest(backend) => backend.pipeline(writes).await,
		}
	}

	/// Enumerate keys matching a glob pattern.
	pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
		match self {
			Self::Direct(backend) => backend.keys(pattern).await,
			Self::Rest(backend) => backend.keys(pattern).await,
		}
	}

	/// Liveness probe.
	pub async fn ping(&self) -> Result<()> {
		match self {
			Self::Direct(backend) => backend.ping().await,
			Self::Rest(backend) => backend.ping().await,
		}
	}
}

/// Redis backend over a multiplexed async connection.
#[derive(Clone, Debug)]
pub struct DirectBackend {
	conn: redis::aio::MultiplexedConnection,
}
impl DirectBackend {
	/// Open a connection to the given Redis URL.
	pub async fn connect(url: &str) -> Result<Self> {
		let client = redis::Client::open(url)?;
		let conn = client.get_multiplexed_async_connection().await?;

		Ok(Self { conn })
	}

	async fn get(&self, key: &str) -> Result<Option<String>> {
		let mut conn = self.conn.clone();

		Ok(conn.get::<_, Option<String>>(key).await?)
	}

	async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
		let mut conn = self.conn.clone();

		match ttl_secs {
			Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl).await?,
			None => conn.set::<_, _, ()>(key, value).await?,
		}

		Ok(())
	}

	async fn pipeline(&self, writes: &[CacheWrite]) -> Result<()> {
		if writes.is_empty() {
			return Ok(());
		}

		let mut conn = self.conn.clone();
		let mut pipe = redis::pipe();

		for write in writes {
			match write.ttl_secs {
				Some(ttl) => {
					pipe.set_ex(&write.key, &write.value, ttl).ignore();
				},
				None => {
					pipe.set(&write.key, &write.value).ignore();
				},
			}
		}

		pipe.query_async::<()>(&mut conn).await?;

		Ok(())
	}

	async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
		let mut conn = self.conn.clone();

		Ok(conn.keys::<_, Vec<String>>(pattern).await?)
	}

	async fn ping(&self) -> Result<()> {
		let mut conn = self.conn.clone();
		let _: String = redis::cmd("PING").query_async(&mut conn).await?;

		Ok(())
	}
}

/// REST backend speaking the command-array protocol of managed
/// Redis-compatible services.
#[derive(Clone, Debug)]
pub struct RestBackend {
	client: reqwest::Client,
	base: Url,
	token: String,
}
impl RestBackend {
	/// Build a REST backend for the given base URL and bearer token.
	pub fn new(base: &str, token: impl Into<String>) -> Result<Self> {
		let base = Url::parse(base)?;
		let client = reqwest::Client::builder()
			.user_agent(format!("kaos-worker/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(Duration::from_secs(5))
			.timeout(Duration::from_secs(10))
			.build()?;

		Ok(Self { client, base, token: token.into() })
	}

	async fn get(&self, key: &str) -> Result<Option<String>> {
		let result = self.command(json!(["GET", key])).await?;

		match result {
			Value::Null => Ok(None),
			Value::String(value) => Ok(Some(value)),
			other => Err(Error::Parse {
				origin: self.base.to_string(),
				reason: format!("Unexpected GET result shape: {other}."),
			}),
		}
	}

	async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
		let command = match ttl_secs {
			Some(ttl) => json!(["SET", key, value, "EX", ttl]),
			None => json!(["SET", key, value]),
		};

		self.command(command).await?;

		Ok(())
	}

	async fn pipeline(&self, writes: &[CacheWrite]) -> Result<()> {
		if writes.is_empty() {
			return Ok(());
		}

		let commands: Vec<Value> = writes
			.iter()
			.map(|write| match write.ttl_secs {
				Some(ttl) => json!(["SET", write.key, write.value, "EX", ttl]),
				None => json!(["SET", write.key, write.value]),
			})
			.collect();
		let url = self.base.join("pipeline")?;
		let response =
			self.client.post(url).bearer_auth(&self.token).json(&commands).send().await?;

		if !response.status().is_success() {
			return Err(Error::CacheUnavailable(format!(
				"REST pipeline returned {}.",
				response.status()
			)));
		}

		let results: Vec<RestResult> = response.json().await?;

		for result in results {
			if let Some(error) = result.error {
				return Err(Error::CacheUnavailable(format!("REST pipeline command: {error}.")));
			}
		}

		Ok(())
	}

	async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
		let result = self.command(json!(["KEYS", pattern])).await?;
		let Value::Array(items) = result else {
			return Err(Error::Parse {
				origin: self.base.to_string(),
				reason: "KEYS result was not an array.".into(),
			});
		};

		Ok(items.into_iter().filter_map(|item| item.as_str().map(str::to_string)).collect())
	}

	async fn ping(&self) -> Result<()> {
		let result = self.command(json!(["PING"])).await?;

		match result.as_str() {
			Some("PONG") => Ok(()),
			_ => Err(Error::CacheUnavailable("PING did not return PONG.".into())),
		}
	}

	async fn command(&self, command: Value) -> Result<Value> {
		let response = self
			.client
			.post(self.base.clone())
			.bearer_auth(&self.token)
			.json(&command)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(Error::CacheUnavailable(format!(
				"REST backend returned {}.",
				response.status()
			)));
		}

		let result: RestResult = response.json().await?;

		if let Some(error) = result.error {
			return Err(Error::CacheUnavailable(format!("REST command failed: {error}.")));
		}

		Ok(result.result.unwrap_or(Value::Null))
	}
}

#[derive(Debug, Deserialize)]
struct RestResult {
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<String>,
}
