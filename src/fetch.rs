//! Outbound HTTP with per-call timeouts, bounded retries, and error
//! classification.
//!
//! Every outbound request in the worker goes through [`Fetcher`]; collectors
//! never touch `reqwest` directly. Failures are classified into transient
//! kinds (retried with exponential backoff) and terminal 4xx responses
//! (surfaced immediately).

// crates.io
use reqwest::{Client, RequestBuilder, Response, StatusCode, redirect::Policy};
use serde::de::DeserializeOwned;
use tokio::time;
// self
use crate::_prelude::*;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_ERROR_BODY_BYTES: usize = 512;

/// Per-call fetch policy.
#[derive(Clone)]
pub struct FetchOptions {
	/// Per-attempt timeout; an attempt exceeding it fails with a timeout kind.
	pub timeout: Duration,
	/// Additional attempts permitted after the initial request.
	pub retries: u32,
	/// Base delay; attempt `k` waits `base * 2^k` before retrying.
	pub retry_base_delay: Duration,
	should_retry: Option<Arc<dyn Fn(&Error) -> bool + Send + Sync>>,
}
impl FetchOptions {
	/// Options with the given per-attempt timeout, defaults otherwise.
	pub fn with_timeout(timeout: Duration) -> Self {
		Self { timeout, ..Self::default() }
	}

	/// Options that never retry.
	pub fn no_retry() -> Self {
		Self { retries: 0, ..Self::default() }
	}

	/// Override the retry budget and base delay.
	pub fn retry(mut self, retries: u32, base_delay: Duration) -> Self {
		self.retries = retries;
		self.retry_base_delay = base_delay;

		self
	}

	/// Override the retry predicate; the default is [`Error::is_retryable`].
	pub fn should_retry(mut self, predicate: impl Fn(&Error) -> bool + Send + Sync + 'static) -> Self {
		self.should_retry = Some(Arc::new(predicate));

		self
	}

	fn retry_allowed(&self, err: &Error) -> bool {
		match &self.should_retry {
			Some(predicate) => predicate(err),
			None => err.is_retryable(),
		}
	}
}
impl Default for FetchOptions {
	fn default() -> Self {
		Self {
			timeout: DEFAULT_TIMEOUT,
			retries: DEFAULT_RETRIES,
			retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
			should_retry: None,
		}
	}
}
impl std::fmt::Debug for FetchOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FetchOptions")
			.field("timeout", &self.timeout)
			.field("retries", &self.retries)
			.field("retry_base_delay", &self.retry_base_delay)
			.finish()
	}
}

/// Shared outbound HTTP client.
#[derive(Clone, Debug)]
pub struct Fetcher {
	client: Client,
}
impl Fetcher {
	/// Build the shared client (rustls, bounded redirects, connect timeout).
	pub fn new() -> Result<Self> {
		let client = Client::builder()
			.redirect(Policy::limited(10))
			.user_agent(format!("kaos-worker/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(Duration::from_secs(5))
			.build()?;

		Ok(Self { client })
	}

	/// Access the underlying client to prepare custom requests for [`Self::send`].
	pub fn client(&self) -> &Client {
		&self.client
	}

	/// GET a URL and decode the JSON body.
	pub async fn get_json<T>(&self, url: &str, options: &FetchOptions) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let response = self.send(url, options, || self.client.get(url)).await?;

		response.json::<T>().await.map_err(|err| Error::Parse {
			origin: url.to_string(),
			reason: format!("JSON decode failed: {err}."),
		})
	}

	/// GET a URL and return the body as text.
	pub async fn get_text(&self, url: &str, options: &FetchOptions) -> Result<String> {
		let response = self.send(url, options, || self.client.get(url)).await?;

		Ok(response.text().await?)
	}

	/// GET a URL and return the raw body bytes.
	pub async fn get_bytes(&self, url: &str, options: &FetchOptions) -> Result<Vec<u8>> {
		let response = self.send(url, options, || self.client.get(url)).await?;

		Ok(response.bytes().await?.to_vec())
	}

	/// Execute a prepared request under the retry policy.
	///
	/// The builder closure runs once per attempt because a `RequestBuilder`
	/// is consumed by sending.
	pub async fn send<F>(&self, url: &str, options: &FetchOptions, build: F) -> Result<Response>
	where
		F: Fn() -> RequestBuilder,
	{
		let mut attempt = 0_u32;

		loop {
			match self.attempt(build(), url, options.timeout).await {
				Ok(response) => return Ok(response),
				Err(err) => {
					if attempt >= options.retries || !options.retry_allowed(&err) {
						return Err(err);
					}

					let delay = options.retry_base_delay * 2_u32.pow(attempt);

					tracing::debug!(url, attempt = attempt + 1, ?delay, error = %err, "retrying fetch");
					time::sleep(delay).await;

					attempt += 1;
				},
			}
		}
	}

	async fn attempt(
		&self,
		builder: RequestBuilder,
		url: &str,
		timeout: Duration,
	) -> Result<Response> {
		let started = Instant::now();
		let response = builder.timeout(timeout).send().await.map_err(|err| {
			if err.is_timeout() {
				Error::Timeout { url: url.to_string(), elapsed_ms: started.elapsed().as_millis() as u64 }
			} else if err.is_connect() || err.is_request() {
				Error::Network { url: url.to_string(), reason: err.to_string() }
			} else {
				Error::Reqwest(err)
			}
		})?;
		let status = response.status();

		if status == StatusCode::TOO_MANY_REQUESTS {
			let retry_after = response
				.headers()
				.get("retry-after")
				.and_then(|value| value.to_str().ok())
				.and_then(|raw| raw.parse::<u64>().ok());

			return Err(Error::RateLimited { url: url.to_string(), retry_after });
		}
		if !status.is_success() {
			let body = response.text().await.ok().map(|body| truncate(body, MAX_ERROR_BODY_BYTES));

			return Err(Error::UpstreamStatus { status, url: url.to_string(), body });
		}

		Ok(response)
	}
}

fn truncate(mut body: String, max: usize) -> String {
	if body.len() > max {
		let mut cut = max;

		while !body.is_char_boundary(cut) {
			cut -= 1;
		}

		body.truncate(cut);
	}

	body
}
