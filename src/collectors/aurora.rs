//! Aurora probability forecast, preserved as the provider's JSON.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
	keys,
};

const DEFAULT_URL: &str = "https://services.swpc.noaa.gov/json/ovation_aurora_latest.json";
const TTL_SECS: u64 = 600;
const PERIOD: Duration = Duration::from_secs(300);

/// Collector for the `kaos:aurora:latest` passthrough.
pub struct AuroraCollector {
	descriptor: Descriptor,
	url: String,
}
impl AuroraCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_url(DEFAULT_URL)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("aurora", keys::aurora(), TTL_SECS, PERIOD)?,
			url: url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for AuroraCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let payload: Value = ctx.fetcher.get_json(&self.url, &FetchOptions::default()).await?;
		let coordinates =
			payload.get("coordinates").and_then(Value::as_array).ok_or_else(|| Error::Parse {
				origin: self.url.clone(),
				reason: "Aurora payload has no coordinates array.".into(),
			})?;

		tracing::debug!(points = coordinates.len(), "aurora forecast fetched");
		ctx.store(&keys::aurora(), &payload, TTL_SECS).await
	}
}
