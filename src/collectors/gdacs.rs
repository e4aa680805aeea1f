//! GDACS global disaster alert events.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
	keys,
};

const DEFAULT_URL: &str = "https://www.gdacs.org/gdacsapi/api/events/geteventlist/MAP";
const TTL_SECS: u64 = 600;
const PERIOD: Duration = Duration::from_secs(300);

/// Collector for the `kaos:gdacs:events` feed.
pub struct GdacsCollector {
	descriptor: Descriptor,
	url: String,
}
impl GdacsCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_url(DEFAULT_URL)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("gdacs", keys::gdacs(), TTL_SECS, PERIOD)?,
			url: url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for GdacsCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let payload: Value = ctx.fetcher.get_json(&self.url, &FetchOptions::default()).await?;
		let features = payload
			.get("features")
			.and_then(Value::as_array)
			.ok_or_else(|| Error::Parse {
				origin: self.url.clone(),
				reason: "GDACS payload has no features array.".into(),
			})?;

		tracing::debug!(events = features.len(), "gdacs events fetched");
		ctx.store(&keys::gdacs(), &payload, TTL_SECS).await
	}
}
