//! IPMA meteorological warnings, preserved as the provider's JSON.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
	keys,
};

const DEFAULT_URL: &str =
	"https://api.ipma.pt/open-data/forecast/warnings/warnings_www.json";
const TTL_SECS: u64 = 2_700;
const PERIOD: Duration = Duration::from_secs(1_200);

/// Collector for the `kaos:warnings:ipma` passthrough.
pub struct WarningsCollector {
	descriptor: Descriptor,
	url: String,
}
impl WarningsCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_url(DEFAULT_URL)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("warnings", keys::warnings_ipma(), TTL_SECS, PERIOD)?,
			url: url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for WarningsCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let payload: Value = ctx.fetcher.get_json(&self.url, &FetchOptions::default()).await?;
		let warnings = payload.as_array().ok_or_else(|| Error::Parse {
			origin: self.url.clone(),
			reason: "Warnings payload is not an array.".into(),
		})?;

		tracing::debug!(warnings = warnings.len(), "ipma warnings fetched");
		ctx.store(&keys::warnings_ipma(), &payload, TTL_SECS).await
	}
}
