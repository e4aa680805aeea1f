//! Seismic event feed: GeoJSON passthrough for three time ranges.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
	keys,
};

const DEFAULT_BASE_URL: &str = "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary";
/// Time ranges the collector maintains, one payload key each.
pub const RANGES: [&str; 3] = ["day", "week", "month"];
const TTL_SECS: u64 = 180;
const PERIOD: Duration = Duration::from_secs(120);

/// Multi-key collector for the `kaos:seismic:{day|week|month}` feeds.
pub struct SeismicCollector {
	descriptor: Descriptor,
	base_url: String,
}
impl SeismicCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_base_url(DEFAULT_BASE_URL)
	}

	/// Collector against a custom upstream base (tests).
	pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("seismic", keys::seismic("{range}"), TTL_SECS, PERIOD)?,
			base_url: base_url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for SeismicCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let options = FetchOptions::default();

		for range in RANGES {
			let url = format!("{}/all_{range}.geojson", self.base_url);
			let feed: Value = ctx.fetcher.get_json(&url, &options).await?;
			let features = feed
				.get("features")
				.and_then(Value::as_array)
				.ok_or_else(|| Error::Parse {
					origin: url.clone(),
					reason: "GeoJSON payload has no features array.".into(),
				})?;

			tracing::debug!(range, events = features.len(), "seismic feed fetched");
			ctx.store(&keys::seismic(range), &feed, TTL_SECS).await?;
		}

		Ok(())
	}
}
