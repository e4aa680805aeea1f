//! Space weather snapshot: planetary K index, solar radio flux, and the
//! latest X-ray flare class.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
	keys,
};

const DEFAULT_BASE_URL: &str = "https://services.swpc.noaa.gov/json";
const TTL_SECS: u64 = 1_200;
const PERIOD: Duration = Duration::from_secs(600);

/// Scalar snapshot stored at `kaos:space-weather:current`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpaceWeather {
	/// Most recent planetary K index.
	pub kp_index: f64,
	/// 10.7 cm solar radio flux in solar flux units.
	pub solar_flux: Option<f64>,
	/// Class of the latest X-ray flare (e.g. `M1.4`).
	pub xray_class: Option<String>,
	/// Snapshot timestamp.
	pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct KpSample {
	kp_index: f64,
	time_tag: String,
}

#[derive(Debug, Deserialize)]
struct FluxSample {
	flux: f64,
}

#[derive(Debug, Deserialize)]
struct FlareSample {
	#[serde(default)]
	max_class: Option<String>,
}

/// Collector for the `kaos:space-weather:current` snapshot.
pub struct SpaceWeatherCollector {
	descriptor: Descriptor,
	base_url: String,
}
impl SpaceWeatherCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_base_url(DEFAULT_BASE_URL)
	}

	/// Collector against a custom upstream base (tests).
	pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval(
				"space-weather",
				keys::space_weather(),
				TTL_SECS,
				PERIOD,
			)?,
			base_url: base_url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for SpaceWeatherCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let options = FetchOptions::default();
		let kp_url = format!("{}/planetary_k_index_1m.json", self.base_url);
		let kp: Vec<KpSample> = ctx.fetcher.get_json(&kp_url, &options).await?;
		let latest_kp = kp.last().ok_or_else(|| Error::Parse {
			origin: kp_url.clone(),
			reason: "K index series is empty.".into(),
		})?;

		// flux and flare feeds are best-effort; the K index alone is a usable
		// snapshot
		let flux_url = format!("{}/f10cm_flux.json", self.base_url);
		let solar_flux = match ctx.fetcher.get_json::<Vec<FluxSample>>(&flux_url, &options).await {
			Ok(samples) => samples.last().map(|sample| sample.flux),
			Err(err) => {
				tracing::warn!(error = %err, "solar flux fetch failed; omitting");

				None
			},
		};
		let flare_url = format!("{}/goes/primary/xray-flares-latest.json", self.base_url);
		let xray_class = match ctx.fetcher.get_json::<Vec<FlareSample>>(&flare_url, &options).await {
			Ok(samples) => samples.into_iter().next().and_then(|sample| sample.max_class),
			Err(err) => {
				tracing::warn!(error = %err, "x-ray flare fetch failed; omitting");

				None
			},
		};
		let snapshot = SpaceWeather {
			kp_index: latest_kp.kp_index,
			solar_flux,
			xray_class,
			updated_at: Utc::now(),
		};

		tracing::debug!(kp = snapshot.kp_index, sample_time = %latest_kp.time_tag, "space weather fetched");
		ctx.store(&keys::space_weather(), &snapshot, TTL_SECS).await
	}
}
