//! Civil-protection incident feed (ANEPC ocorrências).

// crates.io
use serde::{Deserialize, Serialize};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	fetch::FetchOptions,
	keys,
};

const DEFAULT_URL: &str =
	"https://prociv-agserver.geomai.mai.gov.pt/arcgis/rest/services/Ocorrencias_Base/FeatureServer/0/query?where=1%3D1&outFields=*&f=json";
const TTL_SECS: u64 = 600;
const PERIOD: Duration = Duration::from_secs(300);

/// One active incident.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Incident {
	/// Upstream incident identifier.
	pub id: String,
	/// Latitude in degrees.
	pub lat: f64,
	/// Longitude in degrees.
	pub lon: f64,
	/// Nature of the incident (upstream classification string).
	pub nature: Option<String>,
	/// Operational state.
	pub state: Option<String>,
	/// Ground personnel committed.
	pub operatives: Option<u32>,
	/// Ground vehicles committed.
	pub vehicles: Option<u32>,
	/// Aerial means committed.
	pub aircraft: Option<u32>,
	/// Unix milliseconds when the incident started.
	pub started_at: Option<i64>,
}

/// Collector for the `kaos:prociv:ocorrencias` feed.
pub struct ProcivCollector {
	descriptor: Descriptor,
	url: String,
}
impl ProcivCollector {
	/// Collector against the default upstream.
	pub fn new() -> Result<Self> {
		Self::with_url(DEFAULT_URL)
	}

	/// Collector against a custom upstream URL (tests).
	pub fn with_url(url: impl Into<String>) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("prociv", keys::prociv(), TTL_SECS, PERIOD)?,
			url: url.into(),
		})
	}
}
#[async_trait::async_trait]
impl Collect for ProcivCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let payload: Value = ctx.fetcher.get_json(&self.url, &FetchOptions::default()).await?;
		let incidents = parse_incidents(&payload).map_err(|reason| Error::Parse {
			origin: self.url.clone(),
			reason,
		})?;

		tracing::debug!(incidents = incidents.len(), "prociv incidents fetched");
		ctx.store(&keys::prociv(), &incidents, TTL_SECS).await
	}
}

/// Flatten the upstream feature-service response into incident records,
/// dropping features without usable coordinates.
fn parse_incidents(payload: &Value) -> std::result::Result<Vec<Incident>, String> {
	let features = payload
		.get("features")
		.and_then(Value::as_array)
		.ok_or_else(|| "response has no features array".to_string())?;
	let incidents = features
		.iter()
		.filter_map(|feature| {
			let attributes = feature.get("attributes")?;
			let geometry = feature.get("geometry")?;
			let lat = geometry.get("y")?.as_f64()?;
			let lon = geometry.get("x")?.as_f64()?;

			if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
				tracing::warn!(lat, lon, "skipping incident outside coordinate bounds");

				return None;
			}

			Some(Incident {
				id: attributes
					.get("OBJECTID")
					.map(|id| id.to_string())
					.unwrap_or_else(|| "unknown".into()),
				lat,
				lon,
				nature: string_of(attributes, "Natureza"),
				state: string_of(attributes, "EstadoOcorrencia"),
				operatives: u32_of(attributes, "Operacionais"),
				vehicles: u32_of(attributes, "NumeroMeiosTerrestresEnvolvidos"),
				aircraft: u32_of(attributes, "NumeroMeiosAereosEnvolvidos"),
				started_at: attributes.get("DataOcorrencia").and_then(Value::as_i64),
			})
		})
		.collect();

	Ok(incidents)
}

fn string_of(attributes: &Value, field: &str) -> Option<String> {
	attributes.get(field).and_then(Value::as_str).map(str::to_string)
}

fn u32_of(attributes: &Value, field: &str) -> Option<u32> {
	attributes.get(field).and_then(Value::as_u64).map(|n| n as u32)
}
