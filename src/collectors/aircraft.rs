//! Aircraft state vectors with OAuth2 client-credentials auth and compact
//! storage records.

// crates.io
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
// self
use crate::{
	_prelude::*,
	collector::{Collect, CollectContext, Descriptor},
	config::OpenSkyCredentials,
	fetch::FetchOptions,
	keys,
};

const DEFAULT_STATES_URL: &str = "https://opensky-network.org/api/states/all";
const DEFAULT_TOKEN_URL: &str =
	"https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token";
const TTL_SECS: u64 = 120;
const PERIOD: Duration = Duration::from_secs(60);
// tokens expire upstream after 30 minutes; the shorter cache guarantees a
// refresh margin
const TOKEN_CACHE: Duration = Duration::from_secs(25 * 60);
const RATE_LIMIT_HEADER: &str = "x-rate-limit-remaining";

/// Public aircraft record served by the read API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aircraft {
	/// ICAO 24-bit transponder address.
	pub icao24: String,
	/// Callsign, when broadcast.
	pub callsign: Option<String>,
	/// Country of registration.
	pub origin_country: String,
	/// Unix seconds of the last received message.
	pub last_contact: i64,
	/// Latitude in degrees.
	pub lat: f64,
	/// Longitude in degrees.
	pub lon: f64,
	/// Barometric altitude in meters.
	pub baro_altitude: Option<f64>,
	/// Whether the aircraft is on the ground.
	pub on_ground: bool,
	/// Ground speed in m/s.
	pub velocity: Option<f64>,
	/// True track in degrees clockwise from north.
	pub heading: Option<f64>,
	/// Vertical rate in m/s.
	pub vertical_rate: Option<f64>,
	/// Geometric altitude in meters.
	pub geo_altitude: Option<f64>,
	/// Transponder squawk code.
	pub squawk: Option<String>,
}

/// Storage-side compact record: optional fields omitted, coordinates rounded
/// to three decimals, altitudes/velocities/headings/vertical-rate to
/// integers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompactAircraft {
	/// ICAO 24-bit transponder address.
	pub icao24: String,
	/// Callsign, when broadcast.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub callsign: Option<String>,
	/// Country of registration.
	pub origin_country: String,
	/// Unix seconds of the last received message.
	pub last_contact: i64,
	/// Latitude rounded to three decimals.
	pub lat: f64,
	/// Longitude rounded to three decimals.
	pub lon: f64,
	/// Barometric altitude in whole meters.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub baro_altitude: Option<i64>,
	/// Ground flag, omitted when airborne.
	#[serde(skip_serializing_if = "std::ops::Not::not")]
	#[serde(default)]
	pub on_ground: bool,
	/// Ground speed in whole m/s.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub velocity: Option<i64>,
	/// True track in whole degrees.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub heading: Option<i64>,
	/// Vertical rate in whole m/s.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub vertical_rate: Option<i64>,
	/// Geometric altitude in whole meters.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub geo_altitude: Option<i64>,
	/// Transponder squawk code.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub squawk: Option<String>,
}

/// Compact a public record for storage.
pub fn compact(record: &Aircraft) -> CompactAircraft {
	CompactAircraft {
		icao24: record.icao24.clone(),
		callsign: record.callsign.clone(),
		origin_country: record.origin_country.clone(),
		last_contact: record.last_contact,
		lat: round3(record.lat),
		lon: round3(record.lon),
		baro_altitude: record.baro_altitude.map(|v| v.round() as i64),
		on_ground: record.on_ground,
		velocity: record.velocity.map(|v| v.round() as i64),
		heading: record.heading.map(|v| v.round() as i64),
		vertical_rate: record.vertical_rate.map(|v| v.round() as i64),
		geo_altitude: record.geo_altitude.map(|v| v.round() as i64),
		squawk: record.squawk.clone(),
	}
}

/// Expand a compact record back to the public shape.
pub fn expand(record: &CompactAircraft) -> Aircraft {
	Aircraft {
		icao24: record.icao24.clone(),
		callsign: record.callsign.clone(),
		origin_country: record.origin_country.clone(),
		last_contact: record.last_contact,
		lat: record.lat,
		lon: record.lon,
		baro_altitude: record.baro_altitude.map(|v| v as f64),
		on_ground: record.on_ground,
		velocity: record.velocity.map(|v| v as f64),
		heading: record.heading.map(|v| v as f64),
		vertical_rate: record.vertical_rate.map(|v| v as f64),
		geo_altitude: record.geo_altitude.map(|v| v as f64),
		squawk: record.squawk.clone(),
	}
}

fn round3(value: f64) -> f64 {
	(value * 1_000.0).round() / 1_000.0
}

#[derive(Debug, Deserialize)]
struct StatesResponse {
	#[serde(default)]
	states: Option<Vec<Vec<Value>>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
}

#[derive(Debug)]
struct CachedToken {
	token: String,
	fetched_at: Instant,
}

/// Collector for the `kaos:aircraft:global` feed.
pub struct AircraftCollector {
	descriptor: Descriptor,
	states_url: String,
	token_url: String,
	credentials: Option<OpenSkyCredentials>,
	token: Mutex<Option<CachedToken>>,
}
impl AircraftCollector {
	/// Collector against the default upstream.
	pub fn new(credentials: Option<OpenSkyCredentials>) -> Result<Self> {
		Self::with_urls(DEFAULT_STATES_URL, DEFAULT_TOKEN_URL, credentials)
	}

	/// Collector against custom upstream URLs (tests).
	pub fn with_urls(
		states_url: impl Into<String>,
		token_url: impl Into<String>,
		credentials: Option<OpenSkyCredentials>,
	) -> Result<Self> {
		Ok(Self {
			descriptor: Descriptor::interval("aircraft", keys::aircraft(), TTL_SECS, PERIOD)?,
			states_url: states_url.into(),
			token_url: token_url.into(),
			credentials,
			token: Mutex::new(None),
		})
	}

	/// Resolve a bearer token, reusing the cached one while it is fresh.
	async fn bearer_token(&self, ctx: &CollectContext) -> Result<Option<String>> {
		let Some(credentials) = &self.credentials else {
			return Ok(None);
		};
		let mut cached = self.token.lock().await;

		if let Some(token) = cached.as_ref()
			&& token.fetched_at.elapsed() < TOKEN_CACHE
		{
			return Ok(Some(token.token.clone()));
		}

		let options = FetchOptions::no_retry();
		let response = ctx
			.fetcher
			.send(&self.token_url, &options, || {
				ctx.fetcher.client().post(&self.token_url).form(&[
					("grant_type", "client_credentials"),
					("client_id", credentials.client_id.as_str()),
					("client_secret", credentials.client_secret.as_str()),
				])
			})
			.await?;
		let token: TokenResponse = response.json().await.map_err(|err| Error::Parse {
			origin: self.token_url.clone(),
			reason: format!("Token response decode failed: {err}."),
		})?;

		tracing::info!("aircraft: OAuth token refreshed");
		*cached = Some(CachedToken { token: token.access_token.clone(), fetched_at: Instant::now() });

		Ok(Some(token.access_token))
	}
}
#[async_trait::async_trait]
impl Collect for AircraftCollector {
	fn descriptor(&self) -> &Descriptor {
		&self.descriptor
	}

	async fn collect(&self, ctx: &CollectContext) -> Result<()> {
		let token = self.bearer_token(ctx).await?;
		let options = FetchOptions::default();
		let response = ctx
			.fetcher
			.send(&self.states_url, &options, || {
				let builder = ctx.fetcher.client().get(&self.states_url);

				match &token {
					Some(token) => builder.bearer_auth(token),
					None => builder,
				}
			})
			.await?;

		if let Some(remaining) = response
			.headers()
			.get(RATE_LIMIT_HEADER)
			.and_then(|value| value.to_str().ok())
		{
			tracing::debug!(remaining, "aircraft: rate limit credits");
		}

		let payload: StatesResponse = response.json().await.map_err(|err| Error::Parse {
			origin: self.states_url.clone(),
			reason: format!("JSON decode failed: {err}."),
		})?;
		let records: Vec<CompactAircraft> = payload
			.states
			.unwrap_or_default()
			.iter()
			.filter_map(|row| parse_state(row))
			.map(|record| compact(&record))
			.collect();

		tracing::debug!(aircraft = records.len(), "aircraft states fetched");
		ctx.store(&keys::aircraft(), &records, TTL_SECS).await
	}
}

/// Decode one upstream state vector row; rows without a position are
/// dropped.
fn parse_state(row: &[Value]) -> Option<Aircraft> {
	let lon = row.get(5)?.as_f64()?;
	let lat = row.get(6)?.as_f64()?;

	if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
		return None;
	}

	Some(Aircraft {
		icao24: row.first()?.as_str()?.to_string(),
		callsign: row
			.get(1)
			.and_then(Value::as_str)
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::to_string),
		origin_country: row.get(2).and_then(Value::as_str).unwrap_or("").to_string(),
		last_contact: row.get(4).and_then(Value::as_i64).unwrap_or(0),
		lat,
		lon,
		baro_altitude: row.get(7).and_then(Value::as_f64),
		on_ground: row.get(8).and_then(Value::as_bool).unwrap_or(false),
		velocity: row.get(9).and_then(Value::as_f64),
		heading: row.get(10).and_then(Value::as_f64),
		vertical_rate: row.get(11).and_then(Value::as_f64),
		geo_altitude: row.get(13).and_then(Value::as_f64),
		squawk: row.get(14).and_then(Value::as_str).map(str::to_string),
	})
}
