//! Stable cache key layout shared by collectors and read handlers.
//!
//! Every key the engine writes or reads is built here so the producer and
//! consumer sides cannot drift apart.

/// Namespace prefix applied to every key.
pub const NAMESPACE: &str = "kaos";

/// Pattern matched by the health surface to enumerate collector statuses.
pub const META_STATUS_PATTERN: &str = "kaos:meta:*:status";

/// Seismic event feed for a time range (`day`, `week`, `month`).
pub fn seismic(range: &str) -> String {
	format!("{NAMESPACE}:seismic:{range}")
}

/// Rolling global lightning strike window.
pub fn lightning() -> String {
	format!("{NAMESPACE}:lightning:global")
}

/// Global aircraft state vectors (compact records).
pub fn aircraft() -> String {
	format!("{NAMESPACE}:aircraft:global")
}

/// Rolling APRS station window.
pub fn aprs() -> String {
	format!("{NAMESPACE}:aprs:global")
}

/// Current space weather snapshot.
pub fn space_weather() -> String {
	format!("{NAMESPACE}:space-weather:current")
}

/// Global total electron content grid.
pub fn tec() -> String {
	format!("{NAMESPACE}:tec:global")
}

/// Latest aurora probability GeoJSON.
pub fn aurora() -> String {
	format!("{NAMESPACE}:aurora:latest")
}

/// Active fire detections for a source and day window.
pub fn fires(source: &str, days: u8) -> String {
	format!("{NAMESPACE}:fires:{source}:{days}")
}

/// KiwiSDR receiver station list (compact records).
pub fn kiwisdr() -> String {
	format!("{NAMESPACE}:kiwisdr:stations")
}

/// GFS-derived layer grid (`temperature`, `humidity`, `precipitation`,
/// `cloud-cover`, `cape`, `fire-weather`, `uv-index`, `wind`).
pub fn gfs(layer: &str) -> String {
	format!("{NAMESPACE}:gfs:{layer}")
}

/// Global ocean surface current vector grid.
pub fn ocean_currents() -> String {
	format!("{NAMESPACE}:ocean-currents:global")
}

/// Global significant wave height grid.
pub fn waves() -> String {
	format!("{NAMESPACE}:waves:global")
}

/// Global sea surface temperature grid.
pub fn sst() -> String {
	format!("{NAMESPACE}:sst:global")
}

/// Interpolated global air quality grid.
pub fn air_quality() -> String {
	format!("{NAMESPACE}:air-quality:global")
}

/// IPMA meteorological warnings passthrough.
pub fn warnings_ipma() -> String {
	format!("{NAMESPACE}:warnings:ipma")
}

/// Civil-protection incident list.
pub fn prociv() -> String {
	format!("{NAMESPACE}:prociv:ocorrencias")
}

/// GDACS global disaster alert events.
pub fn gdacs() -> String {
	format!("{NAMESPACE}:gdacs:events")
}

/// Read-side cache-aside key for current weather at a rounded coordinate.
///
/// Coordinates are rounded to one decimal (~11 km) to raise the hit rate.
pub fn weather_current(lat: f64, lon: f64) -> String {
	format!("{NAMESPACE}:weather:current:{:.1}:{:.1}", lat, lon)
}

/// Read-side cache-aside key for a weather map tile.
pub fn weather_tile(layer: &str, z: u8, x: u32, y: u32) -> String {
	format!("{NAMESPACE}:weather:tile:{layer}:{z}:{x}:{y}")
}

/// Collector status metadata key (`ok`, `degraded`, `error`).
pub fn meta_status(name: &str) -> String {
	format!("{NAMESPACE}:meta:{name}:status")
}

/// Collector last-run metadata key (unix milliseconds).
pub fn meta_last_run(name: &str) -> String {
	format!("{NAMESPACE}:meta:{name}:last-run")
}

/// Collector consecutive-error-count metadata key.
pub fn meta_error_count(name: &str) -> String {
	format!("{NAMESPACE}:meta:{name}:error-count")
}

/// Extract the collector name from a `kaos:meta:<name>:status` key.
pub fn collector_of_status_key(key: &str) -> Option<&str> {
	key.strip_prefix("kaos:meta:")?.strip_suffix(":status")
}
