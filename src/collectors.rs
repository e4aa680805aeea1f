//! Hand-written collectors, one module per observation feed, plus the
//! startup registration that wires them into the scheduler.

pub mod air_quality;
pub mod aircraft;
pub mod aprs;
pub mod aurora;
pub mod fires;
pub mod gdacs;
pub mod gfs;
pub mod kiwisdr;
pub mod lightning;
pub mod ocean;
pub mod prociv;
pub mod seismic;
pub mod space_weather;
pub mod tec;
pub mod warnings;

// self
use crate::{
	_prelude::*,
	config::Config,
	scheduler::Scheduler,
	source::{self, GenericCollector},
};

fn enabled(config: &Config, name: &str) -> bool {
	if config.is_disabled(name) {
		tracing::info!(collector = name, "disabled by configuration");

		return false;
	}

	true
}

/// Register every enabled collector: hand-written feeds first, then the
/// JSON-declared generic sources.
///
/// Feeds that need credentials are skipped with a warning when the
/// credential is absent; `KAOS_DISABLE_<NAME>` flags skip registration
/// outright.
pub fn register_all(scheduler: &mut Scheduler, config: &Config) -> Result<()> {
	if enabled(config, "seismic") {
		scheduler.register(Box::new(seismic::SeismicCollector::new()?));
	}
	if enabled(config, "space-weather") {
		scheduler.register(Box::new(space_weather::SpaceWeatherCollector::new()?));
	}
	if enabled(config, "tec") {
		scheduler.register(Box::new(tec::TecCollector::new()?));
	}
	if enabled(config, "aurora") {
		scheduler.register(Box::new(aurora::AuroraCollector::new()?));
	}
	if enabled(config, "gfs") {
		scheduler.register(Box::new(gfs::GfsCollector::new()?));
	}
	if enabled(config, "ocean-currents") {
		scheduler.register(Box::new(ocean::OceanCurrentsCollector::new()?));
	}
	if enabled(config, "waves") {
		scheduler.register(Box::new(ocean::WavesCollector::new()?));
	}
	if enabled(config, "sst") {
		scheduler.register(Box::new(ocean::SstCollector::new()?));
	}
	if enabled(config, "kiwisdr") {
		scheduler.register(Box::new(kiwisdr::KiwisdrCollector::new()?));
	}
	if enabled(config, "warnings") {
		scheduler.register(Box::new(warnings::WarningsCollector::new()?));
	}
	if enabled(config, "prociv") {
		scheduler.register(Box::new(prociv::ProcivCollector::new()?));
	}
	if enabled(config, "gdacs") {
		scheduler.register(Box::new(gdacs::GdacsCollector::new()?));
	}
	if enabled(config, "aircraft") {
		scheduler.register(Box::new(aircraft::AircraftCollector::new(config.opensky.clone())?));
	}
	if enabled(config, "fires") {
		match &config.firms_api_key {
			Some(api_key) => scheduler.register(Box::new(fires::FiresCollector::new(api_key)?)),
			None => tracing::warn!("fires: no API key configured; collector not registered"),
		}
	}
	if enabled(config, "air-quality") {
		match &config.airq_api_key {
			Some(api_key) =>
				scheduler.register(Box::new(air_quality::AirQualityCollector::new(api_key)?)),
			None => tracing::warn!("air-quality: no API key configured; collector not registered"),
		}
	}
	if enabled(config, "lightning") {
		scheduler.register_stream(Arc::new(lightning::LightningCollector::new()));
	}
	if enabled(config, "aprs") {
		scheduler.register_stream(Arc::new(aprs::AprsCollector::new()));
	}

	for declaration in source::load_dir(&config.sources_dir)? {
		if !enabled(config, &declaration.name) {
			continue;
		}

		scheduler.register(Box::new(GenericCollector::new(declaration)?));
	}

	Ok(())
}
