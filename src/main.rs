//! Service entry point: wire the cache, collectors, scheduler, and HTTP
//! surfaces, then run until a shutdown signal.

// crates.io
use tokio::net::TcpListener;
// self
use kaos_worker::{
	CacheClient, Fetcher, Result, Scheduler,
	api::{self, ApiState},
	collector::CollectContext,
	collectors,
	config::{self, Config},
	health::{self, HealthState},
};

#[tokio::main]
async fn main() -> Result<()> {
	config::init_tracing();

	let config = Config::from_env()?;
	let cache = CacheClient::connect(&config.cache).await;
	let fetcher = Fetcher::new()?;
	let ctx = CollectContext { cache: cache.clone(), fetcher: fetcher.clone() };
	let mut scheduler = Scheduler::new(ctx);

	collectors::register_all(&mut scheduler, &config)?;
	tracing::info!(collectors = scheduler.len(), "collector registration complete");

	let scheduler = std::sync::Arc::new(scheduler);

	scheduler.start();

	let health_router = health::router(HealthState {
		cache: cache.clone(),
		scheduler: scheduler.clone(),
		started_at: tokio::time::Instant::now(),
	});
	let health_listener = TcpListener::bind(("0.0.0.0", config.health_port)).await?;

	tracing::info!(port = config.health_port, "health surface listening");
	tokio::spawn(async move {
		if let Err(err) = axum::serve(health_listener, health_router).await {
			tracing::error!(error = %err, "health surface exited");
		}
	});

	let api_router = api::router(ApiState::new(
		cache.clone(),
		fetcher.clone(),
		config.owm_api_key.clone(),
	));
	let api_listener = TcpListener::bind(("0.0.0.0", config.api_port)).await?;

	tracing::info!(port = config.api_port, "read api listening");
	tokio::spawn(async move {
		if let Err(err) = axum::serve(api_listener, api_router).await {
			tracing::error!(error = %err, "read api exited");
		}
	});

	tokio::signal::ctrl_c().await?;
	tracing::info!("shutdown signal received");
	scheduler.stop();

	Ok(())
}
