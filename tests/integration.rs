//! Integration test harness; cases live under `tests/integration/`.

#[path = "integration/support.rs"]
mod support;

#[path = "integration/api_read.rs"]
mod api_read;
#[path = "integration/cache_rest.rs"]
mod cache_rest;
#[path = "integration/collector_runs.rs"]
mod collector_runs;
#[path = "integration/fetch_retry.rs"]
mod fetch_retry;
#[path = "integration/health_surface.rs"]
mod health_surface;
