//! Background geophysical and situational data ingestion service.
//!
//! The collection engine continuously pulls heterogeneous observation feeds
//! (seismic events, lightning strikes, aircraft positions, atmospheric and
//! oceanographic grids, amateur radio stations, space weather,
//! civil-protection incidents, global disaster alerts), transforms each feed
//! into a compact frontend-ready shape, and publishes it into a
//! Redis-compatible cache under stable keys with bounded freshness. A read
//! API serves those keys over HTTP, and a health surface reports per-feed
//! status.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod cache;
pub mod collector;
pub mod collectors;
pub mod config;
pub mod fetch;
pub mod grid;
pub mod health;
pub mod keys;
pub mod scheduler;
pub mod source;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}
pub use crate::{
	cache::client::CacheClient,
	collector::{Collect, CollectorHandle, Descriptor},
	error::{Error, Result},
	fetch::Fetcher,
	scheduler::Scheduler,
};
