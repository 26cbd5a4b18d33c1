//! Road-network data acquisition for the drover planner.
//!
//! Two HTTP gateways (a static OSRM-protocol provider and a time-dependent
//! Valhalla-protocol provider), a haversine fallback, the tiered matrix
//! builder that turns a location list into a complete [`TravelMatrix`]
//! with bounded parallel fetching, and a TTL disk cache.
//!
//! [`TravelMatrix`]: drover_core::TravelMatrix

#![forbid(unsafe_code)]

mod builder;
mod cache;
mod fallback;
mod osrm;
mod polyline;
mod valhalla;

pub use builder::{CancellationFlag, MatrixBuildError, MatrixBuilder, MatrixBuilderConfig};
pub use cache::{CacheError, CacheKey, MatrixCache, CACHE_SCHEMA_VERSION};
pub use fallback::HaversineGateway;
pub use osrm::{OsrmConfig, OsrmGateway};
pub use valhalla::{ValhallaConfig, ValhallaGateway};

use thiserror::Error;

/// Error building an HTTP gateway client.
#[derive(Debug, Error)]
#[error("failed to build the HTTP client: {0}")]
pub struct GatewayBuildError(#[from] reqwest::Error);
