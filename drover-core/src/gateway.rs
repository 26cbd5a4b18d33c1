//! The routing gateway seam.
//!
//! A gateway is an abstract source of pairwise `(distance, duration)` data
//! and route geometry, backed by a road-network service or by the haversine
//! fallback. Every failure mode is a typed variant so the matrix builder can
//! orchestrate retries and fallbacks explicitly rather than through an
//! exception chain.

use geo::Coord;
use thiserror::Error;

/// Departure time of day for time-dependent routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartureTime {
    /// Hour, 0-23.
    pub hour: u8,
    /// Minute, 0-59.
    pub minute: u8,
}

/// Error returned by [`DepartureTime::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("departure time must be HH:MM, got {0:?}")]
pub struct DepartureTimeError(pub String);

impl DepartureTime {
    /// Parse an `"HH:MM"` clock string.
    pub fn parse(raw: &str) -> Result<Self, DepartureTimeError> {
        let err = || DepartureTimeError(raw.to_owned());
        let (h, m) = raw.split_once(':').ok_or_else(err)?;
        let hour: u8 = h.parse().map_err(|_| err())?;
        let minute: u8 = m.parse().map_err(|_| err())?;
        if hour > 23 || minute > 59 {
            return Err(err());
        }
        Ok(Self { hour, minute })
    }
}

impl std::fmt::Display for DepartureTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Raw matrix data from one provider call.
///
/// Grids are `sources × destinations`; a `None` cell means the provider
/// could not route that pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixResponse {
    /// Distances in metres.
    pub distances_m: Vec<Vec<Option<i32>>>,
    /// Durations in seconds.
    pub durations_s: Vec<Vec<Option<i32>>>,
}

impl MatrixResponse {
    /// Count cells missing from either grid.
    #[must_use]
    pub fn missing_cells(&self) -> usize {
        let missing = |grid: &Vec<Vec<Option<i32>>>| {
            grid.iter()
                .flat_map(|row| row.iter())
                .filter(|c| c.is_none())
                .count()
        };
        missing(&self.distances_m).max(missing(&self.durations_s))
    }

    /// True when every cell of both grids is present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_cells() == 0
    }
}

/// Distance and duration of one point-to-point leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLeg {
    /// Distance in metres.
    pub distance_m: i32,
    /// Duration in seconds.
    pub duration_s: i32,
}

/// Decoded geometry of a route through ordered waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteGeometry {
    /// Polyline points (`x` = longitude, `y` = latitude).
    pub points: Vec<Coord<f64>>,
    /// Total distance in metres.
    pub distance_m: i32,
    /// Total duration in seconds.
    pub duration_s: i32,
}

/// Typed failure modes of a routing gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The provider returned a usable but incomplete matrix. The partial
    /// response rides along so the caller can decide fill policy.
    #[error("provider returned a partial matrix with {missing} missing cells")]
    PartialMatrix {
        /// The incomplete grids.
        response: MatrixResponse,
        /// Cells absent from the response.
        missing: usize,
    },
    /// The request exceeds the provider's URL or payload limit.
    #[error("request with {locations} locations exceeds the provider limit")]
    RequestTooLarge {
        /// Locations in the rejected request.
        locations: usize,
    },
    /// Timeout, connection failure, or 5xx from the provider.
    #[error("routing provider unavailable: {reason}")]
    ProviderUnavailable {
        /// Human-readable cause.
        reason: String,
    },
    /// The provider answered with something the client cannot interpret.
    #[error("malformed provider response: {message}")]
    InvalidResponse {
        /// Human-readable cause.
        message: String,
    },
    /// No route exists between the requested coordinates.
    #[error("no route found between the requested coordinates")]
    NoRoute,
    /// A matrix call needs at least two locations.
    #[error("matrix request needs at least two locations, got {got}")]
    TooFewLocations {
        /// Locations supplied.
        got: usize,
    },
}

/// Abstract source of road-network distances, durations, and geometry.
///
/// Implementations must be shareable across the matrix builder's worker
/// pool, hence `Send + Sync`.
pub trait RoutingGateway: Send + Sync {
    /// Stable identity used for cache keying; includes the costing profile.
    fn provider_id(&self) -> &str;

    /// Fetch a `sources × destinations` matrix over `locations`.
    ///
    /// `sources` and `destinations` index into `locations`; empty slices
    /// mean "all locations". Only time-dependent providers honour
    /// `departure`. Missing upstream cells surface as
    /// [`GatewayError::PartialMatrix`].
    fn matrix(
        &self,
        locations: &[Coord<f64>],
        sources: &[usize],
        destinations: &[usize],
        departure: Option<DepartureTime>,
    ) -> Result<MatrixResponse, GatewayError>;

    /// Fetch a single point-to-point leg.
    fn route(&self, from: Coord<f64>, to: Coord<f64>) -> Result<RouteLeg, GatewayError>;

    /// Fetch the ordered polyline through `waypoints`.
    fn geometry(&self, waypoints: &[Coord<f64>]) -> Result<RouteGeometry, GatewayError>;
}
