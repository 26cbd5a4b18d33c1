//! Test doubles shared by the workspace's test suites.
//!
//! Deterministic gateways let matrix and pipeline tests run without any
//! routing server: a fixed gateway replays caller-supplied grids, and the
//! counting wrapper proves cache hits issue no provider calls.

use std::sync::atomic::{AtomicUsize, Ordering};

use geo::Coord;

use crate::gateway::{
    DepartureTime, GatewayError, MatrixResponse, RouteGeometry, RouteLeg, RoutingGateway,
};
use crate::geometry::{haversine_m, road_estimate_m, travel_seconds};

/// A gateway that computes every cell from haversine geometry.
///
/// Complete, deterministic, and offline; useful wherever a test needs a
/// plausible matrix without caring about its exact values.
#[derive(Debug, Clone)]
pub struct FixedGeometryGateway {
    /// Average speed used to derive durations.
    pub speed_kmh: f64,
}

impl Default for FixedGeometryGateway {
    fn default() -> Self {
        Self { speed_kmh: 40.0 }
    }
}

impl FixedGeometryGateway {
    fn leg(&self, from: Coord<f64>, to: Coord<f64>) -> RouteLeg {
        let distance = road_estimate_m(from, to);
        RouteLeg {
            distance_m: distance.round() as i32,
            duration_s: travel_seconds(distance, self.speed_kmh).round() as i32,
        }
    }
}

impl RoutingGateway for FixedGeometryGateway {
    fn provider_id(&self) -> &str {
        "fixed-geometry"
    }

    fn matrix(
        &self,
        locations: &[Coord<f64>],
        sources: &[usize],
        destinations: &[usize],
        _departure: Option<DepartureTime>,
    ) -> Result<MatrixResponse, GatewayError> {
        if locations.len() < 2 {
            return Err(GatewayError::TooFewLocations {
                got: locations.len(),
            });
        }
        let all: Vec<usize> = (0..locations.len()).collect();
        let sources: &[usize] = if sources.is_empty() { &all } else { sources };
        let destinations: &[usize] = if destinations.is_empty() {
            &all
        } else {
            destinations
        };

        let mut distances = Vec::with_capacity(sources.len());
        let mut durations = Vec::with_capacity(sources.len());
        for &s in sources {
            let mut drow = Vec::with_capacity(destinations.len());
            let mut trow = Vec::with_capacity(destinations.len());
            for &d in destinations {
                let leg = self.leg(locations[s], locations[d]);
                drow.push(Some(leg.distance_m));
                trow.push(Some(leg.duration_s));
            }
            distances.push(drow);
            durations.push(trow);
        }
        Ok(MatrixResponse {
            distances_m: distances,
            durations_s: durations,
        })
    }

    fn route(&self, from: Coord<f64>, to: Coord<f64>) -> Result<RouteLeg, GatewayError> {
        Ok(self.leg(from, to))
    }

    fn geometry(&self, waypoints: &[Coord<f64>]) -> Result<RouteGeometry, GatewayError> {
        if waypoints.len() < 2 {
            return Err(GatewayError::NoRoute);
        }
        let mut distance = 0.0;
        for pair in waypoints.windows(2) {
            distance += haversine_m(pair[0], pair[1]);
        }
        Ok(RouteGeometry {
            points: waypoints.to_vec(),
            distance_m: distance.round() as i32,
            duration_s: travel_seconds(distance, self.speed_kmh).round() as i32,
        })
    }
}

/// Wraps a gateway and counts matrix and route calls.
pub struct CountingGateway<G> {
    inner: G,
    matrix_calls: AtomicUsize,
    route_calls: AtomicUsize,
}

impl<G: RoutingGateway> CountingGateway<G> {
    /// Wrap `inner`.
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            matrix_calls: AtomicUsize::new(0),
            route_calls: AtomicUsize::new(0),
        }
    }

    /// Matrix calls observed so far.
    pub fn matrix_calls(&self) -> usize {
        self.matrix_calls.load(Ordering::SeqCst)
    }

    /// Route calls observed so far.
    pub fn route_calls(&self) -> usize {
        self.route_calls.load(Ordering::SeqCst)
    }
}

impl<G: RoutingGateway> RoutingGateway for CountingGateway<G> {
    fn provider_id(&self) -> &str {
        self.inner.provider_id()
    }

    fn matrix(
        &self,
        locations: &[Coord<f64>],
        sources: &[usize],
        destinations: &[usize],
        departure: Option<DepartureTime>,
    ) -> Result<MatrixResponse, GatewayError> {
        self.matrix_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.matrix(locations, sources, destinations, departure)
    }

    fn route(&self, from: Coord<f64>, to: Coord<f64>) -> Result<RouteLeg, GatewayError> {
        self.route_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.route(from, to)
    }

    fn geometry(&self, waypoints: &[Coord<f64>]) -> Result<RouteGeometry, GatewayError> {
        self.inner.geometry(waypoints)
    }
}

/// A gateway that always reports the provider as unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableGateway;

impl RoutingGateway for UnavailableGateway {
    fn provider_id(&self) -> &str {
        "unavailable"
    }

    fn matrix(
        &self,
        _locations: &[Coord<f64>],
        _sources: &[usize],
        _destinations: &[usize],
        _departure: Option<DepartureTime>,
    ) -> Result<MatrixResponse, GatewayError> {
        Err(GatewayError::ProviderUnavailable {
            reason: "test gateway is always down".to_owned(),
        })
    }

    fn route(&self, _from: Coord<f64>, _to: Coord<f64>) -> Result<RouteLeg, GatewayError> {
        Err(GatewayError::ProviderUnavailable {
            reason: "test gateway is always down".to_owned(),
        })
    }

    fn geometry(&self, _waypoints: &[Coord<f64>]) -> Result<RouteGeometry, GatewayError> {
        Err(GatewayError::ProviderUnavailable {
            reason: "test gateway is always down".to_owned(),
        })
    }
}
