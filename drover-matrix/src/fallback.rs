//! Haversine fallback gateway.
//!
//! Always available and always complete: distances come from great-circle
//! geometry scaled by the road-shape factor, durations from a fixed average
//! speed. Less accurate than a road network, which is why it sits last in
//! the fallback chain.

use geo::Coord;

use drover_core::gateway::{
    DepartureTime, GatewayError, MatrixResponse, RouteGeometry, RouteLeg, RoutingGateway,
};
use drover_core::geometry::{road_estimate_m, travel_seconds, DEFAULT_AVERAGE_SPEED_KMH};

/// Offline gateway estimating every pair from geometry.
#[derive(Debug, Clone)]
pub struct HaversineGateway {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineGateway {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_AVERAGE_SPEED_KMH,
        }
    }
}

impl HaversineGateway {
    /// Gateway with an explicit average speed.
    #[must_use]
    pub const fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Estimate one leg.
    #[must_use]
    pub fn leg(&self, from: Coord<f64>, to: Coord<f64>) -> RouteLeg {
        let distance = road_estimate_m(from, to);
        RouteLeg {
            distance_m: distance.round() as i32,
            duration_s: travel_seconds(distance, self.speed_kmh).round() as i32,
        }
    }
}

impl RoutingGateway for HaversineGateway {
    fn provider_id(&self) -> &str {
        "haversine"
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
                if s == d {
                    drow.push(Some(0));
                    trow.push(Some(0));
                } else {
                    let leg = self.leg(locations[s], locations[d]);
                    drow.push(Some(leg.distance_m));
                    trow.push(Some(leg.duration_s));
                }
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
            distance += road_estimate_m(pair[0], pair[1]);
        }
        Ok(RouteGeometry {
            points: waypoints.to_vec(),
            distance_m: distance.round() as i32,
            duration_s: travel_seconds(distance, self.speed_kmh).round() as i32,
        })
    }
}
