//! The solver contract: problem, solution, and the `Solver` trait.

use geo::Coord;
use thiserror::Error;

use crate::customer::Customer;
use crate::geometry::haversine_km;
use crate::matrix::TravelMatrix;
use crate::vehicle::{DepotSet, VehicleClass, VehicleUnit};

/// Demand volumes are scaled to integer units at this factor.
pub const DEMAND_SCALE: f64 = 100.0;

/// Scale a demand volume to integer units.
#[must_use]
pub fn scale_demand(volume: f64) -> i64 {
    (volume * DEMAND_SCALE).round() as i64
}

/// The preferential-vehicle disk around the city centre.
#[derive(Debug, Clone, PartialEq)]
pub struct CenterZone {
    /// Zone centre.
    pub center: Coord<f64>,
    /// Zone radius in kilometres.
    pub radius_km: f64,
}

impl CenterZone {
    /// True when the location lies inside the zone.
    #[must_use]
    pub fn contains(&self, location: Coord<f64>) -> bool {
        haversine_km(location, self.center) <= self.radius_km
    }
}

/// Arc-cost shaping for the centre zone.
///
/// Costs apply when the destination of an arc is a customer. The penalties
/// are large enough to steer the search away without making the assignment
/// impossible when nothing else is feasible.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcCostPolicy {
    /// Whether centre-zone shaping is active at all.
    pub enabled: bool,
    /// Multiplier on arcs a centre-class vehicle drives to an in-zone customer.
    pub center_discount: f64,
    /// Added metres when a centre-class vehicle leaves the zone.
    pub out_of_zone_penalty: i64,
    /// Added metres when any other class enters the zone.
    pub in_zone_penalty: i64,
}

impl Default for ArcCostPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            center_discount: 0.5,
            out_of_zone_penalty: 40_000,
            in_zone_penalty: 40_000,
        }
    }
}

/// How the solver prices omitting a customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropPolicy {
    /// Flat penalty per dropped customer.
    Fixed {
        /// Penalty in matrix units.
        penalty: i64,
    },
    /// Demand-weighted prize: dropping costs `base + scaled_demand × k`.
    Prize {
        /// Base penalty in matrix units.
        base: i64,
        /// Cost per scaled demand unit.
        demand_coefficient: i64,
    },
}

impl DropPolicy {
    /// Cost of dropping a customer with the given scaled demand.
    #[must_use]
    pub fn cost(&self, scaled_demand: i64) -> i64 {
        match *self {
            Self::Fixed { penalty } => penalty,
            Self::Prize {
                base,
                demand_coefficient,
            } => base + scaled_demand * demand_coefficient,
        }
    }
}

/// Everything a solver engine needs for one run.
///
/// Node layout: depots occupy matrix indices `0..depots.len()`, customer `i`
/// sits at `depots.len() + i`. The matrix must already carry any traffic
/// adjustment; engines only read it.
#[derive(Debug)]
pub struct RoutingProblem<'a> {
    /// Serviceable customers in matrix order.
    pub customers: &'a [Customer],
    /// Expanded vehicle units.
    pub units: &'a [VehicleUnit],
    /// Depot set the matrix was built over.
    pub depots: &'a DepotSet,
    /// Traffic-adjusted travel matrix over depots then customers.
    pub matrix: &'a TravelMatrix,
    /// Optional preferential zone.
    pub center_zone: Option<CenterZone>,
    /// Arc-cost shaping parameters.
    pub cost_policy: ArcCostPolicy,
    /// Dropping policy; `None` forbids dropping.
    pub drop_policy: Option<DropPolicy>,
}

impl RoutingProblem<'_> {
    /// Matrix node index of customer `i`.
    #[must_use]
    pub fn customer_node(&self, i: usize) -> usize {
        self.depots.len() + i
    }

    /// Per-customer centre-zone membership.
    #[must_use]
    pub fn customers_in_zone(&self) -> Vec<bool> {
        match &self.center_zone {
            Some(zone) => self
                .customers
                .iter()
                .map(|c| zone.contains(c.location))
                .collect(),
            None => vec![false; self.customers.len()],
        }
    }

    /// Scaled integer demands in customer order.
    #[must_use]
    pub fn scaled_demands(&self) -> Vec<i64> {
        self.customers.iter().map(|c| scale_demand(c.demand)).collect()
    }

    /// Check the matrix covers every depot and customer.
    pub fn validate(&self) -> Result<(), SolveError> {
        let expected = self.depots.len() + self.customers.len();
        if self.matrix.len() != expected {
            return Err(SolveError::InvalidProblem(format!(
                "matrix covers {} locations but the problem has {expected}",
                self.matrix.len(),
            )));
        }
        Ok(())
    }
}

/// One vehicle's ordered visit plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Index into the problem's vehicle units.
    pub vehicle: usize,
    /// Class of the assigned unit.
    pub class: VehicleClass,
    /// Customer ids in visit order.
    pub customers: Vec<String>,
    /// Start (and end) depot node index.
    pub start_depot: usize,
    /// Total road distance in metres.
    pub total_distance_m: i64,
    /// Total duration in seconds: adjusted travel plus service.
    pub total_duration_s: i64,
    /// Total demand volume on board.
    pub total_demand: f64,
    /// Route start as minutes from midnight.
    pub start_minute: u32,
    /// Whether every hard limit holds.
    pub feasible: bool,
}

impl Route {
    /// Number of customer stops.
    #[must_use]
    pub fn stops(&self) -> usize {
        self.customers.len()
    }

    /// Check the route against its unit's hard limits.
    #[must_use]
    pub fn within_limits(&self, unit: &VehicleUnit) -> bool {
        if self.total_demand > f64::from(unit.capacity) + 1e-9 {
            return false;
        }
        if let Some(max) = unit.max_stops {
            if self.customers.len() > max as usize {
                return false;
            }
        }
        if let Some(max) = unit.max_distance_m {
            if self.total_distance_m > max {
                return false;
            }
        }
        self.total_duration_s <= unit.max_time_seconds
    }
}

/// A complete solver outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Non-empty routes, ordered by vehicle unit.
    pub routes: Vec<Route>,
    /// Ids of customers no route serves.
    pub dropped: Vec<String>,
    /// Objective the engine minimised: arc cost plus dropping penalties, in
    /// matrix units. Never a reportable distance.
    pub fitness: f64,
    /// Set when the solution came from the greedy fallback or a degraded
    /// matrix.
    pub degraded: bool,
}

impl Solution {
    /// A solution with no routes and nothing dropped.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            routes: Vec::new(),
            dropped: Vec::new(),
            fitness: 0.0,
            degraded: false,
        }
    }

    /// Sum of route distances in metres.
    #[must_use]
    pub fn total_distance_m(&self) -> i64 {
        self.routes.iter().map(|r| r.total_distance_m).sum()
    }

    /// Sum of route durations in seconds.
    #[must_use]
    pub fn total_duration_s(&self) -> i64 {
        self.routes.iter().map(|r| r.total_duration_s).sum()
    }

    /// Total demand volume served.
    #[must_use]
    pub fn total_served_volume(&self) -> f64 {
        self.routes.iter().map(|r| r.total_demand).sum()
    }

    /// Number of vehicles with at least one customer.
    #[must_use]
    pub fn vehicles_used(&self) -> usize {
        self.routes.len()
    }

    /// True when every route honours its limits.
    #[must_use]
    pub fn all_routes_feasible(&self) -> bool {
        self.routes.iter().all(|r| r.feasible)
    }
}

/// Errors returned by [`Solver::solve`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    /// The problem's shape is internally inconsistent.
    #[error("inconsistent problem: {0}")]
    InvalidProblem(String),
    /// The engine found nothing usable within its budget.
    #[error("no feasible solution found within the budget")]
    NoSolution,
}

/// A CVRP solver engine.
///
/// Engines must be `Send + Sync` so the parallel multi-strategy mode can run
/// them from worker threads.
pub trait Solver: Send + Sync {
    /// Solve the problem, returning the best solution found in budget.
    fn solve(&self, problem: &RoutingProblem<'_>) -> Result<Solution, SolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::coord;
    use rstest::rstest;

    #[rstest]
    fn drop_policies_price_as_documented() {
        assert_eq!(DropPolicy::Fixed { penalty: 45_000 }.cost(1000), 45_000);
        assert_eq!(
            DropPolicy::Prize {
                base: 45_000,
                demand_coefficient: 100
            }
            .cost(1000),
            145_000
        );
    }

    #[rstest]
    fn center_zone_membership_uses_the_radius() {
        let zone = CenterZone {
            center: coord(42.6974, 23.3238),
            radius_km: 1.7,
        };
        assert!(zone.contains(coord(42.6980, 23.3250)));
        assert!(!zone.contains(coord(42.90, 23.90)));
    }

    #[rstest]
    fn demand_scaling_rounds_to_integer_units() {
        assert_eq!(scale_demand(12.345), 1235);
        assert_eq!(scale_demand(0.0), 0);
    }
}
