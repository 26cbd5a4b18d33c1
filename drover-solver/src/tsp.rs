//! Per-route TSP refinement.
//!
//! After the CVRP engines settle the assignment, each route's visit order
//! is re-sequenced as a closed tour from the vehicle's TSP origin, which
//! may differ from its operational depot. The tour is optimised on a
//! haversine approximation for speed; a new order is accepted only when
//! strictly shorter, and final metrics always come back from the real
//! adjusted matrix.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use geo::Coord;

use drover_core::geometry::{coords_close, haversine_m};
use drover_core::solve::{RoutingProblem, Solution};

use crate::model::route_totals;

/// Settings for the refinement stage.
#[derive(Debug, Clone)]
pub struct TspConfig {
    /// Re-sequence every route, not only those with a divergent origin.
    pub always: bool,
    /// Budget per route.
    pub budget: Duration,
}

impl Default for TspConfig {
    fn default() -> Self {
        Self {
            always: true,
            budget: Duration::from_secs(2),
        }
    }
}

/// Re-sequence each route from its unit's TSP origin.
pub fn refine_routes(solution: &mut Solution, problem: &RoutingProblem<'_>, config: &TspConfig) {
    let index_of: HashMap<&str, usize> = problem
        .customers
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.as_str(), i))
        .collect();

    for route in &mut solution.routes {
        let unit = &problem.units[route.vehicle];
        let origin = unit.tsp_origin;
        let depot_coord = problem.depots.coords()[unit.start_depot];
        if !config.always && coords_close(origin, depot_coord) {
            continue;
        }
        if route.customers.len() < 3 {
            continue;
        }

        let Some(visits) = route
            .customers
            .iter()
            .map(|id| index_of.get(id.as_str()).copied())
            .collect::<Option<Vec<usize>>>()
        else {
            log::warn!("route {} references an unknown customer, skipping", route.vehicle);
            continue;
        };
        let points: Vec<Coord<f64>> = visits
            .iter()
            .map(|&c| problem.customers[c].location)
            .collect();

        let current_order: Vec<usize> = (0..points.len()).collect();
        let current_length = tour_length(origin, &points, &current_order);
        let candidate = optimise_tour(origin, &points, config.budget);
        let candidate_length = tour_length(origin, &points, &candidate);

        if candidate_length < current_length {
            log::debug!(
                "route {}: tour shortened {:.0}m -> {:.0}m",
                route.vehicle,
                current_length,
                candidate_length,
            );
            let reordered: Vec<usize> = candidate.iter().map(|&p| visits[p]).collect();
            route.customers = reordered
                .iter()
                .map(|&c| problem.customers[c].id.clone())
                .collect();
            let (distance, duration, demand) = route_totals(problem, unit, &reordered);
            route.total_distance_m = distance;
            route.total_duration_s = duration;
            route.total_demand = demand;
            route.feasible = route.within_limits(unit);
        }
    }
}

/// Closed-tour length from the origin through `order` and back.
fn tour_length(origin: Coord<f64>, points: &[Coord<f64>], order: &[usize]) -> f64 {
    let mut length = 0.0;
    let mut prev = origin;
    for &p in order {
        length += haversine_m(prev, points[p]);
        prev = points[p];
    }
    length + haversine_m(prev, origin)
}

/// Nearest-neighbour construction plus 2-opt until the budget fires.
///
/// The nearest-neighbour order doubles as the fallback when no improvement
/// is found in time.
fn optimise_tour(origin: Coord<f64>, points: &[Coord<f64>], budget: Duration) -> Vec<usize> {
    let deadline = Instant::now() + budget;

    // Nearest neighbour from the origin.
    let mut order: Vec<usize> = Vec::with_capacity(points.len());
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut prev = origin;
    while let Some((slot, _)) = remaining
        .iter()
        .enumerate()
        .map(|(slot, &p)| (slot, haversine_m(prev, points[p])))
        .min_by(|a, b| a.1.total_cmp(&b.1))
    {
        let p = remaining.swap_remove(slot);
        prev = points[p];
        order.push(p);
    }

    // 2-opt descent.
    let n = order.len();
    let mut improved = true;
    while improved && Instant::now() < deadline {
        improved = false;
        for i in 0..n.saturating_sub(1) {
            for j in (i + 1)..n {
                let before = tour_length(origin, points, &order);
                order[i..=j].reverse();
                if tour_length(origin, points, &order) + 1e-9 < before {
                    improved = true;
                } else {
                    order[i..=j].reverse();
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }
    }
    order
}
