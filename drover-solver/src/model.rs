//! Solver-side view of a routing problem.

use drover_core::solve::{RoutingProblem, DEMAND_SCALE};
use drover_core::vehicle::VehicleUnit;

/// Drop cost standing in when dropping is disabled: large enough that the
/// search always prefers serving, small enough that sums cannot overflow.
pub(crate) const FORCED_SERVE_COST: i64 = 1_000_000_000;

/// Precomputed lookups shared by every engine.
pub(crate) struct SolverModel<'p> {
    pub problem: &'p RoutingProblem<'p>,
    /// Centre-zone membership per customer.
    pub in_zone: Vec<bool>,
    /// Scaled integer demand per customer.
    pub demands: Vec<i64>,
    /// Cost of dropping each customer.
    pub drop_costs: Vec<i64>,
    /// Nearest other customers per customer, by raw distance.
    pub neighbours: Vec<Vec<usize>>,
}

impl<'p> SolverModel<'p> {
    pub fn new(problem: &'p RoutingProblem<'p>, neighbour_cap: usize) -> Self {
        let in_zone = problem.customers_in_zone();
        let demands = problem.scaled_demands();
        let drop_costs = demands
            .iter()
            .map(|&d| {
                problem
                    .drop_policy
                    .map_or(FORCED_SERVE_COST, |policy| policy.cost(d))
            })
            .collect();
        let neighbours = build_neighbours(problem, neighbour_cap);
        Self {
            problem,
            in_zone,
            demands,
            drop_costs,
            neighbours,
        }
    }

    pub fn num_customers(&self) -> usize {
        self.problem.customers.len()
    }

    pub fn num_depots(&self) -> usize {
        self.problem.depots.len()
    }

    /// Matrix node of customer `c`.
    pub fn node(&self, c: usize) -> usize {
        self.problem.customer_node(c)
    }

    /// Customer index of a matrix node, `None` for depots.
    pub fn customer_of_node(&self, node: usize) -> Option<usize> {
        node.checked_sub(self.num_depots())
    }

    pub fn distance(&self, from_node: usize, to_node: usize) -> i64 {
        i64::from(self.problem.matrix.distance_m(from_node, to_node))
    }

    pub fn duration(&self, from_node: usize, to_node: usize) -> i64 {
        i64::from(self.problem.matrix.duration_s(from_node, to_node))
    }

    pub fn dropping_allowed(&self) -> bool {
        self.problem.drop_policy.is_some()
    }

    pub fn unit(&self, unit_idx: usize) -> &VehicleUnit {
        &self.problem.units[unit_idx]
    }

    /// A unit's capacity in the same scaled units as demands.
    pub fn scaled_capacity(&self, unit: &VehicleUnit) -> i64 {
        i64::from(unit.capacity) * DEMAND_SCALE as i64
    }

    pub fn num_units(&self) -> usize {
        self.problem.units.len()
    }
}

/// Raw per-route totals from the adjusted matrix and the unit's service
/// time. Used for authoritative reporting; never includes cost shaping.
pub(crate) fn route_totals(
    problem: &RoutingProblem<'_>,
    unit: &VehicleUnit,
    visits: &[usize],
) -> (i64, i64, f64) {
    let mut distance = 0i64;
    let mut duration = 0i64;
    let mut demand = 0f64;
    let mut prev = unit.start_depot;
    for &c in visits {
        let node = problem.customer_node(c);
        distance += i64::from(problem.matrix.distance_m(prev, node));
        duration += i64::from(problem.matrix.duration_s(prev, node)) + unit.service_seconds;
        demand += problem.customers[c].demand;
        prev = node;
    }
    distance += i64::from(problem.matrix.distance_m(prev, unit.end_depot));
    duration += i64::from(problem.matrix.duration_s(prev, unit.end_depot));
    (distance, duration, demand)
}

fn build_neighbours(problem: &RoutingProblem<'_>, cap: usize) -> Vec<Vec<usize>> {
    let n = problem.customers.len();
    let cap = cap.max(1).min(n.saturating_sub(1));
    (0..n)
        .map(|c| {
            let node = problem.customer_node(c);
            let mut others: Vec<usize> = (0..n).filter(|&o| o != c).collect();
            others.sort_by_key(|&o| problem.matrix.distance_m(node, problem.customer_node(o)));
            others.truncate(cap);
            others
        })
        .collect()
}
