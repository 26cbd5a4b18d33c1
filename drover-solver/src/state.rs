//! Search state shared by the engines.
//!
//! A state assigns each vehicle unit an ordered visit list and keeps the
//! rest of the customers in an unassigned pool. Candidate moves are priced
//! with incremental arc deltas; applied routes are re-evaluated exactly, so
//! the state never drifts from the matrix.

use std::collections::HashMap;

use drover_core::solve::{Route, Solution};

use crate::cost::CostMode;
use crate::model::{route_totals, SolverModel};

/// Exact totals of one route under one vehicle unit.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RouteMetrics {
    pub distance_m: i64,
    pub duration_s: i64,
    pub load: i64,
    pub stops: usize,
    /// Shaped arc cost, including any active search penalties.
    pub cost: i64,
}

/// A (possibly partial) assignment of customers to vehicle units.
#[derive(Debug, Clone)]
pub(crate) struct SearchState {
    /// Visit lists indexed by vehicle unit.
    pub routes: Vec<Vec<usize>>,
    /// Customers no route serves, ascending.
    pub unassigned: Vec<usize>,
}

impl SearchState {
    /// Every customer unassigned, every route empty.
    pub fn fresh(num_units: usize, num_customers: usize) -> Self {
        Self {
            routes: vec![Vec::new(); num_units],
            unassigned: (0..num_customers).collect(),
        }
    }

    /// Remove a customer from the unassigned pool.
    pub fn claim(&mut self, customer: usize) {
        self.unassigned.retain(|&c| c != customer);
    }

    /// Return a customer to the unassigned pool, keeping it sorted.
    pub fn release(&mut self, customer: usize) {
        match self.unassigned.binary_search(&customer) {
            Ok(_) => {}
            Err(pos) => self.unassigned.insert(pos, customer),
        }
    }

    /// Total customers currently served.
    pub fn served(&self) -> usize {
        self.routes.iter().map(Vec::len).sum()
    }
}

/// Arc-cost and feasibility oracle for one engine run.
///
/// Owns the cost mode and the guided-local-search penalty store; search code
/// mutates penalties between descents, so the context is single-owner per
/// run and never shared across workers.
pub(crate) struct SearchContext<'p> {
    pub model: SolverModel<'p>,
    cost_mode: CostMode,
    penalty_scale: i64,
    penalties: HashMap<(usize, usize), i64>,
}

impl<'p> SearchContext<'p> {
    pub fn new(model: SolverModel<'p>, cost_mode: CostMode) -> Self {
        Self {
            model,
            cost_mode,
            penalty_scale: 0,
            penalties: HashMap::new(),
        }
    }

    /// Arc cost including active penalties.
    pub fn arc_cost(&self, unit_idx: usize, from_node: usize, to_node: usize) -> i64 {
        let class = self.model.unit(unit_idx).class;
        let base = self.cost_mode.arc_cost(&self.model, class, from_node, to_node);
        if self.penalty_scale == 0 {
            return base;
        }
        base + self.penalty_scale
            * self
                .penalties
                .get(&(from_node, to_node))
                .copied()
                .unwrap_or(0)
    }

    /// Arc cost without penalties; the true objective.
    pub fn base_arc_cost(&self, unit_idx: usize, from_node: usize, to_node: usize) -> i64 {
        let class = self.model.unit(unit_idx).class;
        self.cost_mode.arc_cost(&self.model, class, from_node, to_node)
    }

    /// Activate guided-local-search penalties at the given scale.
    pub fn set_penalty_scale(&mut self, scale: i64) {
        self.penalty_scale = scale;
    }

    /// Bump the penalty counter of one arc.
    pub fn penalise_arc(&mut self, from_node: usize, to_node: usize) {
        *self.penalties.entry((from_node, to_node)).or_insert(0) += 1;
    }

    /// Current penalty counter of one arc.
    pub fn arc_penalty(&self, from_node: usize, to_node: usize) -> i64 {
        self.penalties.get(&(from_node, to_node)).copied().unwrap_or(0)
    }

    /// Evaluate a visit list under a unit, with penalties.
    pub fn route_metrics(&self, unit_idx: usize, visits: &[usize]) -> RouteMetrics {
        self.route_metrics_impl(unit_idx, visits, true)
    }

    /// Evaluate a visit list under a unit, penalties suppressed.
    pub fn route_metrics_base(&self, unit_idx: usize, visits: &[usize]) -> RouteMetrics {
        self.route_metrics_impl(unit_idx, visits, false)
    }

    fn route_metrics_impl(&self, unit_idx: usize, visits: &[usize], penalised: bool) -> RouteMetrics {
        let unit = self.model.unit(unit_idx);
        let mut metrics = RouteMetrics::default();
        if visits.is_empty() {
            return metrics;
        }
        let mut prev = unit.start_depot;
        for &c in visits {
            let node = self.model.node(c);
            metrics.distance_m += self.model.distance(prev, node);
            metrics.duration_s += self.model.duration(prev, node) + unit.service_seconds;
            metrics.load += self.model.demands[c];
            metrics.stops += 1;
            metrics.cost += if penalised {
                self.arc_cost(unit_idx, prev, node)
            } else {
                self.base_arc_cost(unit_idx, prev, node)
            };
            prev = node;
        }
        metrics.distance_m += self.model.distance(prev, unit.end_depot);
        metrics.duration_s += self.model.duration(prev, unit.end_depot);
        metrics.cost += if penalised {
            self.arc_cost(unit_idx, prev, unit.end_depot)
        } else {
            self.base_arc_cost(unit_idx, prev, unit.end_depot)
        };
        metrics
    }

    /// Whether metrics satisfy every hard dimension of the unit.
    pub fn feasible(&self, unit_idx: usize, metrics: &RouteMetrics) -> bool {
        let unit = self.model.unit(unit_idx);
        if metrics.load > self.model.scaled_capacity(unit) {
            return false;
        }
        if let Some(max) = unit.max_stops {
            if metrics.stops > max as usize {
                return false;
            }
        }
        if let Some(max) = unit.max_distance_m {
            if metrics.distance_m > max {
                return false;
            }
        }
        metrics.duration_s <= unit.max_time_seconds
    }

    /// Whether a visit list is feasible under a unit.
    pub fn visits_feasible(&self, unit_idx: usize, visits: &[usize]) -> bool {
        let metrics = self.route_metrics_base(unit_idx, visits);
        self.feasible(unit_idx, &metrics)
    }

    /// Augmented objective of a state: route costs plus drop costs.
    pub fn state_cost(&self, state: &SearchState) -> i64 {
        self.state_cost_impl(state, true)
    }

    /// True objective of a state, penalties suppressed.
    pub fn state_cost_base(&self, state: &SearchState) -> i64 {
        self.state_cost_impl(state, false)
    }

    fn state_cost_impl(&self, state: &SearchState, penalised: bool) -> i64 {
        let routes: i64 = state
            .routes
            .iter()
            .enumerate()
            .map(|(u, visits)| self.route_metrics_impl(u, visits, penalised).cost)
            .sum();
        let drops: i64 = state
            .unassigned
            .iter()
            .map(|&c| self.model.drop_costs[c])
            .sum();
        routes + drops
    }

    /// Whether every route in the state honours its limits.
    pub fn state_feasible(&self, state: &SearchState) -> bool {
        state
            .routes
            .iter()
            .enumerate()
            .all(|(u, visits)| self.visits_feasible(u, visits))
    }
}

/// A candidate placement of one customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Insertion {
    pub unit: usize,
    pub position: usize,
    /// Change in augmented cost.
    pub delta_cost: i64,
}

/// Cheapest feasible placement of `customer` across all units.
///
/// Deltas are exact: arc differences for cost, distance, and duration, plus
/// the unit's service time; feasibility checks run against the route's
/// current exact metrics.
pub(crate) fn best_insertion(
    ctx: &SearchContext<'_>,
    state: &SearchState,
    customer: usize,
) -> Option<Insertion> {
    best_insertion_in_units(ctx, state, customer, 0..state.routes.len())
}

/// Cheapest feasible placement of `customer` within the given units.
pub(crate) fn best_insertion_in_units(
    ctx: &SearchContext<'_>,
    state: &SearchState,
    customer: usize,
    units: impl IntoIterator<Item = usize>,
) -> Option<Insertion> {
    let node = ctx.model.node(customer);
    let demand = ctx.model.demands[customer];
    let mut best: Option<Insertion> = None;

    for unit_idx in units {
        let unit = ctx.model.unit(unit_idx);
        let visits = &state.routes[unit_idx];
        let metrics = ctx.route_metrics(unit_idx, visits);

        if metrics.load + demand > ctx.model.scaled_capacity(unit) {
            continue;
        }
        if let Some(max) = unit.max_stops {
            if metrics.stops + 1 > max as usize {
                continue;
            }
        }

        for position in 0..=visits.len() {
            let prev = if position == 0 {
                unit.start_depot
            } else {
                ctx.model.node(visits[position - 1])
            };
            let next = if position == visits.len() {
                unit.end_depot
            } else {
                ctx.model.node(visits[position])
            };

            let delta_distance = ctx.model.distance(prev, node) + ctx.model.distance(node, next)
                - ctx.model.distance(prev, next);
            if let Some(max) = unit.max_distance_m {
                if metrics.distance_m + delta_distance > max {
                    continue;
                }
            }
            let delta_duration = ctx.model.duration(prev, node) + ctx.model.duration(node, next)
                - ctx.model.duration(prev, next)
                + unit.service_seconds;
            if metrics.duration_s + delta_duration > unit.max_time_seconds {
                continue;
            }

            let delta_cost = ctx.arc_cost(unit_idx, prev, node) + ctx.arc_cost(unit_idx, node, next)
                - ctx.arc_cost(unit_idx, prev, next);
            if best.map_or(true, |b| delta_cost < b.delta_cost) {
                best = Some(Insertion {
                    unit: unit_idx,
                    position,
                    delta_cost,
                });
            }
        }
    }
    best
}

/// Translate a finished state into the public [`Solution`] shape.
///
/// Route totals are recomputed from the adjusted matrix plus the unit's
/// service time, so shaped costs never leak into reported metrics.
pub(crate) fn extract_solution(ctx: &SearchContext<'_>, state: &SearchState) -> Solution {
    let problem = ctx.model.problem;
    let mut routes = Vec::new();
    for (unit_idx, visits) in state.routes.iter().enumerate() {
        if visits.is_empty() {
            continue;
        }
        let unit = ctx.model.unit(unit_idx);
        let (distance, duration, demand) = route_totals(problem, unit, visits);
        let mut route = Route {
            vehicle: unit_idx,
            class: unit.class,
            customers: visits
                .iter()
                .map(|&c| problem.customers[c].id.clone())
                .collect(),
            start_depot: unit.start_depot,
            total_distance_m: distance,
            total_duration_s: duration,
            total_demand: demand,
            start_minute: unit.start_minute,
            feasible: true,
        };
        route.feasible = route.within_limits(unit);
        routes.push(route);
    }

    let dropped = state
        .unassigned
        .iter()
        .map(|&c| problem.customers[c].id.clone())
        .collect();

    Solution {
        routes,
        dropped,
        fitness: ctx.state_cost_base(state) as f64,
        degraded: false,
    }
}
