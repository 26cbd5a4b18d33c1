//! Local search: best-improvement descent plus the metaheuristics that
//! drive it out of local optima.
//!
//! Every loop checks the wall-clock deadline and returns its best-so-far
//! when the budget fires; nothing here blocks past the configured limit.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::construct::fill_pass;
use crate::state::{best_insertion, SearchContext, SearchState};

/// Budgets and neighbourhood bounds for one search run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchLimits {
    /// Hard wall-clock cap; best-so-far is returned when it fires.
    pub deadline: Instant,
    /// Budget for one descent to a local optimum.
    pub inner: Duration,
    /// Arc-exchange segment bound.
    pub num_arcs: usize,
    /// Guided-local-search lambda coefficient.
    pub lambda: f64,
}

impl SearchLimits {
    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// One candidate modification of a state.
#[derive(Debug, Clone, Copy)]
enum Move {
    Relocate {
        from_unit: usize,
        from_pos: usize,
        to_unit: usize,
        to_pos: usize,
    },
    Swap {
        unit_a: usize,
        pos_a: usize,
        unit_b: usize,
        pos_b: usize,
    },
    Reverse {
        unit: usize,
        start: usize,
        end: usize,
    },
    Drop {
        unit: usize,
        pos: usize,
    },
    Insert {
        customer: usize,
        unit: usize,
        pos: usize,
    },
}

fn apply_move(state: &mut SearchState, mv: Move) {
    match mv {
        Move::Relocate {
            from_unit,
            from_pos,
            to_unit,
            to_pos,
        } => {
            let customer = state.routes[from_unit].remove(from_pos);
            let to_pos = if from_unit == to_unit && to_pos > from_pos {
                to_pos - 1
            } else {
                to_pos
            };
            state.routes[to_unit].insert(to_pos, customer);
        }
        Move::Swap {
            unit_a,
            pos_a,
            unit_b,
            pos_b,
        } => {
            let a = state.routes[unit_a][pos_a];
            let b = state.routes[unit_b][pos_b];
            state.routes[unit_a][pos_a] = b;
            state.routes[unit_b][pos_b] = a;
        }
        Move::Reverse { unit, start, end } => {
            state.routes[unit][start..=end].reverse();
        }
        Move::Drop { unit, pos } => {
            let customer = state.routes[unit].remove(pos);
            state.release(customer);
        }
        Move::Insert {
            customer,
            unit,
            pos,
        } => {
            state.claim(customer);
            state.routes[unit].insert(pos, customer);
        }
    }
}

/// Evaluate a move's augmented-cost delta, `None` when infeasible or void.
fn eval_move(
    ctx: &SearchContext<'_>,
    state: &SearchState,
    route_costs: &[i64],
    mv: Move,
) -> Option<i64> {
    match mv {
        Move::Relocate {
            from_unit,
            from_pos,
            to_unit,
            to_pos,
        } => {
            let customer = state.routes[from_unit][from_pos];
            if from_unit == to_unit {
                let mut visits = state.routes[from_unit].clone();
                visits.remove(from_pos);
                let to_pos = if to_pos > from_pos { to_pos - 1 } else { to_pos };
                if to_pos > visits.len() {
                    return None;
                }
                visits.insert(to_pos, customer);
                if visits == state.routes[from_unit] {
                    return None;
                }
                let metrics = ctx.route_metrics(from_unit, &visits);
                if !ctx.feasible(from_unit, &metrics) {
                    return None;
                }
                Some(metrics.cost - route_costs[from_unit])
            } else {
                let mut from = state.routes[from_unit].clone();
                from.remove(from_pos);
                let mut to = state.routes[to_unit].clone();
                if to_pos > to.len() {
                    return None;
                }
                to.insert(to_pos, customer);
                let to_metrics = ctx.route_metrics(to_unit, &to);
                if !ctx.feasible(to_unit, &to_metrics) {
                    return None;
                }
                let from_metrics = ctx.route_metrics(from_unit, &from);
                Some(
                    from_metrics.cost + to_metrics.cost
                        - route_costs[from_unit]
                        - route_costs[to_unit],
                )
            }
        }
        Move::Swap {
            unit_a,
            pos_a,
            unit_b,
            pos_b,
        } => {
            if unit_a == unit_b {
                let mut visits = state.routes[unit_a].clone();
                visits.swap(pos_a, pos_b);
                let metrics = ctx.route_metrics(unit_a, &visits);
                if !ctx.feasible(unit_a, &metrics) {
                    return None;
                }
                Some(metrics.cost - route_costs[unit_a])
            } else {
                let mut a = state.routes[unit_a].clone();
                let mut b = state.routes[unit_b].clone();
                std::mem::swap(&mut a[pos_a], &mut b[pos_b]);
                let ma = ctx.route_metrics(unit_a, &a);
                let mb = ctx.route_metrics(unit_b, &b);
                if !ctx.feasible(unit_a, &ma) || !ctx.feasible(unit_b, &mb) {
                    return None;
                }
                Some(ma.cost + mb.cost - route_costs[unit_a] - route_costs[unit_b])
            }
        }
        Move::Reverse { unit, start, end } => {
            let mut visits = state.routes[unit].clone();
            visits[start..=end].reverse();
            let metrics = ctx.route_metrics(unit, &visits);
            if !ctx.feasible(unit, &metrics) {
                return None;
            }
            Some(metrics.cost - route_costs[unit])
        }
        Move::Drop { unit, pos } => {
            if !ctx.model.dropping_allowed() {
                return None;
            }
            let customer = state.routes[unit][pos];
            let mut visits = state.routes[unit].clone();
            visits.remove(pos);
            let metrics = ctx.route_metrics(unit, &visits);
            Some(metrics.cost - route_costs[unit] + ctx.model.drop_costs[customer])
        }
        Move::Insert {
            customer,
            unit,
            pos,
        } => {
            let mut visits = state.routes[unit].clone();
            if pos > visits.len() {
                return None;
            }
            visits.insert(pos, customer);
            let metrics = ctx.route_metrics(unit, &visits);
            if !ctx.feasible(unit, &metrics) {
                return None;
            }
            Some(metrics.cost - route_costs[unit] - ctx.model.drop_costs[customer])
        }
    }
}

/// Where every assigned customer currently sits.
fn positions(ctx: &SearchContext<'_>, state: &SearchState) -> Vec<Option<(usize, usize)>> {
    let mut index = vec![None; ctx.model.num_customers()];
    for (unit, visits) in state.routes.iter().enumerate() {
        for (pos, &customer) in visits.iter().enumerate() {
            index[customer] = Some((unit, pos));
        }
    }
    index
}

/// Best move under the filter; `allowed(customer, delta)` gates each
/// candidate by its primary moved customer.
fn find_best_move(
    ctx: &SearchContext<'_>,
    state: &SearchState,
    limits: &SearchLimits,
    allowed: &dyn Fn(usize, i64) -> bool,
) -> Option<(Move, i64)> {
    let route_costs: Vec<i64> = state
        .routes
        .iter()
        .enumerate()
        .map(|(u, visits)| ctx.route_metrics(u, visits).cost)
        .collect();
    let where_is = positions(ctx, state);
    let mut best: Option<(Move, i64)> = None;
    let mut consider = |mv: Move, customer: usize| {
        if let Some(delta) = eval_move(ctx, state, &route_costs, mv) {
            if allowed(customer, delta) && best.map_or(true, |(_, b)| delta < b) {
                best = Some((mv, delta));
            }
        }
    };

    for from_unit in 0..state.routes.len() {
        for from_pos in 0..state.routes[from_unit].len() {
            let customer = state.routes[from_unit][from_pos];

            // Relocation next to a near neighbour, or opening any route.
            for &nb in &ctx.model.neighbours[customer] {
                if let Some((to_unit, to_pos)) = where_is[nb] {
                    consider(
                        Move::Relocate {
                            from_unit,
                            from_pos,
                            to_unit,
                            to_pos,
                        },
                        customer,
                    );
                    consider(
                        Move::Relocate {
                            from_unit,
                            from_pos,
                            to_unit,
                            to_pos: to_pos + 1,
                        },
                        customer,
                    );
                    // Positional exchange with the neighbour.
                    let (unit_b, pos_b) = (to_unit, to_pos);
                    if (from_unit, from_pos) != (unit_b, pos_b) {
                        consider(
                            Move::Swap {
                                unit_a: from_unit,
                                pos_a: from_pos,
                                unit_b,
                                pos_b,
                            },
                            customer,
                        );
                    }
                }
            }
            for to_unit in 0..state.routes.len() {
                if to_unit != from_unit {
                    consider(
                        Move::Relocate {
                            from_unit,
                            from_pos,
                            to_unit,
                            to_pos: 0,
                        },
                        customer,
                    );
                }
            }

            consider(Move::Drop { unit: from_unit, pos: from_pos }, customer);
        }

        // Intra-route segment reversals, bounded by the arc budget.
        let len = state.routes[from_unit].len();
        for start in 0..len.saturating_sub(1) {
            for end in (start + 1)..len.min(start + 1 + limits.num_arcs) {
                let customer = state.routes[from_unit][start];
                consider(
                    Move::Reverse {
                        unit: from_unit,
                        start,
                        end,
                    },
                    customer,
                );
            }
        }
    }

    for &customer in &state.unassigned {
        if let Some(insertion) = best_insertion(ctx, state, customer) {
            consider(
                Move::Insert {
                    customer,
                    unit: insertion.unit,
                    pos: insertion.position,
                },
                customer,
            );
        }
    }

    best
}

/// Best-improvement descent to a local optimum of the augmented objective.
pub(crate) fn descend(ctx: &SearchContext<'_>, state: &mut SearchState, limits: &SearchLimits) {
    let inner_deadline = (Instant::now() + limits.inner).min(limits.deadline);
    loop {
        if Instant::now() >= inner_deadline {
            return;
        }
        match find_best_move(ctx, state, limits, &|_, _| true) {
            Some((mv, delta)) if delta < 0 => apply_move(state, mv),
            _ => return,
        }
    }
}

/// Mean off-diagonal arc distance; the GLS penalty unit.
fn mean_arc_cost(ctx: &SearchContext<'_>) -> i64 {
    let matrix = ctx.model.problem.matrix;
    let n = matrix.len();
    if n < 2 {
        return 1;
    }
    let mut total = 0i64;
    for i in 0..n {
        for j in 0..n {
            total += i64::from(matrix.distance_m(i, j));
        }
    }
    (total / (n * n - n) as i64).max(1)
}

/// Arcs driven by a state, as (unit, from, to) node pairs.
fn solution_arcs(ctx: &SearchContext<'_>, state: &SearchState) -> Vec<(usize, usize, usize)> {
    let mut arcs = Vec::new();
    for (unit_idx, visits) in state.routes.iter().enumerate() {
        if visits.is_empty() {
            continue;
        }
        let unit = ctx.model.unit(unit_idx);
        let mut prev = unit.start_depot;
        for &c in visits {
            let node = ctx.model.node(c);
            arcs.push((unit_idx, prev, node));
            prev = node;
        }
        arcs.push((unit_idx, prev, unit.end_depot));
    }
    arcs
}

/// Guided local search: penalise high-utility arcs of each local optimum
/// and re-descend on the augmented objective, tracking the true best.
pub(crate) fn guided_local_search(
    ctx: &mut SearchContext<'_>,
    state: &mut SearchState,
    limits: &SearchLimits,
) -> SearchState {
    let scale = ((limits.lambda * mean_arc_cost(ctx) as f64).round() as i64).max(1);
    ctx.set_penalty_scale(scale);

    let mut best = state.clone();
    let mut best_cost = ctx.state_cost_base(&best);

    while !limits.expired() {
        descend(ctx, state, limits);

        let cost = ctx.state_cost_base(state);
        if cost < best_cost && ctx.state_feasible(state) {
            best = state.clone();
            best_cost = cost;
        }
        if limits.expired() {
            break;
        }

        // Penalise every arc attaining the maximum utility.
        let arcs = solution_arcs(ctx, state);
        if arcs.is_empty() {
            break;
        }
        let utility = |&(unit, from, to): &(usize, usize, usize)| -> i64 {
            ctx.base_arc_cost(unit, from, to) / (1 + ctx.arc_penalty(from, to))
        };
        let max_utility = arcs.iter().map(utility).max().unwrap_or(0);
        if max_utility <= 0 {
            break;
        }
        let to_penalise: Vec<(usize, usize)> = arcs
            .iter()
            .filter(|arc| utility(*arc) == max_utility)
            .map(|&(_, from, to)| (from, to))
            .collect();
        for (from, to) in to_penalise {
            ctx.penalise_arc(from, to);
        }
    }

    ctx.set_penalty_scale(0);
    best
}

/// Simulated annealing with a geometric cooling schedule.
pub(crate) fn simulated_annealing(
    ctx: &SearchContext<'_>,
    state: &mut SearchState,
    limits: &SearchLimits,
    rng: &mut ChaCha8Rng,
) -> SearchState {
    let mut best = state.clone();
    let mut best_cost = ctx.state_cost_base(&best);
    let mut current_cost = best_cost;

    let mut temperature = (mean_arc_cost(ctx) * 4) as f64;
    let floor = 1.0;
    let cooling = 0.995;

    while !limits.expired() {
        for _ in 0..64 {
            let Some((mv, delta)) = random_move(ctx, state, rng) else {
                continue;
            };
            let accept = delta < 0
                || rng.gen::<f64>() < (-(delta as f64) / temperature.max(floor)).exp();
            if accept {
                apply_move(state, mv);
                current_cost += delta;
                if current_cost < best_cost && ctx.state_feasible(state) {
                    best = state.clone();
                    best_cost = current_cost;
                }
            }
        }
        temperature = (temperature * cooling).max(floor);
        if limits.expired() {
            break;
        }
    }
    best
}

/// Propose one random feasible move.
fn random_move(
    ctx: &SearchContext<'_>,
    state: &SearchState,
    rng: &mut ChaCha8Rng,
) -> Option<(Move, i64)> {
    let route_costs: Vec<i64> = state
        .routes
        .iter()
        .enumerate()
        .map(|(u, visits)| ctx.route_metrics(u, visits).cost)
        .collect();
    let served: Vec<(usize, usize)> = state
        .routes
        .iter()
        .enumerate()
        .flat_map(|(u, visits)| (0..visits.len()).map(move |p| (u, p)))
        .collect();
    if served.is_empty() && state.unassigned.is_empty() {
        return None;
    }

    for _ in 0..16 {
        let mv = match rng.gen_range(0..4u8) {
            0 if !served.is_empty() => {
                let (from_unit, from_pos) = served[rng.gen_range(0..served.len())];
                let to_unit = rng.gen_range(0..state.routes.len());
                let to_pos = rng.gen_range(0..=state.routes[to_unit].len());
                Move::Relocate {
                    from_unit,
                    from_pos,
                    to_unit,
                    to_pos,
                }
            }
            1 if served.len() >= 2 => {
                let (unit_a, pos_a) = served[rng.gen_range(0..served.len())];
                let (unit_b, pos_b) = served[rng.gen_range(0..served.len())];
                if (unit_a, pos_a) == (unit_b, pos_b) {
                    continue;
                }
                Move::Swap {
                    unit_a,
                    pos_a,
                    unit_b,
                    pos_b,
                }
            }
            2 => {
                let candidates: Vec<usize> = state
                    .routes
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.len() >= 3)
                    .map(|(u, _)| u)
                    .collect();
                if candidates.is_empty() {
                    continue;
                }
                let unit = candidates[rng.gen_range(0..candidates.len())];
                let len = state.routes[unit].len();
                let start = rng.gen_range(0..len - 1);
                let end = rng.gen_range(start + 1..len);
                Move::Reverse { unit, start, end }
            }
            _ if !state.unassigned.is_empty() => {
                let customer = state.unassigned[rng.gen_range(0..state.unassigned.len())];
                let insertion = best_insertion(ctx, state, customer)?;
                Move::Insert {
                    customer,
                    unit: insertion.unit,
                    pos: insertion.position,
                }
            }
            _ => continue,
        };
        if let Some(delta) = eval_move(ctx, state, &route_costs, mv) {
            return Some((mv, delta));
        }
    }
    None
}

/// Tabu search: always take the best admissible move, forbid recently moved
/// customers, aspire past the list when a move beats the incumbent.
pub(crate) fn tabu_search(
    ctx: &SearchContext<'_>,
    state: &mut SearchState,
    limits: &SearchLimits,
) -> SearchState {
    const TENURE: u64 = 15;

    let mut best = state.clone();
    let mut best_cost = ctx.state_cost_base(&best);
    let mut tabu: HashMap<usize, u64> = HashMap::new();
    let mut iteration = 0u64;

    while !limits.expired() {
        iteration += 1;
        let current_cost = ctx.state_cost(state);
        let aspiration = best_cost - current_cost;
        let allowed = |customer: usize, delta: i64| -> bool {
            tabu.get(&customer).map_or(true, |&until| iteration >= until) || delta < aspiration
        };
        let Some((mv, _)) = find_best_move(ctx, state, limits, &allowed) else {
            break;
        };
        let moved = primary_customer(state, mv);
        apply_move(state, mv);
        tabu.insert(moved, iteration + TENURE);

        let cost = ctx.state_cost_base(state);
        if cost < best_cost && ctx.state_feasible(state) {
            best = state.clone();
            best_cost = cost;
        }
    }
    best
}

fn primary_customer(state: &SearchState, mv: Move) -> usize {
    match mv {
        Move::Relocate {
            from_unit,
            from_pos,
            ..
        }
        | Move::Drop {
            unit: from_unit,
            pos: from_pos,
        } => state.routes[from_unit][from_pos],
        Move::Swap { unit_a, pos_a, .. } => state.routes[unit_a][pos_a],
        Move::Reverse { unit, start, .. } => state.routes[unit][start],
        Move::Insert { customer, .. } => customer,
    }
}

/// Iterated local search: ruin a fraction of the visits, recreate cheapest
/// -first, descend, and keep the better of the two.
pub(crate) fn iterated_local_search(
    ctx: &SearchContext<'_>,
    state: &mut SearchState,
    limits: &SearchLimits,
    rng: &mut ChaCha8Rng,
) -> SearchState {
    descend(ctx, state, limits);
    let mut best = state.clone();
    let mut best_cost = ctx.state_cost_base(&best);

    while !limits.expired() {
        let mut candidate = best.clone();

        // Ruin: release a random tenth of the served customers.
        let served: Vec<(usize, usize)> = candidate
            .routes
            .iter()
            .enumerate()
            .flat_map(|(u, visits)| (0..visits.len()).map(move |p| (u, p)))
            .collect();
        if served.is_empty() {
            break;
        }
        let k = (served.len() / 10).max(1);
        let mut doomed: Vec<(usize, usize)> = Vec::with_capacity(k);
        for _ in 0..k {
            doomed.push(served[rng.gen_range(0..served.len())]);
        }
        doomed.sort_by(|a, b| b.cmp(a));
        doomed.dedup();
        for (unit, pos) in doomed {
            let customer = candidate.routes[unit].remove(pos);
            candidate.release(customer);
        }

        // Recreate and polish.
        fill_pass(ctx, &mut candidate);
        descend(ctx, &mut candidate, limits);

        let cost = ctx.state_cost_base(&candidate);
        if cost < best_cost && ctx.state_feasible(&candidate) {
            best = candidate;
            best_cost = cost;
        }
    }
    best
}
