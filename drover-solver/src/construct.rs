//! First-solution construction heuristics.

use drover_core::config::FirstSolutionStrategy;

use crate::state::{best_insertion, best_insertion_in_units, Insertion, SearchContext, SearchState};

/// Build an initial state with the requested heuristic.
pub(crate) fn build(strategy: FirstSolutionStrategy, ctx: &SearchContext<'_>) -> SearchState {
    let state = match strategy {
        FirstSolutionStrategy::Automatic | FirstSolutionStrategy::ParallelCheapestInsertion => {
            parallel_cheapest_insertion(ctx)
        }
        FirstSolutionStrategy::CheapestInsertion => sequential_cheapest_insertion(ctx),
        FirstSolutionStrategy::PathCheapestArc => path_cheapest_arc(ctx),
        FirstSolutionStrategy::Savings => savings(ctx),
        FirstSolutionStrategy::Christofides => farthest_seed_insertion(ctx),
    };
    log::debug!(
        "{strategy:?} construction served {} of {} customers",
        state.served(),
        ctx.model.num_customers(),
    );
    state
}

/// Repeatedly place the globally cheapest (customer, position) pair.
fn parallel_cheapest_insertion(ctx: &SearchContext<'_>) -> SearchState {
    let mut state = SearchState::fresh(ctx.model.num_units(), ctx.model.num_customers());
    fill_pass(ctx, &mut state);
    state
}

/// Place every unassigned customer that still fits anywhere, cheapest first.
pub(crate) fn fill_pass(ctx: &SearchContext<'_>, state: &mut SearchState) {
    loop {
        let mut best: Option<(usize, Insertion)> = None;
        for &customer in &state.unassigned {
            if let Some(insertion) = best_insertion(ctx, state, customer) {
                if best
                    .map_or(true, |(_, b)| insertion.delta_cost < b.delta_cost)
                {
                    best = Some((customer, insertion));
                }
            }
        }
        let Some((customer, insertion)) = best else {
            return;
        };
        state.claim(customer);
        state.routes[insertion.unit].insert(insertion.position, customer);
    }
}

/// Fill one vehicle at a time before opening the next.
fn sequential_cheapest_insertion(ctx: &SearchContext<'_>) -> SearchState {
    let mut state = SearchState::fresh(ctx.model.num_units(), ctx.model.num_customers());
    for unit_idx in 0..ctx.model.num_units() {
        loop {
            let mut best: Option<(usize, Insertion)> = None;
            for &customer in &state.unassigned {
                if let Some(insertion) =
                    best_insertion_in_units(ctx, &state, customer, [unit_idx])
                {
                    if best
                        .map_or(true, |(_, b)| insertion.delta_cost < b.delta_cost)
                    {
                        best = Some((customer, insertion));
                    }
                }
            }
            let Some((customer, insertion)) = best else {
                break;
            };
            state.claim(customer);
            state.routes[insertion.unit].insert(insertion.position, customer);
        }
    }
    state
}

/// Grow each route by appending the cheapest next arc.
fn path_cheapest_arc(ctx: &SearchContext<'_>) -> SearchState {
    let mut state = SearchState::fresh(ctx.model.num_units(), ctx.model.num_customers());
    for unit_idx in 0..ctx.model.num_units() {
        loop {
            let last_node = state.routes[unit_idx]
                .last()
                .map_or(ctx.model.unit(unit_idx).start_depot, |&c| ctx.model.node(c));
            let mut best: Option<(usize, i64)> = None;
            for &customer in &state.unassigned {
                let mut candidate = state.routes[unit_idx].clone();
                candidate.push(customer);
                if !ctx.visits_feasible(unit_idx, &candidate) {
                    continue;
                }
                let arc = ctx.arc_cost(unit_idx, last_node, ctx.model.node(customer));
                if best.map_or(true, |(_, b)| arc < b) {
                    best = Some((customer, arc));
                }
            }
            let Some((customer, _)) = best else {
                break;
            };
            state.claim(customer);
            state.routes[unit_idx].push(customer);
        }
    }
    // A late vehicle may still have room for customers an earlier pass
    // skipped at the tail.
    fill_pass(ctx, &mut state);
    state
}

/// Clarke-Wright savings merges, then chain-to-vehicle assignment.
fn savings(ctx: &SearchContext<'_>) -> SearchState {
    let n = ctx.model.num_customers();
    let mut state = SearchState::fresh(ctx.model.num_units(), n);
    if n == 0 {
        return state;
    }

    // Merge ceiling: the most generous unit on each dimension.
    let max_capacity = (0..ctx.model.num_units())
        .map(|u| ctx.model.scaled_capacity(ctx.model.unit(u)))
        .max()
        .unwrap_or(0);
    let max_stops = (0..ctx.model.num_units())
        .map(|u| ctx.model.unit(u).max_stops.map_or(usize::MAX, |m| m as usize))
        .max()
        .unwrap_or(usize::MAX);

    // Savings against the main depot: s(i, j) = d(0,i) + d(0,j) - d(i,j).
    struct Saving {
        i: usize,
        j: usize,
        value: i64,
    }
    let depot = 0usize;
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            let (ni, nj) = (ctx.model.node(i), ctx.model.node(j));
            let value = ctx.model.distance(depot, ni) + ctx.model.distance(depot, nj)
                - ctx.model.distance(ni, nj);
            if value > 0 {
                pairs.push(Saving { i, j, value });
            }
        }
    }
    pairs.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| (a.i, a.j).cmp(&(b.i, b.j))));

    let mut chain_of: Vec<usize> = (0..n).collect();
    let mut chains: Vec<Vec<usize>> = (0..n).map(|c| vec![c]).collect();
    let mut loads: Vec<i64> = ctx.model.demands.clone();

    for saving in &pairs {
        let (ci, cj) = (chain_of[saving.i], chain_of[saving.j]);
        if ci == cj {
            continue;
        }
        if loads[ci] + loads[cj] > max_capacity
            || chains[ci].len() + chains[cj].len() > max_stops
        {
            continue;
        }
        let i_at_end = chains[ci].last() == Some(&saving.i);
        let j_at_start = chains[cj].first() == Some(&saving.j);
        let i_at_start = chains[ci].first() == Some(&saving.i);
        let j_at_end = chains[cj].last() == Some(&saving.j);

        let (from, into, reverse_from, reverse_into) = if i_at_end && j_at_start {
            (cj, ci, false, false)
        } else if j_at_end && i_at_start {
            (ci, cj, false, false)
        } else if i_at_end && j_at_end {
            (cj, ci, true, false)
        } else if i_at_start && j_at_start {
            (cj, ci, false, true)
        } else {
            continue;
        };

        let mut moved = std::mem::take(&mut chains[from]);
        if reverse_from {
            moved.reverse();
        }
        if reverse_into {
            chains[into].reverse();
        }
        chains[into].append(&mut moved);
        loads[into] += loads[from];
        loads[from] = 0;
        for &c in &chains[into] {
            chain_of[c] = into;
        }
    }

    // Hand the heaviest chains to the roomiest free vehicles.
    let mut chain_ids: Vec<usize> = (0..n).filter(|&c| !chains[c].is_empty()).collect();
    chain_ids.sort_by(|&a, &b| loads[b].cmp(&loads[a]).then_with(|| a.cmp(&b)));
    let mut unit_free = vec![true; ctx.model.num_units()];

    for chain_id in chain_ids {
        let chain = &chains[chain_id];
        let mut placed = false;
        let mut order: Vec<usize> = (0..ctx.model.num_units()).collect();
        order.sort_by_key(|&u| std::cmp::Reverse(ctx.model.scaled_capacity(ctx.model.unit(u))));
        for unit_idx in order {
            if !unit_free[unit_idx] {
                continue;
            }
            let forward_ok = ctx.visits_feasible(unit_idx, chain);
            let mut reversed = chain.clone();
            reversed.reverse();
            let backward_ok = ctx.visits_feasible(unit_idx, &reversed);
            if !forward_ok && !backward_ok {
                continue;
            }
            let visits = if !forward_ok {
                reversed
            } else if backward_ok
                && ctx.route_metrics(unit_idx, &reversed).cost
                    < ctx.route_metrics(unit_idx, chain).cost
            {
                reversed
            } else {
                chain.clone()
            };
            for &c in &visits {
                state.claim(c);
            }
            state.routes[unit_idx] = visits;
            unit_free[unit_idx] = false;
            placed = true;
            break;
        }
        if !placed {
            log::debug!("savings chain of {} customers fits no single vehicle", chain.len());
        }
    }

    fill_pass(ctx, &mut state);
    state
}

/// Seed every vehicle with its farthest reachable customer, then insert the
/// rest cheapest-first.
fn farthest_seed_insertion(ctx: &SearchContext<'_>) -> SearchState {
    let mut state = SearchState::fresh(ctx.model.num_units(), ctx.model.num_customers());
    for unit_idx in 0..ctx.model.num_units() {
        let depot = ctx.model.unit(unit_idx).start_depot;
        let mut seed: Option<(usize, i64)> = None;
        for &customer in &state.unassigned {
            if !ctx.visits_feasible(unit_idx, &[customer]) {
                continue;
            }
            let distance = ctx.model.distance(depot, ctx.model.node(customer));
            if seed.map_or(true, |(_, d)| distance > d) {
                seed = Some((customer, distance));
            }
        }
        if let Some((customer, _)) = seed {
            state.claim(customer);
            state.routes[unit_idx].push(customer);
        }
    }
    fill_pass(ctx, &mut state);
    state
}
