//! Deterministic multi-strategy race.
//!
//! Workers run independent dimension-engine searches over a shared
//! read-only problem, each with its own (construction, metaheuristic) pair
//! drawn cyclically from the configured lists and a seed equal to its
//! worker index. Results come home over a channel drained after all workers
//! join; the winner is picked by the deterministic selection rule.

use std::sync::mpsc;

use drover_core::config::{CvrpSection, FirstSolutionStrategy, LocalSearchMetaheuristic};
use drover_core::solve::{RoutingProblem, Solution, SolveError};

use crate::dimensions::{run_search, SearchConfig};

/// Settings of the multi-strategy race.
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Worker count.
    pub workers: usize,
    /// Construction heuristics, drawn cyclically.
    pub strategies: Vec<FirstSolutionStrategy>,
    /// Metaheuristics, drawn cyclically.
    pub metaheuristics: Vec<LocalSearchMetaheuristic>,
    /// Base search parameters shared by every worker.
    pub base: SearchConfig,
}

impl ParallelConfig {
    /// Derive race settings from the `cvrp` configuration section.
    #[must_use]
    pub fn from_cvrp(cvrp: &CvrpSection) -> Self {
        Self {
            workers: cvrp.resolved_workers(),
            strategies: cvrp.parallel_first_solution_strategies.clone(),
            metaheuristics: cvrp.parallel_local_search_metaheuristics.clone(),
            base: SearchConfig::from_cvrp(cvrp),
        }
    }

    fn worker_config(&self, worker: usize) -> SearchConfig {
        let mut config = self.base.clone().with_seed(worker as u64);
        if !self.strategies.is_empty() {
            config.strategy = self.strategies[worker % self.strategies.len()];
        }
        if !self.metaheuristics.is_empty() {
            config.metaheuristic = self.metaheuristics[worker % self.metaheuristics.len()];
        }
        config
    }
}

/// Race `workers` independent searches and pick the winner.
pub fn solve_parallel(
    problem: &RoutingProblem<'_>,
    config: &ParallelConfig,
) -> Result<Solution, SolveError> {
    let workers = config.workers.max(1);
    log::info!("racing {workers} solver workers");

    let (tx, rx) = mpsc::channel::<(usize, Solution)>();
    std::thread::scope(|scope| {
        for worker in 0..workers {
            let tx = tx.clone();
            let worker_config = config.worker_config(worker);
            scope.spawn(move || {
                log::debug!(
                    "worker {worker}: {:?} + {:?}",
                    worker_config.strategy,
                    worker_config.metaheuristic,
                );
                match run_search(problem, &worker_config) {
                    Ok(solution) => {
                        let _ = tx.send((worker, solution));
                    }
                    Err(err) => log::warn!("worker {worker} found nothing: {err}"),
                }
            });
        }
    });
    drop(tx);

    let candidates: Vec<(usize, Solution)> = rx.into_iter().collect();
    select_winner(candidates).ok_or(SolveError::NoSolution)
}

/// Deterministic winner selection.
///
/// Feasible candidates only; minimum fitness wins, ties broken by served
/// demand descending, then vehicle count ascending, then worker index.
#[must_use]
pub fn select_winner(mut candidates: Vec<(usize, Solution)>) -> Option<Solution> {
    candidates.retain(|(_, s)| s.all_routes_feasible());
    candidates.sort_by(|(ia, a), (ib, b)| {
        a.fitness
            .total_cmp(&b.fitness)
            .then_with(|| b.total_served_volume().total_cmp(&a.total_served_volume()))
            .then_with(|| a.vehicles_used().cmp(&b.vehicles_used()))
            .then_with(|| ia.cmp(ib))
    });
    let winner = candidates.into_iter().next().map(|(worker, solution)| {
        log::info!(
            "worker {worker} wins with fitness {:.0} over {} routes",
            solution.fitness,
            solution.routes.len(),
        );
        solution
    });
    winner
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::solve::Route;
    use drover_core::vehicle::VehicleClass;
    use rstest::rstest;

    fn candidate(fitness: f64, served: f64, vehicles: usize, feasible: bool) -> Solution {
        let routes = (0..vehicles)
            .map(|v| Route {
                vehicle: v,
                class: VehicleClass::Internal,
                customers: vec![format!("c{v}")],
                start_depot: 0,
                total_distance_m: 1000,
                total_duration_s: 600,
                total_demand: served / vehicles as f64,
                start_minute: 480,
                feasible,
            })
            .collect();
        Solution {
            routes,
            dropped: Vec::new(),
            fitness,
            degraded: false,
        }
    }

    #[rstest]
    fn lowest_fitness_wins() {
        let winner = select_winner(vec![
            (0, candidate(200.0, 50.0, 2, true)),
            (1, candidate(100.0, 50.0, 2, true)),
        ])
        .unwrap();
        assert!((winner.fitness - 100.0).abs() < f64::EPSILON);
    }

    #[rstest]
    fn infeasible_candidates_never_win() {
        let winner = select_winner(vec![
            (0, candidate(10.0, 50.0, 2, false)),
            (1, candidate(500.0, 50.0, 2, true)),
        ])
        .unwrap();
        assert!((winner.fitness - 500.0).abs() < f64::EPSILON);
    }

    #[rstest]
    fn ties_break_on_served_volume_then_vehicles_then_index() {
        let winner = select_winner(vec![
            (0, candidate(100.0, 40.0, 2, true)),
            (1, candidate(100.0, 60.0, 2, true)),
        ])
        .unwrap();
        assert!((winner.total_served_volume() - 60.0).abs() < 1e-9);

        let winner = select_winner(vec![
            (0, candidate(100.0, 60.0, 3, true)),
            (1, candidate(100.0, 60.0, 2, true)),
        ])
        .unwrap();
        assert_eq!(winner.vehicles_used(), 2);
    }

    #[rstest]
    fn empty_field_has_no_winner() {
        assert!(select_winner(Vec::new()).is_none());
        assert!(select_winner(vec![(0, candidate(1.0, 1.0, 1, false))]).is_none());
    }
}
