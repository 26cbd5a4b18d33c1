//! The dimension engine.
//!
//! Keeps a four-dimension route state (load, distance, stops, time), prices
//! arcs through the per-class evaluator, exposes every customer as a
//! droppable disjunction, and searches with a configurable construction
//! heuristic plus metaheuristic under a hard wall-clock budget.

use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use drover_core::config::{CvrpSection, FirstSolutionStrategy, LocalSearchMetaheuristic};
use drover_core::solve::{RoutingProblem, Solution, SolveError, Solver};

use crate::construct;
use crate::cost::CostMode;
use crate::model::SolverModel;
use crate::search::{self, SearchLimits};
use crate::state::{extract_solution, SearchContext};

/// Search parameters for one engine run.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Construction heuristic.
    pub strategy: FirstSolutionStrategy,
    /// Improvement metaheuristic.
    pub metaheuristic: LocalSearchMetaheuristic,
    /// Hard wall-clock budget.
    pub time_limit: Duration,
    /// Budget for one descent to a local optimum.
    pub inner_limit: Duration,
    /// Neighbour-list size for relocation candidates.
    pub num_nodes: usize,
    /// Segment bound for arc exchanges.
    pub num_arcs: usize,
    /// Guided-local-search lambda coefficient.
    pub lambda: f64,
    /// Seed for the stochastic components.
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: FirstSolutionStrategy::Christofides,
            metaheuristic: LocalSearchMetaheuristic::GuidedLocalSearch,
            time_limit: Duration::from_secs(30),
            inner_limit: Duration::from_secs(15),
            num_nodes: 120,
            num_arcs: 110,
            lambda: 0.8,
            seed: 0,
        }
    }
}

impl SearchConfig {
    /// Derive search parameters from the `cvrp` configuration section.
    #[must_use]
    pub fn from_cvrp(cvrp: &CvrpSection) -> Self {
        Self {
            strategy: cvrp.first_solution_strategy,
            metaheuristic: cvrp.local_search_metaheuristic,
            time_limit: Duration::from_secs(cvrp.time_limit_seconds),
            inner_limit: Duration::from_secs_f64(cvrp.lns_time_limit_seconds.max(0.1)),
            num_nodes: cvrp.lns_num_nodes,
            num_arcs: cvrp.lns_num_arcs,
            lambda: cvrp.search_lambda_coefficient,
            seed: 0,
        }
    }

    /// The same configuration under a different seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Per-class arc costs, four hard dimensions, droppable customers.
#[derive(Debug, Clone, Default)]
pub struct DimensionSolver {
    /// Search parameters.
    pub config: SearchConfig,
}

impl DimensionSolver {
    /// Engine with explicit search parameters.
    #[must_use]
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }
}

impl Solver for DimensionSolver {
    fn solve(&self, problem: &RoutingProblem<'_>) -> Result<Solution, SolveError> {
        problem.validate()?;
        if problem.customers.is_empty() || problem.units.is_empty() {
            return Ok(Solution {
                dropped: problem.customers.iter().map(|c| c.id.clone()).collect(),
                ..Solution::empty()
            });
        }

        let model = SolverModel::new(problem, self.config.num_nodes);
        let mut ctx = SearchContext::new(model, CostMode::ByClass);
        let limits = SearchLimits {
            deadline: Instant::now() + self.config.time_limit,
            inner: self.config.inner_limit,
            num_arcs: self.config.num_arcs.max(1),
            lambda: self.config.lambda,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        let mut current = construct::build(self.config.strategy, &ctx);
        let best = match self.config.metaheuristic {
            LocalSearchMetaheuristic::Automatic | LocalSearchMetaheuristic::GuidedLocalSearch => {
                search::guided_local_search(&mut ctx, &mut current, &limits)
            }
            LocalSearchMetaheuristic::SimulatedAnnealing => {
                search::simulated_annealing(&ctx, &mut current, &limits, &mut rng)
            }
            LocalSearchMetaheuristic::TabuSearch => {
                search::tabu_search(&ctx, &mut current, &limits)
            }
        };

        if !ctx.state_feasible(&best) {
            return Err(SolveError::NoSolution);
        }
        if !ctx.model.dropping_allowed() && !best.unassigned.is_empty() {
            // Skipping is off and the search could not place everyone.
            return Err(SolveError::NoSolution);
        }
        Ok(extract_solution(&ctx, &best))
    }
}

/// Run one configured search; used by the parallel race workers.
pub(crate) fn run_search(
    problem: &RoutingProblem<'_>,
    config: &SearchConfig,
) -> Result<Solution, SolveError> {
    DimensionSolver::new(config.clone()).solve(problem)
}
