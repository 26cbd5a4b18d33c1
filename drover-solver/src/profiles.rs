//! The profile engine.
//!
//! Encodes the centre-zone rule as two precomputed arc-cost matrices (one
//! for centre-class units, one for everything else), models load as
//! `[demand, 1]` against `[capacity, max_stops]`, prices dropping as a
//! demand-weighted prize, and improves by iterated local search under a
//! single seed.

use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use drover_core::config::{CvrpSection, FirstSolutionStrategy};
use drover_core::solve::{RoutingProblem, Solution, SolveError, Solver};

use crate::construct;
use crate::cost::{profile_matrices, CostMode};
use crate::model::SolverModel;
use crate::search::{self, SearchLimits};
use crate::state::{extract_solution, SearchContext};

/// Iterated local search over per-class profile matrices.
#[derive(Debug, Clone)]
pub struct ProfileSolver {
    /// Hard wall-clock budget.
    pub time_limit: Duration,
    /// Neighbour-list size for relocation candidates.
    pub num_nodes: usize,
    /// Segment bound for arc exchanges.
    pub num_arcs: usize,
    /// Seed for the perturbation randomness.
    pub seed: u64,
}

impl Default for ProfileSolver {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(30),
            num_nodes: 120,
            num_arcs: 110,
            seed: 42,
        }
    }
}

impl ProfileSolver {
    /// Derive engine parameters from the `cvrp` configuration section.
    #[must_use]
    pub fn from_cvrp(cvrp: &CvrpSection) -> Self {
        Self {
            time_limit: Duration::from_secs(cvrp.time_limit_seconds),
            num_nodes: cvrp.lns_num_nodes,
            num_arcs: cvrp.lns_num_arcs,
            seed: 42,
        }
    }
}

impl Solver for ProfileSolver {
    fn solve(&self, problem: &RoutingProblem<'_>) -> Result<Solution, SolveError> {
        problem.validate()?;
        if problem.customers.is_empty() || problem.units.is_empty() {
            return Ok(Solution {
                dropped: problem.customers.iter().map(|c| c.id.clone()).collect(),
                ..Solution::empty()
            });
        }

        let model = SolverModel::new(problem, self.num_nodes);
        let (center, other) = profile_matrices(&model);
        let ctx = SearchContext::new(model, CostMode::Profiles { center, other });
        let limits = SearchLimits {
            deadline: Instant::now() + self.time_limit,
            inner: self.time_limit.min(Duration::from_secs(5)),
            num_arcs: self.num_arcs.max(1),
            lambda: 0.0,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut current = construct::build(FirstSolutionStrategy::ParallelCheapestInsertion, &ctx);
        let best = search::iterated_local_search(&ctx, &mut current, &limits, &mut rng);

        if !ctx.state_feasible(&best) {
            return Err(SolveError::NoSolution);
        }
        if !ctx.model.dropping_allowed() && !best.unassigned.is_empty() {
            return Err(SolveError::NoSolution);
        }
        Ok(extract_solution(&ctx, &best))
    }
}
