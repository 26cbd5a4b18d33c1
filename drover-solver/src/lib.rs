//! CVRP search engines for the drover planner.
//!
//! Two engines satisfy the [`Solver`](drover_core::Solver) contract:
//!
//! - [`DimensionSolver`] keeps a four-dimension route state (load, distance,
//!   stops, time) and prices arcs per vehicle class through a tagged
//!   evaluator, with droppable customers carrying a flat penalty.
//! - [`ProfileSolver`] precomputes one arc-cost matrix per vehicle-class
//!   profile and runs iterated local search under a single seed, with
//!   prize-weighted dropping.
//!
//! Around them: a deterministic multi-strategy race, a greedy fallback for
//! when an engine comes back empty, and a per-route TSP refinement stage.

#![forbid(unsafe_code)]

mod construct;
mod cost;
mod dimensions;
mod greedy;
mod model;
mod parallel;
mod profiles;
mod search;
mod state;
mod tsp;

pub use dimensions::{DimensionSolver, SearchConfig};
pub use greedy::GreedySolver;
pub use parallel::{select_winner, solve_parallel, ParallelConfig};
pub use profiles::ProfileSolver;
pub use tsp::{refine_routes, TspConfig};
