//! Facade crate for the drover fleet routing optimiser.
//!
//! Re-exports the core domain types and exposes the [`Planner`], which wires
//! the pipeline end to end: warehouse allocation, matrix building, urban
//! traffic adjustment, CVRP search, greedy fallback, and TSP refinement.

#![forbid(unsafe_code)]

mod planner;

pub use planner::{Plan, PlanError, Planner};

pub use drover_core::{
    allocate, Allocation, ArcCostPolicy, CenterZone, Customer, CustomerError, DepartureTime,
    DepotSet, DropPolicy, Fleet, GatewayError, MatrixError, PlannerConfig, ProgressReporter,
    Route, RoutingEngine, RoutingGateway, RoutingProblem, Solution, SolveError, Solver,
    SolverKind, TrafficZone, TravelMatrix, VehicleClass, VehicleSpec, VehicleUnit,
    WarehousePolicy,
};
pub use drover_matrix::{
    HaversineGateway, MatrixBuilder, MatrixBuilderConfig, MatrixCache, OsrmConfig, OsrmGateway,
    ValhallaConfig, ValhallaGateway,
};
pub use drover_solver::{DimensionSolver, GreedySolver, ProfileSolver, SearchConfig, TspConfig};
