//! Core domain types for the drover fleet routing optimiser.
//!
//! This crate defines the data model shared by the matrix and solver crates:
//! customers, vehicle fleets, travel matrices, the routing gateway seam, and
//! the solver contract. Constructors validate their input and return `Result`
//! so that malformed data surfaces early rather than deep inside a search.

#![forbid(unsafe_code)]

pub mod allocator;
pub mod config;
pub mod customer;
pub mod gateway;
pub mod geometry;
pub mod ingest;
pub mod matrix;
pub mod progress;
pub mod solve;
pub mod test_support;
pub mod traffic;
pub mod vehicle;

pub use allocator::{allocate, Allocation, WarehousePolicy};
pub use config::{
    ConfigError, FirstSolutionStrategy, LocalSearchMetaheuristic, PlannerConfig, RoutingEngine,
    SolverKind,
};
pub use customer::{Customer, CustomerError};
pub use gateway::{
    DepartureTime, DepartureTimeError, GatewayError, MatrixResponse, RouteGeometry, RouteLeg,
    RoutingGateway,
};
pub use geometry::{coord, haversine_km, haversine_m};
pub use matrix::{MatrixError, TravelMatrix};
pub use progress::{LogReporter, ProgressReporter, SilentReporter};
pub use solve::{
    ArcCostPolicy, CenterZone, DropPolicy, Route, RoutingProblem, Solution, SolveError, Solver,
};
pub use traffic::{adjust_durations, TrafficZone, TrafficZoneError};
pub use vehicle::{DepotSet, Fleet, VehicleClass, VehicleError, VehicleSpec, VehicleUnit};
