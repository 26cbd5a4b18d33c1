//! The end-to-end planning pipeline.

use std::time::Duration;

use thiserror::Error;

use drover_core::allocator::{allocate, Allocation};
use drover_core::config::{ConfigError, PlannerConfig, RoutingEngine, SolverKind};
use drover_core::customer::Customer;
use drover_core::gateway::RoutingGateway;
use drover_core::progress::LogReporter;
use drover_core::solve::{DropPolicy, RoutingProblem, Solution, Solver};
use drover_core::traffic::adjust_durations;
use drover_matrix::{
    MatrixBuildError, MatrixBuilder, MatrixCache, OsrmConfig, OsrmGateway, ValhallaConfig,
    ValhallaGateway,
};
use drover_solver::{
    refine_routes, solve_parallel, DimensionSolver, GreedySolver, ParallelConfig, ProfileSolver,
    SearchConfig, TspConfig,
};

/// A finished planning run.
#[derive(Debug, Clone)]
pub struct Plan {
    /// The routing solution over the serviceable customers.
    pub solution: Solution,
    /// The warehouse split the solution was computed against.
    pub allocation: Allocation,
    /// Locations covered by the travel matrix.
    pub matrix_size: usize,
    /// Matrix cells estimated from geometry rather than a provider.
    pub degraded_cells: usize,
}

/// Errors terminating a planning run.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The customer list was empty after ingest.
    #[error("no valid customers to plan")]
    NoCustomers,
    /// The configuration failed to load or resolve.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No routing gateway could be constructed.
    #[error("routing provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// The matrix build failed outright.
    #[error(transparent)]
    Matrix(#[from] MatrixBuildError),
    /// Neither an engine nor the greedy fallback produced a solution.
    #[error("no feasible or greedy solution")]
    NoSolution,
}

impl PlanError {
    /// Process exit code for this failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoCustomers | Self::Config(_) => 2,
            Self::Matrix(_) | Self::NoSolution => 3,
            Self::ProviderUnavailable(_) => 4,
        }
    }
}

/// Orchestrates allocation, matrix building, solving, and refinement.
#[derive(Debug, Clone)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    /// Planner over a validated configuration.
    #[must_use]
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan against the configured routing providers.
    pub fn plan(&self, customers: &[Customer]) -> Result<Plan, PlanError> {
        let routing = &self.config.routing;
        let timeout = Duration::from_secs(routing.timeout_seconds);

        let static_gateway = OsrmGateway::new(OsrmConfig {
            base_url: routing.static_url.clone(),
            profile: routing.costing_profile.clone(),
            timeout,
            average_speed_kmh: routing.average_speed_kmh,
            ..OsrmConfig::default()
        })
        .map_err(|err| PlanError::ProviderUnavailable(err.to_string()))?;

        let mirror = routing
            .fallback_url
            .as_ref()
            .and_then(|url| {
                OsrmGateway::new(OsrmConfig {
                    base_url: url.clone(),
                    profile: routing.costing_profile.clone(),
                    timeout,
                    average_speed_kmh: routing.average_speed_kmh,
                    ..OsrmConfig::default()
                })
                .map_err(|err| log::warn!("public mirror unavailable: {err}"))
                .ok()
            });

        match routing.engine {
            RoutingEngine::TimeDependent => {
                let valhalla = ValhallaGateway::new(ValhallaConfig {
                    base_url: routing.time_dependent_url.clone(),
                    timeout,
                    ..ValhallaConfig::default()
                })
                .map_err(|err| PlanError::ProviderUnavailable(err.to_string()))?;
                if valhalla.is_reachable() {
                    self.plan_with_gateway(customers, &valhalla, Some(&static_gateway))
                } else {
                    // The time-dependent server is down; run the chain the
                    // static engine would use.
                    log::warn!("time-dependent provider down, planning with the static engine");
                    self.plan_with_gateway(
                        customers,
                        &static_gateway,
                        mirror.as_ref().map(|g| g as &dyn RoutingGateway),
                    )
                }
            }
            RoutingEngine::Static => self.plan_with_gateway(
                customers,
                &static_gateway,
                mirror.as_ref().map(|g| g as &dyn RoutingGateway),
            ),
        }
    }

    /// Plan with explicit gateways; the seam the tests drive.
    pub fn plan_with_gateway(
        &self,
        customers: &[Customer],
        gateway: &dyn RoutingGateway,
        fallback: Option<&dyn RoutingGateway>,
    ) -> Result<Plan, PlanError> {
        if customers.is_empty() {
            return Err(PlanError::NoCustomers);
        }
        let fleet = self.config.fleet()?;
        let main_depot = self.config.main_depot();
        let policy = self.config.warehouse.policy();
        let allocation = allocate(customers, &fleet, &policy, main_depot);

        if !fleet.has_enabled() || allocation.serviceable.is_empty() {
            // Nothing the fleet can do is a valid, empty outcome.
            return Ok(Plan {
                solution: Solution::empty(),
                allocation,
                matrix_size: 0,
                degraded_cells: 0,
            });
        }

        let depots = fleet.depot_set(main_depot);
        let mut locations = depots.coords().to_vec();
        locations.extend(allocation.serviceable.iter().map(|c| c.location));

        let routing = &self.config.routing;
        // Only the time-dependent engine keys matrices by departure time.
        let departure = (routing.engine == RoutingEngine::TimeDependent
            && routing.enable_time_dependent)
            .then(|| routing.departure())
            .transpose()
            .map_err(ConfigError::from)?;

        let cache = self.config.cache.enabled.then(|| {
            MatrixCache::new(
                self.config.cache.directory.clone(),
                Duration::from_secs(self.config.cache.ttl_seconds),
            )
        });

        let reporter = LogReporter;
        let mut builder = MatrixBuilder::new(gateway)
            .with_estimator_speed(routing.average_speed_kmh)
            .with_reporter(&reporter);
        if let Some(fallback) = fallback {
            builder = builder.with_fallback(fallback);
        }
        if let Some(cache) = cache.as_ref() {
            builder = builder.with_cache(cache);
        }
        let mut matrix = builder.build(&locations, departure)?;

        if let Some(zone) = self.config.locations.traffic_zone().map_err(ConfigError::from)? {
            adjust_durations(&mut matrix, &zone);
        }

        let cvrp = &self.config.cvrp;
        let units = fleet.expand_units(&depots);
        let drop_policy = cvrp.allow_customer_skipping.then(|| match cvrp.solver {
            SolverKind::Dimensions => DropPolicy::Fixed {
                penalty: cvrp.drop_penalty,
            },
            SolverKind::Profiles => DropPolicy::Prize {
                base: cvrp.drop_penalty,
                demand_coefficient: cvrp.prize_demand_coefficient,
            },
        });

        let problem = RoutingProblem {
            customers: &allocation.serviceable,
            units: &units,
            depots: &depots,
            matrix: &matrix,
            center_zone: self.config.locations.center_zone(),
            cost_policy: self.config.locations.arc_cost_policy(),
            drop_policy,
        };

        let engine_result = match cvrp.solver {
            SolverKind::Dimensions if cvrp.enable_parallel_solving => {
                solve_parallel(&problem, &ParallelConfig::from_cvrp(cvrp))
            }
            SolverKind::Dimensions => {
                DimensionSolver::new(SearchConfig::from_cvrp(cvrp)).solve(&problem)
            }
            SolverKind::Profiles => ProfileSolver::from_cvrp(cvrp).solve(&problem),
        };

        let mut solution = match engine_result {
            Ok(solution) => solution,
            Err(err) => {
                log::warn!("solver engine failed ({err}), running the greedy fallback");
                GreedySolver
                    .solve(&problem)
                    .map_err(|_| PlanError::NoSolution)?
            }
        };
        if matrix.degraded_cells() > 0 {
            solution.degraded = true;
        }

        let tsp = TspConfig {
            always: cvrp.enable_final_depot_reconfiguration,
            ..TspConfig::default()
        };
        refine_routes(&mut solution, &problem, &tsp);

        log::info!(
            "plan finished: {} routes, {} dropped, {} in the warehouse, fitness {:.0}",
            solution.routes.len(),
            solution.dropped.len(),
            allocation.warehouse.len(),
            solution.fitness,
        );

        Ok(Plan {
            solution,
            allocation,
            matrix_size: matrix.len(),
            degraded_cells: matrix.degraded_cells(),
        })
    }
}
