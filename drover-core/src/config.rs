//! Planner configuration.
//!
//! A closed record: every section rejects unknown keys at load so a typo in
//! a config file fails loudly instead of silently using a default. Defaults
//! mirror the production deployment.

use serde::Deserialize;
use thiserror::Error;

use crate::gateway::{DepartureTime, DepartureTimeError};
use crate::geometry::coord;
use crate::solve::{ArcCostPolicy, CenterZone};
use crate::traffic::{TrafficZone, TrafficZoneError};
use crate::vehicle::{Fleet, VehicleClass, VehicleError, VehicleSpec};
use crate::WarehousePolicy;

/// Which road-network engine computes the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingEngine {
    /// Static routing, no time dependence.
    Static,
    /// Time-dependent routing honouring the departure time.
    TimeDependent,
}

/// Which solver engine runs the CVRP search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Four-dimension route state with a per-vehicle arc-cost evaluator.
    Dimensions,
    /// Iterated local search over per-class profile cost matrices.
    Profiles,
}

/// First-solution construction heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstSolutionStrategy {
    /// Let the engine pick.
    Automatic,
    /// Clarke-Wright savings merges.
    Savings,
    /// Fill one route at a time by cheapest insertion.
    CheapestInsertion,
    /// Grow all routes simultaneously by globally cheapest insertion.
    ParallelCheapestInsertion,
    /// Nearest-arc chain growth per vehicle.
    PathCheapestArc,
    /// Farthest-seed insertion in the Christofides spirit.
    Christofides,
}

/// Local-search metaheuristic applied after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalSearchMetaheuristic {
    /// Let the engine pick.
    Automatic,
    /// Guided local search with arc penalties.
    GuidedLocalSearch,
    /// Simulated annealing.
    SimulatedAnnealing,
    /// Tabu search.
    TabuSearch,
}

/// `routing` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RoutingSection {
    /// Preferred engine.
    pub engine: RoutingEngine,
    /// Whether the time-dependent engine may use the departure time.
    pub enable_time_dependent: bool,
    /// Departure time as `"HH:MM"`.
    pub departure_time: String,
    /// Base URL of the static provider.
    pub static_url: String,
    /// Optional public mirror tried when the primary provider fails.
    pub fallback_url: Option<String>,
    /// Base URL of the time-dependent provider.
    pub time_dependent_url: String,
    /// Costing profile (e.g. `"driving"`, `"auto"`, `"truck"`).
    pub costing_profile: String,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Average speed for haversine fallbacks, km/h.
    pub average_speed_kmh: f64,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            engine: RoutingEngine::Static,
            enable_time_dependent: true,
            departure_time: "08:00".to_owned(),
            static_url: "http://localhost:5000".to_owned(),
            fallback_url: Some("http://router.project-osrm.org".to_owned()),
            time_dependent_url: "http://localhost:8002".to_owned(),
            costing_profile: "driving".to_owned(),
            timeout_seconds: 60,
            average_speed_kmh: 40.0,
        }
    }
}

impl RoutingSection {
    /// Parse the configured departure time.
    pub fn departure(&self) -> Result<DepartureTime, DepartureTimeError> {
        DepartureTime::parse(&self.departure_time)
    }
}

/// `locations` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LocationsSection {
    /// Main depot `(lat, lon)`.
    pub depot_location: (f64, f64),
    /// Centre-zone centre `(lat, lon)`.
    pub center_location: (f64, f64),
    /// Centre-zone radius in kilometres.
    pub center_zone_radius_km: f64,
    /// Whether centre-zone cost shaping is active.
    pub enable_center_zone_restrictions: bool,
    /// Penalty metres for an external-class arc into the zone.
    pub external_bus_center_penalty_multiplier: f64,
    /// Penalty metres for an internal-class arc into the zone.
    pub internal_bus_center_penalty_multiplier: f64,
    /// Discount multiplier for the centre class inside the zone.
    pub center_bus_discount: f64,
    /// Urban traffic disk centre `(lat, lon)`.
    pub city_center_coords: (f64, f64),
    /// Urban traffic disk radius in kilometres.
    pub city_traffic_radius_km: f64,
    /// Duration multiplier inside the urban disk.
    pub city_traffic_duration_multiplier: f64,
    /// Whether the urban traffic adjustment runs.
    pub enable_city_traffic_adjustment: bool,
}

impl Default for LocationsSection {
    fn default() -> Self {
        Self {
            depot_location: (42.695_785, 23.231_659),
            center_location: (42.697_357, 23.323_810),
            center_zone_radius_km: 1.7,
            enable_center_zone_restrictions: true,
            external_bus_center_penalty_multiplier: 40_000.0,
            internal_bus_center_penalty_multiplier: 40_000.0,
            center_bus_discount: 0.5,
            city_center_coords: (42.6977, 23.3219),
            city_traffic_radius_km: 10.0,
            city_traffic_duration_multiplier: 1.6,
            enable_city_traffic_adjustment: true,
        }
    }
}

impl LocationsSection {
    /// The centre zone, when restrictions are enabled.
    #[must_use]
    pub fn center_zone(&self) -> Option<CenterZone> {
        self.enable_center_zone_restrictions.then(|| CenterZone {
            center: coord(self.center_location.0, self.center_location.1),
            radius_km: self.center_zone_radius_km,
        })
    }

    /// Arc-cost shaping derived from the penalties and discount.
    #[must_use]
    pub fn arc_cost_policy(&self) -> ArcCostPolicy {
        ArcCostPolicy {
            enabled: self.enable_center_zone_restrictions,
            center_discount: self.center_bus_discount,
            out_of_zone_penalty: self.external_bus_center_penalty_multiplier.round() as i64,
            in_zone_penalty: self.internal_bus_center_penalty_multiplier.round() as i64,
        }
    }

    /// The urban traffic zone, when the adjustment is enabled.
    pub fn traffic_zone(&self) -> Result<Option<TrafficZone>, TrafficZoneError> {
        if !self.enable_city_traffic_adjustment {
            return Ok(None);
        }
        TrafficZone::new(
            coord(self.city_center_coords.0, self.city_center_coords.1),
            self.city_traffic_radius_km,
            self.city_traffic_duration_multiplier,
        )
        .map(Some)
    }
}

/// One vehicle record in the `vehicles` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VehicleSection {
    /// Vehicle class.
    pub class: VehicleClass,
    /// Capacity in stock units.
    pub capacity: u32,
    /// Number of units.
    pub count: u32,
    /// Optional distance ceiling in kilometres.
    #[serde(default)]
    pub max_distance_km: Option<f64>,
    /// Time budget in minutes; defaults to eight hours.
    #[serde(default)]
    pub max_time_minutes: Option<u32>,
    /// Service minutes per stop; defaults per class.
    #[serde(default)]
    pub service_minutes: Option<u32>,
    /// Start minute of day; defaults per class.
    #[serde(default)]
    pub start_minute: Option<u32>,
    /// Optional stop ceiling per route.
    #[serde(default)]
    pub max_stops: Option<u32>,
    /// Whether the type participates; defaults to true.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Start depot `(lat, lon)`; defaults to the main depot.
    #[serde(default)]
    pub start_depot: Option<(f64, f64)>,
    /// TSP origin `(lat, lon)`; defaults to the start depot.
    #[serde(default)]
    pub tsp_origin: Option<(f64, f64)>,
}

impl VehicleSection {
    fn to_spec(&self, main_depot: (f64, f64)) -> VehicleSpec {
        let start = self.start_depot.unwrap_or(main_depot);
        VehicleSpec {
            class: self.class,
            capacity: self.capacity,
            count: self.count,
            max_distance_km: self.max_distance_km,
            max_time_minutes: self.max_time_minutes.unwrap_or(480),
            service_minutes: self
                .service_minutes
                .unwrap_or_else(|| self.class.default_service_minutes()),
            start_minute: self
                .start_minute
                .unwrap_or_else(|| self.class.default_start_minute()),
            max_stops: self.max_stops,
            enabled: self.enabled,
            start_depot: coord(start.0, start.1),
            tsp_origin: self.tsp_origin.map(|(lat, lon)| coord(lat, lon)),
        }
    }
}

/// `warehouse` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WarehouseSection {
    /// Per-customer volume ceiling.
    pub max_customer_volume: f64,
    /// Fraction of fleet capacity the allocator may fill.
    pub capacity_tolerance: f64,
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            max_customer_volume: 120.0,
            capacity_tolerance: 1.0,
        }
    }
}

impl WarehouseSection {
    /// As an allocator policy.
    #[must_use]
    pub fn policy(&self) -> WarehousePolicy {
        WarehousePolicy {
            max_customer_volume: self.max_customer_volume,
            capacity_tolerance: self.capacity_tolerance,
        }
    }
}

/// `cvrp` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CvrpSection {
    /// Engine selection.
    pub solver: SolverKind,
    /// Wall-clock budget per engine run, seconds.
    pub time_limit_seconds: u64,
    /// Whether the engine may drop customers.
    pub allow_customer_skipping: bool,
    /// Flat penalty for dropping a customer, matrix units.
    pub drop_penalty: i64,
    /// Demand coefficient of the prize drop cost.
    pub prize_demand_coefficient: i64,
    /// Construction heuristic for single-run mode.
    pub first_solution_strategy: FirstSolutionStrategy,
    /// Metaheuristic for single-run mode.
    pub local_search_metaheuristic: LocalSearchMetaheuristic,
    /// Inner improvement budget in seconds.
    pub lns_time_limit_seconds: f64,
    /// Neighbourhood size for relocation candidates.
    pub lns_num_nodes: usize,
    /// Neighbourhood size for arc-exchange candidates.
    pub lns_num_arcs: usize,
    /// Guided-local-search lambda coefficient.
    pub search_lambda_coefficient: f64,
    /// Whether the multi-strategy race runs.
    pub enable_parallel_solving: bool,
    /// Worker count; `-1` means cores minus one.
    pub num_workers: i32,
    /// Construction heuristics raced in parallel mode, drawn cyclically.
    pub parallel_first_solution_strategies: Vec<FirstSolutionStrategy>,
    /// Metaheuristics raced in parallel mode, drawn cyclically.
    pub parallel_local_search_metaheuristics: Vec<LocalSearchMetaheuristic>,
    /// Whether the TSP stage re-sequences every route.
    pub enable_final_depot_reconfiguration: bool,
}

impl Default for CvrpSection {
    fn default() -> Self {
        use FirstSolutionStrategy as Fs;
        use LocalSearchMetaheuristic as Ls;
        Self {
            solver: SolverKind::Profiles,
            time_limit_seconds: 30,
            allow_customer_skipping: true,
            drop_penalty: 45_000,
            prize_demand_coefficient: 100,
            first_solution_strategy: Fs::Christofides,
            local_search_metaheuristic: Ls::GuidedLocalSearch,
            lns_time_limit_seconds: 15.0,
            lns_num_nodes: 120,
            lns_num_arcs: 110,
            search_lambda_coefficient: 0.8,
            enable_parallel_solving: false,
            num_workers: -1,
            parallel_first_solution_strategies: vec![
                Fs::ParallelCheapestInsertion,
                Fs::Savings,
                Fs::ParallelCheapestInsertion,
                Fs::PathCheapestArc,
                Fs::Savings,
                Fs::ParallelCheapestInsertion,
                Fs::ParallelCheapestInsertion,
            ],
            parallel_local_search_metaheuristics: vec![
                Ls::GuidedLocalSearch,
                Ls::GuidedLocalSearch,
                Ls::GuidedLocalSearch,
                Ls::GuidedLocalSearch,
                Ls::SimulatedAnnealing,
                Ls::GuidedLocalSearch,
                Ls::GuidedLocalSearch,
            ],
            enable_final_depot_reconfiguration: true,
        }
    }
}

impl CvrpSection {
    /// Resolve the worker count against the machine's parallelism.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        if self.num_workers > 0 {
            return self.num_workers as usize;
        }
        let cores = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        cores.saturating_sub(1).max(1)
    }
}

/// `cache` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheSection {
    /// Whether matrix caching is active.
    pub enabled: bool,
    /// Cache directory.
    pub directory: String,
    /// Entry lifetime in seconds.
    pub ttl_seconds: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "cache".to_owned(),
            ttl_seconds: 24 * 3600,
        }
    }
}

/// The full planner configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PlannerConfig {
    /// Routing engine selection and endpoints.
    pub routing: RoutingSection,
    /// Geographic parameters.
    pub locations: LocationsSection,
    /// Fleet records.
    pub vehicles: Vec<VehicleSection>,
    /// Warehouse policy caps.
    pub warehouse: WarehouseSection,
    /// Solver parameters.
    pub cvrp: CvrpSection,
    /// Matrix cache settings.
    pub cache: CacheSection,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            routing: RoutingSection::default(),
            locations: LocationsSection::default(),
            vehicles: default_vehicles(),
            warehouse: WarehouseSection::default(),
            cvrp: CvrpSection::default(),
            cache: CacheSection::default(),
        }
    }
}

/// The production fleet used when no `vehicles` section is given.
fn default_vehicles() -> Vec<VehicleSection> {
    let locations = LocationsSection::default();
    let regional_depot = (43.221_043, 23.534_403);
    let vehicle = |class, capacity, count, enabled| VehicleSection {
        class,
        capacity,
        count,
        max_distance_km: None,
        max_time_minutes: None,
        service_minutes: None,
        start_minute: None,
        max_stops: None,
        enabled,
        start_depot: Some(locations.depot_location),
        tsp_origin: None,
    };
    vec![
        vehicle(VehicleClass::Internal, 385, 7, true),
        vehicle(VehicleClass::Center, 320, 1, true),
        vehicle(VehicleClass::External, 385, 3, false),
        vehicle(VehicleClass::Special, 300, 2, false),
        VehicleSection {
            max_stops: Some(40),
            start_depot: Some(regional_depot),
            tsp_origin: Some(regional_depot),
            ..vehicle(VehicleClass::Regional, 385, 3, false)
        },
    ]
}

/// Errors returned while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON document did not match the schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// A vehicle record failed validation.
    #[error(transparent)]
    Vehicle(#[from] VehicleError),
    /// The departure time was malformed.
    #[error(transparent)]
    Departure(#[from] DepartureTimeError),
    /// The traffic zone parameters were degenerate.
    #[error(transparent)]
    Traffic(#[from] TrafficZoneError),
}

impl PlannerConfig {
    /// Load a configuration from a JSON document.
    ///
    /// Unknown keys anywhere in the document fail the load.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Build the validated fleet from the vehicle records.
    pub fn fleet(&self) -> Result<Fleet, ConfigError> {
        let specs = self
            .vehicles
            .iter()
            .map(|v| v.to_spec(self.locations.depot_location))
            .collect();
        Ok(Fleet::new(specs)?)
    }

    /// The main depot coordinate.
    #[must_use]
    pub fn main_depot(&self) -> geo::Coord<f64> {
        coord(self.locations.depot_location.0, self.locations.depot_location.1)
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_carry_the_production_fleet() {
        let config = PlannerConfig::default();
        let fleet = config.fleet().unwrap();
        assert_eq!(fleet.specs().len(), 5);
        // Internal 385x7 plus centre 320x1 are the enabled defaults.
        assert_eq!(fleet.total_capacity(), 385 * 7 + 320);
    }

    #[rstest]
    fn unknown_keys_fail_loudly() {
        let raw = r#"{ "routing": { "enigne": "static" } }"#;
        assert!(matches!(
            PlannerConfig::from_json_str(raw),
            Err(ConfigError::Parse(_))
        ));
    }

    #[rstest]
    fn sections_default_when_omitted() {
        let config = PlannerConfig::from_json_str("{}").unwrap();
        assert_eq!(config.cvrp.time_limit_seconds, 30);
        assert_eq!(config.cache.ttl_seconds, 86_400);
        assert_eq!(config.routing.engine, RoutingEngine::Static);
    }

    #[rstest]
    fn solver_kind_parses_snake_case() {
        let raw = r#"{ "cvrp": { "solver": "dimensions" } }"#;
        let config = PlannerConfig::from_json_str(raw).unwrap();
        assert_eq!(config.cvrp.solver, SolverKind::Dimensions);
    }

    #[rstest]
    fn engine_names_parse() {
        let raw = r#"{ "routing": { "engine": "time_dependent" } }"#;
        let config = PlannerConfig::from_json_str(raw).unwrap();
        assert_eq!(config.routing.engine, RoutingEngine::TimeDependent);
    }

    #[rstest]
    fn departure_time_round_trips() {
        let config = PlannerConfig::default();
        let departure = config.routing.departure().unwrap();
        assert_eq!(departure.to_string(), "08:00");
    }

    #[rstest]
    fn traffic_zone_is_none_when_disabled() {
        let mut config = PlannerConfig::default();
        config.locations.enable_city_traffic_adjustment = false;
        assert!(config.locations.traffic_zone().unwrap().is_none());
    }
}
