//! End-to-end scenarios on the planning pipeline, driven through an offline
//! geometry gateway so no routing server is involved.

use rstest::rstest;

use drover::{Customer, Plan, PlanError, Planner, PlannerConfig, VehicleClass};
use drover_core::config::VehicleSection;
use drover_core::test_support::FixedGeometryGateway;

const DEPOT: (f64, f64) = (42.6958, 23.2317);

fn vehicle_section(class: VehicleClass, capacity: u32, count: u32) -> VehicleSection {
    let raw = format!(
        r#"{{ "class": "{class}", "capacity": {capacity}, "count": {count}, "start_depot": [{}, {}] }}"#,
        DEPOT.0, DEPOT.1,
    );
    serde_json::from_str(&raw).expect("vehicle section should parse")
}

fn base_config(vehicles: Vec<VehicleSection>) -> PlannerConfig {
    let mut config = PlannerConfig::default();
    config.vehicles = vehicles;
    config.locations.depot_location = DEPOT;
    config.cache.enabled = false;
    config.cvrp.solver = drover::SolverKind::Dimensions;
    config.cvrp.time_limit_seconds = 2;
    config.cvrp.lns_time_limit_seconds = 0.5;
    config.cvrp.enable_parallel_solving = false;
    config.cvrp.enable_final_depot_reconfiguration = false;
    config
}

fn plan(config: PlannerConfig, customers: &[Customer]) -> Result<Plan, PlanError> {
    Planner::new(config).plan_with_gateway(customers, &FixedGeometryGateway::default(), None)
}

fn customer(id: &str, lat: f64, lon: f64, demand: f64) -> Customer {
    Customer::new(id, format!("Customer {id}"), lat, lon, demand).unwrap()
}

/// Three nearby customers, one roomy vehicle: a single route serves all.
#[rstest]
fn trivial_scenario_serves_all_three() {
    let config = base_config(vec![vehicle_section(VehicleClass::Internal, 100, 1)]);
    let customers = vec![
        customer("a", 42.70, 23.32, 10.0),
        customer("b", 42.71, 23.33, 10.0),
        customer("c", 42.72, 23.34, 10.0),
    ];

    let plan = plan(config, &customers).unwrap();
    assert_eq!(plan.allocation.warehouse.len(), 0);
    assert_eq!(plan.solution.routes.len(), 1);
    assert!(plan.solution.dropped.is_empty());
    assert_eq!(plan.solution.routes[0].customers.len(), 3);
    assert_eq!(plan.matrix_size, 4);
}

/// Total demand above fleet capacity: the allocator holds two customers
/// back for the warehouse before the solver ever runs.
#[rstest]
fn overflow_scenario_fills_the_warehouse() {
    let config = base_config(vec![vehicle_section(VehicleClass::Internal, 100, 1)]);
    let customers: Vec<Customer> = (0..5)
        .map(|i| customer(&format!("c{i}"), 42.70 + f64::from(i) * 0.005, 23.32, 30.0))
        .collect();

    let plan = plan(config, &customers).unwrap();
    assert_eq!(plan.allocation.serviceable.len(), 3);
    assert_eq!(plan.allocation.warehouse.len(), 2);
    let served: usize = plan.solution.routes.iter().map(|r| r.customers.len()).sum();
    assert_eq!(served, 3);
    assert!((plan.allocation.served_volume - 90.0).abs() < 1e-9);
}

/// A customer bigger than any single vehicle goes straight to the
/// warehouse and produces no route.
#[rstest]
fn oversized_scenario_routes_nothing() {
    let config = base_config(vec![vehicle_section(VehicleClass::Internal, 385, 1)]);
    let customers = vec![customer("giant", 42.71, 23.33, 500.0)];

    let plan = plan(config, &customers).unwrap();
    assert!(plan.solution.routes.is_empty());
    assert_eq!(plan.allocation.warehouse.len(), 1);
    assert!(plan.allocation.serviceable.is_empty());
}

/// Urban-disk durations scale by the multiplier; distances never move.
#[rstest]
fn traffic_adjustment_scales_durations_only() {
    let customers = vec![
        customer("u1", 42.6990, 23.3250, 10.0),
        customer("u2", 42.7050, 23.3300, 10.0),
    ];
    let vehicles = vec![vehicle_section(VehicleClass::Internal, 100, 1)];

    let mut off = base_config(vehicles.clone());
    off.locations.enable_city_traffic_adjustment = false;
    let plan_off = plan(off, &customers).unwrap();

    let mut on = base_config(vehicles);
    on.locations.enable_city_traffic_adjustment = true;
    on.locations.city_traffic_duration_multiplier = 1.6;
    let plan_on = plan(on, &customers).unwrap();

    let route_off = &plan_off.solution.routes[0];
    let route_on = &plan_on.solution.routes[0];
    assert_eq!(route_off.customers, route_on.customers);
    assert_eq!(route_off.total_distance_m, route_on.total_distance_m);

    // Strip service time, then travel should scale by the multiplier.
    let service = 2 * 7 * 60; // two stops at the internal default
    let travel_off = route_off.total_duration_s - service;
    let travel_on = route_on.total_duration_s - service;
    let expected = (travel_off as f64 * 1.6).round() as i64;
    assert!(
        (travel_on - expected).abs() <= 5,
        "travel {travel_on}s should be about {expected}s",
    );
}

/// No customers at all is invalid input, exit code 2.
#[rstest]
fn empty_input_is_an_error() {
    let config = base_config(vec![vehicle_section(VehicleClass::Internal, 100, 1)]);
    let err = plan(config, &[]).unwrap_err();
    assert!(matches!(err, PlanError::NoCustomers));
    assert_eq!(err.exit_code(), 2);
}

/// A fleet with nothing enabled yields an empty plan, not an error.
#[rstest]
fn disabled_fleet_sends_everyone_to_the_warehouse() {
    let mut section = vehicle_section(VehicleClass::Internal, 100, 1);
    section.enabled = false;
    let config = base_config(vec![section]);
    let customers = vec![customer("a", 42.70, 23.32, 10.0)];

    let plan = plan(config, &customers).unwrap();
    assert!(plan.solution.routes.is_empty());
    assert_eq!(plan.allocation.warehouse.len(), 1);
    assert_eq!(plan.matrix_size, 0);
}

/// The profile engine drives the same pipeline to the same contract.
#[rstest]
fn profile_engine_runs_the_pipeline() {
    let mut config = base_config(vec![vehicle_section(VehicleClass::Internal, 100, 1)]);
    config.cvrp.solver = drover::SolverKind::Profiles;
    let customers = vec![
        customer("a", 42.70, 23.32, 10.0),
        customer("b", 42.71, 23.33, 10.0),
    ];

    let plan = plan(config, &customers).unwrap();
    assert_eq!(plan.solution.routes.len(), 1);
    assert!(plan.solution.dropped.is_empty());
}

/// The multi-strategy race returns a winner through the same seam.
#[rstest]
fn parallel_mode_produces_a_winner() {
    let mut config = base_config(vec![vehicle_section(VehicleClass::Internal, 100, 2)]);
    config.cvrp.enable_parallel_solving = true;
    config.cvrp.num_workers = 2;
    config.cvrp.time_limit_seconds = 1;
    let customers: Vec<Customer> = (0..6)
        .map(|i| customer(&format!("c{i}"), 42.70 + f64::from(i) * 0.004, 23.32, 20.0))
        .collect();

    let plan = plan(config, &customers).unwrap();
    let served: usize = plan.solution.routes.iter().map(|r| r.customers.len()).sum();
    assert_eq!(served, 6);
}

/// TSP refinement keeps totals consistent with the matrix after reordering.
#[rstest]
fn final_reconfiguration_keeps_routes_feasible() {
    let mut config = base_config(vec![vehicle_section(VehicleClass::Internal, 200, 1)]);
    config.cvrp.enable_final_depot_reconfiguration = true;
    let customers: Vec<Customer> = (0..5)
        .map(|i| customer(&format!("c{i}"), 42.70 + f64::from(i) * 0.006, 23.32, 10.0))
        .collect();

    let plan = plan(config, &customers).unwrap();
    let route = &plan.solution.routes[0];
    assert!(route.feasible);
    assert_eq!(route.customers.len(), 5);
    assert!(route.total_distance_m > 0);
}
