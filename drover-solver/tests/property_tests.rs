//! Property-based tests for the solver invariants.
//!
//! For every generated instance, a solution must partition the serviceable
//! set, respect each unit's hard dimensions, close its routes at the start
//! depot, and never exceed the configured fleet.


use std::collections::{HashMap, HashSet};
use std::time::Duration;

use proptest::prelude::*;

use drover_core::solve::{DropPolicy, Solver};
use drover_core::vehicle::VehicleClass;
use drover_solver::{DimensionSolver, SearchConfig};
use scenario_support::{customer, vehicle, Fixture};

const DEPOT: (f64, f64) = (42.6958, 23.2317);

fn tight_config(seed: u64) -> SearchConfig {
    SearchConfig {
        time_limit: Duration::from_millis(300),
        inner_limit: Duration::from_millis(100),
        seed,
        ..SearchConfig::default()
    }
}

prop_compose! {
    fn instance_strategy()(
        demands in prop::collection::vec(1.0f64..50.0, 3..12),
        capacity in 60u32..160,
        vehicle_count in 1u32..4,
        max_stops in prop::option::of(2u32..8),
        seed in any::<u64>(),
    ) -> (Vec<f64>, u32, u32, Option<u32>, u64) {
        (demands, capacity, vehicle_count, max_stops, seed)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn solutions_respect_every_hard_invariant(
        (demands, capacity, vehicle_count, max_stops, seed) in instance_strategy()
    ) {
        let customers: Vec<_> = demands
            .iter()
            .enumerate()
            .map(|(i, &demand)| {
                customer(
                    &format!("c{i:02}"),
                    42.68 + (i % 4) as f64 * 0.01,
                    23.30 + (i / 4) as f64 * 0.01,
                    demand,
                )
            })
            .collect();
        let mut spec = vehicle(VehicleClass::Internal, capacity, vehicle_count, DEPOT);
        spec.max_stops = max_stops;
        let fixture = Fixture::new(DEPOT, customers, vec![spec])
            .with_drop_policy(DropPolicy::Fixed { penalty: 45_000 });
        let problem = fixture.problem();

        let solution = DimensionSolver::new(tight_config(seed))
            .solve(&problem)
            .expect("dropping is allowed, so a solution always exists");

        // Partition: every customer appears exactly once, served or dropped.
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for route in &solution.routes {
            for id in &route.customers {
                *seen.entry(id.as_str()).or_insert(0) += 1;
            }
        }
        for id in &solution.dropped {
            *seen.entry(id.as_str()).or_insert(0) += 1;
        }
        prop_assert_eq!(seen.len(), fixture.customers.len());
        for customer in &fixture.customers {
            prop_assert_eq!(
                seen.get(customer.id.as_str()).copied(),
                Some(1),
                "customer {} must appear exactly once",
                customer.id
            );
        }

        // Fleet count: no more routes than configured units, one per unit.
        prop_assert!(solution.routes.len() <= vehicle_count as usize);
        let units_used: HashSet<usize> = solution.routes.iter().map(|r| r.vehicle).collect();
        prop_assert_eq!(units_used.len(), solution.routes.len());

        for route in &solution.routes {
            let unit = &fixture.units[route.vehicle];

            // Capacity.
            prop_assert!(route.total_demand <= f64::from(unit.capacity) + 1e-9);
            // Stops.
            if let Some(max) = unit.max_stops {
                prop_assert!(route.customers.len() <= max as usize);
            }
            // Time, including service.
            prop_assert!(route.total_duration_s <= unit.max_time_seconds);
            // Depot closure.
            prop_assert_eq!(route.start_depot, unit.start_depot);
            // The route must be self-consistent with the matrix walk.
            prop_assert!(route.feasible);
            prop_assert!(route.total_distance_m >= 0);
        }
    }

    #[test]
    fn ample_capacity_always_serves_everyone(seed in any::<u64>()) {
        let customers: Vec<_> = (0..6)
            .map(|i| customer(&format!("c{i}"), 42.69 + f64::from(i) * 0.004, 23.31, 12.0))
            .collect();
        let fixture = Fixture::new(
            DEPOT,
            customers,
            vec![vehicle(VehicleClass::Internal, 60, 2, DEPOT)],
        )
        .with_drop_policy(DropPolicy::Fixed { penalty: 45_000 });
        let problem = fixture.problem();

        // Capacity comfortably covers the demand, and serving always beats
        // the 45 000 drop penalty, so every run must serve all six customers
        // regardless of how far the metaheuristic got before its deadline.
        let first = DimensionSolver::new(tight_config(seed)).solve(&problem).unwrap();
        let second = DimensionSolver::new(tight_config(seed)).solve(&problem).unwrap();
        let served = |s: &drover_core::Solution| -> HashSet<String> {
            s.routes.iter().flat_map(|r| r.customers.clone()).collect()
        };
        prop_assert_eq!(served(&first).len(), 6);
        prop_assert_eq!(served(&second).len(), 6);
    }
}
