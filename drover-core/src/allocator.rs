//! Warehouse allocation.
//!
//! Decides which customers the fleet can serve at all before any routing
//! happens. Customers the fleet cannot or may not carry go to the warehouse
//! list; the rest form the serviceable pool handed to the solver.
//!
//! Sorting small demands first, and among equal demands the farthest
//! customers first, gives the router the densest candidate pool while the
//! admission walk refuses outliers up front.

use geo::Coord;

use crate::customer::Customer;
use crate::geometry::haversine_km;
use crate::vehicle::Fleet;

/// Policy caps applied during allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct WarehousePolicy {
    /// Per-customer volume ceiling; larger orders ship from the warehouse.
    pub max_customer_volume: f64,
    /// Fraction of the total fleet capacity the walk may fill.
    pub capacity_tolerance: f64,
}

impl Default for WarehousePolicy {
    fn default() -> Self {
        Self {
            max_customer_volume: 120.0,
            capacity_tolerance: 1.0,
        }
    }
}

/// Result of splitting customers into serviceable and warehouse sets.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Customers the solver will route, in admission order.
    pub serviceable: Vec<Customer>,
    /// Customers left to the warehouse.
    pub warehouse: Vec<Customer>,
    /// Total enabled fleet capacity.
    pub capacity_total: u64,
    /// Demand volume admitted to the serviceable pool.
    pub served_volume: f64,
    /// `served_volume / capacity_total`, zero for an empty fleet.
    pub utilisation: f64,
}

/// Partition `customers` into serviceable and warehouse sets.
///
/// Admission order: demand ascending, then distance from the main depot
/// descending, then id ascending. A customer goes to the warehouse when its
/// demand exceeds the largest single vehicle, when it exceeds the policy
/// ceiling, or when admitting it would overflow the tolerated fleet
/// capacity. Deterministic for a fixed input.
#[must_use]
pub fn allocate(
    customers: &[Customer],
    fleet: &Fleet,
    policy: &WarehousePolicy,
    main_depot: Coord<f64>,
) -> Allocation {
    let capacity_total = fleet.total_capacity();
    let capacity_max_single = fleet.max_single_capacity();
    let budget = capacity_total as f64 * policy.capacity_tolerance;

    let mut ordered: Vec<&Customer> = customers.iter().collect();
    ordered.sort_by(|a, b| {
        a.demand
            .total_cmp(&b.demand)
            .then_with(|| {
                haversine_km(b.location, main_depot).total_cmp(&haversine_km(a.location, main_depot))
            })
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut serviceable = Vec::new();
    let mut warehouse = Vec::new();
    let mut used = 0.0f64;

    for customer in ordered {
        if f64::from(capacity_max_single) < customer.demand {
            log::warn!(
                "customer {} (volume {:.2}) exceeds the largest vehicle ({capacity_max_single}), sending to the warehouse",
                customer.id,
                customer.demand,
            );
            warehouse.push(customer.clone());
        } else if customer.demand > policy.max_customer_volume {
            log::info!(
                "customer {} (volume {:.2}) exceeds the policy ceiling ({:.2}), sending to the warehouse",
                customer.id,
                customer.demand,
                policy.max_customer_volume,
            );
            warehouse.push(customer.clone());
        } else if used + customer.demand <= budget {
            used += customer.demand;
            serviceable.push(customer.clone());
        } else {
            warehouse.push(customer.clone());
        }
    }

    let utilisation = if capacity_total > 0 {
        used / capacity_total as f64
    } else {
        0.0
    };
    log::info!(
        "allocation: {} serviceable, {} warehouse, utilisation {:.1}%",
        serviceable.len(),
        warehouse.len(),
        utilisation * 100.0,
    );

    Allocation {
        serviceable,
        warehouse,
        capacity_total,
        served_volume: used,
        utilisation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::coord;
    use crate::vehicle::{VehicleClass, VehicleSpec};
    use rstest::rstest;

    fn fleet_of_one(capacity: u32) -> Fleet {
        Fleet::new(vec![VehicleSpec {
            class: VehicleClass::Internal,
            capacity,
            count: 1,
            max_distance_km: None,
            max_time_minutes: 480,
            service_minutes: 7,
            start_minute: 480,
            max_stops: None,
            enabled: true,
            start_depot: coord(42.70, 23.32),
            tsp_origin: None,
        }])
        .unwrap()
    }

    fn customer(id: &str, lat: f64, demand: f64) -> Customer {
        Customer::new(id, id, lat, 23.32, demand).unwrap()
    }

    #[rstest]
    fn overflow_leaves_the_remainder_in_the_warehouse() {
        let fleet = fleet_of_one(100);
        let customers: Vec<Customer> = (0..5)
            .map(|i| customer(&format!("c{i}"), 42.70 + f64::from(i) * 0.01, 30.0))
            .collect();
        let allocation = allocate(
            &customers,
            &fleet,
            &WarehousePolicy::default(),
            coord(42.70, 23.32),
        );
        assert_eq!(allocation.serviceable.len(), 3);
        assert_eq!(allocation.warehouse.len(), 2);
        assert!((allocation.served_volume - 90.0).abs() < 1e-9);
        assert!((allocation.utilisation - 0.9).abs() < 1e-9);
    }

    #[rstest]
    fn oversized_customer_goes_straight_to_the_warehouse() {
        let fleet = fleet_of_one(385);
        let customers = vec![customer("big", 42.71, 500.0)];
        let allocation = allocate(
            &customers,
            &fleet,
            &WarehousePolicy::default(),
            coord(42.70, 23.32),
        );
        assert!(allocation.serviceable.is_empty());
        assert_eq!(allocation.warehouse.len(), 1);
    }

    #[rstest]
    fn policy_ceiling_overrides_fleet_capacity() {
        let fleet = fleet_of_one(385);
        let customers = vec![customer("heavy", 42.71, 150.0)];
        let policy = WarehousePolicy {
            max_customer_volume: 120.0,
            capacity_tolerance: 1.0,
        };
        let allocation = allocate(&customers, &fleet, &policy, coord(42.70, 23.32));
        assert!(allocation.serviceable.is_empty());
    }

    #[rstest]
    fn admission_prefers_small_then_far() {
        let fleet = fleet_of_one(40);
        let near_small = customer("near-small", 42.701, 10.0);
        let far_small = customer("far-small", 42.90, 10.0);
        let big = customer("big", 42.75, 30.0);
        let allocation = allocate(
            &[big, near_small, far_small],
            &fleet,
            &WarehousePolicy::default(),
            coord(42.70, 23.32),
        );
        let ids: Vec<&str> = allocation.serviceable.iter().map(|c| c.id.as_str()).collect();
        // Both small customers fit; the far one is admitted first. The big
        // order would overflow 40 and stays behind.
        assert_eq!(ids, vec!["far-small", "near-small"]);
        assert_eq!(allocation.warehouse.len(), 1);
    }

    #[rstest]
    fn split_is_deterministic_across_runs() {
        let fleet = fleet_of_one(100);
        let customers: Vec<Customer> = (0..20)
            .map(|i| customer(&format!("c{i:02}"), 42.70 + f64::from(i % 7) * 0.02, 10.0 + f64::from(i % 3)))
            .collect();
        let policy = WarehousePolicy::default();
        let depot = coord(42.70, 23.32);
        let first = allocate(&customers, &fleet, &policy, depot);
        let second = allocate(&customers, &fleet, &policy, depot);
        assert_eq!(first, second);
    }

    #[rstest]
    fn empty_fleet_sends_everything_to_the_warehouse() {
        let fleet = Fleet::new(Vec::new()).unwrap();
        let customers = vec![customer("c1", 42.71, 10.0)];
        let allocation = allocate(
            &customers,
            &fleet,
            &WarehousePolicy::default(),
            coord(42.70, 23.32),
        );
        assert!(allocation.serviceable.is_empty());
        assert_eq!(allocation.warehouse.len(), 1);
        assert!((allocation.utilisation - 0.0).abs() < f64::EPSILON);
    }
}
