//! Behavioural tests for ingest and warehouse allocation working together.

use rstest::rstest;

use drover_core::allocator::{allocate, WarehousePolicy};
use drover_core::geometry::coord;
use drover_core::ingest::{build_customers, CustomerRecord};
use drover_core::vehicle::{Fleet, VehicleClass, VehicleSpec};

fn record(id: &str, gps: &str, volume: f64) -> CustomerRecord {
    CustomerRecord {
        id: id.to_owned(),
        name: format!("Customer {id}"),
        gps: gps.to_owned(),
        volume,
    }
}

fn fleet(capacity: u32, count: u32) -> Fleet {
    Fleet::new(vec![VehicleSpec {
        class: VehicleClass::Internal,
        capacity,
        count,
        max_distance_km: None,
        max_time_minutes: 480,
        service_minutes: 7,
        start_minute: 480,
        max_stops: None,
        enabled: true,
        start_depot: coord(42.6958, 23.2317),
        tsp_origin: None,
    }])
    .unwrap()
}

#[rstest]
fn ingested_rows_flow_into_the_allocator() {
    let records = vec![
        record("a", "42.70, 23.32", 30.0),
        record("broken", "somewhere in town", 10.0),
        record("b", "42.71 23.33", 30.0),
        record("c", "N42.72, E23.34", 60.0),
    ];
    let customers = build_customers(&records).unwrap();
    assert_eq!(customers.len(), 3, "the unparseable row is dropped");

    let allocation = allocate(
        &customers,
        &fleet(100, 1),
        &WarehousePolicy::default(),
        coord(42.6958, 23.2317),
    );
    // 30 + 30 fit; adding 60 would overflow the single 100-unit vehicle.
    assert_eq!(allocation.serviceable.len(), 2);
    assert_eq!(allocation.warehouse.len(), 1);
    assert_eq!(allocation.warehouse[0].id, "c");
}

#[rstest]
fn allocation_is_stable_for_identical_inputs() {
    let records: Vec<CustomerRecord> = (0..30)
        .map(|i| {
            record(
                &format!("c{i:02}"),
                &format!("{}, {}", 42.65 + f64::from(i % 6) * 0.02, 23.28 + f64::from(i / 6) * 0.02),
                5.0 + f64::from(i % 4) * 10.0,
            )
        })
        .collect();
    let customers = build_customers(&records).unwrap();
    let fleet = fleet(120, 3);
    let policy = WarehousePolicy::default();
    let depot = coord(42.6958, 23.2317);

    let first = allocate(&customers, &fleet, &policy, depot);
    let second = allocate(&customers, &fleet, &policy, depot);
    assert_eq!(first, second);
    assert!(first.utilisation <= 1.0);
}
