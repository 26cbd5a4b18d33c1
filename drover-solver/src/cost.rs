//! Arc-cost shaping for the centre zone.
//!
//! Two equivalent realisations of the same cost table: tagged dispatch on
//! the vehicle class for the dimension engine, and precomputed per-profile
//! matrices for the profile engine. Costs apply only when the destination is
//! a customer; arcs back to a depot always cost their raw distance.

use drover_core::solve::ArcCostPolicy;
use drover_core::vehicle::VehicleClass;

use crate::model::SolverModel;

/// Which cost realisation an engine runs with.
pub(crate) enum CostMode {
    /// Compute per arc, dispatching on the unit's class.
    ByClass,
    /// Index precomputed profile matrices by class.
    Profiles {
        /// Costs for centre-class units.
        center: Vec<Vec<i64>>,
        /// Costs for every other class.
        other: Vec<Vec<i64>>,
    },
}

impl CostMode {
    pub fn arc_cost(
        &self,
        model: &SolverModel<'_>,
        class: VehicleClass,
        from_node: usize,
        to_node: usize,
    ) -> i64 {
        match self {
            Self::ByClass => shaped_cost(model, class, from_node, to_node),
            Self::Profiles { center, other } => {
                let grid = if class == VehicleClass::Center {
                    center
                } else {
                    other
                };
                grid[from_node][to_node]
            }
        }
    }
}

/// The class/zone cost table, evaluated per arc.
fn shaped_cost(
    model: &SolverModel<'_>,
    class: VehicleClass,
    from_node: usize,
    to_node: usize,
) -> i64 {
    let distance = model.distance(from_node, to_node);
    let policy = &model.problem.cost_policy;
    if !policy.enabled {
        return distance;
    }
    let Some(customer) = model.customer_of_node(to_node) else {
        return distance;
    };
    let in_zone = model.in_zone[customer];
    if class == VehicleClass::Center {
        if in_zone {
            (distance as f64 * policy.center_discount).round() as i64
        } else {
            distance + policy.out_of_zone_penalty
        }
    } else if in_zone {
        distance + policy.in_zone_penalty
    } else {
        distance
    }
}

/// Precompute the two profile matrices over the full node set.
///
/// Both are derived from the traffic-adjusted matrix, so the urban
/// multiplier is in force for each profile exactly once.
pub(crate) fn profile_matrices(model: &SolverModel<'_>) -> (Vec<Vec<i64>>, Vec<Vec<i64>>) {
    let n = model.problem.matrix.len();
    let build = |class: VehicleClass| -> Vec<Vec<i64>> {
        (0..n)
            .map(|from| {
                (0..n)
                    .map(|to| shaped_cost(model, class, from, to))
                    .collect()
            })
            .collect()
    };
    (build(VehicleClass::Center), build(VehicleClass::Internal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::geometry::coord;
    use drover_core::matrix::TravelMatrix;
    use drover_core::solve::{CenterZone, RoutingProblem};
    use drover_core::vehicle::{DepotSet, Fleet, VehicleSpec};
    use drover_core::Customer;
    use rstest::rstest;

    fn fixture() -> (Vec<Customer>, Fleet, TravelMatrix) {
        let depot = coord(42.70, 23.30);
        // Customer 0 sits at the zone centre, customer 1 well outside it.
        let customers = vec![
            Customer::new("in", "in", 42.6974, 23.3238, 10.0).unwrap(),
            Customer::new("out", "out", 42.7600, 23.4500, 10.0).unwrap(),
        ];
        let specs = [VehicleClass::Center, VehicleClass::Internal]
            .into_iter()
            .map(|class| VehicleSpec {
                class,
                capacity: 100,
                count: 1,
                max_distance_km: None,
                max_time_minutes: 480,
                service_minutes: 7,
                start_minute: 480,
                max_stops: None,
                enabled: true,
                start_depot: depot,
                tsp_origin: None,
            })
            .collect();
        let fleet = Fleet::new(specs).unwrap();
        let locations = vec![depot, customers[0].location, customers[1].location];
        let distance = vec![
            vec![0, 1000, 2000],
            vec![1000, 0, 1500],
            vec![2000, 1500, 0],
        ];
        let duration = vec![vec![0, 120, 240], vec![120, 0, 180], vec![240, 180, 0]];
        let matrix = TravelMatrix::new(locations, distance, duration).unwrap();
        (customers, fleet, matrix)
    }

    fn problem<'a>(
        customers: &'a [Customer],
        depots: &'a DepotSet,
        units: &'a [drover_core::vehicle::VehicleUnit],
        matrix: &'a TravelMatrix,
    ) -> RoutingProblem<'a> {
        RoutingProblem {
            customers,
            units,
            depots,
            matrix,
            center_zone: Some(CenterZone {
                center: coord(42.6974, 23.3238),
                radius_km: 1.7,
            }),
            cost_policy: ArcCostPolicy::default(),
            drop_policy: None,
        }
    }

    #[rstest]
    fn class_dispatch_matches_the_cost_table() {
        let (customers, fleet, matrix) = fixture();
        let depots = fleet.depot_set(coord(42.70, 23.30));
        let units = fleet.expand_units(&depots);
        let problem = problem(&customers, &depots, &units, &matrix);
        let model = SolverModel::new(&problem, 10);
        let mode = CostMode::ByClass;

        // Centre class, in-zone customer: discounted.
        assert_eq!(mode.arc_cost(&model, VehicleClass::Center, 0, 1), 500);
        // Centre class, out-of-zone customer: penalised.
        assert_eq!(mode.arc_cost(&model, VehicleClass::Center, 0, 2), 42_000);
        // Other class, in-zone customer: penalised.
        assert_eq!(mode.arc_cost(&model, VehicleClass::Internal, 0, 1), 41_000);
        // Other class, out-of-zone customer: plain distance.
        assert_eq!(mode.arc_cost(&model, VehicleClass::Internal, 0, 2), 2000);
        // Arcs back to the depot are never shaped.
        assert_eq!(mode.arc_cost(&model, VehicleClass::Center, 1, 0), 1000);
    }

    #[rstest]
    fn profile_matrices_agree_with_dispatch() {
        let (customers, fleet, matrix) = fixture();
        let depots = fleet.depot_set(coord(42.70, 23.30));
        let units = fleet.expand_units(&depots);
        let problem = problem(&customers, &depots, &units, &matrix);
        let model = SolverModel::new(&problem, 10);
        let (center, other) = profile_matrices(&model);
        let dispatch = CostMode::ByClass;

        for from in 0..3 {
            for to in 0..3 {
                assert_eq!(
                    center[from][to],
                    dispatch.arc_cost(&model, VehicleClass::Center, from, to)
                );
                assert_eq!(
                    other[from][to],
                    dispatch.arc_cost(&model, VehicleClass::External, from, to)
                );
            }
        }
    }
}
