//! Best-effort greedy fallback.
//!
//! Runs when an engine errors out or returns nothing usable: customers are
//! taken demand-descending and placed at the cheapest feasible position
//! across the fleet; whatever fits nowhere is dropped. Solutions are always
//! marked degraded.

use drover_core::solve::{RoutingProblem, Solution, SolveError, Solver};

use crate::cost::CostMode;
use crate::model::SolverModel;
use crate::state::{best_insertion, extract_solution, SearchContext, SearchState};

/// Demand-descending cheapest-insertion assignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySolver;

impl Solver for GreedySolver {
    fn solve(&self, problem: &RoutingProblem<'_>) -> Result<Solution, SolveError> {
        problem.validate()?;
        let model = SolverModel::new(problem, 16);
        let ctx = SearchContext::new(model, CostMode::ByClass);
        let mut state = SearchState::fresh(problem.units.len(), problem.customers.len());

        let mut order: Vec<usize> = (0..problem.customers.len()).collect();
        order.sort_by(|&a, &b| {
            problem.customers[b]
                .demand
                .total_cmp(&problem.customers[a].demand)
                .then_with(|| problem.customers[a].id.cmp(&problem.customers[b].id))
        });

        for customer in order {
            match best_insertion(&ctx, &state, customer) {
                Some(insertion) => {
                    state.claim(customer);
                    state.routes[insertion.unit].insert(insertion.position, customer);
                }
                None => log::debug!(
                    "greedy fallback drops customer {}",
                    problem.customers[customer].id
                ),
            }
        }

        let mut solution = extract_solution(&ctx, &state);
        solution.degraded = true;
        log::info!(
            "greedy fallback served {} customers, dropped {}",
            state.served(),
            solution.dropped.len(),
        );
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::geometry::coord;
    use drover_core::matrix::TravelMatrix;
    use drover_core::solve::ArcCostPolicy;
    use drover_core::vehicle::{Fleet, VehicleClass, VehicleSpec};
    use drover_core::Customer;
    use rstest::rstest;

    #[rstest]
    fn drops_what_cannot_fit_and_marks_degraded() {
        let depot = coord(42.70, 23.30);
        let customers: Vec<Customer> = (0..3)
            .map(|i| {
                Customer::new(
                    format!("c{i}"),
                    format!("c{i}"),
                    42.71 + f64::from(i) * 0.01,
                    23.31,
                    60.0,
                )
                .unwrap()
            })
            .collect();
        let fleet = Fleet::new(vec![VehicleSpec {
            class: VehicleClass::Internal,
            capacity: 100,
            count: 1,
            max_distance_km: None,
            max_time_minutes: 480,
            service_minutes: 5,
            start_minute: 480,
            max_stops: None,
            enabled: true,
            start_depot: depot,
            tsp_origin: None,
        }])
        .unwrap();
        let depots = fleet.depot_set(depot);
        let units = fleet.expand_units(&depots);

        let mut locations = vec![depot];
        locations.extend(customers.iter().map(|c| c.location));
        let n = locations.len();
        let grid = |scale: i32| -> Vec<Vec<i32>> {
            (0..n)
                .map(|i| (0..n).map(|j| if i == j { 0 } else { scale }).collect())
                .collect()
        };
        let matrix = TravelMatrix::new(locations, grid(1000), grid(300)).unwrap();

        let problem = RoutingProblem {
            customers: &customers,
            units: &units,
            depots: &depots,
            matrix: &matrix,
            center_zone: None,
            cost_policy: ArcCostPolicy::default(),
            drop_policy: None,
        };

        let solution = GreedySolver.solve(&problem).unwrap();
        assert!(solution.degraded);
        // Only one 60-unit customer fits a 100-unit vehicle.
        assert_eq!(solution.routes.len(), 1);
        assert_eq!(solution.routes[0].customers.len(), 1);
        assert_eq!(solution.dropped.len(), 2);
    }
}
