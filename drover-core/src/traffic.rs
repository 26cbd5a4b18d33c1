//! Urban traffic adjustment.
//!
//! Inside a congested urban disk, observed travel times exceed free-flow
//! estimates. The adjuster scales matrix durations for every pair whose
//! endpoints both fall inside the disk. Distances are never touched.

use geo::Coord;
use thiserror::Error;

use crate::geometry::haversine_km;
use crate::matrix::TravelMatrix;

/// A congested urban disk with a duration multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficZone {
    /// Disk centre.
    pub center: Coord<f64>,
    /// Disk radius in kilometres.
    pub radius_km: f64,
    /// Duration multiplier, strictly greater than one.
    pub multiplier: f64,
}

/// Errors returned by [`TrafficZone::new`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrafficZoneError {
    /// The radius was zero or negative.
    #[error("traffic zone radius {0} must be positive")]
    NonPositiveRadius(f64),
    /// The multiplier would shrink or preserve durations.
    #[error("traffic multiplier {0} must exceed 1.0")]
    MultiplierTooSmall(f64),
}

impl TrafficZone {
    /// Validates and constructs a [`TrafficZone`].
    pub fn new(center: Coord<f64>, radius_km: f64, multiplier: f64) -> Result<Self, TrafficZoneError> {
        if !(radius_km > 0.0) {
            return Err(TrafficZoneError::NonPositiveRadius(radius_km));
        }
        if !(multiplier > 1.0) {
            return Err(TrafficZoneError::MultiplierTooSmall(multiplier));
        }
        Ok(Self {
            center,
            radius_km,
            multiplier,
        })
    }

    /// True when the location lies inside the disk.
    #[must_use]
    pub fn contains(&self, location: Coord<f64>) -> bool {
        haversine_km(location, self.center) <= self.radius_km
    }
}

/// Scale durations for pairs entirely inside the urban disk.
///
/// Idempotent: the matrix records that it has been adjusted and a second
/// call returns without touching it.
pub fn adjust_durations(matrix: &mut TravelMatrix, zone: &TrafficZone) {
    if matrix.is_traffic_adjusted() {
        log::debug!("traffic adjustment already applied, skipping");
        return;
    }

    let in_urban: Vec<bool> = matrix
        .locations()
        .iter()
        .map(|loc| zone.contains(*loc))
        .collect();

    let mut scaled = 0usize;
    let multiplier = zone.multiplier;
    let durations = matrix.durations_mut();
    for (i, row) in durations.iter_mut().enumerate() {
        if !in_urban[i] {
            continue;
        }
        for (j, cell) in row.iter_mut().enumerate() {
            if i != j && in_urban[j] {
                *cell = (f64::from(*cell) * multiplier).round() as i32;
                scaled += 1;
            }
        }
    }
    matrix.mark_traffic_adjusted();
    log::info!(
        "traffic adjustment scaled {scaled} duration cells by {multiplier} ({} of {} locations in the urban disk)",
        in_urban.iter().filter(|v| **v).count(),
        in_urban.len(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::coord;
    use rstest::{fixture, rstest};

    #[fixture]
    fn matrix() -> TravelMatrix {
        // Two city locations plus one far outside the disk.
        let locations = vec![coord(42.6977, 23.3219), coord(42.7000, 23.3300), coord(43.5, 24.5)];
        let distances = vec![vec![0, 1000, 90_000], vec![1000, 0, 91_000], vec![90_000, 91_000, 0]];
        let durations = vec![vec![0, 100, 4000], vec![100, 0, 4100], vec![4000, 4100, 0]];
        TravelMatrix::new(locations, distances, durations).unwrap()
    }

    #[fixture]
    fn zone() -> TrafficZone {
        TrafficZone::new(coord(42.6977, 23.3219), 10.0, 1.6).unwrap()
    }

    #[rstest]
    fn scales_only_pairs_inside_the_disk(mut matrix: TravelMatrix, zone: TrafficZone) {
        adjust_durations(&mut matrix, &zone);
        assert_eq!(matrix.duration_s(0, 1), 160);
        assert_eq!(matrix.duration_s(1, 0), 160);
        // One endpoint outside: untouched.
        assert_eq!(matrix.duration_s(0, 2), 4000);
        assert_eq!(matrix.duration_s(2, 1), 4100);
    }

    #[rstest]
    fn distances_are_never_adjusted(mut matrix: TravelMatrix, zone: TrafficZone) {
        adjust_durations(&mut matrix, &zone);
        assert_eq!(matrix.distance_m(0, 1), 1000);
        assert_eq!(matrix.distance_m(0, 2), 90_000);
    }

    #[rstest]
    fn second_application_does_not_compound(mut matrix: TravelMatrix, zone: TrafficZone) {
        adjust_durations(&mut matrix, &zone);
        let once = matrix.clone();
        adjust_durations(&mut matrix, &zone);
        assert_eq!(matrix, once);
    }

    #[rstest]
    fn rejects_degenerate_zones() {
        assert!(TrafficZone::new(coord(0.0, 0.0), 0.0, 1.5).is_err());
        assert!(TrafficZone::new(coord(0.0, 0.0), 5.0, 1.0).is_err());
    }
}
