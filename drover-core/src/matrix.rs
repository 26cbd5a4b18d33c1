//! Travel matrices: pairwise road distances and durations.

use geo::Coord;
use thiserror::Error;

/// A square matrix of road distances (metres) and durations (seconds) over an
/// ordered location list.
///
/// The diagonal is forced to zero on construction. Symmetry is not assumed.
/// Once built the matrix is read-only apart from the traffic adjustment in
/// [`crate::traffic`], which records itself so it cannot compound.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelMatrix {
    locations: Vec<Coord<f64>>,
    distances_m: Vec<Vec<i32>>,
    durations_s: Vec<Vec<i32>>,
    degraded_cells: usize,
    traffic_adjusted: bool,
}

/// Errors returned by [`TravelMatrix::new`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    /// A grid did not match the location count.
    #[error("matrix must be {expected}x{expected}, row {row} has {len} entries")]
    NotSquare {
        /// Offending row index.
        row: usize,
        /// Entries found in that row.
        len: usize,
        /// Expected dimension.
        expected: usize,
    },
    /// Grid row count did not match the location count.
    #[error("expected {expected} rows, got {got}")]
    RowCountMismatch {
        /// Rows found.
        got: usize,
        /// Expected dimension.
        expected: usize,
    },
    /// A cell held a negative value.
    #[error("matrix cell ({i}, {j}) is negative")]
    NegativeEntry {
        /// Row index.
        i: usize,
        /// Column index.
        j: usize,
    },
}

impl TravelMatrix {
    /// Validates grids against the location list and constructs a matrix.
    ///
    /// The diagonal is zeroed; negative entries are rejected.
    pub fn new(
        locations: Vec<Coord<f64>>,
        mut distances_m: Vec<Vec<i32>>,
        mut durations_s: Vec<Vec<i32>>,
    ) -> Result<Self, MatrixError> {
        let n = locations.len();
        for grid in [&mut distances_m, &mut durations_s] {
            if grid.len() != n {
                return Err(MatrixError::RowCountMismatch {
                    got: grid.len(),
                    expected: n,
                });
            }
            for (row, cells) in grid.iter_mut().enumerate() {
                if cells.len() != n {
                    return Err(MatrixError::NotSquare {
                        row,
                        len: cells.len(),
                        expected: n,
                    });
                }
                for (col, cell) in cells.iter().enumerate() {
                    if *cell < 0 {
                        return Err(MatrixError::NegativeEntry { i: row, j: col });
                    }
                }
                cells[row] = 0;
            }
        }
        Ok(Self {
            locations,
            distances_m,
            durations_s,
            degraded_cells: 0,
            traffic_adjusted: false,
        })
    }

    /// Record how many cells were filled from the haversine fallback.
    #[must_use]
    pub fn with_degraded_cells(mut self, count: usize) -> Self {
        self.degraded_cells = count;
        self
    }

    /// Number of locations (and matrix dimension).
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// True when the matrix covers no locations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// The ordered location list the matrix was built over.
    #[must_use]
    pub fn locations(&self) -> &[Coord<f64>] {
        &self.locations
    }

    /// Location at index `i`.
    #[must_use]
    pub fn location(&self, i: usize) -> Coord<f64> {
        self.locations[i]
    }

    /// Road distance in metres from node `i` to node `j`.
    #[must_use]
    pub fn distance_m(&self, i: usize, j: usize) -> i32 {
        self.distances_m[i][j]
    }

    /// Travel duration in seconds from node `i` to node `j`.
    #[must_use]
    pub fn duration_s(&self, i: usize, j: usize) -> i32 {
        self.durations_s[i][j]
    }

    /// Cells estimated via haversine rather than fetched from a provider.
    #[must_use]
    pub fn degraded_cells(&self) -> usize {
        self.degraded_cells
    }

    /// Whether the urban traffic multiplier has been applied.
    #[must_use]
    pub fn is_traffic_adjusted(&self) -> bool {
        self.traffic_adjusted
    }

    /// Row-major copy of the distance grid.
    #[must_use]
    pub fn distances_row_major(&self) -> Vec<i32> {
        self.distances_m.iter().flatten().copied().collect()
    }

    /// Row-major copy of the duration grid.
    #[must_use]
    pub fn durations_row_major(&self) -> Vec<i32> {
        self.durations_s.iter().flatten().copied().collect()
    }

    pub(crate) fn durations_mut(&mut self) -> &mut Vec<Vec<i32>> {
        &mut self.durations_s
    }

    pub(crate) fn mark_traffic_adjusted(&mut self) {
        self.traffic_adjusted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::coord;
    use rstest::rstest;

    fn two_locations() -> Vec<Coord<f64>> {
        vec![coord(42.70, 23.32), coord(42.71, 23.33)]
    }

    #[rstest]
    fn forces_diagonal_to_zero() {
        let matrix = TravelMatrix::new(
            two_locations(),
            vec![vec![5, 100], vec![100, 5]],
            vec![vec![9, 60], vec![60, 9]],
        )
        .unwrap();
        assert_eq!(matrix.distance_m(0, 0), 0);
        assert_eq!(matrix.duration_s(1, 1), 0);
        assert_eq!(matrix.distance_m(0, 1), 100);
    }

    #[rstest]
    fn rejects_jagged_rows() {
        let result = TravelMatrix::new(
            two_locations(),
            vec![vec![0, 100], vec![100]],
            vec![vec![0, 60], vec![60, 0]],
        );
        assert!(matches!(result, Err(MatrixError::NotSquare { row: 1, .. })));
    }

    #[rstest]
    fn rejects_negative_cells() {
        let result = TravelMatrix::new(
            two_locations(),
            vec![vec![0, -1], vec![100, 0]],
            vec![vec![0, 60], vec![60, 0]],
        );
        assert!(matches!(
            result,
            Err(MatrixError::NegativeEntry { i: 0, j: 1 })
        ));
    }
}
