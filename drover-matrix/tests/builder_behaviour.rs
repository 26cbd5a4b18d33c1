//! Behavioural tests for the matrix builder's strategy tiers and fallbacks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use geo::Coord;
use rstest::rstest;

use drover_core::gateway::{
    DepartureTime, GatewayError, MatrixResponse, RouteGeometry, RouteLeg, RoutingGateway,
};
use drover_core::geometry::coord;
use drover_core::test_support::{CountingGateway, FixedGeometryGateway, UnavailableGateway};
use drover_matrix::{MatrixBuilder, MatrixBuilderConfig, MatrixCache};

fn grid_locations(n: usize) -> Vec<Coord<f64>> {
    (0..n)
        .map(|i| coord(42.60 + (i / 10) as f64 * 0.01, 23.20 + (i % 10) as f64 * 0.01))
        .collect()
}

fn fast_config() -> MatrixBuilderConfig {
    MatrixBuilderConfig {
        retry_attempts: 1,
        retry_base_delay: Duration::from_millis(1),
        ..MatrixBuilderConfig::default()
    }
}

/// Refuses matrix requests above a location ceiling, delegating smaller ones
/// to haversine geometry. Mimics a provider table-size limit.
struct CappedGateway {
    inner: FixedGeometryGateway,
    max_locations: usize,
    matrix_calls: AtomicUsize,
}

impl CappedGateway {
    fn new(max_locations: usize) -> Self {
        Self {
            inner: FixedGeometryGateway::default(),
            max_locations,
            matrix_calls: AtomicUsize::new(0),
        }
    }
}

impl RoutingGateway for CappedGateway {
    fn provider_id(&self) -> &str {
        "capped"
    }

    fn matrix(
        &self,
        locations: &[Coord<f64>],
        sources: &[usize],
        destinations: &[usize],
        departure: Option<DepartureTime>,
    ) -> Result<MatrixResponse, GatewayError> {
        self.matrix_calls.fetch_add(1, Ordering::SeqCst);
        if locations.len() > self.max_locations {
            return Err(GatewayError::RequestTooLarge {
                locations: locations.len(),
            });
        }
        self.inner.matrix(locations, sources, destinations, departure)
    }

    fn route(&self, from: Coord<f64>, to: Coord<f64>) -> Result<RouteLeg, GatewayError> {
        self.inner.route(from, to)
    }

    fn geometry(&self, waypoints: &[Coord<f64>]) -> Result<RouteGeometry, GatewayError> {
        self.inner.geometry(waypoints)
    }
}

/// Returns a matrix with one null cell to exercise the degraded fill.
struct HoleyGateway;

impl RoutingGateway for HoleyGateway {
    fn provider_id(&self) -> &str {
        "holey"
    }

    fn matrix(
        &self,
        locations: &[Coord<f64>],
        sources: &[usize],
        destinations: &[usize],
        departure: Option<DepartureTime>,
    ) -> Result<MatrixResponse, GatewayError> {
        let mut response =
            FixedGeometryGateway::default().matrix(locations, sources, destinations, departure)?;
        response.distances_m[0][1] = None;
        response.durations_s[0][1] = None;
        let missing = response.missing_cells();
        Err(GatewayError::PartialMatrix { response, missing })
    }

    fn route(&self, from: Coord<f64>, to: Coord<f64>) -> Result<RouteLeg, GatewayError> {
        FixedGeometryGateway::default().route(from, to)
    }

    fn geometry(&self, waypoints: &[Coord<f64>]) -> Result<RouteGeometry, GatewayError> {
        FixedGeometryGateway::default().geometry(waypoints)
    }
}

#[rstest]
fn small_inputs_use_a_single_request() {
    let gateway = CountingGateway::new(FixedGeometryGateway::default());
    let locations = grid_locations(5);
    let matrix = MatrixBuilder::new(&gateway)
        .with_config(fast_config())
        .build(&locations, None)
        .unwrap();

    assert_eq!(matrix.len(), 5);
    assert_eq!(gateway.matrix_calls(), 1);
    assert_eq!(matrix.degraded_cells(), 0);
    for i in 0..5 {
        assert_eq!(matrix.distance_m(i, i), 0);
    }
}

#[rstest]
fn medium_inputs_are_tiled_and_stitched() {
    let gateway = CountingGateway::new(FixedGeometryGateway::default());
    let locations = grid_locations(45);
    let config = MatrixBuilderConfig {
        single_request_limit: 30,
        chunk_size: 20,
        ..fast_config()
    };
    let matrix = MatrixBuilder::new(&gateway)
        .with_config(config)
        .build(&locations, None)
        .unwrap();

    assert_eq!(matrix.len(), 45);
    // 45 locations in chunks of 20 gives three ranges, nine tile pairs.
    assert_eq!(gateway.matrix_calls(), 9);
    assert_eq!(matrix.degraded_cells(), 0);

    // Stitched values must match a direct haversine computation.
    let reference = FixedGeometryGateway::default();
    let leg = reference.route(locations[3], locations[41]).unwrap();
    assert_eq!(matrix.distance_m(3, 41), leg.distance_m);
    assert_eq!(matrix.duration_s(3, 41), leg.duration_s);
}

#[rstest]
fn oversized_tiles_resplit_with_a_halved_chunk() {
    let gateway = CappedGateway::new(25);
    let locations = grid_locations(40);
    let config = MatrixBuilderConfig {
        single_request_limit: 10,
        chunk_size: 20,
        ..fast_config()
    };
    // Same-range tiles (20 locations) fit; cross tiles (40-location unions)
    // are refused and must be re-split rather than degraded.
    let matrix = MatrixBuilder::new(&gateway)
        .with_config(config)
        .build(&locations, None)
        .unwrap();
    assert_eq!(matrix.len(), 40);
    assert_eq!(matrix.degraded_cells(), 0);
}

#[rstest]
fn partial_matrices_are_filled_and_counted() {
    let gateway = HoleyGateway;
    let locations = grid_locations(4);
    let matrix = MatrixBuilder::new(&gateway)
        .with_config(fast_config())
        .build(&locations, None)
        .unwrap();

    assert_eq!(matrix.degraded_cells(), 1);
    // The hole is filled with a positive haversine estimate.
    assert!(matrix.distance_m(0, 1) > 0);
    assert!(matrix.duration_s(0, 1) > 0);
}

#[rstest]
fn unavailable_provider_degrades_to_haversine() {
    let gateway = UnavailableGateway;
    let locations = grid_locations(4);
    let matrix = MatrixBuilder::new(&gateway)
        .with_config(fast_config())
        .build(&locations, None)
        .unwrap();

    assert_eq!(matrix.degraded_cells(), 4 * 4 - 4);
    assert!(matrix.distance_m(0, 3) > 0);
}

#[rstest]
fn fallback_gateway_rescues_an_unavailable_primary() {
    let primary = UnavailableGateway;
    let fallback = CountingGateway::new(FixedGeometryGateway::default());
    let locations = grid_locations(4);
    let matrix = MatrixBuilder::new(&primary)
        .with_fallback(&fallback)
        .with_config(fast_config())
        .build(&locations, None)
        .unwrap();

    assert_eq!(matrix.degraded_cells(), 0);
    assert_eq!(fallback.matrix_calls(), 1);
}

#[rstest]
fn large_inputs_fall_back_to_pairwise_routes() {
    let gateway = CountingGateway::new(FixedGeometryGateway::default());
    let locations = grid_locations(12);
    let config = MatrixBuilderConfig {
        single_request_limit: 4,
        tiled_request_limit: 8,
        ..fast_config()
    };
    let matrix = MatrixBuilder::new(&gateway)
        .with_config(config)
        .build(&locations, None)
        .unwrap();

    assert_eq!(matrix.len(), 12);
    assert_eq!(gateway.matrix_calls(), 0);
    assert_eq!(gateway.route_calls(), 12 * 12 - 12);
    assert_eq!(matrix.degraded_cells(), 0);
}

#[rstest]
fn cache_hit_issues_zero_provider_requests() {
    let dir = tempfile::tempdir().unwrap();
    let cache = MatrixCache::new(dir.path().to_str().unwrap(), Duration::from_secs(3600));
    let gateway = CountingGateway::new(FixedGeometryGateway::default());
    let locations = grid_locations(6);

    let first = MatrixBuilder::new(&gateway)
        .with_cache(&cache)
        .with_config(fast_config())
        .build(&locations, None)
        .unwrap();
    assert_eq!(gateway.matrix_calls(), 1);

    let second = MatrixBuilder::new(&gateway)
        .with_cache(&cache)
        .with_config(fast_config())
        .build(&locations, None)
        .unwrap();
    assert_eq!(gateway.matrix_calls(), 1, "second build must be served from cache");
    assert_eq!(first.distances_row_major(), second.distances_row_major());
    assert_eq!(first.durations_row_major(), second.durations_row_major());
}

#[rstest]
fn departure_time_distinguishes_cache_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cache = MatrixCache::new(dir.path().to_str().unwrap(), Duration::from_secs(3600));
    let gateway = CountingGateway::new(FixedGeometryGateway::default());
    let locations = grid_locations(4);
    let builder = || {
        MatrixBuilder::new(&gateway)
            .with_cache(&cache)
            .with_config(fast_config())
    };

    builder().build(&locations, None).unwrap();
    builder()
        .build(&locations, Some(DepartureTime::parse("08:00").unwrap()))
        .unwrap();
    assert_eq!(gateway.matrix_calls(), 2, "departure time must key separately");
}

#[rstest]
fn single_location_builds_a_trivial_matrix() {
    let gateway = CountingGateway::new(FixedGeometryGateway::default());
    let matrix = MatrixBuilder::new(&gateway)
        .build(&grid_locations(1), None)
        .unwrap();
    assert_eq!(matrix.len(), 1);
    assert_eq!(gateway.matrix_calls(), 0);
}
