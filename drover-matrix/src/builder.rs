//! The tiered matrix builder.
//!
//! Turns an ordered location list into a complete [`TravelMatrix`] using the
//! cheapest provider strategy that fits:
//!
//! - up to `single_request_limit` locations: one table request;
//! - up to `tiled_request_limit`: quadratic tiling in `chunk_size` blocks,
//!   fetched on a bounded worker pool and stitched by absolute indices;
//! - beyond that: pairwise route requests, also pooled.
//!
//! Transient provider failures retry with exponential backoff, oversized
//! requests re-split with a halved chunk, and anything still unresolved is
//! estimated from haversine geometry and counted as degraded.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use geo::Coord;
use rayon::prelude::*;
use thiserror::Error;

use drover_core::gateway::{DepartureTime, GatewayError, MatrixResponse, RoutingGateway};
use drover_core::matrix::{MatrixError, TravelMatrix};
use drover_core::progress::{ProgressReporter, SilentReporter};

use crate::cache::{CacheKey, MatrixCache};
use crate::fallback::HaversineGateway;

static SILENT: SilentReporter = SilentReporter;

/// Cooperative cancellation checked at every chunk boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// A fresh, unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tuning knobs for the builder.
#[derive(Debug, Clone)]
pub struct MatrixBuilderConfig {
    /// Largest N served by a single table request.
    pub single_request_limit: usize,
    /// Largest N served by quadratic tiling.
    pub tiled_request_limit: usize,
    /// Tile edge length.
    pub chunk_size: usize,
    /// Worker pool bound for tile and pairwise fetches.
    pub workers: usize,
    /// Retries per request on transient failure.
    pub retry_attempts: u32,
    /// Base delay of the exponential backoff.
    pub retry_base_delay: Duration,
}

impl Default for MatrixBuilderConfig {
    fn default() -> Self {
        Self {
            single_request_limit: 30,
            tiled_request_limit: 500,
            chunk_size: 80,
            workers: 5,
            retry_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Errors returned by [`MatrixBuilder::build`].
#[derive(Debug, Error)]
pub enum MatrixBuildError {
    /// An empty location list has no matrix.
    #[error("no locations to build a matrix over")]
    NoLocations,
    /// The cancellation flag fired mid-build.
    #[error("matrix build cancelled")]
    Cancelled,
    /// Assembled grids failed matrix validation.
    #[error(transparent)]
    Shape(#[from] MatrixError),
}

/// Builds complete travel matrices from a routing gateway.
pub struct MatrixBuilder<'a> {
    gateway: &'a dyn RoutingGateway,
    fallback_gateway: Option<&'a dyn RoutingGateway>,
    estimator: HaversineGateway,
    cache: Option<&'a MatrixCache>,
    reporter: &'a dyn ProgressReporter,
    cancel: CancellationFlag,
    config: MatrixBuilderConfig,
}

impl<'a> MatrixBuilder<'a> {
    /// Builder over a primary gateway with default settings.
    #[must_use]
    pub fn new(gateway: &'a dyn RoutingGateway) -> Self {
        Self {
            gateway,
            fallback_gateway: None,
            estimator: HaversineGateway::default(),
            cache: None,
            reporter: &SILENT,
            cancel: CancellationFlag::new(),
            config: MatrixBuilderConfig::default(),
        }
    }

    /// Try this gateway before degrading to haversine estimates.
    #[must_use]
    pub fn with_fallback(mut self, gateway: &'a dyn RoutingGateway) -> Self {
        self.fallback_gateway = Some(gateway);
        self
    }

    /// Read and write this cache around provider fetches.
    #[must_use]
    pub fn with_cache(mut self, cache: &'a MatrixCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Report coarse progress events here.
    #[must_use]
    pub fn with_reporter(mut self, reporter: &'a dyn ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Observe this cancellation flag.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the tuning knobs.
    #[must_use]
    pub fn with_config(mut self, config: MatrixBuilderConfig) -> Self {
        self.config = config;
        self
    }

    /// Average speed for degraded-cell estimates, km/h.
    #[must_use]
    pub fn with_estimator_speed(mut self, speed_kmh: f64) -> Self {
        self.estimator = HaversineGateway::new(speed_kmh);
        self
    }

    /// Build the complete N×N matrix for `locations`.
    pub fn build(
        &self,
        locations: &[Coord<f64>],
        departure: Option<DepartureTime>,
    ) -> Result<TravelMatrix, MatrixBuildError> {
        let n = locations.len();
        if n == 0 {
            return Err(MatrixBuildError::NoLocations);
        }
        if n == 1 {
            return Ok(TravelMatrix::new(
                locations.to_vec(),
                vec![vec![0]],
                vec![vec![0]],
            )?);
        }

        let key = CacheKey::new(self.gateway.provider_id(), departure, locations);
        if let Some(cache) = self.cache {
            if let Some(matrix) = cache.get(&key, locations) {
                log::info!("matrix cache hit for {n} locations, no provider requests issued");
                return Ok(matrix);
            }
        }

        let assembled = if n <= self.config.single_request_limit {
            self.build_single(locations, departure)?
        } else if n <= self.config.tiled_request_limit {
            self.build_tiled(locations, departure)?
        } else {
            self.build_pairwise(locations, departure)?
        };
        let Assembled {
            distances,
            durations,
            degraded,
        } = assembled;

        let matrix = TravelMatrix::new(locations.to_vec(), distances, durations)?
            .with_degraded_cells(degraded);
        if degraded > 0 {
            log::info!("matrix build finished with {degraded} degraded cells of {}", n * n);
        }
        if let Some(cache) = self.cache {
            if let Err(err) = cache.put(&key, self.gateway.provider_id(), &matrix) {
                log::warn!("failed to persist the matrix cache entry: {err}");
            }
        }
        Ok(matrix)
    }

    fn build_single(
        &self,
        locations: &[Coord<f64>],
        departure: Option<DepartureTime>,
    ) -> Result<Assembled, MatrixBuildError> {
        let n = locations.len();
        match self.fetch_block(locations, &[], &[], departure) {
            BlockResult::Complete(response) | BlockResult::Partial(response, _) => {
                let mut assembled = Assembled::zeroed(n);
                let degraded = self.write_block(
                    &mut assembled,
                    &response,
                    locations,
                    &(0..n).collect::<Vec<_>>(),
                    &(0..n).collect::<Vec<_>>(),
                );
                assembled.degraded = degraded;
                Ok(assembled)
            }
            BlockResult::TooLarge => self.build_tiled(locations, departure),
            BlockResult::Failed => Ok(self.estimate_all(locations)),
        }
    }

    fn build_tiled(
        &self,
        locations: &[Coord<f64>],
        departure: Option<DepartureTime>,
    ) -> Result<Assembled, MatrixBuildError> {
        let n = locations.len();
        let chunk = self.config.chunk_size.max(1);
        let mut ranges: Vec<Range<usize>> = Vec::new();
        let mut start = 0;
        while start < n {
            ranges.push(start..(start + chunk).min(n));
            start += chunk;
        }

        // Row-major tile order; completion order is irrelevant because every
        // tile is stitched by absolute indices.
        let pairs: Vec<(Range<usize>, Range<usize>)> = ranges
            .iter()
            .flat_map(|rows| ranges.iter().map(move |cols| (rows.clone(), cols.clone())))
            .collect();

        self.reporter.begin("matrix tiles", pairs.len());
        let counter = AtomicUsize::new(0);
        let tiles = self.run_pool(pairs, |(rows, cols)| {
            let tile = if self.cancel.is_cancelled() {
                None
            } else {
                Some(self.fetch_tile(locations, rows, cols, departure, chunk))
            };
            self.reporter.advance(counter.fetch_add(1, Ordering::SeqCst) + 1);
            tile
        });
        self.reporter.finish("matrix tiles");

        if self.cancel.is_cancelled() {
            return Err(MatrixBuildError::Cancelled);
        }

        let mut assembled = Assembled::zeroed(n);
        for tile in tiles.into_iter().flatten() {
            assembled.degraded += tile.degraded;
            for (ti, i) in tile.rows.clone().enumerate() {
                for (tj, j) in tile.cols.clone().enumerate() {
                    assembled.distances[i][j] = tile.distances[ti][tj];
                    assembled.durations[i][j] = tile.durations[ti][tj];
                }
            }
        }
        Ok(assembled)
    }

    fn build_pairwise(
        &self,
        locations: &[Coord<f64>],
        _departure: Option<DepartureTime>,
    ) -> Result<Assembled, MatrixBuildError> {
        let n = locations.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .filter(|(i, j)| i != j)
            .collect();

        self.reporter.begin("pairwise routes", pairs.len());
        let counter = AtomicUsize::new(0);
        let cells = self.run_pool(pairs, |(i, j)| {
            let cell = if self.cancel.is_cancelled() {
                None
            } else {
                Some(self.fetch_pair(locations, i, j))
            };
            self.reporter.advance(counter.fetch_add(1, Ordering::SeqCst) + 1);
            cell
        });
        self.reporter.finish("pairwise routes");

        if self.cancel.is_cancelled() {
            return Err(MatrixBuildError::Cancelled);
        }

        let mut assembled = Assembled::zeroed(n);
        for cell in cells.into_iter().flatten() {
            assembled.distances[cell.i][cell.j] = cell.distance_m;
            assembled.durations[cell.i][cell.j] = cell.duration_s;
            if cell.degraded {
                assembled.degraded += 1;
            }
        }
        Ok(assembled)
    }

    /// Run `work` over `items` on a pool bounded by the configured worker
    /// count, preserving item order in the result.
    fn run_pool<T, R, F>(&self, items: Vec<T>, work: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        let workers = self.config.workers.clamp(1, items.len().max(1));
        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| items.into_par_iter().map(&work).collect()),
            Err(err) => {
                log::warn!("worker pool unavailable ({err}), fetching sequentially");
                items.into_iter().map(work).collect()
            }
        }
    }

    fn fetch_tile(
        &self,
        locations: &[Coord<f64>],
        rows: Range<usize>,
        cols: Range<usize>,
        departure: Option<DepartureTime>,
        chunk: usize,
    ) -> Tile {
        let row_indices: Vec<usize> = rows.clone().collect();
        let col_indices: Vec<usize> = cols.clone().collect();

        let outcome = if rows == cols {
            let block: Vec<Coord<f64>> = row_indices.iter().map(|&i| locations[i]).collect();
            self.fetch_block(&block, &[], &[], departure)
        } else {
            let union: Vec<Coord<f64>> = row_indices
                .iter()
                .chain(col_indices.iter())
                .map(|&i| locations[i])
                .collect();
            let sources: Vec<usize> = (0..row_indices.len()).collect();
            let destinations: Vec<usize> = (row_indices.len()..union.len()).collect();
            self.fetch_block(&union, &sources, &destinations, departure)
        };

        match outcome {
            BlockResult::Complete(response) | BlockResult::Partial(response, _) => {
                let mut tile = Tile::zeroed(rows.clone(), cols.clone());
                let degraded =
                    self.write_tile_block(&mut tile, &response, locations, &row_indices, &col_indices);
                tile.degraded = degraded;
                tile
            }
            BlockResult::TooLarge if chunk > 1 => {
                // The provider refused this tile size; re-split it at half
                // the chunk and stitch the quadrants.
                let half = (chunk / 2).max(1);
                log::info!(
                    "tile {}..{} x {}..{} too large, re-splitting with chunk {half}",
                    rows.start,
                    rows.end,
                    cols.start,
                    cols.end,
                );
                self.split_tile(locations, rows, cols, departure, half)
            }
            BlockResult::TooLarge | BlockResult::Failed => {
                self.estimate_tile(locations, rows, cols)
            }
        }
    }

    fn split_tile(
        &self,
        locations: &[Coord<f64>],
        rows: Range<usize>,
        cols: Range<usize>,
        departure: Option<DepartureTime>,
        chunk: usize,
    ) -> Tile {
        let halve = |range: &Range<usize>| -> Vec<Range<usize>> {
            let len = range.end - range.start;
            if len <= 1 {
                return vec![range.clone()];
            }
            let mid = range.start + len / 2;
            vec![range.start..mid, mid..range.end]
        };

        let mut tile = Tile::zeroed(rows.clone(), cols.clone());
        for sub_rows in halve(&rows) {
            for sub_cols in halve(&cols) {
                let sub = self.fetch_tile(locations, sub_rows.clone(), sub_cols.clone(), departure, chunk);
                tile.degraded += sub.degraded;
                for (ti, i) in sub.rows.clone().enumerate() {
                    for (tj, j) in sub.cols.clone().enumerate() {
                        tile.distances[i - rows.start][j - cols.start] = sub.distances[ti][tj];
                        tile.durations[i - rows.start][j - cols.start] = sub.durations[ti][tj];
                    }
                }
            }
        }
        tile
    }

    fn fetch_pair(&self, locations: &[Coord<f64>], i: usize, j: usize) -> PairCell {
        let from = locations[i];
        let to = locations[j];
        let attempt = self.gateway.route(from, to).or_else(|err| {
            if let (GatewayError::ProviderUnavailable { .. }, Some(fallback)) =
                (&err, self.fallback_gateway)
            {
                fallback.route(from, to)
            } else {
                Err(err)
            }
        });
        match attempt {
            Ok(leg) => PairCell {
                i,
                j,
                distance_m: leg.distance_m,
                duration_s: leg.duration_s,
                degraded: false,
            },
            Err(err) => {
                log::debug!("pairwise request {i}->{j} failed ({err}), estimating");
                let leg = self.estimator.leg(from, to);
                PairCell {
                    i,
                    j,
                    distance_m: leg.distance_m,
                    duration_s: leg.duration_s,
                    degraded: true,
                }
            }
        }
    }

    /// Fetch one block, retrying transient failures and then trying the
    /// fallback gateway before giving up.
    fn fetch_block(
        &self,
        locations: &[Coord<f64>],
        sources: &[usize],
        destinations: &[usize],
        departure: Option<DepartureTime>,
    ) -> BlockResult {
        let primary = self.try_gateway(self.gateway, locations, sources, destinations, departure);
        match primary {
            BlockResult::Failed => {
                if let Some(fallback) = self.fallback_gateway {
                    log::info!(
                        "primary provider failed for a {}-location block, trying {}",
                        locations.len(),
                        fallback.provider_id(),
                    );
                    self.try_gateway(fallback, locations, sources, destinations, departure)
                } else {
                    BlockResult::Failed
                }
            }
            other => other,
        }
    }

    fn try_gateway(
        &self,
        gateway: &dyn RoutingGateway,
        locations: &[Coord<f64>],
        sources: &[usize],
        destinations: &[usize],
        departure: Option<DepartureTime>,
    ) -> BlockResult {
        for attempt in 0..=self.config.retry_attempts {
            match gateway.matrix(locations, sources, destinations, departure) {
                Ok(response) => return BlockResult::Complete(response),
                Err(GatewayError::PartialMatrix { response, missing }) => {
                    return BlockResult::Partial(response, missing);
                }
                Err(GatewayError::RequestTooLarge { .. }) => return BlockResult::TooLarge,
                Err(GatewayError::ProviderUnavailable { reason }) => {
                    if attempt == self.config.retry_attempts {
                        log::warn!(
                            "{} unavailable after {} attempts: {reason}",
                            gateway.provider_id(),
                            attempt + 1,
                        );
                        return BlockResult::Failed;
                    }
                    let delay = self.config.retry_base_delay * 2u32.saturating_pow(attempt);
                    log::debug!(
                        "{} unavailable ({reason}), retrying in {delay:?}",
                        gateway.provider_id(),
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => {
                    log::warn!("{} request failed: {err}", gateway.provider_id());
                    return BlockResult::Failed;
                }
            }
        }
        BlockResult::Failed
    }

    /// Write a response block into `assembled` at the absolute indices in
    /// `row_indices` × `col_indices`, estimating missing cells. Returns the
    /// degraded-cell count.
    fn write_block(
        &self,
        assembled: &mut Assembled,
        response: &MatrixResponse,
        locations: &[Coord<f64>],
        row_indices: &[usize],
        col_indices: &[usize],
    ) -> usize {
        let mut degraded = 0;
        for (bi, &i) in row_indices.iter().enumerate() {
            for (bj, &j) in col_indices.iter().enumerate() {
                let distance = response
                    .distances_m
                    .get(bi)
                    .and_then(|row| row.get(bj))
                    .copied()
                    .flatten();
                let duration = response
                    .durations_s
                    .get(bi)
                    .and_then(|row| row.get(bj))
                    .copied()
                    .flatten();
                match (distance, duration) {
                    (Some(distance), Some(duration)) => {
                        assembled.distances[i][j] = distance;
                        assembled.durations[i][j] = duration;
                    }
                    _ => {
                        let (d, t) = self.estimate_cell(locations, i, j);
                        assembled.distances[i][j] = d;
                        assembled.durations[i][j] = t;
                        if i != j {
                            degraded += 1;
                        }
                    }
                }
            }
        }
        degraded
    }

    /// As [`Self::write_block`] but into a tile-local grid.
    fn write_tile_block(
        &self,
        tile: &mut Tile,
        response: &MatrixResponse,
        locations: &[Coord<f64>],
        row_indices: &[usize],
        col_indices: &[usize],
    ) -> usize {
        let mut degraded = 0;
        for (bi, &i) in row_indices.iter().enumerate() {
            for (bj, &j) in col_indices.iter().enumerate() {
                let distance = response
                    .distances_m
                    .get(bi)
                    .and_then(|row| row.get(bj))
                    .copied()
                    .flatten();
                let duration = response
                    .durations_s
                    .get(bi)
                    .and_then(|row| row.get(bj))
                    .copied()
                    .flatten();
                match (distance, duration) {
                    (Some(distance), Some(duration)) => {
                        tile.distances[bi][bj] = distance;
                        tile.durations[bi][bj] = duration;
                    }
                    _ => {
                        let (d, t) = self.estimate_cell(locations, i, j);
                        tile.distances[bi][bj] = d;
                        tile.durations[bi][bj] = t;
                        if i != j {
                            degraded += 1;
                        }
                    }
                }
            }
        }
        degraded
    }

    fn estimate_cell(&self, locations: &[Coord<f64>], i: usize, j: usize) -> (i32, i32) {
        if i == j {
            return (0, 0);
        }
        let leg = self.estimator.leg(locations[i], locations[j]);
        (leg.distance_m, leg.duration_s)
    }

    fn estimate_all(&self, locations: &[Coord<f64>]) -> Assembled {
        let n = locations.len();
        let mut assembled = Assembled::zeroed(n);
        for i in 0..n {
            for j in 0..n {
                let (d, t) = self.estimate_cell(locations, i, j);
                assembled.distances[i][j] = d;
                assembled.durations[i][j] = t;
            }
        }
        assembled.degraded = n * n - n;
        assembled
    }

    fn estimate_tile(&self, locations: &[Coord<f64>], rows: Range<usize>, cols: Range<usize>) -> Tile {
        let mut tile = Tile::zeroed(rows.clone(), cols.clone());
        for (ti, i) in rows.clone().enumerate() {
            for (tj, j) in cols.clone().enumerate() {
                let (d, t) = self.estimate_cell(locations, i, j);
                tile.distances[ti][tj] = d;
                tile.durations[ti][tj] = t;
                if i != j {
                    tile.degraded += 1;
                }
            }
        }
        tile
    }
}

struct Assembled {
    distances: Vec<Vec<i32>>,
    durations: Vec<Vec<i32>>,
    degraded: usize,
}

impl Assembled {
    fn zeroed(n: usize) -> Self {
        Self {
            distances: vec![vec![0; n]; n],
            durations: vec![vec![0; n]; n],
            degraded: 0,
        }
    }
}

struct Tile {
    rows: Range<usize>,
    cols: Range<usize>,
    distances: Vec<Vec<i32>>,
    durations: Vec<Vec<i32>>,
    degraded: usize,
}

impl Tile {
    fn zeroed(rows: Range<usize>, cols: Range<usize>) -> Self {
        let height = rows.end - rows.start;
        let width = cols.end - cols.start;
        Self {
            rows,
            cols,
            distances: vec![vec![0; width]; height],
            durations: vec![vec![0; width]; height],
            degraded: 0,
        }
    }
}

struct PairCell {
    i: usize,
    j: usize,
    distance_m: i32,
    duration_s: i32,
    degraded: bool,
}

enum BlockResult {
    Complete(MatrixResponse),
    Partial(MatrixResponse, usize),
    TooLarge,
    Failed,
}
