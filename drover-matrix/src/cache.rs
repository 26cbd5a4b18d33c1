//! On-disk matrix cache.
//!
//! One file per entry, named by the md5 of a canonical key over the provider
//! identity, departure time, and the ordered coordinate list at 6-decimal
//! precision. Entries carry a schema version byte so a format change
//! invalidates old files instead of misreading them. Writes go to a
//! temporary file and rename into place; corrupt or stale files are misses.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use camino::Utf8PathBuf;
use geo::Coord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use drover_core::gateway::DepartureTime;
use drover_core::matrix::TravelMatrix;

/// Bumped whenever the entry layout changes.
pub const CACHE_SCHEMA_VERSION: u8 = 1;

/// Errors returned by [`MatrixCache::put`].
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Entry encoding failure.
    #[error("cache encoding failed: {0}")]
    Encode(#[from] bincode::Error),
}

/// Content-addressed key for one matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    hex: String,
}

impl CacheKey {
    /// Derive the key for a provider, departure time, and location list.
    #[must_use]
    pub fn new(
        provider_id: &str,
        departure: Option<DepartureTime>,
        locations: &[Coord<f64>],
    ) -> Self {
        let mut canonical = format!(
            "v{CACHE_SCHEMA_VERSION}|{provider_id}|{}|",
            departure.map_or_else(|| "-".to_owned(), |d| d.to_string()),
        );
        for location in locations {
            canonical.push_str(&format!("{:.6},{:.6};", location.y, location.x));
        }
        Self {
            hex: format!("{:x}", md5::compute(canonical.as_bytes())),
        }
    }

    /// Hex digest used as the file stem.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    version: u8,
    provider: String,
    created_unix: u64,
    n: u32,
    distances_m: Vec<i32>,
    durations_s: Vec<i32>,
}

/// TTL-evicted matrix cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct MatrixCache {
    dir: Utf8PathBuf,
    ttl: Duration,
}

impl MatrixCache {
    /// Cache rooted at `dir` with the given entry lifetime.
    pub fn new(dir: impl Into<Utf8PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    fn entry_path(&self, key: &CacheKey) -> Utf8PathBuf {
        self.dir.join(format!("{}.bin", key.hex))
    }

    /// Look up a matrix. Stale, corrupt, or mismatched entries are misses.
    #[must_use]
    pub fn get(&self, key: &CacheKey, locations: &[Coord<f64>]) -> Option<TravelMatrix> {
        let path = self.entry_path(key);
        let bytes = std::fs::read(&path).ok()?;
        let entry: CacheEntry = match bincode::deserialize(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("cache entry {path} is corrupt ({err}), treating as a miss");
                let _ = std::fs::remove_file(&path);
                return None;
            }
        };

        if entry.version != CACHE_SCHEMA_VERSION {
            log::warn!(
                "cache entry {path} has schema {} (want {CACHE_SCHEMA_VERSION}), treating as a miss",
                entry.version,
            );
            let _ = std::fs::remove_file(&path);
            return None;
        }
        let age = now_unix().saturating_sub(entry.created_unix);
        if age > self.ttl.as_secs() {
            log::debug!("cache entry {path} expired ({age}s old)");
            let _ = std::fs::remove_file(&path);
            return None;
        }
        let n = entry.n as usize;
        if n != locations.len() || entry.distances_m.len() != n * n || entry.durations_s.len() != n * n {
            log::warn!("cache entry {path} does not match the requested locations");
            return None;
        }

        let unflatten = |flat: &[i32]| -> Vec<Vec<i32>> {
            flat.chunks(n).map(<[i32]>::to_vec).collect()
        };
        match TravelMatrix::new(
            locations.to_vec(),
            unflatten(&entry.distances_m),
            unflatten(&entry.durations_s),
        ) {
            Ok(matrix) => Some(matrix),
            Err(err) => {
                log::warn!("cache entry {path} holds an invalid matrix ({err})");
                None
            }
        }
    }

    /// Persist a matrix atomically.
    pub fn put(
        &self,
        key: &CacheKey,
        provider_id: &str,
        matrix: &TravelMatrix,
    ) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            version: CACHE_SCHEMA_VERSION,
            provider: provider_id.to_owned(),
            created_unix: now_unix(),
            n: matrix.len() as u32,
            distances_m: matrix.distances_row_major(),
            durations_s: matrix.durations_row_major(),
        };
        let bytes = bincode::serialize(&entry)?;

        let path = self.entry_path(key);
        let tmp = self.dir.join(format!("{}.bin.tmp", key.hex));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::geometry::coord;
    use rstest::rstest;

    fn sample_matrix() -> (Vec<Coord<f64>>, TravelMatrix) {
        let locations = vec![coord(42.70, 23.32), coord(42.71, 23.33)];
        let matrix = TravelMatrix::new(
            locations.clone(),
            vec![vec![0, 1500], vec![1490, 0]],
            vec![vec![0, 180], vec![175, 0]],
        )
        .unwrap();
        (locations, matrix)
    }

    #[rstest]
    fn key_is_stable_and_sensitive() {
        let locations = [coord(42.70, 23.32), coord(42.71, 23.33)];
        let a = CacheKey::new("osrm/driving", None, &locations);
        let b = CacheKey::new("osrm/driving", None, &locations);
        assert_eq!(a, b);

        let other_provider = CacheKey::new("valhalla/auto", None, &locations);
        assert_ne!(a, other_provider);

        let departure = DepartureTime::parse("08:00").unwrap();
        let with_departure = CacheKey::new("osrm/driving", Some(departure), &locations);
        assert_ne!(a, with_departure);
    }

    #[rstest]
    fn round_trips_byte_identically() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MatrixCache::new(dir.path().to_str().unwrap(), Duration::from_secs(3600));
        let (locations, matrix) = sample_matrix();
        let key = CacheKey::new("osrm/driving", None, &locations);

        cache.put(&key, "osrm/driving", &matrix).unwrap();
        let loaded = cache.get(&key, &locations).expect("entry should be fresh");
        assert_eq!(loaded.distances_row_major(), matrix.distances_row_major());
        assert_eq!(loaded.durations_row_major(), matrix.durations_row_major());
    }

    #[rstest]
    fn zero_ttl_expires_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MatrixCache::new(dir.path().to_str().unwrap(), Duration::ZERO);
        let (locations, matrix) = sample_matrix();
        let key = CacheKey::new("osrm/driving", None, &locations);

        cache.put(&key, "osrm/driving", &matrix).unwrap();
        std::thread::sleep(Duration::from_millis(1100));
        assert!(cache.get(&key, &locations).is_none());
    }

    #[rstest]
    fn corrupt_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MatrixCache::new(dir.path().to_str().unwrap(), Duration::from_secs(3600));
        let (locations, matrix) = sample_matrix();
        let key = CacheKey::new("osrm/driving", None, &locations);
        cache.put(&key, "osrm/driving", &matrix).unwrap();

        let path = dir.path().join(format!("{}.bin", key.hex()));
        std::fs::write(&path, b"not a cache entry").unwrap();
        assert!(cache.get(&key, &locations).is_none());
        // The corrupt file is evicted.
        assert!(!path.exists());
    }
}
