//! Vehicle classes, fleet specifications, and depot derivation.

use geo::Coord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::coords_close;

/// The closed set of vehicle classes the planner knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    /// Standard city delivery vehicle.
    Internal,
    /// Vehicle preferred inside the centre zone.
    Center,
    /// Long-haul vehicle for routes leaving the city.
    External,
    /// Special-regime vehicle.
    Special,
    /// Vehicle stationed at a regional depot.
    Regional,
}

impl VehicleClass {
    /// Default per-stop service time in minutes for this class.
    #[must_use]
    pub const fn default_service_minutes(self) -> u32 {
        match self {
            Self::Internal | Self::External | Self::Regional => 7,
            Self::Center => 9,
            Self::Special => 6,
        }
    }

    /// Default start time as minutes from midnight.
    #[must_use]
    pub const fn default_start_minute(self) -> u32 {
        match self {
            Self::Internal | Self::Special | Self::Regional => 480,
            Self::Center => 510,
            Self::External => 450,
        }
    }
}

impl std::fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Internal => "internal",
            Self::Center => "center",
            Self::External => "external",
            Self::Special => "special",
            Self::Regional => "regional",
        };
        f.write_str(name)
    }
}

/// Configuration for one logical vehicle type.
///
/// All vehicles of a class share the same limits; `count` says how many
/// physical units exist. Disabled specs are ignored everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSpec {
    /// Vehicle class.
    pub class: VehicleClass,
    /// Capacity in stock units, strictly positive.
    pub capacity: u32,
    /// Number of available units of this type.
    pub count: u32,
    /// Optional per-route distance ceiling in kilometres.
    pub max_distance_km: Option<f64>,
    /// Per-route time budget in minutes, travel plus service.
    pub max_time_minutes: u32,
    /// Service time per stop in minutes.
    pub service_minutes: u32,
    /// Route start time as minutes from midnight.
    pub start_minute: u32,
    /// Optional ceiling on customers per route.
    pub max_stops: Option<u32>,
    /// Whether this type participates in planning.
    pub enabled: bool,
    /// Depot the unit starts from and returns to.
    pub start_depot: Coord<f64>,
    /// Origin used by the TSP refinement stage; defaults to the start depot.
    pub tsp_origin: Option<Coord<f64>>,
}

impl VehicleSpec {
    /// The origin the TSP refinement stage sequences from.
    #[must_use]
    pub fn tsp_origin(&self) -> Coord<f64> {
        self.tsp_origin.unwrap_or(self.start_depot)
    }

    fn validate(&self) -> Result<(), VehicleError> {
        if self.capacity == 0 {
            return Err(VehicleError::ZeroCapacity(self.class));
        }
        if self.max_time_minutes == 0 {
            return Err(VehicleError::ZeroTimeBudget(self.class));
        }
        Ok(())
    }
}

/// Errors returned by [`Fleet::new`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VehicleError {
    /// A vehicle spec declared zero capacity.
    #[error("{0} vehicle must have a positive capacity")]
    ZeroCapacity(VehicleClass),
    /// A vehicle spec declared a zero time budget.
    #[error("{0} vehicle must have a positive time budget")]
    ZeroTimeBudget(VehicleClass),
}

/// A validated collection of vehicle specifications.
#[derive(Debug, Clone, PartialEq)]
pub struct Fleet {
    specs: Vec<VehicleSpec>,
}

impl Fleet {
    /// Validates every spec and constructs a [`Fleet`].
    pub fn new(specs: Vec<VehicleSpec>) -> Result<Self, VehicleError> {
        for spec in &specs {
            spec.validate()?;
        }
        Ok(Self { specs })
    }

    /// All specifications, enabled or not.
    #[must_use]
    pub fn specs(&self) -> &[VehicleSpec] {
        &self.specs
    }

    /// Enabled specifications only.
    pub fn enabled(&self) -> impl Iterator<Item = &VehicleSpec> {
        self.specs.iter().filter(|s| s.enabled)
    }

    /// True when at least one unit of one enabled spec exists.
    #[must_use]
    pub fn has_enabled(&self) -> bool {
        self.enabled().any(|s| s.count > 0)
    }

    /// Total fleet capacity: Σ capacity × count over enabled specs.
    #[must_use]
    pub fn total_capacity(&self) -> u64 {
        self.enabled()
            .map(|s| u64::from(s.capacity) * u64::from(s.count))
            .sum()
    }

    /// Capacity of the largest single enabled vehicle.
    #[must_use]
    pub fn max_single_capacity(&self) -> u32 {
        self.enabled()
            .filter(|s| s.count > 0)
            .map(|s| s.capacity)
            .max()
            .unwrap_or(0)
    }

    /// Derive the depot set: the main depot first, then every other distinct
    /// start depot of an enabled spec ordered by (latitude, longitude).
    #[must_use]
    pub fn depot_set(&self, main_depot: Coord<f64>) -> DepotSet {
        let mut others: Vec<Coord<f64>> = Vec::new();
        for spec in self.enabled() {
            let depot = spec.start_depot;
            if coords_close(depot, main_depot) {
                continue;
            }
            if !others.iter().any(|d| coords_close(*d, depot)) {
                others.push(depot);
            }
        }
        others.sort_by(|a, b| a.y.total_cmp(&b.y).then_with(|| a.x.total_cmp(&b.x)));

        let mut coords = Vec::with_capacity(others.len() + 1);
        coords.push(main_depot);
        coords.extend(others);
        DepotSet { coords }
    }

    /// Expand enabled specs into individual vehicle units with resolved
    /// depot node indices. Units are numbered in spec order, so numbering is
    /// deterministic for a fixed configuration.
    #[must_use]
    pub fn expand_units(&self, depots: &DepotSet) -> Vec<VehicleUnit> {
        let mut units = Vec::new();
        for (spec_index, spec) in self.specs.iter().enumerate() {
            if !spec.enabled {
                continue;
            }
            let depot = depots.index_of(spec.start_depot).unwrap_or(0);
            for unit_index in 0..spec.count {
                units.push(VehicleUnit {
                    spec_index,
                    unit_index,
                    class: spec.class,
                    capacity: spec.capacity,
                    max_distance_m: spec.max_distance_km.map(|km| (km * 1000.0).round() as i64),
                    max_stops: spec.max_stops,
                    max_time_seconds: i64::from(spec.max_time_minutes) * 60,
                    service_seconds: i64::from(spec.service_minutes) * 60,
                    start_minute: spec.start_minute,
                    start_depot: depot,
                    end_depot: depot,
                    tsp_origin: spec.tsp_origin(),
                });
            }
        }
        units
    }
}

/// Ordered set of unique depot coordinates.
///
/// Depot indices occupy matrix rows `0..len()`; customers follow.
#[derive(Debug, Clone, PartialEq)]
pub struct DepotSet {
    coords: Vec<Coord<f64>>,
}

impl DepotSet {
    /// Depot coordinates in index order.
    #[must_use]
    pub fn coords(&self) -> &[Coord<f64>] {
        &self.coords
    }

    /// Number of depots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// True when no depots exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Index of a depot coordinate, matched to centimetre tolerance.
    #[must_use]
    pub fn index_of(&self, depot: Coord<f64>) -> Option<usize> {
        self.coords.iter().position(|d| coords_close(*d, depot))
    }
}

/// One physical vehicle produced by fleet expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleUnit {
    /// Index of the originating spec within the fleet.
    pub spec_index: usize,
    /// Ordinal of this unit within its spec.
    pub unit_index: u32,
    /// Vehicle class.
    pub class: VehicleClass,
    /// Capacity in stock units.
    pub capacity: u32,
    /// Optional distance ceiling in metres.
    pub max_distance_m: Option<i64>,
    /// Optional ceiling on customers per route.
    pub max_stops: Option<u32>,
    /// Time budget in seconds.
    pub max_time_seconds: i64,
    /// Service time per stop in seconds.
    pub service_seconds: i64,
    /// Start time as minutes from midnight.
    pub start_minute: u32,
    /// Start depot node index.
    pub start_depot: usize,
    /// End depot node index; equals the start depot.
    pub end_depot: usize,
    /// Origin for the TSP refinement stage.
    pub tsp_origin: Coord<f64>,
}
