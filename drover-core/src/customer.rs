//! Delivery customers.

use geo::Coord;
use thiserror::Error;

use crate::geometry::coord;

/// A geolocated delivery customer with a demand volume.
///
/// Customers are referenced by their stable `id` throughout a run; routes
/// carry ids rather than embedded copies.
///
/// # Examples
///
/// ```
/// use drover_core::Customer;
///
/// let customer = Customer::new("c-1", "Corner shop", 42.70, 23.32, 12.0)?;
/// assert_eq!(customer.id, "c-1");
/// # Ok::<(), drover_core::CustomerError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    /// Stable identifier, unique within a run.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Geospatial position (`x` = longitude, `y` = latitude).
    pub location: Coord<f64>,
    /// Demand volume in stock units, non-negative.
    pub demand: f64,
}

/// Errors returned by [`Customer::new`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CustomerError {
    /// Latitude or longitude outside the valid range.
    #[error("coordinate ({lat}, {lon}) is outside the valid range")]
    InvalidCoordinate {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lon: f64,
    },
    /// Demand was negative or not finite.
    #[error("demand volume {0} must be finite and non-negative")]
    InvalidVolume(f64),
    /// The id was empty.
    #[error("customer id must not be empty")]
    EmptyId,
}

impl Customer {
    /// Validates and constructs a [`Customer`].
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        lat: f64,
        lon: f64,
        demand: f64,
    ) -> Result<Self, CustomerError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CustomerError::EmptyId);
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(CustomerError::InvalidCoordinate { lat, lon });
        }
        if !demand.is_finite() || demand < 0.0 {
            return Err(CustomerError::InvalidVolume(demand));
        }
        Ok(Self {
            id,
            name: name.into(),
            location: coord(lat, lon),
            demand,
        })
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn lat(&self) -> f64 {
        self.location.y
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn lon(&self) -> f64 {
        self.location.x
    }
}
