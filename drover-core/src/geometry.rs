//! Great-circle geometry helpers.
//!
//! Coordinates use [`geo::Coord`] with `x` = longitude and `y` = latitude.
//! Road distances estimated from straight-line geometry carry a fixed shape
//! factor, since real road networks are longer than the geodesic.

use geo::Coord;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Ratio of typical road distance to great-circle distance.
pub const ROAD_SHAPE_FACTOR: f64 = 1.3;

/// Default urban driving speed assumed when no provider duration exists.
pub const DEFAULT_AVERAGE_SPEED_KMH: f64 = 40.0;

/// Build a coordinate from latitude and longitude in degrees.
#[must_use]
pub fn coord(lat: f64, lon: f64) -> Coord<f64> {
    Coord { x: lon, y: lat }
}

/// Great-circle distance between two coordinates in metres.
#[must_use]
pub fn haversine_m(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let dlat = (b.y - a.y).to_radians();
    let dlon = (b.x - a.x).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Great-circle distance between two coordinates in kilometres.
#[must_use]
pub fn haversine_km(a: Coord<f64>, b: Coord<f64>) -> f64 {
    haversine_m(a, b) / 1000.0
}

/// Road-distance estimate in metres for a pair with no provider data.
#[must_use]
pub fn road_estimate_m(a: Coord<f64>, b: Coord<f64>) -> f64 {
    haversine_m(a, b) * ROAD_SHAPE_FACTOR
}

/// Travel time in seconds for a distance at the given average speed.
#[must_use]
pub fn travel_seconds(distance_m: f64, speed_kmh: f64) -> f64 {
    if speed_kmh <= 0.0 {
        return 0.0;
    }
    distance_m / 1000.0 / speed_kmh * 3600.0
}

/// True when two coordinates agree to roughly centimetre precision.
#[must_use]
pub fn coords_close(a: Coord<f64>, b: Coord<f64>) -> bool {
    (a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn same_point_has_zero_distance() {
        let p = coord(42.7, 23.32);
        assert!(haversine_m(p, p) < 0.001);
    }

    #[rstest]
    fn sofia_to_vratza_is_roughly_sixty_kilometres() {
        let sofia = coord(42.6977, 23.3219);
        let vratza = coord(43.2210, 23.5344);
        let km = haversine_km(sofia, vratza);
        assert!((55.0..70.0).contains(&km), "got {km} km");
    }

    #[rstest]
    fn distance_is_symmetric() {
        let a = coord(42.70, 23.32);
        let b = coord(42.75, 23.40);
        assert!((haversine_m(a, b) - haversine_m(b, a)).abs() < 1e-9);
    }

    #[rstest]
    fn ten_kilometres_at_forty_kmh_takes_fifteen_minutes() {
        let seconds = travel_seconds(10_000.0, 40.0);
        assert!((seconds - 900.0).abs() < 1e-9);
    }
}
