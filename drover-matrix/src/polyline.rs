//! Google polyline decoding for encoded route shapes.

use geo::Coord;

/// Decode a polyline string into coordinates at the given precision
/// (1e5 for OSRM, 1e6 for Valhalla shapes).
pub(crate) fn decode(encoded: &str, precision: f64) -> Vec<Coord<f64>> {
    let mut points = Vec::new();
    let mut lat = 0i64;
    let mut lon = 0i64;
    let bytes = encoded.as_bytes();
    let mut index = 0;

    let mut next_value = |index: &mut usize| -> Option<i64> {
        let mut shift = 0u32;
        let mut result = 0i64;
        loop {
            let byte = i64::from(*bytes.get(*index)?) - 63;
            *index += 1;
            result |= (byte & 0x1f) << shift;
            shift += 5;
            if byte < 0x20 {
                break;
            }
        }
        Some(if result & 1 != 0 {
            !(result >> 1)
        } else {
            result >> 1
        })
    };

    while index < bytes.len() {
        let Some(dlat) = next_value(&mut index) else {
            break;
        };
        let Some(dlon) = next_value(&mut index) else {
            break;
        };
        lat += dlat;
        lon += dlon;
        points.push(Coord {
            x: lon as f64 / precision,
            y: lat as f64 / precision,
        });
    }

    points
}
