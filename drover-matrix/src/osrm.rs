//! Static routing gateway speaking the OSRM HTTP protocol.
//!
//! Table requests go out as GET with `annotations=distance,duration` and
//! optional `sources`/`destinations` index lists; coordinate lists too long
//! for a URL switch to the POST form. Some deployments omit the `distances`
//! annotation, in which case distances are derived from durations at the
//! configured average speed.

use std::time::Duration;

use geo::Coord;
use serde::Deserialize;

use drover_core::gateway::{
    DepartureTime, GatewayError, MatrixResponse, RouteGeometry, RouteLeg, RoutingGateway,
};

use crate::GatewayBuildError;

/// Derived distances run longer than the straight-line ideal.
const DERIVED_DISTANCE_CORRECTION: f64 = 1.1;

/// Connection settings for an OSRM-protocol server.
#[derive(Debug, Clone)]
pub struct OsrmConfig {
    /// Server base URL.
    pub base_url: String,
    /// Routing profile (`"driving"`, `"walking"`, `"cycling"`).
    pub profile: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Speed used when deriving distances from durations, km/h.
    pub average_speed_kmh: f64,
    /// Location ceiling per table request; more fails with `RequestTooLarge`.
    pub max_table_locations: usize,
    /// Longest URL sent as GET before switching to POST.
    pub max_get_url_len: usize,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_owned(),
            profile: "driving".to_owned(),
            timeout: Duration::from_secs(60),
            average_speed_kmh: 40.0,
            max_table_locations: 100,
            max_get_url_len: 4000,
        }
    }
}

/// Gateway for a static OSRM-protocol routing server.
#[derive(Debug)]
pub struct OsrmGateway {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
    id: String,
}

impl OsrmGateway {
    /// Build a gateway with a keep-alive HTTP client.
    pub fn new(config: OsrmConfig) -> Result<Self, GatewayBuildError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent("drover/0.1")
            .build()?;
        let id = format!("osrm/{}", config.profile);
        Ok(Self { config, client, id })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn coords_path(locations: &[Coord<f64>]) -> String {
        locations
            .iter()
            .map(|c| format!("{:.6},{:.6}", c.x, c.y))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn index_list(indices: &[usize]) -> String {
        indices
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";")
    }

    fn send_table(
        &self,
        locations: &[Coord<f64>],
        sources: &[usize],
        destinations: &[usize],
    ) -> Result<TableResponse, GatewayError> {
        let mut url = format!(
            "{}/table/v1/{}/{}?annotations=distance,duration",
            self.base(),
            self.config.profile,
            Self::coords_path(locations),
        );
        if !sources.is_empty() {
            url.push_str(&format!("&sources={}", Self::index_list(sources)));
        }
        if !destinations.is_empty() {
            url.push_str(&format!("&destinations={}", Self::index_list(destinations)));
        }

        let response = if url.len() <= self.config.max_get_url_len {
            self.client.get(&url).send()
        } else {
            let mut body = serde_json::json!({
                "coordinates": locations.iter().map(|c| [c.x, c.y]).collect::<Vec<_>>(),
                "annotations": ["distance", "duration"],
            });
            if !sources.is_empty() {
                body["sources"] = serde_json::json!(sources);
            }
            if !destinations.is_empty() {
                body["destinations"] = serde_json::json!(destinations);
            }
            self.client
                .post(format!("{}/table/v1/{}", self.base(), self.config.profile))
                .json(&body)
                .send()
        };

        let response = response.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::ProviderUnavailable {
                reason: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::InvalidResponse {
                message: format!("HTTP {status}"),
            });
        }
        let table: TableResponse = response.json().map_err(|err| GatewayError::InvalidResponse {
            message: err.to_string(),
        })?;
        if table.code != "Ok" {
            return Err(GatewayError::InvalidResponse {
                message: format!(
                    "table request failed: {} {}",
                    table.code,
                    table.message.clone().unwrap_or_default()
                ),
            });
        }
        Ok(table)
    }
}

impl RoutingGateway for OsrmGateway {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn matrix(
        &self,
        locations: &[Coord<f64>],
        sources: &[usize],
        destinations: &[usize],
        _departure: Option<DepartureTime>,
    ) -> Result<MatrixResponse, GatewayError> {
        if locations.len() < 2 {
            return Err(GatewayError::TooFewLocations {
                got: locations.len(),
            });
        }
        if locations.len() > self.config.max_table_locations {
            return Err(GatewayError::RequestTooLarge {
                locations: locations.len(),
            });
        }

        let table = self.send_table(locations, sources, destinations)?;

        let durations = table.durations.ok_or_else(|| GatewayError::InvalidResponse {
            message: "table response carries no durations".to_owned(),
        })?;

        let speed_ms = self.config.average_speed_kmh * 1000.0 / 3600.0;
        let distances = match table.distances {
            Some(distances) => distances,
            None => {
                // Older deployments reject the distance annotation; estimate
                // from durations at the configured speed.
                log::warn!("table response carries no distances, deriving from durations");
                durations
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|cell| cell.map(|s| s * speed_ms * DERIVED_DISTANCE_CORRECTION))
                            .collect()
                    })
                    .collect()
            }
        };

        let response = MatrixResponse {
            distances_m: round_grid(&distances),
            durations_s: round_grid(&durations),
        };
        let missing = response.missing_cells();
        if missing > 0 {
            return Err(GatewayError::PartialMatrix { response, missing });
        }
        Ok(response)
    }

    fn route(&self, from: Coord<f64>, to: Coord<f64>) -> Result<RouteLeg, GatewayError> {
        let url = format!(
            "{}/route/v1/{}/{}?overview=false&steps=false",
            self.base(),
            self.config.profile,
            Self::coords_path(&[from, to]),
        );
        let route = self.fetch_route(&url)?;
        Ok(RouteLeg {
            distance_m: route.distance.round() as i32,
            duration_s: route.duration.round() as i32,
        })
    }

    fn geometry(&self, waypoints: &[Coord<f64>]) -> Result<RouteGeometry, GatewayError> {
        if waypoints.len() < 2 {
            return Err(GatewayError::NoRoute);
        }
        let url = format!(
            "{}/route/v1/{}/{}?geometries=geojson&overview=full",
            self.base(),
            self.config.profile,
            Self::coords_path(waypoints),
        );
        let route = self.fetch_route(&url)?;
        let points = route
            .geometry
            .map(|g| {
                g.coordinates
                    .into_iter()
                    .map(|[lon, lat]| Coord { x: lon, y: lat })
                    .collect()
            })
            .unwrap_or_default();
        Ok(RouteGeometry {
            points,
            distance_m: route.distance.round() as i32,
            duration_s: route.duration.round() as i32,
        })
    }
}

impl OsrmGateway {
    fn fetch_route(&self, url: &str) -> Result<OsrmRoute, GatewayError> {
        let response = self.client.get(url).send().map_err(map_transport_error)?;
        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::ProviderUnavailable {
                reason: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::InvalidResponse {
                message: format!("HTTP {status}"),
            });
        }
        let body: RouteResponse = response.json().map_err(|err| GatewayError::InvalidResponse {
            message: err.to_string(),
        })?;
        if body.code != "Ok" {
            return Err(GatewayError::InvalidResponse {
                message: format!("route request failed: {}", body.code),
            });
        }
        body.routes.into_iter().next().ok_or(GatewayError::NoRoute)
    }
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    GatewayError::ProviderUnavailable {
        reason: err.to_string(),
    }
}

fn round_grid(grid: &[Vec<Option<f64>>]) -> Vec<Vec<Option<i32>>> {
    grid.iter()
        .map(|row| {
            row.iter()
                .copied()
                .map(|cell| {
                    cell.filter(|v| v.is_finite() && *v >= 0.0)
                        .map(|v| v.round() as i32)
                })
                .collect()
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    code: String,
    message: Option<String>,
    distances: Option<Vec<Vec<Option<f64>>>>,
    durations: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: Option<GeoJsonLine>,
}

#[derive(Debug, Deserialize)]
struct GeoJsonLine {
    coordinates: Vec<[f64; 2]>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn coords_path_is_lon_lat_semicolon_separated() {
        let path = OsrmGateway::coords_path(&[
            Coord { x: 23.32, y: 42.70 },
            Coord { x: 23.33, y: 42.71 },
        ]);
        assert_eq!(path, "23.320000,42.700000;23.330000,42.710000");
    }

    #[rstest]
    fn oversized_requests_fail_before_any_io() {
        let gateway = OsrmGateway::new(OsrmConfig {
            max_table_locations: 2,
            ..OsrmConfig::default()
        })
        .unwrap();
        let locations = vec![
            Coord { x: 23.32, y: 42.70 },
            Coord { x: 23.33, y: 42.71 },
            Coord { x: 23.34, y: 42.72 },
        ];
        let err = gateway.matrix(&locations, &[], &[], None).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::RequestTooLarge { locations: 3 }
        ));
    }

    #[rstest]
    fn deserialises_table_with_null_cells() {
        let raw = r#"{"code":"Ok","durations":[[0.0,null],[120.5,0.0]],"distances":[[0.0,null],[900.0,0.0]]}"#;
        let table: TableResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(table.code, "Ok");
        let durations = table.durations.unwrap();
        assert_eq!(durations[0][1], None);
        assert_eq!(durations[1][0], Some(120.5));
    }

    #[rstest]
    fn round_grid_drops_negative_and_non_finite_values() {
        let grid = vec![vec![Some(1.4), Some(-2.0), Some(f64::NAN), None]];
        let rounded = round_grid(&grid);
        assert_eq!(rounded, vec![vec![Some(1), None, None, None]]);
    }
}
