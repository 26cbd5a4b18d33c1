//! Time-dependent routing gateway speaking the Valhalla HTTP protocol.
//!
//! Matrix data comes from `/sources_to_targets` (distances arrive in
//! kilometres and are converted to metres); point-to-point legs and shapes
//! from `/route`. A departure time turns into a `date_time` block of type
//! `depart_at` stamped with today's civil date.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use geo::Coord;
use serde::Deserialize;
use serde_json::json;

use drover_core::gateway::{
    DepartureTime, GatewayError, MatrixResponse, RouteGeometry, RouteLeg, RoutingGateway,
};

use crate::polyline;
use crate::GatewayBuildError;

/// Connection settings for a Valhalla-protocol server.
#[derive(Debug, Clone)]
pub struct ValhallaConfig {
    /// Server base URL.
    pub base_url: String,
    /// Costing model (`"auto"`, `"truck"`, `"bicycle"`, `"pedestrian"`).
    pub costing: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Location ceiling per matrix request.
    pub max_matrix_locations: usize,
}

impl Default for ValhallaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_owned(),
            costing: "auto".to_owned(),
            timeout: Duration::from_secs(60),
            max_matrix_locations: 50,
        }
    }
}

/// Gateway for a time-dependent Valhalla-protocol routing server.
#[derive(Debug)]
pub struct ValhallaGateway {
    config: ValhallaConfig,
    client: reqwest::blocking::Client,
    id: String,
}

impl ValhallaGateway {
    /// Build a gateway with a keep-alive HTTP client.
    pub fn new(config: ValhallaConfig) -> Result<Self, GatewayBuildError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent("drover/0.1")
            .build()?;
        let id = format!("valhalla/{}", config.costing);
        Ok(Self { config, client, id })
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Probe `/status`; true when the server answers.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        let url = format!("{}/status", self.base());
        match self.client.get(url).send() {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                log::warn!("time-dependent provider unreachable: {err}");
                false
            }
        }
    }

    fn date_time_block(departure: DepartureTime) -> serde_json::Value {
        let (year, month, day) = today_civil();
        json!({
            "type": 1,
            "value": format!("{year:04}-{month:02}-{day:02}T{departure}"),
        })
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::blocking::Response, GatewayError> {
        let url = format!("{}{path}", self.base());
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|err| GatewayError::ProviderUnavailable {
                reason: err.to_string(),
            })?;
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
        Ok(response)
    }
}

impl RoutingGateway for ValhallaGateway {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn matrix(
        &self,
        locations: &[Coord<f64>],
        sources: &[usize],
        destinations: &[usize],
        departure: Option<DepartureTime>,
    ) -> Result<MatrixResponse, GatewayError> {
        if locations.len() < 2 {
            return Err(GatewayError::TooFewLocations {
                got: locations.len(),
            });
        }
        if locations.len() > self.config.max_matrix_locations {
            return Err(GatewayError::RequestTooLarge {
                locations: locations.len(),
            });
        }

        let pick = |indices: &[usize]| -> Vec<serde_json::Value> {
            let all: Vec<usize> = (0..locations.len()).collect();
            let indices: &[usize] = if indices.is_empty() { &all } else { indices };
            indices
                .iter()
                .map(|&i| json!({ "lat": locations[i].y, "lon": locations[i].x }))
                .collect()
        };

        let mut body = json!({
            "sources": pick(sources),
            "targets": pick(destinations),
            "costing": self.config.costing,
        });
        if let Some(departure) = departure {
            body["date_time"] = Self::date_time_block(departure);
        }

        let parsed: SourcesToTargetsResponse = self
            .post("/sources_to_targets", &body)?
            .json()
            .map_err(|err| GatewayError::InvalidResponse {
                message: err.to_string(),
            })?;

        let rows = parsed.sources_to_targets;
        let mut distances = Vec::with_capacity(rows.len());
        let mut durations = Vec::with_capacity(rows.len());
        for row in rows {
            let mut drow = Vec::with_capacity(row.len());
            let mut trow = Vec::with_capacity(row.len());
            for cell in row {
                match cell {
                    Some(cell) => {
                        drow.push(cell.distance.map(|km| (km * 1000.0).round() as i32));
                        trow.push(cell.time.map(|s| s.round() as i32));
                    }
                    None => {
                        drow.push(None);
                        trow.push(None);
                    }
                }
            }
            distances.push(drow);
            durations.push(trow);
        }

        let response = MatrixResponse {
            distances_m: distances,
            durations_s: durations,
        };
        let missing = response.missing_cells();
        if missing > 0 {
            return Err(GatewayError::PartialMatrix { response, missing });
        }
        Ok(response)
    }

    fn route(&self, from: Coord<f64>, to: Coord<f64>) -> Result<RouteLeg, GatewayError> {
        let body = json!({
            "locations": [
                { "lat": from.y, "lon": from.x },
                { "lat": to.y, "lon": to.x },
            ],
            "costing": self.config.costing,
            "directions_options": { "units": "kilometers" },
        });
        let parsed: RouteResponse =
            self.post("/route", &body)?
                .json()
                .map_err(|err| GatewayError::InvalidResponse {
                    message: err.to_string(),
                })?;
        let summary = parsed
            .trip
            .legs
            .first()
            .map(|leg| &leg.summary)
            .ok_or(GatewayError::NoRoute)?;
        Ok(RouteLeg {
            distance_m: (summary.length * 1000.0).round() as i32,
            duration_s: summary.time.round() as i32,
        })
    }

    fn geometry(&self, waypoints: &[Coord<f64>]) -> Result<RouteGeometry, GatewayError> {
        if waypoints.len() < 2 {
            return Err(GatewayError::NoRoute);
        }
        let body = json!({
            "locations": waypoints
                .iter()
                .map(|c| json!({ "lat": c.y, "lon": c.x }))
                .collect::<Vec<_>>(),
            "costing": self.config.costing,
            "directions_options": { "units": "kilometers" },
        });
        let parsed: RouteResponse =
            self.post("/route", &body)?
                .json()
                .map_err(|err| GatewayError::InvalidResponse {
                    message: err.to_string(),
                })?;

        let mut points = Vec::new();
        let mut distance_km = 0.0;
        let mut time_s = 0.0;
        for leg in &parsed.trip.legs {
            distance_km += leg.summary.length;
            time_s += leg.summary.time;
            if let Some(shape) = &leg.shape {
                // Valhalla shapes are encoded at 1e6 precision.
                points.extend(polyline::decode(shape, 1e6));
            }
        }
        if parsed.trip.legs.is_empty() {
            return Err(GatewayError::NoRoute);
        }
        Ok(RouteGeometry {
            points,
            distance_m: (distance_km * 1000.0).round() as i32,
            duration_s: time_s.round() as i32,
        })
    }
}

/// Today's civil date in UTC as (year, month, day).
///
/// Days-to-civil conversion from Hinnant's calendrical algorithms.
fn today_civil() -> (i64, u32, u32) {
    let days = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs() / 86_400) as i64)
        .unwrap_or(0);
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

#[derive(Debug, Deserialize)]
struct SourcesToTargetsResponse {
    sources_to_targets: Vec<Vec<Option<MatrixCell>>>,
}

#[derive(Debug, Deserialize)]
struct MatrixCell {
    distance: Option<f64>,
    time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    trip: Trip,
}

#[derive(Debug, Deserialize)]
struct Trip {
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Debug, Deserialize)]
struct Leg {
    summary: LegSummary,
    shape: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegSummary {
    length: f64,
    time: f64,
}
