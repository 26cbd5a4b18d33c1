//! The tabular ingest contract.
//!
//! Spreadsheet reading lives outside the core; this module consumes the
//! already-tabulated records and turns them into validated [`Customer`]s.
//! Invalid rows are dropped with a warning, duplicated ids reject the batch.

use serde::Deserialize;
use thiserror::Error;

use crate::customer::Customer;

/// One raw customer row as handed over by the ingest collaborator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomerRecord {
    /// Stable customer id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Raw GPS string, see [`parse_gps`] for accepted forms.
    pub gps: String,
    /// Demand volume.
    pub volume: f64,
}

/// Errors returned by [`build_customers`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// Two records carried the same id.
    #[error("duplicate customer id {0:?}")]
    DuplicateId(String),
}

/// Parse a GPS string into `(latitude, longitude)`.
///
/// Accepts comma- or space-separated decimal degrees, optionally with
/// hemisphere letters (`N`/`S`/`E`/`W`) prefixed or suffixed to either
/// number. Latitude comes first. Returns `None` for anything else or for
/// out-of-range coordinates.
#[must_use]
pub fn parse_gps(raw: &str) -> Option<(f64, f64)> {
    let numbers: Vec<f64> = raw
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(parse_component)
        .collect::<Option<Vec<f64>>>()?;

    let [lat, lon] = numbers.as_slice() else {
        return None;
    };
    if !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lon) {
        return None;
    }
    Some((*lat, *lon))
}

/// Parse one coordinate component with an optional hemisphere letter.
fn parse_component(token: &str) -> Option<f64> {
    let token = token.trim();
    let (body, sign) = match token.chars().next()? {
        'N' | 'n' | 'E' | 'e' => (&token[1..], 1.0),
        'S' | 's' | 'W' | 'w' => (&token[1..], -1.0),
        _ => match token.chars().last()? {
            'N' | 'n' | 'E' | 'e' => (&token[..token.len() - 1], 1.0),
            'S' | 's' | 'W' | 'w' => (&token[..token.len() - 1], -1.0),
            _ => (token, 1.0),
        },
    };
    let value: f64 = body.trim().parse().ok()?;
    Some(value * sign)
}

/// Validate records into customers.
///
/// Rows with unparseable GPS or invalid volume are skipped with a warning;
/// a duplicated id fails the whole batch.
pub fn build_customers(records: &[CustomerRecord]) -> Result<Vec<Customer>, IngestError> {
    let mut customers: Vec<Customer> = Vec::with_capacity(records.len());
    let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();

    for record in records {
        if !seen.insert(record.id.as_str()) {
            return Err(IngestError::DuplicateId(record.id.clone()));
        }
        let Some((lat, lon)) = parse_gps(&record.gps) else {
            log::warn!(
                "skipping customer {}: unparseable GPS {:?}",
                record.id,
                record.gps
            );
            continue;
        };
        match Customer::new(&record.id, &record.name, lat, lon, record.volume) {
            Ok(customer) => customers.push(customer),
            Err(err) => log::warn!("skipping customer {}: {err}", record.id),
        }
    }
    Ok(customers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("42.70, 23.32", 42.70, 23.32)]
    #[case("42.70 23.32", 42.70, 23.32)]
    #[case("N42.70, E23.32", 42.70, 23.32)]
    #[case("42.70N 23.32E", 42.70, 23.32)]
    #[case("S33.86, E151.21", -33.86, 151.21)]
    #[case("-33.86,151.21", -33.86, 151.21)]
    fn parses_supported_gps_forms(#[case] raw: &str, #[case] lat: f64, #[case] lon: f64) {
        let parsed = parse_gps(raw).expect("should parse");
        assert!((parsed.0 - lat).abs() < 1e-9);
        assert!((parsed.1 - lon).abs() < 1e-9);
    }

    #[rstest]
    #[case("")]
    #[case("not a coordinate")]
    #[case("42.70")]
    #[case("42.70, 23.32, 5.0")]
    #[case("95.0, 23.32")]
    #[case("42.70, 190.0")]
    fn rejects_malformed_gps(#[case] raw: &str) {
        assert_eq!(parse_gps(raw), None);
    }

    fn record(id: &str, gps: &str, volume: f64) -> CustomerRecord {
        CustomerRecord {
            id: id.to_owned(),
            name: format!("Customer {id}"),
            gps: gps.to_owned(),
            volume,
        }
    }

    #[rstest]
    fn drops_invalid_rows_and_keeps_the_rest() {
        let records = vec![
            record("a", "42.70, 23.32", 10.0),
            record("b", "garbage", 10.0),
            record("c", "42.71, 23.33", -3.0),
            record("d", "42.72, 23.34", 7.5),
        ];
        let customers = build_customers(&records).unwrap();
        let ids: Vec<&str> = customers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
    }

    #[rstest]
    fn duplicate_ids_reject_the_batch() {
        let records = vec![
            record("a", "42.70, 23.32", 10.0),
            record("a", "42.71, 23.33", 4.0),
        ];
        assert_eq!(
            build_customers(&records),
            Err(IngestError::DuplicateId("a".to_owned()))
        );
    }
}
