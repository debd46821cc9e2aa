//! CSV forecast import.
//!
//! Expected header: `village,timestamp,demand_kw,solar_kw` (`demand` and
//! `solar` are accepted as aliases). Other columns, such as `wind_kw`, are
//! ignored: dispatch balances demand against solar only. Rows keep their
//! file order within each village; ordering is checked later by the
//! simulator.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

use crate::dispatch::types::{ForecastPoint, VillageId};
use crate::error::{DispatchError, Result};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Deserialize)]
struct RawRow {
    village: Option<String>,
    timestamp: Option<String>,
    #[serde(alias = "demand")]
    demand_kw: Option<String>,
    #[serde(alias = "solar")]
    solar_kw: Option<String>,
}

/// Parses a local timestamp, or an RFC 3339 one converted to UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
}

/// Reads a forecast CSV file into per-village series.
///
/// # Errors
///
/// See [`read_forecast_csv`].
pub fn read_forecast_file(path: &Path) -> Result<BTreeMap<VillageId, Vec<ForecastPoint>>> {
    let file = std::fs::File::open(path)?;
    read_forecast_csv(file)
}

/// Reads forecast rows from any reader into per-village series.
///
/// # Errors
///
/// Returns [`DispatchError::Validation`] naming the field and row when a
/// value is missing, unparseable, negative or non-finite, and
/// [`DispatchError::Csv`] for malformed CSV.
pub fn read_forecast_csv(reader: impl Read) -> Result<BTreeMap<VillageId, Vec<ForecastPoint>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut series: BTreeMap<VillageId, Vec<ForecastPoint>> = BTreeMap::new();
    for (i, row) in rdr.deserialize::<RawRow>().enumerate() {
        // header is line 1
        let line = i + 2;
        let row = row?;

        let village = required(row.village, "village", line)?;
        let raw_ts = required(row.timestamp, "timestamp", line)?;
        let timestamp = parse_timestamp(&raw_ts).ok_or_else(|| {
            DispatchError::validation("timestamp", format!("row {line}: cannot parse \"{raw_ts}\""))
        })?;
        let demand = number(row.demand_kw, "demand_kw", line)?;
        let solar = number(row.solar_kw, "solar_kw", line)?;

        let point = ForecastPoint::new(timestamp, demand, solar).map_err(|e| match e {
            DispatchError::Validation { field, message } => DispatchError::Validation {
                field,
                message: format!("row {line}: {message}"),
            },
            other => other,
        })?;
        series.entry(VillageId::new(village)).or_default().push(point);
    }
    Ok(series)
}

fn required(value: Option<String>, field: &str, line: usize) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DispatchError::validation(field, format!("row {line}: missing value")))
}

fn number(value: Option<String>, field: &str, line: usize) -> Result<f64> {
    let raw = required(value, field, line)?;
    raw.parse::<f64>().map_err(|_| {
        DispatchError::validation(field, format!("row {line}: \"{raw}\" is not a number"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: DispatchError) -> String {
        match err {
            DispatchError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn groups_rows_by_village() {
        let csv = "\
village,timestamp,demand_kw,solar_kw
north,2024-01-01 00:00,10,0
south,2024-01-01 00:00,5,1
north,2024-01-01 01:00,12,0.5
";
        let series = read_forecast_csv(csv.as_bytes()).unwrap();
        assert_eq!(series.len(), 2);
        let north = &series[&VillageId::new("north")];
        assert_eq!(north.len(), 2);
        assert_eq!(north[1].demand_kw(), 12.0);
        assert_eq!(north[1].solar_kw(), 0.5);
    }

    #[test]
    fn accepts_short_column_aliases_and_whitespace() {
        let csv = "village, timestamp, demand, solar\n east , 2024-01-01T06:00:00 , 3 , 4 \n";
        let series = read_forecast_csv(csv.as_bytes()).unwrap();
        let east = &series[&VillageId::new("east")];
        assert_eq!(east[0].demand_kw(), 3.0);
        assert_eq!(east[0].timestamp().to_string(), "2024-01-01 06:00:00");
    }

    #[test]
    fn extra_columns_like_wind_are_ignored() {
        let csv = "\
village,timestamp,demand_kw,solar_kw,wind_kw
north,2024-01-01 00:00,10,2,7.5
north,2024-01-01 01:00,11,3,
";
        let series = read_forecast_csv(csv.as_bytes()).unwrap();
        let north = &series[&VillageId::new("north")];
        assert_eq!(north.len(), 2);
        assert_eq!(north[0].demand_kw(), 10.0);
        assert_eq!(north[0].solar_kw(), 2.0);
        assert_eq!(north[1].solar_kw(), 3.0);
    }

    #[test]
    fn missing_solar_is_rejected_with_row() {
        let csv = "village,timestamp,demand_kw,solar_kw\nnorth,2024-01-01 00:00,10,\n";
        let err = read_forecast_csv(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
        assert_eq!(field_of(err), "solar_kw");
    }

    #[test]
    fn missing_column_is_rejected() {
        let csv = "village,timestamp,demand_kw\nnorth,2024-01-01 00:00,10\n";
        let err = read_forecast_csv(csv.as_bytes()).unwrap_err();
        assert_eq!(field_of(err), "solar_kw");
    }

    #[test]
    fn negative_demand_is_rejected() {
        let csv = "village,timestamp,demand_kw,solar_kw\nnorth,2024-01-01 00:00,-1,0\n";
        let err = read_forecast_csv(csv.as_bytes()).unwrap_err();
        assert_eq!(field_of(err), "demand_kw");
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let csv = "village,timestamp,demand_kw,solar_kw\nnorth,2024-01-01 00:00,lots,0\n";
        let err = read_forecast_csv(csv.as_bytes()).unwrap_err();
        assert_eq!(field_of(err), "demand_kw");
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let csv = "village,timestamp,demand_kw,solar_kw\nnorth,yesterday,1,0\n";
        let err = read_forecast_csv(csv.as_bytes()).unwrap_err();
        assert_eq!(field_of(err), "timestamp");
    }

    #[test]
    fn rfc3339_timestamps_convert_to_utc() {
        let ts = parse_timestamp("2024-01-01T02:00:00+02:00").unwrap();
        assert_eq!(ts.to_string(), "2024-01-01 00:00:00");
    }
}
