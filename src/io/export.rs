//! CSV export for finalized dispatch records.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::dispatch::types::{DispatchRecord, VillageId};

/// Column header for CSV dispatch export.
pub const HEADER: &str = "village,timestamp,demand_kw,solar_kw,soc_frac,charge_kw,discharge_kw,\
                          net_import_kw,served_critical_kw,served_noncritical_kw,surplus_kw,\
                          deficit_kw,received_from_pool_kw,net_import_after_share_kw";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Exports dispatch records to a CSV file at the given path.
///
/// Villages are written in ascending id order, each village's records in
/// timestep order. Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(dispatch: &BTreeMap<VillageId, Vec<DispatchRecord>>, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(dispatch, buf)
}

/// Writes dispatch records as CSV to any writer.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(
    dispatch: &BTreeMap<VillageId, Vec<DispatchRecord>>,
    writer: impl Write,
) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for (village, records) in dispatch {
        for r in records {
            wtr.write_record(&[
                village.to_string(),
                r.timestamp().format(TIMESTAMP_FORMAT).to_string(),
                format!("{:.4}", r.demand_kw()),
                format!("{:.4}", r.solar_kw()),
                format!("{:.4}", r.soc_frac()),
                format!("{:.4}", r.charge_kw()),
                format!("{:.4}", r.discharge_kw()),
                format!("{:.4}", r.net_import_kw()),
                format!("{:.4}", r.served_critical_kw()),
                format!("{:.4}", r.served_noncritical_kw()),
                format!("{:.4}", r.surplus_kw()),
                format!("{:.4}", r.deficit_kw()),
                format!("{:.4}", r.received_from_pool_kw()),
                format!("{:.4}", r.net_import_after_share_kw()),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    use super::*;
    use crate::dispatch::battery::BatterySimulator;
    use crate::dispatch::types::{BatteryConfig, ForecastPoint};

    fn ts(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
            + Duration::hours(hour)
    }

    fn dispatch(villages: &[&str], steps: i64) -> BTreeMap<VillageId, Vec<DispatchRecord>> {
        let sim = BatterySimulator::new(BatteryConfig::default());
        villages
            .iter()
            .map(|name| {
                let id = VillageId::new(*name);
                let series: Vec<ForecastPoint> = (0..steps)
                    .map(|h| ForecastPoint::new(ts(h), 30.0, 10.0 * h as f64).unwrap())
                    .collect();
                let records = sim.simulate(&id, &series).unwrap();
                (id, records)
            })
            .collect()
    }

    fn render(d: &BTreeMap<VillageId, Vec<DispatchRecord>>) -> String {
        let mut buf = Vec::new();
        write_csv(d, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_matches_column_layout() {
        let output = render(&dispatch(&["a"], 1));
        let first_line = output.lines().next().unwrap_or("");
        assert_eq!(
            first_line,
            "village,timestamp,demand_kw,solar_kw,soc_frac,charge_kw,discharge_kw,\
             net_import_kw,served_critical_kw,served_noncritical_kw,surplus_kw,\
             deficit_kw,received_from_pool_kw,net_import_after_share_kw"
        );
    }

    #[test]
    fn row_count_matches_records() {
        let output = render(&dispatch(&["a", "b"], 24));
        // 1 header + 2 villages x 24 rows
        assert_eq!(output.lines().count(), 49);
    }

    #[test]
    fn villages_written_in_ascending_order() {
        let output = render(&dispatch(&["zulu", "alpha", "mike"], 2));
        let villages: Vec<&str> = output
            .lines()
            .skip(1)
            .filter_map(|l| l.split(',').next())
            .collect();
        assert_eq!(villages, vec!["alpha", "alpha", "mike", "mike", "zulu", "zulu"]);
    }

    #[test]
    fn deterministic_output() {
        let d = dispatch(&["a", "b"], 5);
        assert_eq!(render(&d), render(&d));
    }

    #[test]
    fn rows_are_parseable() {
        let output = render(&dispatch(&["a"], 3));
        let mut rdr = csv::ReaderBuilder::new().from_reader(output.as_bytes());
        let headers = rdr.headers().cloned().ok();
        assert_eq!(headers.as_ref().map(csv::StringRecord::len), Some(14));

        let mut row_count = 0;
        for record in rdr.records() {
            let rec = record.unwrap();
            assert_eq!(&rec[1][..10], "2024-05-01");
            for i in 2..14 {
                let val: Result<f64, _> = rec[i].parse();
                assert!(val.is_ok(), "column {i} should parse as f64");
            }
            row_count += 1;
        }
        assert_eq!(row_count, 3);
    }
}
