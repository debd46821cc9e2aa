//! Synthetic village demand and solar generators used to build history.

/// Village demand profile generator.
pub mod load;
/// Solar array generation model.
pub mod solar;
pub mod types;

use chrono::{Duration, NaiveDateTime, Timelike};

use crate::dispatch::types::ForecastPoint;
use crate::error::Result;

pub use load::VillageLoad;
pub use solar::SolarArray;
pub use types::{Device, DeviceContext};

/// Samples `steps` points of demand and solar starting at `start`.
///
/// Device profiles follow the wall-clock hour of each timestamp.
///
/// # Errors
///
/// Propagates [`ForecastPoint::new`] validation; generators clamp at zero so
/// this only fails on non-finite device parameters.
pub fn synthesize_series(
    load: &mut VillageLoad,
    pv: &mut SolarArray,
    start: NaiveDateTime,
    steps: usize,
    dt_hours: f64,
) -> Result<Vec<ForecastPoint>> {
    let step = Duration::milliseconds((dt_hours * 3_600_000.0).round() as i64);
    let mut series = Vec::with_capacity(steps);
    let start_hour = f64::from(start.hour()) + f64::from(start.minute()) / 60.0;
    let mut ts = start;
    for t in 0..steps {
        let ctx = DeviceContext::new(t, dt_hours).with_start_hour(start_hour);
        series.push(ForecastPoint::new(ts, load.power_kw(&ctx), pv.power_kw(&ctx))?);
        ts += step;
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn series_has_requested_length_and_spacing() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        let mut load = VillageLoad::new(10.0, 2.0, 0.0, 0.1, 1);
        let mut pv = SolarArray::new(20.0, 6.0, 18.0, 0.1, 2);
        let series = synthesize_series(&mut load, &mut pv, start, 48, 0.5).unwrap();
        assert_eq!(series.len(), 48);
        assert_eq!(series[1].timestamp() - series[0].timestamp(), Duration::minutes(30));
        assert_eq!(series[47].timestamp(), start + Duration::minutes(30 * 47));
    }

    #[test]
    fn solar_follows_wall_clock_hour() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let mut load = VillageLoad::new(10.0, 0.0, 0.0, 0.0, 1);
        let mut pv = SolarArray::new(20.0, 6.0, 18.0, 0.0, 2);
        let series = synthesize_series(&mut load, &mut pv, start, 13, 1.0).unwrap();
        // noon peak first, midnight dark last
        assert!((series[0].solar_kw() - 20.0).abs() < 1e-9);
        assert_eq!(series[12].solar_kw(), 0.0);
    }
}
