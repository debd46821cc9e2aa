//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use village_dispatch::dispatch::{BatteryConfig, ForecastPoint, VillageId};

/// Midnight on the first fixture day.
pub fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap()
}

/// Hourly series from `start()` with one `(demand_kw, solar_kw)` pair per step.
pub fn hourly_series(values: &[(f64, f64)]) -> Vec<ForecastPoint> {
    values
        .iter()
        .enumerate()
        .map(|(h, &(demand, solar))| {
            ForecastPoint::new(start() + Duration::hours(h as i64), demand, solar).unwrap()
        })
        .collect()
}

/// Constant hourly series of `steps` points.
pub fn flat_series(steps: usize, demand_kw: f64, solar_kw: f64) -> Vec<ForecastPoint> {
    hourly_series(&vec![(demand_kw, solar_kw); steps])
}

/// Village with a daily demand/solar cycle: night deficit, midday surplus.
pub fn daily_cycle(days: usize, base_kw: f64, solar_peak_kw: f64) -> Vec<ForecastPoint> {
    let values: Vec<(f64, f64)> = (0..days * 24)
        .map(|h| {
            let hour = (h % 24) as f64;
            let solar = if (6.0..18.0).contains(&hour) {
                solar_peak_kw * (std::f64::consts::PI * (hour - 6.0) / 12.0).sin()
            } else {
                0.0
            };
            (base_kw + 5.0 * (hour / 24.0), solar)
        })
        .collect();
    hourly_series(&values)
}

/// Battery with the documented defaults (100 kWh, 50 kW, 20% floor, 25% critical).
pub fn default_battery() -> BatteryConfig {
    BatteryConfig::default()
}

/// Small battery that is (nearly) full after one sunny hour.
pub fn small_battery(capacity_kwh: f64) -> BatteryConfig {
    BatteryConfig {
        capacity_kwh,
        ..BatteryConfig::default()
    }
}

/// Battery that can neither charge nor discharge.
pub fn idle_battery() -> BatteryConfig {
    BatteryConfig {
        pmax_kw: 0.0,
        ..BatteryConfig::default()
    }
}

/// Builds a forecast map from `(id, series)` pairs.
pub fn forecasts(
    entries: Vec<(&str, Vec<ForecastPoint>)>,
) -> BTreeMap<VillageId, Vec<ForecastPoint>> {
    entries
        .into_iter()
        .map(|(id, series)| (VillageId::new(id), series))
        .collect()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}
