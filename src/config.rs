//! TOML-based scenario configuration and preset definitions.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;

use crate::dispatch::pool::DEFAULT_NEAR_FULL_SOC;
use crate::dispatch::types::{BatteryConfig, DEFAULT_INITIAL_SOC, VillageId};
use crate::dispatch::{EmptySeriesPolicy, PoolOrder};
use crate::forecast::DEFAULT_MIN_HISTORY;

/// Top-level scenario configuration parsed from TOML.
///
/// All sections have defaults. Load from TOML with
/// [`ScenarioConfig::from_toml_file`] or use [`ScenarioConfig::baseline`]
/// for the built-in three-village cluster.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Timing and run-wide switches.
    #[serde(default)]
    pub run: RunConfig,
    /// Battery parameters shared by every village unless overridden.
    #[serde(default)]
    pub battery: BatteryDefaults,
    /// Surplus pooling parameters.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Forecast model parameters.
    #[serde(default)]
    pub forecast: ForecastConfig,
    /// Villages in the cluster, in listed pool order.
    #[serde(default)]
    pub villages: Vec<VillageConfig>,
}

/// Timing and run-wide switches.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Timestep length in hours (must be > 0).
    pub dt_hours: f64,
    /// Starting state of charge for every village (0.0-1.0).
    pub initial_soc: f64,
    /// Number of forecast timesteps to dispatch (must be > 0).
    pub steps: usize,
    /// First forecast timestamp, as a quoted ISO 8601 string.
    pub start: NaiveDateTime,
    /// Master random seed for synthetic history.
    pub seed: u64,
    /// Disable the parallel phases.
    pub force_sequential: bool,
    /// Accept empty village series instead of failing.
    pub allow_empty: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dt_hours: 1.0,
            initial_soc: DEFAULT_INITIAL_SOC,
            steps: 24,
            start: default_start(),
            seed: 42,
            force_sequential: false,
            allow_empty: false,
        }
    }
}

fn default_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Battery parameters shared by every village.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryDefaults {
    /// Usable energy capacity (kWh); zero means no storage.
    pub battery_kwh: f64,
    /// Charge and discharge power limit (kW).
    pub battery_pmax_kw: f64,
    /// Discharge floor as a fraction of capacity.
    pub min_soc_frac: f64,
    /// Share of demand that is critical.
    pub critical_fraction: f64,
}

impl Default for BatteryDefaults {
    fn default() -> Self {
        Self {
            battery_kwh: 100.0,
            battery_pmax_kw: 50.0,
            min_soc_frac: 0.2,
            critical_fraction: 0.25,
        }
    }
}

/// Surplus pooling parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Minimum SOC for a village's surplus to enter the pool.
    pub near_full_soc: f64,
    /// `"ascending"` (by village id) or `"listed"` (order of `[[villages]]`).
    pub order: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            near_full_soc: DEFAULT_NEAR_FULL_SOC,
            order: "ascending".to_string(),
        }
    }
}

/// Forecast model parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    /// Days of synthetic history generated before the forecast start.
    pub history_days: usize,
    /// History points required before an hourly profile is fitted.
    pub min_history: usize,
    /// TOML file for persisted models; in-memory when absent.
    pub model_store: Option<PathBuf>,
    /// Refit models even when the store already holds one.
    pub force_retrain: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            history_days: 7,
            min_history: DEFAULT_MIN_HISTORY,
            model_store: None,
            force_retrain: false,
        }
    }
}

/// One village: demand and solar profile plus optional battery overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VillageConfig {
    /// Unique village identifier.
    pub id: String,
    /// Baseline demand (kW).
    pub base_kw: f64,
    /// Daily demand swing (kW).
    pub amp_kw: f64,
    /// Demand phase offset (radians).
    pub phase_rad: f64,
    /// Demand noise standard deviation (kW).
    pub noise_std: f64,
    /// Solar output at noon (kW).
    pub solar_kw_peak: f64,
    /// Hour of day generation starts.
    pub sunrise_hour: f64,
    /// Hour of day generation ends.
    pub sunset_hour: f64,
    /// Solar noise as a fraction of output.
    pub solar_noise_std: f64,
    pub battery_kwh: Option<f64>,
    pub battery_pmax_kw: Option<f64>,
    pub min_soc_frac: Option<f64>,
    pub critical_fraction: Option<f64>,
}

impl Default for VillageConfig {
    fn default() -> Self {
        Self {
            id: "village".to_string(),
            base_kw: 30.0,
            amp_kw: 12.0,
            phase_rad: 1.2,
            noise_std: 1.5,
            solar_kw_peak: 40.0,
            sunrise_hour: 6.0,
            sunset_hour: 18.0,
            solar_noise_std: 0.05,
            battery_kwh: None,
            battery_pmax_kw: None,
            min_soc_frac: None,
            critical_fraction: None,
        }
    }
}

impl VillageConfig {
    fn named(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Whether any battery parameter differs from the shared defaults.
    pub fn has_battery_override(&self) -> bool {
        self.battery_kwh.is_some()
            || self.battery_pmax_kw.is_some()
            || self.min_soc_frac.is_some()
            || self.critical_fraction.is_some()
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"run.dt_hours"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: three mixed villages, default batteries.
    pub fn baseline() -> Self {
        Self {
            run: RunConfig::default(),
            battery: BatteryDefaults::default(),
            pool: PoolConfig::default(),
            forecast: ForecastConfig::default(),
            villages: vec![
                VillageConfig::named("hillside"),
                VillageConfig {
                    base_kw: 22.0,
                    amp_kw: 8.0,
                    solar_kw_peak: 70.0,
                    ..VillageConfig::named("lakeshore")
                },
                VillageConfig {
                    base_kw: 40.0,
                    amp_kw: 15.0,
                    phase_rad: 0.8,
                    solar_kw_peak: 20.0,
                    ..VillageConfig::named("riverbend")
                },
            ],
        }
    }

    /// Returns the sunny-cluster preset: one large solar donor with a small
    /// battery next to two solar-poor villages.
    pub fn sunny_cluster() -> Self {
        Self {
            run: RunConfig {
                initial_soc: 0.9,
                ..RunConfig::default()
            },
            pool: PoolConfig {
                order: "listed".to_string(),
                ..PoolConfig::default()
            },
            villages: vec![
                VillageConfig {
                    base_kw: 15.0,
                    amp_kw: 5.0,
                    solar_kw_peak: 120.0,
                    sunrise_hour: 5.0,
                    sunset_hour: 19.0,
                    battery_kwh: Some(40.0),
                    battery_pmax_kw: Some(20.0),
                    ..VillageConfig::named("mesa")
                },
                VillageConfig {
                    base_kw: 35.0,
                    solar_kw_peak: 10.0,
                    ..VillageConfig::named("canyon")
                },
                VillageConfig {
                    base_kw: 28.0,
                    phase_rad: 0.4,
                    solar_kw_peak: 15.0,
                    ..VillageConfig::named("arroyo")
                },
            ],
            ..Self::baseline()
        }
    }

    /// Returns the stressed-grid preset: high demand, weak solar, half-hour
    /// steps and small batteries.
    pub fn stressed_grid() -> Self {
        Self {
            run: RunConfig {
                dt_hours: 0.5,
                initial_soc: 0.4,
                steps: 48,
                ..RunConfig::default()
            },
            battery: BatteryDefaults {
                battery_kwh: 40.0,
                battery_pmax_kw: 15.0,
                min_soc_frac: 0.3,
                critical_fraction: 0.4,
            },
            villages: vec![
                VillageConfig {
                    base_kw: 55.0,
                    amp_kw: 20.0,
                    noise_std: 3.0,
                    solar_kw_peak: 25.0,
                    ..VillageConfig::named("quarry")
                },
                VillageConfig {
                    base_kw: 48.0,
                    amp_kw: 18.0,
                    noise_std: 3.0,
                    solar_kw_peak: 15.0,
                    battery_kwh: Some(0.0),
                    ..VillageConfig::named("millbrook")
                },
            ],
            ..Self::baseline()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "sunny_cluster", "stressed_grid"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "sunny_cluster" => Ok(Self::sunny_cluster()),
            "stressed_grid" => Ok(Self::stressed_grid()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Shared battery configuration, with the run's timestep.
    pub fn battery_config(&self) -> BatteryConfig {
        let b = &self.battery;
        BatteryConfig {
            capacity_kwh: b.battery_kwh,
            pmax_kw: b.battery_pmax_kw,
            min_soc_frac: b.min_soc_frac,
            critical_fraction: b.critical_fraction,
            dt_hours: self.run.dt_hours,
        }
    }

    /// Battery configuration for one village, applying its overrides.
    pub fn village_battery(&self, village: &VillageConfig) -> BatteryConfig {
        let shared = self.battery_config();
        BatteryConfig {
            capacity_kwh: village.battery_kwh.unwrap_or(shared.capacity_kwh),
            pmax_kw: village.battery_pmax_kw.unwrap_or(shared.pmax_kw),
            min_soc_frac: village.min_soc_frac.unwrap_or(shared.min_soc_frac),
            critical_fraction: village.critical_fraction.unwrap_or(shared.critical_fraction),
            dt_hours: shared.dt_hours,
        }
    }

    /// Pool visiting order; assumes `validate` passed.
    pub fn pool_order(&self) -> PoolOrder {
        if self.pool.order == "listed" {
            PoolOrder::Listed(self.villages.iter().map(|v| VillageId::new(&v.id)).collect())
        } else {
            PoolOrder::Ascending
        }
    }

    pub fn empty_policy(&self) -> EmptySeriesPolicy {
        if self.run.allow_empty {
            EmptySeriesPolicy::AllowEmpty
        } else {
            EmptySeriesPolicy::Reject
        }
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let r = &self.run;

        if !(r.dt_hours.is_finite() && r.dt_hours > 0.0) {
            errors.push(ConfigError::new("run.dt_hours", "must be > 0"));
        } else if (r.dt_hours * 60.0).fract() != 0.0 {
            errors.push(ConfigError::new(
                "run.dt_hours",
                "must be a whole number of minutes",
            ));
        }
        if !(0.0..=1.0).contains(&r.initial_soc) {
            errors.push(ConfigError::new("run.initial_soc", "must be in [0.0, 1.0]"));
        }
        if r.steps == 0 {
            errors.push(ConfigError::new("run.steps", "must be > 0"));
        }

        let b = &self.battery;
        check_battery(
            "battery",
            b.battery_kwh,
            b.battery_pmax_kw,
            b.min_soc_frac,
            b.critical_fraction,
            &mut errors,
        );

        if !(0.0..=1.0).contains(&self.pool.near_full_soc) {
            errors.push(ConfigError::new("pool.near_full_soc", "must be in [0.0, 1.0]"));
        }
        if self.pool.order != "ascending" && self.pool.order != "listed" {
            errors.push(ConfigError::new(
                "pool.order",
                format!(
                    "must be \"ascending\" or \"listed\", got \"{}\"",
                    self.pool.order
                ),
            ));
        }

        if self.forecast.history_days == 0 {
            errors.push(ConfigError::new("forecast.history_days", "must be > 0"));
        }

        let mut seen = BTreeSet::new();
        for (i, v) in self.villages.iter().enumerate() {
            let prefix = format!("villages[{i}]");
            if v.id.trim().is_empty() {
                errors.push(ConfigError::new(format!("{prefix}.id"), "must not be empty"));
            } else if !seen.insert(v.id.as_str()) {
                errors.push(ConfigError::new(
                    format!("{prefix}.id"),
                    format!("duplicate village id \"{}\"", v.id),
                ));
            }
            if v.base_kw < 0.0 || v.solar_kw_peak < 0.0 {
                errors.push(ConfigError::new(
                    format!("{prefix}.base_kw"),
                    "base_kw and solar_kw_peak must be >= 0",
                ));
            }
            if !(0.0..=24.0).contains(&v.sunrise_hour) || !(0.0..=24.0).contains(&v.sunset_hour) {
                errors.push(ConfigError::new(
                    format!("{prefix}.sunrise_hour"),
                    "sunrise_hour and sunset_hour must be in [0, 24]",
                ));
            }
            let bat = self.village_battery(v);
            check_battery(
                &prefix,
                bat.capacity_kwh,
                bat.pmax_kw,
                bat.min_soc_frac,
                bat.critical_fraction,
                &mut errors,
            );
        }

        errors
    }
}

fn check_battery(
    prefix: &str,
    capacity_kwh: f64,
    pmax_kw: f64,
    min_soc_frac: f64,
    critical_fraction: f64,
    errors: &mut Vec<ConfigError>,
) {
    if !(capacity_kwh.is_finite() && capacity_kwh >= 0.0) {
        errors.push(ConfigError::new(format!("{prefix}.battery_kwh"), "must be >= 0"));
    }
    if !(pmax_kw.is_finite() && pmax_kw >= 0.0) {
        errors.push(ConfigError::new(
            format!("{prefix}.battery_pmax_kw"),
            "must be >= 0",
        ));
    }
    if !(0.0..=1.0).contains(&min_soc_frac) {
        errors.push(ConfigError::new(
            format!("{prefix}.min_soc_frac"),
            "must be in [0.0, 1.0]",
        ));
    }
    if !(0.0..=1.0).contains(&critical_fraction) {
        errors.push(ConfigError::new(
            format!("{prefix}.critical_fraction"),
            "must be in [0.0, 1.0]",
        ));
    }
}
