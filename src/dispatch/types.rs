//! Core dispatch types: village identity, forecast input, battery parameters, and output records.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

/// Starting state of charge used when a run does not specify one.
pub const DEFAULT_INITIAL_SOC: f64 = 0.6;

/// Identifier of one village.
///
/// Ordering is lexicographic; ascending order is the default pooling order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VillageId(String);

impl VillageId {
    /// Wraps any string-like value as a village identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VillageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VillageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for VillageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One forecast sample for a single village.
///
/// Construct with [`ForecastPoint::new`], which rejects negative or
/// non-finite power values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    timestamp: NaiveDateTime,
    demand_kw: f64,
    solar_kw: f64,
}

impl ForecastPoint {
    /// Creates a validated forecast point.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Validation`] naming `demand_kw` or `solar_kw`
    /// if either value is negative, NaN, or infinite.
    pub fn new(timestamp: NaiveDateTime, demand_kw: f64, solar_kw: f64) -> Result<Self> {
        check_power("demand_kw", demand_kw, timestamp)?;
        check_power("solar_kw", solar_kw, timestamp)?;
        Ok(Self {
            timestamp,
            demand_kw,
            solar_kw,
        })
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn demand_kw(&self) -> f64 {
        self.demand_kw
    }

    pub fn solar_kw(&self) -> f64 {
        self.solar_kw
    }
}

fn check_power(field: &str, value: f64, timestamp: NaiveDateTime) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(DispatchError::validation(
            field,
            format!("must be a finite value >= 0 at {timestamp}, got {value}"),
        ));
    }
    Ok(())
}

/// Fixed battery and dispatch parameters for one village.
///
/// `capacity_kwh = 0` is accepted and models a village with no usable
/// storage: every state-of-charge delta evaluates to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryConfig {
    /// Usable energy capacity (kWh).
    pub capacity_kwh: f64,
    /// Charge and discharge power limit (kW).
    pub pmax_kw: f64,
    /// Lowest state of charge the battery may be discharged to (0.0–1.0).
    pub min_soc_frac: f64,
    /// Share of demand treated as critical (0.0–1.0).
    pub critical_fraction: f64,
    /// Duration of one timestep in hours.
    pub dt_hours: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 100.0,
            pmax_kw: 50.0,
            min_soc_frac: 0.2,
            critical_fraction: 0.25,
            dt_hours: 1.0,
        }
    }
}

impl BatteryConfig {
    /// Checks every parameter range.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Validation`] for the first out-of-range field.
    pub fn validate(&self) -> Result<()> {
        if !self.capacity_kwh.is_finite() || self.capacity_kwh < 0.0 {
            return Err(DispatchError::validation("capacity_kwh", "must be >= 0"));
        }
        if !self.pmax_kw.is_finite() || self.pmax_kw < 0.0 {
            return Err(DispatchError::validation("pmax_kw", "must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.min_soc_frac) {
            return Err(DispatchError::validation(
                "min_soc_frac",
                "must be in [0.0, 1.0]",
            ));
        }
        if !(0.0..=1.0).contains(&self.critical_fraction) {
            return Err(DispatchError::validation(
                "critical_fraction",
                "must be in [0.0, 1.0]",
            ));
        }
        if !self.dt_hours.is_finite() || self.dt_hours <= 0.0 {
            return Err(DispatchError::validation("dt_hours", "must be > 0"));
        }
        Ok(())
    }
}

/// Battery state carried from one timestep to the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryState {
    soc_frac: f64,
}

impl BatteryState {
    /// Creates a state with the given state of charge.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Validation`] if `soc_frac` is outside `[0, 1]`.
    pub fn new(soc_frac: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&soc_frac) {
            return Err(DispatchError::validation(
                "initial_soc",
                format!("must be in [0.0, 1.0], got {soc_frac}"),
            ));
        }
        Ok(Self { soc_frac })
    }

    /// Clamps `soc_frac` into `[0, 1]`.
    pub(crate) fn clamped(soc_frac: f64) -> Self {
        Self {
            soc_frac: soc_frac.clamp(0.0, 1.0),
        }
    }

    pub fn soc_frac(&self) -> f64 {
        self.soc_frac
    }
}

impl Default for BatteryState {
    fn default() -> Self {
        Self {
            soc_frac: DEFAULT_INITIAL_SOC,
        }
    }
}

/// Dispatch outcome for one village at one timestep.
///
/// Produced by the battery simulator with no pool share applied
/// (`received_from_pool_kw = 0`, `net_import_after_share_kw = net_import_kw`)
/// and finalized by the pool coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DispatchRecord {
    timestamp: NaiveDateTime,
    demand_kw: f64,
    solar_kw: f64,
    soc_frac: f64,
    charge_kw: f64,
    discharge_kw: f64,
    net_import_kw: f64,
    served_critical_kw: f64,
    served_noncritical_kw: f64,
    surplus_kw: f64,
    deficit_kw: f64,
    received_from_pool_kw: f64,
    net_import_after_share_kw: f64,
}

impl DispatchRecord {
    /// Builds a local (pre-sharing) record; surplus and deficit are derived.
    #[expect(clippy::too_many_arguments)]
    pub(crate) fn local(
        timestamp: NaiveDateTime,
        demand_kw: f64,
        solar_kw: f64,
        soc_frac: f64,
        charge_kw: f64,
        discharge_kw: f64,
        net_import_kw: f64,
        served_critical_kw: f64,
        served_noncritical_kw: f64,
    ) -> Self {
        debug_assert!((0.0..=1.0).contains(&soc_frac));
        debug_assert!(charge_kw >= 0.0 && discharge_kw >= 0.0);
        debug_assert!(net_import_kw >= 0.0);
        Self {
            timestamp,
            demand_kw,
            solar_kw,
            soc_frac,
            charge_kw,
            discharge_kw,
            net_import_kw,
            served_critical_kw,
            served_noncritical_kw,
            surplus_kw: (solar_kw - demand_kw).max(0.0),
            deficit_kw: net_import_kw,
            received_from_pool_kw: 0.0,
            net_import_after_share_kw: net_import_kw,
        }
    }

    /// Applies a pool grant, capped at the deficit.
    pub(crate) fn apply_pool_share(&mut self, received_kw: f64) {
        let received = received_kw.clamp(0.0, self.deficit_kw);
        self.received_from_pool_kw = received;
        self.net_import_after_share_kw = (self.net_import_kw - received).max(0.0);
    }

    /// Resets the record to its unshared state.
    pub(crate) fn clear_pool_share(&mut self) {
        self.received_from_pool_kw = 0.0;
        self.net_import_after_share_kw = self.deficit_kw;
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn demand_kw(&self) -> f64 {
        self.demand_kw
    }

    pub fn solar_kw(&self) -> f64 {
        self.solar_kw
    }

    /// State of charge after this step (0.0 to 1.0).
    pub fn soc_frac(&self) -> f64 {
        self.soc_frac
    }

    pub fn charge_kw(&self) -> f64 {
        self.charge_kw
    }

    pub fn discharge_kw(&self) -> f64 {
        self.discharge_kw
    }

    /// Grid import before any pool sharing.
    pub fn net_import_kw(&self) -> f64 {
        self.net_import_kw
    }

    pub fn served_critical_kw(&self) -> f64 {
        self.served_critical_kw
    }

    pub fn served_noncritical_kw(&self) -> f64 {
        self.served_noncritical_kw
    }

    /// Generation in excess of local demand (`max(0, solar - demand)`).
    pub fn surplus_kw(&self) -> f64 {
        self.surplus_kw
    }

    /// Unmet demand after solar and battery; equal to `net_import_kw`.
    pub fn deficit_kw(&self) -> f64 {
        self.deficit_kw
    }

    pub fn received_from_pool_kw(&self) -> f64 {
        self.received_from_pool_kw
    }

    pub fn net_import_after_share_kw(&self) -> f64 {
        self.net_import_after_share_kw
    }
}

impl fmt::Display for DispatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | demand={:>7.2} kW  solar={:>7.2} kW | SoC={:>5.1}%  \
             chg={:.2}  dis={:.2} | import={:.2}  pool={:.2}  after={:.2} kW",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.demand_kw,
            self.solar_kw,
            self.soc_frac * 100.0,
            self.charge_kw,
            self.discharge_kw,
            self.net_import_kw,
            self.received_from_pool_kw,
            self.net_import_after_share_kw,
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    #[test]
    fn forecast_point_rejects_negative_demand() {
        let err = ForecastPoint::new(ts(), -1.0, 0.0).unwrap_err();
        assert!(matches!(err, DispatchError::Validation { ref field, .. } if field == "demand_kw"));
    }

    #[test]
    fn forecast_point_rejects_nan_solar() {
        let err = ForecastPoint::new(ts(), 1.0, f64::NAN).unwrap_err();
        assert!(matches!(err, DispatchError::Validation { ref field, .. } if field == "solar_kw"));
    }

    #[test]
    fn battery_config_defaults_match_run_defaults() {
        let cfg = BatteryConfig::default();
        assert_eq!(cfg.capacity_kwh, 100.0);
        assert_eq!(cfg.pmax_kw, 50.0);
        assert_eq!(cfg.min_soc_frac, 0.2);
        assert_eq!(cfg.critical_fraction, 0.25);
        assert_eq!(cfg.dt_hours, 1.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn battery_config_accepts_zero_capacity() {
        let cfg = BatteryConfig {
            capacity_kwh: 0.0,
            ..BatteryConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn battery_config_rejects_zero_dt() {
        let cfg = BatteryConfig {
            dt_hours: 0.0,
            ..BatteryConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn battery_state_default_is_sixty_percent() {
        assert_eq!(BatteryState::default().soc_frac(), 0.6);
        assert!(BatteryState::new(1.2).is_err());
    }

    #[test]
    fn local_record_derives_surplus_and_deficit() {
        let r = DispatchRecord::local(ts(), 4.0, 10.0, 0.9, 5.0, 0.0, 0.0, 1.0, 3.0);
        assert_eq!(r.surplus_kw(), 6.0);
        assert_eq!(r.deficit_kw(), 0.0);
        assert_eq!(r.received_from_pool_kw(), 0.0);
        assert_eq!(r.net_import_after_share_kw(), 0.0);
    }

    #[test]
    fn pool_share_is_capped_at_deficit() {
        let mut r = DispatchRecord::local(ts(), 10.0, 0.0, 0.2, 0.0, 0.0, 10.0, 0.0, 0.0);
        r.apply_pool_share(12.0);
        assert_eq!(r.received_from_pool_kw(), 10.0);
        assert_eq!(r.net_import_after_share_kw(), 0.0);

        r.clear_pool_share();
        assert_eq!(r.received_from_pool_kw(), 0.0);
        assert_eq!(r.net_import_after_share_kw(), 10.0);
    }

    #[test]
    fn record_display_does_not_panic() {
        let r = DispatchRecord::local(ts(), 10.0, 5.0, 0.55, 0.0, 5.0, 0.0, 2.5, 7.5);
        assert!(!format!("{r}").is_empty());
    }
}
