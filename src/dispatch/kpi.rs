//! Post-hoc per-village KPI computation from finalized dispatch records.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::types::{BatteryConfig, DispatchRecord};

/// Demand above this multiple of solar marks the start of a high-deficit period.
pub const HIGH_DEFICIT_RATIO: f64 = 1.2;

/// Aggregate indicators for one village over a complete run.
///
/// Computed from the final `DispatchRecord` sequence so reported figures
/// always agree with the exported records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VillageSummary {
    /// State of charge after the last step.
    pub final_soc: f64,
    /// Lowest state of charge reached.
    pub min_soc: f64,
    /// Mean grid import before sharing (kW).
    pub mean_net_import_kw: f64,
    /// Mean grid import after sharing (kW).
    pub mean_net_import_after_share_kw: f64,
    /// Grid energy imported before sharing (kWh).
    pub import_kwh: f64,
    /// Grid energy imported after sharing (kWh).
    pub import_after_share_kwh: f64,
    /// Energy received from the pool (kWh).
    pub received_from_pool_kwh: f64,
    /// Peak demand (kW).
    pub peak_demand_kw: f64,
    /// Peak solar generation (kW).
    pub peak_solar_kw: f64,
    /// First timestep where solar exceeds demand.
    pub surplus_window_start: Option<NaiveDateTime>,
    /// Last timestep where solar exceeds demand.
    pub surplus_window_end: Option<NaiveDateTime>,
    /// First timestep where demand exceeds `HIGH_DEFICIT_RATIO` times solar.
    pub first_high_deficit: Option<NaiveDateTime>,
    /// Served critical demand over total critical demand (1.0 when none).
    pub critical_service_ratio: f64,
    /// Charge plus discharge energy (kWh).
    pub battery_throughput_kwh: f64,
    /// Whether any step received pooled energy.
    pub received_from_pool: bool,
}

impl VillageSummary {
    /// Computes all indicators for one village.
    ///
    /// # Arguments
    ///
    /// * `records` - Finalized records in timestamp order
    /// * `battery` - Battery parameters the village ran with
    pub fn from_records(records: &[DispatchRecord], battery: &BatteryConfig) -> Self {
        let Some(last) = records.last() else {
            return Self::empty();
        };

        let dt = battery.dt_hours;
        let n = records.len() as f64;

        let mut import_sum = 0.0_f64;
        let mut after_sum = 0.0_f64;
        let mut pool_sum = 0.0_f64;
        let mut peak_demand = 0.0_f64;
        let mut peak_solar = 0.0_f64;
        let mut min_soc = f64::INFINITY;
        let mut critical_demand = 0.0_f64;
        let mut critical_served = 0.0_f64;
        let mut throughput = 0.0_f64;
        let mut surplus_start = None;
        let mut surplus_end = None;
        let mut high_deficit = None;

        for r in records {
            import_sum += r.net_import_kw();
            after_sum += r.net_import_after_share_kw();
            pool_sum += r.received_from_pool_kw();
            peak_demand = peak_demand.max(r.demand_kw());
            peak_solar = peak_solar.max(r.solar_kw());
            min_soc = min_soc.min(r.soc_frac());
            critical_demand += r.demand_kw() * battery.critical_fraction;
            critical_served += r.served_critical_kw();
            throughput += (r.charge_kw() + r.discharge_kw()) * dt;

            if r.solar_kw() > r.demand_kw() {
                surplus_start.get_or_insert(r.timestamp());
                surplus_end = Some(r.timestamp());
            }
            if high_deficit.is_none() && r.demand_kw() > r.solar_kw() * HIGH_DEFICIT_RATIO {
                high_deficit = Some(r.timestamp());
            }
        }

        let critical_service_ratio = if critical_demand > 0.0 {
            critical_served / critical_demand
        } else {
            1.0
        };

        Self {
            final_soc: last.soc_frac(),
            min_soc,
            mean_net_import_kw: import_sum / n,
            mean_net_import_after_share_kw: after_sum / n,
            import_kwh: import_sum * dt,
            import_after_share_kwh: after_sum * dt,
            received_from_pool_kwh: pool_sum * dt,
            peak_demand_kw: peak_demand,
            peak_solar_kw: peak_solar,
            surplus_window_start: surplus_start,
            surplus_window_end: surplus_end,
            first_high_deficit: high_deficit,
            critical_service_ratio,
            battery_throughput_kwh: throughput,
            received_from_pool: pool_sum > 0.0,
        }
    }

    fn empty() -> Self {
        Self {
            final_soc: 0.0,
            min_soc: 0.0,
            mean_net_import_kw: 0.0,
            mean_net_import_after_share_kw: 0.0,
            import_kwh: 0.0,
            import_after_share_kwh: 0.0,
            received_from_pool_kwh: 0.0,
            peak_demand_kw: 0.0,
            peak_solar_kw: 0.0,
            surplus_window_start: None,
            surplus_window_end: None,
            first_high_deficit: None,
            critical_service_ratio: 1.0,
            battery_throughput_kwh: 0.0,
            received_from_pool: false,
        }
    }
}

fn fmt_ts(ts: Option<NaiveDateTime>) -> String {
    ts.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

impl fmt::Display for VillageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Final SoC:             {:.1}% (min {:.1}%)",
            self.final_soc * 100.0,
            self.min_soc * 100.0
        )?;
        writeln!(
            f,
            "Mean import:           {:.3} kW ({:.3} kW after sharing)",
            self.mean_net_import_kw, self.mean_net_import_after_share_kw
        )?;
        writeln!(
            f,
            "Grid energy:           {:.2} kWh ({:.2} kWh after sharing)",
            self.import_kwh, self.import_after_share_kwh
        )?;
        writeln!(f, "Received from pool:    {:.2} kWh", self.received_from_pool_kwh)?;
        writeln!(
            f,
            "Peak demand / solar:   {:.2} / {:.2} kW",
            self.peak_demand_kw, self.peak_solar_kw
        )?;
        writeln!(
            f,
            "Surplus window:        {} .. {}",
            fmt_ts(self.surplus_window_start),
            fmt_ts(self.surplus_window_end)
        )?;
        writeln!(f, "First high deficit:    {}", fmt_ts(self.first_high_deficit))?;
        writeln!(
            f,
            "Critical served:       {:.1}%",
            self.critical_service_ratio * 100.0
        )?;
        write!(f, "Battery throughput:    {:.2} kWh", self.battery_throughput_kwh)
    }
}
