use crate::error::{DispatchError, Result};

use super::types::{BatteryConfig, BatteryState, DispatchRecord, ForecastPoint, VillageId};

/// How the simulator treats a village series with no points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptySeriesPolicy {
    /// Fail with [`DispatchError::EmptyInput`].
    #[default]
    Reject,
    /// Produce an empty record sequence.
    AllowEmpty,
}

/// Greedy one-step battery dispatch for a single village.
///
/// Each step serves demand from solar first, then from the battery down to
/// `min_soc_frac`, imports the rest, and finally charges from leftover solar.
/// The simulation is a pure fold of [`BatterySimulator::step`] over the
/// series: no randomness and no state outside the returned [`BatteryState`].
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use village_dispatch::dispatch::battery::BatterySimulator;
/// use village_dispatch::dispatch::types::{BatteryConfig, BatteryState, ForecastPoint};
///
/// let ts = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(18, 0, 0).unwrap();
/// let point = ForecastPoint::new(ts, 10.0, 5.0).unwrap();
/// let sim = BatterySimulator::new(BatteryConfig::default());
///
/// let (next, record) = sim.step(BatteryState::default(), &point);
/// assert_eq!(record.discharge_kw(), 5.0);
/// assert!((next.soc_frac() - 0.55).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct BatterySimulator {
    config: BatteryConfig,
    initial: BatteryState,
    empty_policy: EmptySeriesPolicy,
}

impl BatterySimulator {
    /// Creates a simulator starting from the default state of charge.
    pub fn new(config: BatteryConfig) -> Self {
        Self {
            config,
            initial: BatteryState::default(),
            empty_policy: EmptySeriesPolicy::default(),
        }
    }

    /// Sets the state of charge at the first timestep.
    pub fn with_initial_state(mut self, initial: BatteryState) -> Self {
        self.initial = initial;
        self
    }

    /// Sets how an empty series is handled.
    pub fn with_empty_policy(mut self, policy: EmptySeriesPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    /// Battery parameters this simulator runs with.
    pub fn config(&self) -> &BatteryConfig {
        &self.config
    }

    /// Advances the battery by one timestep.
    ///
    /// Returns the state after the step together with the local dispatch
    /// record (no pool share applied).
    pub fn step(&self, state: BatteryState, point: &ForecastPoint) -> (BatteryState, DispatchRecord) {
        let cfg = &self.config;
        let demand_kw = point.demand_kw();
        let solar_kw = point.solar_kw();
        let mut soc = state.soc_frac();

        let critical_kw = demand_kw * cfg.critical_fraction;

        // Solar serves local demand first
        let used_solar_kw = solar_kw.min(demand_kw);
        let remaining_kw = demand_kw - used_solar_kw;

        // Discharge down to min_soc, bounded by pmax
        let max_discharge_kwh = ((soc - cfg.min_soc_frac) * cfg.capacity_kwh).max(0.0);
        let max_discharge_kw = cfg.pmax_kw.min(self.kwh_to_kw(max_discharge_kwh));
        let discharge_kw = max_discharge_kw.min(remaining_kw).max(0.0);
        soc -= self.kwh_to_soc(discharge_kw * cfg.dt_hours);

        let net_import_kw = (remaining_kw - discharge_kw).max(0.0);

        // Leftover solar charges the battery up to full
        let leftover_solar_kw = (solar_kw - used_solar_kw).max(0.0);
        let max_charge_kwh = ((1.0 - soc) * cfg.capacity_kwh).max(0.0);
        let max_charge_kw = cfg.pmax_kw.min(self.kwh_to_kw(max_charge_kwh));
        let charge_kw = max_charge_kw.min(leftover_solar_kw).max(0.0);
        soc += self.kwh_to_soc(charge_kw * cfg.dt_hours);

        let next = BatteryState::clamped(soc);

        let served_critical_kw = critical_kw.min(used_solar_kw + discharge_kw);
        let served_noncritical_kw = (demand_kw - served_critical_kw - net_import_kw).max(0.0);

        let record = DispatchRecord::local(
            point.timestamp(),
            demand_kw,
            solar_kw,
            next.soc_frac(),
            charge_kw,
            discharge_kw,
            net_import_kw,
            served_critical_kw,
            served_noncritical_kw,
        );
        (next, record)
    }

    /// Runs the battery over a village's full, timestamp-ordered series.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::EmptyInput`] if `series` is empty and the policy is
    ///   [`EmptySeriesPolicy::Reject`].
    /// - [`DispatchError::Validation`] on `timestamp` if the series is not
    ///   strictly increasing.
    pub fn simulate(&self, village: &VillageId, series: &[ForecastPoint]) -> Result<Vec<DispatchRecord>> {
        if series.is_empty() {
            return match self.empty_policy {
                EmptySeriesPolicy::Reject => Err(DispatchError::EmptyInput {
                    village: village.clone(),
                }),
                EmptySeriesPolicy::AllowEmpty => Ok(Vec::new()),
            };
        }

        if let Some(pair) = series
            .windows(2)
            .find(|w| w[1].timestamp() <= w[0].timestamp())
        {
            return Err(DispatchError::validation(
                "timestamp",
                format!(
                    "village \"{village}\": {} does not follow {}",
                    pair[1].timestamp(),
                    pair[0].timestamp()
                ),
            ));
        }

        let mut state = self.initial;
        let mut records = Vec::with_capacity(series.len());
        for point in series {
            let (next, record) = self.step(state, point);
            state = next;
            records.push(record);
        }
        Ok(records)
    }

    fn kwh_to_kw(&self, kwh: f64) -> f64 {
        if self.config.dt_hours > 0.0 {
            kwh / self.config.dt_hours
        } else {
            0.0
        }
    }

    /// Energy as a fraction of capacity; zero when there is no capacity.
    fn kwh_to_soc(&self, kwh: f64) -> f64 {
        if self.config.capacity_kwh > 0.0 {
            kwh / self.config.capacity_kwh
        } else {
            0.0
        }
    }
}
