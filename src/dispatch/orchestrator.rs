//! Two-phase multi-village dispatch: local battery runs, then per-timestep pooling.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Duration;
use tracing::{debug, info};

use crate::error::{DispatchError, Result};
use crate::parallel;

use super::battery::{BatterySimulator, EmptySeriesPolicy};
use super::pool::{EnergyPoolCoordinator, PoolStep};
use super::types::{BatteryConfig, BatteryState, DispatchRecord, ForecastPoint, VillageId};

/// Village iteration order used by the pool coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PoolOrder {
    /// Ascending village identifier.
    #[default]
    Ascending,
    /// Explicit order; must list every forecast village exactly once.
    Listed(Vec<VillageId>),
}

/// Final per-village records plus the per-timestep pool figures.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Finalized records, one sequence per village.
    pub dispatch: BTreeMap<VillageId, Vec<DispatchRecord>>,
    /// Pool aggregates, one per shared timestep.
    pub pool_steps: Vec<PoolStep>,
}

impl RunOutput {
    /// Number of shared timesteps in the run.
    pub fn timesteps(&self) -> usize {
        self.pool_steps.len()
    }
}

/// Runs every village's battery independently, then pools surplus per timestep.
///
/// Phase 1 is parallel across villages. After all villages finish, their
/// timestamp grids are checked for alignment before any pooling runs. Phase 2
/// is parallel across timesteps and strictly sequential across villages
/// within a timestep.
#[derive(Debug, Clone)]
pub struct MultiVillageOrchestrator {
    battery: BatteryConfig,
    overrides: BTreeMap<VillageId, BatteryConfig>,
    initial: BatteryState,
    coordinator: EnergyPoolCoordinator,
    order: PoolOrder,
    empty_policy: EmptySeriesPolicy,
    force_sequential: bool,
}

impl MultiVillageOrchestrator {
    /// Creates an orchestrator applying `battery` to every village.
    pub fn new(battery: BatteryConfig) -> Self {
        Self {
            battery,
            overrides: BTreeMap::new(),
            initial: BatteryState::default(),
            coordinator: EnergyPoolCoordinator::default(),
            order: PoolOrder::default(),
            empty_policy: EmptySeriesPolicy::default(),
            force_sequential: false,
        }
    }

    /// Uses `config` instead of the run default for one village.
    ///
    /// The override's `dt_hours` must match the run default.
    pub fn with_battery_override(mut self, village: VillageId, config: BatteryConfig) -> Self {
        self.overrides.insert(village, config);
        self
    }

    /// Starting SOC for every village.
    pub fn with_initial_state(mut self, initial: BatteryState) -> Self {
        self.initial = initial;
        self
    }

    /// Replaces the pool coordinator.
    pub fn with_coordinator(mut self, coordinator: EnergyPoolCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Village order used when sharing.
    pub fn with_pool_order(mut self, order: PoolOrder) -> Self {
        self.order = order;
        self
    }

    /// Empty-series handling for every village.
    pub fn with_empty_policy(mut self, policy: EmptySeriesPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    /// Disables rayon for this orchestrator even when compiled in.
    pub fn force_sequential(mut self, force: bool) -> Self {
        self.force_sequential = force;
        self
    }

    /// Battery parameters in effect for `village`.
    pub fn battery_for(&self, village: &VillageId) -> &BatteryConfig {
        self.overrides.get(village).unwrap_or(&self.battery)
    }

    /// Step length shared by every village.
    pub fn dt_hours(&self) -> f64 {
        self.battery.dt_hours
    }

    /// Executes both phases over all village forecasts.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Validation`] for invalid battery parameters,
    ///   out-of-order timestamps, or spacing that differs from `dt_hours`.
    /// - [`DispatchError::EmptyInput`] for an empty series under the strict
    ///   policy.
    /// - [`DispatchError::PreconditionViolation`] when village timestamp
    ///   grids differ, a pool order is not a permutation of the villages, or an
    ///   override uses a different `dt_hours`.
    pub fn run(&self, forecasts: &BTreeMap<VillageId, Vec<ForecastPoint>>) -> Result<RunOutput> {
        if forecasts.is_empty() {
            return Ok(RunOutput::default());
        }

        self.check_batteries()?;
        let order = self.resolve_order(forecasts)?;

        info!(
            villages = order.len(),
            steps = forecasts.values().map(Vec::len).max().unwrap_or(0),
            "starting local battery dispatch"
        );

        // Phase 1: independent per-village simulation
        let locals: Vec<Vec<DispatchRecord>> = parallel::map_slice(
            &order,
            |village| {
                let series = forecasts.get(*village).map_or(&[][..], Vec::as_slice);
                BatterySimulator::new(*self.battery_for(village))
                    .with_initial_state(self.initial)
                    .with_empty_policy(self.empty_policy)
                    .simulate(village, series)
            },
            self.force_sequential,
        )
        .into_iter()
        .collect::<Result<_>>()?;

        check_grid(&order, &locals)?;
        self.check_spacing(order[0], &locals[0])?;

        // Phase 2: per-timestep pooling in fixed village order
        let steps = locals[0].len();
        let shared: Vec<(Vec<DispatchRecord>, PoolStep)> = parallel::map_indices(
            steps,
            |t| {
                let mut snapshot: Vec<DispatchRecord> = locals.iter().map(|rs| rs[t]).collect();
                let step = self.coordinator.share(t, &mut snapshot);
                (snapshot, step)
            },
            self.force_sequential,
        );

        let mut columns: Vec<Vec<DispatchRecord>> =
            (0..order.len()).map(|_| Vec::with_capacity(steps)).collect();
        let mut pool_steps = Vec::with_capacity(steps);
        for (snapshot, step) in shared {
            debug!(
                timestep = step.timestep,
                surplus_kw = step.pool_surplus_kw,
                deficit_kw = step.pool_deficit_kw,
                distributed_kw = step.distributed_kw,
                "pool step"
            );
            for (column, record) in columns.iter_mut().zip(snapshot) {
                column.push(record);
            }
            pool_steps.push(step);
        }

        let distributed: f64 = pool_steps.iter().map(|s| s.distributed_kw).sum();
        info!(steps, distributed_kw = distributed, "pooling complete");

        let dispatch = order.into_iter().cloned().zip(columns).collect();
        Ok(RunOutput {
            dispatch,
            pool_steps,
        })
    }

    fn check_batteries(&self) -> Result<()> {
        self.battery.validate()?;
        for (village, cfg) in &self.overrides {
            cfg.validate()?;
            if cfg.dt_hours != self.battery.dt_hours {
                return Err(DispatchError::PreconditionViolation(format!(
                    "village \"{village}\" uses dt_hours={} but the run uses dt_hours={}",
                    cfg.dt_hours, self.battery.dt_hours
                )));
            }
        }
        Ok(())
    }

    fn resolve_order<'a>(
        &self,
        forecasts: &'a BTreeMap<VillageId, Vec<ForecastPoint>>,
    ) -> Result<Vec<&'a VillageId>> {
        match &self.order {
            PoolOrder::Ascending => Ok(forecasts.keys().collect()),
            PoolOrder::Listed(listed) => {
                let unique: BTreeSet<&VillageId> = listed.iter().collect();
                if unique.len() != listed.len() || listed.len() != forecasts.len() {
                    return Err(DispatchError::PreconditionViolation(format!(
                        "pool order lists {} villages ({} unique) but {} forecasts were given",
                        listed.len(),
                        unique.len(),
                        forecasts.len()
                    )));
                }
                listed
                    .iter()
                    .map(|v| {
                        forecasts.get_key_value(v).map(|(k, _)| k).ok_or_else(|| {
                            DispatchError::PreconditionViolation(format!(
                                "pool order names unknown village \"{v}\""
                            ))
                        })
                    })
                    .collect()
            }
        }
    }

    /// Consecutive timestamps must be exactly `dt_hours` apart.
    fn check_spacing(&self, village: &VillageId, records: &[DispatchRecord]) -> Result<()> {
        let expected = Duration::milliseconds((self.battery.dt_hours * 3_600_000.0).round() as i64);
        for pair in records.windows(2) {
            let gap = pair[1].timestamp() - pair[0].timestamp();
            if gap != expected {
                return Err(DispatchError::validation(
                    "timestamp",
                    format!(
                        "village \"{village}\": spacing {}s at {} does not match dt_hours={}",
                        gap.num_seconds(),
                        pair[1].timestamp(),
                        self.battery.dt_hours
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Every village must share the reference village's timestamp grid.
fn check_grid(order: &[&VillageId], locals: &[Vec<DispatchRecord>]) -> Result<()> {
    let reference = &locals[0];
    for (village, records) in order.iter().zip(locals).skip(1) {
        if records.len() != reference.len() {
            return Err(DispatchError::PreconditionViolation(format!(
                "village \"{village}\" has {} timesteps but \"{}\" has {}",
                records.len(),
                order[0],
                reference.len()
            )));
        }
        if let Some((t, (a, b))) = reference
            .iter()
            .zip(records)
            .enumerate()
            .find(|(_, (a, b))| a.timestamp() != b.timestamp())
        {
            return Err(DispatchError::PreconditionViolation(format!(
                "timestamp grid mismatch at step {t}: \"{}\" has {} but \"{village}\" has {}",
                order[0],
                a.timestamp(),
                b.timestamp()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    fn ts(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap()
            + Duration::hours(hour)
    }

    fn flat(steps: i64, demand: f64, solar: f64) -> Vec<ForecastPoint> {
        (0..steps)
            .map(|h| ForecastPoint::new(ts(h), demand, solar).unwrap())
            .collect()
    }

    fn forecasts(entries: Vec<(&str, Vec<ForecastPoint>)>) -> BTreeMap<VillageId, Vec<ForecastPoint>> {
        entries
            .into_iter()
            .map(|(id, series)| (VillageId::new(id), series))
            .collect()
    }

    #[test]
    fn empty_forecast_map_yields_empty_output() {
        let out = MultiVillageOrchestrator::new(BatteryConfig::default())
            .run(&BTreeMap::new())
            .unwrap();
        assert!(out.dispatch.is_empty());
        assert_eq!(out.timesteps(), 0);
    }

    #[test]
    fn output_has_one_sequence_per_village() {
        let input = forecasts(vec![("a", flat(6, 5.0, 1.0)), ("b", flat(6, 2.0, 8.0))]);
        let out = MultiVillageOrchestrator::new(BatteryConfig::default())
            .run(&input)
            .unwrap();
        assert_eq!(out.dispatch.len(), 2);
        assert!(out.dispatch.values().all(|rs| rs.len() == 6));
        assert_eq!(out.pool_steps.len(), 6);
    }

    #[test]
    fn length_mismatch_fails_before_pooling() {
        let input = forecasts(vec![("a", flat(6, 5.0, 1.0)), ("b", flat(5, 2.0, 8.0))]);
        let err = MultiVillageOrchestrator::new(BatteryConfig::default())
            .run(&input)
            .unwrap_err();
        assert!(matches!(err, DispatchError::PreconditionViolation(_)));
    }

    #[test]
    fn shifted_grid_fails() {
        let shifted: Vec<ForecastPoint> = (1..7)
            .map(|h| ForecastPoint::new(ts(h), 1.0, 1.0).unwrap())
            .collect();
        let input = forecasts(vec![("a", flat(6, 5.0, 1.0)), ("b", shifted)]);
        let err = MultiVillageOrchestrator::new(BatteryConfig::default())
            .run(&input)
            .unwrap_err();
        assert!(matches!(err, DispatchError::PreconditionViolation(ref m) if m.contains("mismatch")));
    }

    #[test]
    fn spacing_must_match_dt() {
        let cfg = BatteryConfig {
            dt_hours: 0.5,
            ..BatteryConfig::default()
        };
        let input = forecasts(vec![("a", flat(3, 1.0, 0.0))]);
        let err = MultiVillageOrchestrator::new(cfg).run(&input).unwrap_err();
        assert!(matches!(err, DispatchError::Validation { ref field, .. } if field == "timestamp"));
    }

    #[test]
    fn listed_order_must_cover_all_villages() {
        let input = forecasts(vec![("a", flat(2, 1.0, 0.0)), ("b", flat(2, 1.0, 0.0))]);
        let err = MultiVillageOrchestrator::new(BatteryConfig::default())
            .with_pool_order(PoolOrder::Listed(vec![VillageId::new("a")]))
            .run(&input)
            .unwrap_err();
        assert!(matches!(err, DispatchError::PreconditionViolation(_)));

        let err = MultiVillageOrchestrator::new(BatteryConfig::default())
            .with_pool_order(PoolOrder::Listed(vec![VillageId::new("a"), VillageId::new("c")]))
            .run(&input)
            .unwrap_err();
        assert!(matches!(err, DispatchError::PreconditionViolation(ref m) if m.contains("unknown")));
    }

    #[test]
    fn override_with_other_dt_rejected() {
        let input = forecasts(vec![("a", flat(2, 1.0, 0.0))]);
        let override_cfg = BatteryConfig {
            dt_hours: 0.25,
            ..BatteryConfig::default()
        };
        let err = MultiVillageOrchestrator::new(BatteryConfig::default())
            .with_battery_override(VillageId::new("a"), override_cfg)
            .run(&input)
            .unwrap_err();
        assert!(matches!(err, DispatchError::PreconditionViolation(_)));
    }

    #[test]
    fn sequential_and_parallel_runs_match() {
        let input = forecasts(vec![
            ("a", flat(24, 6.0, 0.0)),
            ("b", flat(24, 1.0, 40.0)),
            ("c", flat(24, 9.0, 2.0)),
        ]);
        let base = MultiVillageOrchestrator::new(BatteryConfig::default());
        let par = base.clone().run(&input).unwrap();
        let seq = base.force_sequential(true).run(&input).unwrap();
        assert_eq!(par.dispatch, seq.dispatch);
        assert_eq!(par.pool_steps, seq.pool_steps);
    }

    #[test]
    fn all_empty_series_allowed_when_requested() {
        let input = forecasts(vec![("a", Vec::new()), ("b", Vec::new())]);
        let out = MultiVillageOrchestrator::new(BatteryConfig::default())
            .with_empty_policy(EmptySeriesPolicy::AllowEmpty)
            .run(&input)
            .unwrap();
        assert_eq!(out.timesteps(), 0);
        assert!(out.dispatch.values().all(Vec::is_empty));
    }
}
