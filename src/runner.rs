//! Scenario pipeline: synthetic history, forecasting, dispatch and KPIs.

use std::collections::BTreeMap;

use chrono::Duration;
use tracing::info;

use crate::config::ScenarioConfig;
use crate::devices::{SolarArray, VillageLoad, synthesize_series};
use crate::dispatch::{
    BatteryState, EnergyPoolCoordinator, ForecastPoint, MultiVillageOrchestrator, RunOutput,
    VillageId, VillageSummary,
};
use crate::error::{DispatchError, Result};
use crate::forecast::{
    ForecastRequest, InMemoryModelStore, ModelStore, ProfileForecaster, TomlModelStore,
};

/// Seed offset between a village's load and solar generators.
const SOLAR_SEED_OFFSET: u64 = 1;
/// Seed stride between villages.
const VILLAGE_SEED_STRIDE: u64 = 2;

/// Everything a scenario run produced.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    /// Forecasts the dispatch was computed from.
    pub forecasts: BTreeMap<VillageId, Vec<ForecastPoint>>,
    /// Finalized records and pool figures.
    pub output: RunOutput,
    /// KPI summary per village.
    pub summaries: BTreeMap<VillageId, VillageSummary>,
}

/// Runs a scenario end to end.
///
/// When `forecasts` is `None` each configured village gets synthetic history
/// and a profile forecast; otherwise the given series are dispatched as is.
///
/// # Errors
///
/// Returns the first configuration error, or any error raised while
/// forecasting or dispatching.
pub fn run_scenario(
    cfg: &ScenarioConfig,
    forecasts: Option<BTreeMap<VillageId, Vec<ForecastPoint>>>,
) -> Result<ScenarioRun> {
    if let Some(err) = cfg.validate().into_iter().next() {
        return Err(DispatchError::Config(err));
    }

    let forecasts = match forecasts {
        Some(f) => f,
        None => forecast_villages(cfg)?,
    };

    let orchestrator = build_orchestrator(cfg)?;
    let output = orchestrator.run(&forecasts)?;

    let summaries = output
        .dispatch
        .iter()
        .map(|(id, records)| {
            let summary = VillageSummary::from_records(records, orchestrator.battery_for(id));
            (id.clone(), summary)
        })
        .collect();

    Ok(ScenarioRun {
        forecasts,
        output,
        summaries,
    })
}

/// Builds the orchestrator described by `cfg`.
///
/// # Errors
///
/// Returns [`DispatchError::Validation`] for an out-of-range initial SOC.
pub fn build_orchestrator(cfg: &ScenarioConfig) -> Result<MultiVillageOrchestrator> {
    let mut orchestrator = MultiVillageOrchestrator::new(cfg.battery_config())
        .with_initial_state(BatteryState::new(cfg.run.initial_soc)?)
        .with_coordinator(EnergyPoolCoordinator::new(cfg.pool.near_full_soc))
        .with_pool_order(cfg.pool_order())
        .with_empty_policy(cfg.empty_policy())
        .force_sequential(cfg.run.force_sequential);
    for v in cfg.villages.iter().filter(|v| v.has_battery_override()) {
        orchestrator = orchestrator.with_battery_override(VillageId::new(&v.id), cfg.village_battery(v));
    }
    Ok(orchestrator)
}

/// Synthesizes history for every configured village and forecasts
/// `run.steps` points from `run.start`.
///
/// # Errors
///
/// Propagates model store and forecast errors.
pub fn forecast_villages(cfg: &ScenarioConfig) -> Result<BTreeMap<VillageId, Vec<ForecastPoint>>> {
    let dt = cfg.run.dt_hours;
    let request = ForecastRequest {
        horizon_hours: cfg.run.steps as f64 * dt,
        resolution_minutes: (dt * 60.0).round() as u32,
    };
    let history_steps = (cfg.forecast.history_days as f64 * 24.0 / dt).round() as usize;
    let step = Duration::minutes(i64::from(request.resolution_minutes));
    // history ends one step before the forecast start
    let history_start = cfg.run.start - step * history_steps as i32;

    let forecaster = ProfileForecaster::new(cfg.forecast.min_history);
    let mut store: Box<dyn ModelStore> = match &cfg.forecast.model_store {
        Some(path) => Box::new(TomlModelStore::new(path)),
        None => Box::new(InMemoryModelStore::default()),
    };

    let mut forecasts = BTreeMap::new();
    for (i, v) in cfg.villages.iter().enumerate() {
        let seed = cfg.run.seed.wrapping_add(i as u64 * VILLAGE_SEED_STRIDE);
        let mut load = VillageLoad::new(v.base_kw, v.amp_kw, v.phase_rad, v.noise_std, seed);
        let mut pv = SolarArray::new(
            v.solar_kw_peak,
            v.sunrise_hour,
            v.sunset_hour,
            v.solar_noise_std,
            seed.wrapping_add(SOLAR_SEED_OFFSET),
        );
        let history = synthesize_series(&mut load, &mut pv, history_start, history_steps, dt)?;

        let id = VillageId::new(&v.id);
        let model = forecaster.train_or_load(
            store.as_mut(),
            &id,
            &history,
            cfg.forecast.force_retrain,
        )?;
        let last = history
            .last()
            .map(ForecastPoint::timestamp)
            .unwrap_or(history_start);
        let forecast = forecaster.predict(&model, last, &request)?;
        info!(
            village = %id,
            history = history.len(),
            steps = forecast.len(),
            profile = model.demand.is_fitted(),
            "forecast ready"
        );
        forecasts.insert(id, forecast);
    }
    Ok(forecasts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_runs_every_village() {
        let cfg = ScenarioConfig::baseline();
        let run = run_scenario(&cfg, None).unwrap();
        assert_eq!(run.output.dispatch.len(), 3);
        assert_eq!(run.summaries.len(), 3);
        assert_eq!(run.output.timesteps(), cfg.run.steps);
        for records in run.output.dispatch.values() {
            assert_eq!(records.len(), cfg.run.steps);
            assert_eq!(records[0].timestamp(), cfg.run.start);
        }
    }

    #[test]
    fn forecasts_start_at_run_start() {
        let mut cfg = ScenarioConfig::stressed_grid();
        cfg.forecast.history_days = 1;
        let forecasts = forecast_villages(&cfg).unwrap();
        for series in forecasts.values() {
            assert_eq!(series.len(), 48);
            assert_eq!(series[0].timestamp(), cfg.run.start);
            assert_eq!(
                series[1].timestamp() - series[0].timestamp(),
                Duration::minutes(30)
            );
        }
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let mut cfg = ScenarioConfig::baseline();
        cfg.run.steps = 0;
        let err = run_scenario(&cfg, None).unwrap_err();
        assert!(matches!(err, DispatchError::Config(ref e) if e.field == "run.steps"));
    }

    #[test]
    fn same_seed_same_dispatch() {
        let cfg = ScenarioConfig::sunny_cluster();
        let a = run_scenario(&cfg, None).unwrap();
        let b = run_scenario(&cfg, None).unwrap();
        assert_eq!(a.output.dispatch, b.output.dispatch);
    }

    #[test]
    fn battery_overrides_reach_the_orchestrator() {
        let cfg = ScenarioConfig::stressed_grid();
        let orchestrator = build_orchestrator(&cfg).unwrap();
        assert_eq!(
            orchestrator.battery_for(&VillageId::new("millbrook")).capacity_kwh,
            0.0
        );
        assert_eq!(
            orchestrator.battery_for(&VillageId::new("quarry")).capacity_kwh,
            40.0
        );
    }
}
