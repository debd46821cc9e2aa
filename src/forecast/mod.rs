//! Forecast providers feeding the dispatch engine.
//!
//! [`ProfileForecaster`] fits an hour-of-day mean profile per field when the
//! history is long enough and otherwise falls back to the historical mean.
//! Undertrained villages never fail; they simply receive flat forecasts.

pub mod store;

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatch::types::{ForecastPoint, VillageId};
use crate::error::{DispatchError, Result};

pub use store::{InMemoryModelStore, ModelStore, TomlModelStore};

/// Minimum history length required before an hourly profile is fitted.
pub const DEFAULT_MIN_HISTORY: usize = 50;

/// Horizon and resolution of a requested forecast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastRequest {
    /// Forecast length in hours.
    pub horizon_hours: f64,
    /// Spacing between forecast points in minutes.
    pub resolution_minutes: u32,
}

impl Default for ForecastRequest {
    fn default() -> Self {
        Self {
            horizon_hours: 24.0,
            resolution_minutes: 60,
        }
    }
}

impl ForecastRequest {
    /// Number of points the forecast will contain.
    pub fn steps(&self) -> usize {
        if self.resolution_minutes == 0 || self.horizon_hours <= 0.0 {
            return 0;
        }
        // tolerate float error in horizons computed as steps * dt
        (self.horizon_hours * 60.0 / f64::from(self.resolution_minutes) + 1e-9).floor() as usize
    }

    pub fn dt_hours(&self) -> f64 {
        f64::from(self.resolution_minutes) / 60.0
    }

    /// Timestamps following `last`, one resolution apart.
    fn timestamps(&self, last: NaiveDateTime) -> impl Iterator<Item = NaiveDateTime> {
        let step = Duration::minutes(i64::from(self.resolution_minutes));
        (1..=self.steps()).map(move |k| last + step * k as i32)
    }
}

/// Produces a forecast for one village from its history.
pub trait ForecastProvider {
    /// Returns `request.steps()` points starting one resolution after the
    /// last history timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::EmptyInput`] when `history` is empty.
    fn forecast(
        &self,
        village: &VillageId,
        history: &[ForecastPoint],
        request: &ForecastRequest,
    ) -> Result<Vec<ForecastPoint>>;
}

/// Fitted predictor for a single field (demand or solar).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldModel {
    /// Historical mean, used whenever no hourly value is available.
    pub mean: f64,
    /// Mean value per hour of day (24 entries) when fitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly: Option<Vec<f64>>,
}

impl FieldModel {
    pub fn mean_only(mean: f64) -> Self {
        Self { mean, hourly: None }
    }

    pub fn is_fitted(&self) -> bool {
        self.hourly.is_some()
    }

    /// Prediction for the given hour of day, clamped at zero.
    pub fn predict(&self, hour: u32) -> f64 {
        self.hourly
            .as_ref()
            .and_then(|h| h.get(hour as usize))
            .copied()
            .unwrap_or(self.mean)
            .max(0.0)
    }

    fn fit(history: &[ForecastPoint], value: fn(&ForecastPoint) -> f64, min_history: usize) -> Self {
        let n = history.len();
        let mean = if n > 0 {
            history.iter().map(value).sum::<f64>() / n as f64
        } else {
            0.0
        };
        if n < min_history {
            return Self::mean_only(mean);
        }

        let mut sums = [0.0_f64; 24];
        let mut counts = [0_usize; 24];
        for p in history {
            let h = p.timestamp().hour() as usize;
            sums[h] += value(p);
            counts[h] += 1;
        }
        let hourly = sums
            .iter()
            .zip(counts)
            .map(|(s, c)| if c > 0 { s / c as f64 } else { mean })
            .collect();
        Self {
            mean,
            hourly: Some(hourly),
        }
    }
}

/// Per-village forecast model: one predictor per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VillageModel {
    pub demand: FieldModel,
    pub solar: FieldModel,
    /// Number of history points the model was fitted on.
    pub samples: usize,
}

/// Hour-of-day mean-profile forecaster with mean fallback.
#[derive(Debug, Clone, Copy)]
pub struct ProfileForecaster {
    min_history: usize,
}

impl Default for ProfileForecaster {
    fn default() -> Self {
        Self {
            min_history: DEFAULT_MIN_HISTORY,
        }
    }
}

impl ProfileForecaster {
    pub fn new(min_history: usize) -> Self {
        Self { min_history }
    }

    /// Fits a model; short history yields mean-only predictors.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::EmptyInput`] when `history` is empty.
    pub fn fit(&self, village: &VillageId, history: &[ForecastPoint]) -> Result<VillageModel> {
        if history.is_empty() {
            return Err(DispatchError::EmptyInput {
                village: village.clone(),
            });
        }
        let model = VillageModel {
            demand: FieldModel::fit(history, ForecastPoint::demand_kw, self.min_history),
            solar: FieldModel::fit(history, ForecastPoint::solar_kw, self.min_history),
            samples: history.len(),
        };
        if !model.demand.is_fitted() {
            warn!(
                village = %village,
                samples = history.len(),
                min_history = self.min_history,
                "insufficient history, forecasting historical mean"
            );
        }
        Ok(model)
    }

    /// Loads a stored model for `village`, fitting and saving one if absent.
    ///
    /// # Errors
    ///
    /// Propagates store failures, and [`DispatchError::EmptyInput`] when a
    /// fit is needed but `history` is empty.
    pub fn train_or_load<S: ModelStore + ?Sized>(
        &self,
        store: &mut S,
        village: &VillageId,
        history: &[ForecastPoint],
        force_retrain: bool,
    ) -> Result<VillageModel> {
        if !force_retrain {
            if let Some(model) = store.load(village)? {
                debug!(village = %village, "using stored forecast model");
                return Ok(model);
            }
        }
        let model = self.fit(village, history)?;
        store.save(village, &model)?;
        Ok(model)
    }

    /// Predicts `request.steps()` points after `last` from a fitted model.
    ///
    /// # Errors
    ///
    /// Only fails if the model holds non-finite values.
    pub fn predict(
        &self,
        model: &VillageModel,
        last: NaiveDateTime,
        request: &ForecastRequest,
    ) -> Result<Vec<ForecastPoint>> {
        request
            .timestamps(last)
            .map(|ts| {
                let hour = ts.hour();
                ForecastPoint::new(ts, model.demand.predict(hour), model.solar.predict(hour))
            })
            .collect()
    }
}

impl ForecastProvider for ProfileForecaster {
    fn forecast(
        &self,
        village: &VillageId,
        history: &[ForecastPoint],
        request: &ForecastRequest,
    ) -> Result<Vec<ForecastPoint>> {
        let model = self.fit(village, history)?;
        let last = history[history.len() - 1].timestamp();
        self.predict(&model, last, request)
    }
}

/// Naive "tomorrow is today" forecaster.
///
/// Repeats the history values in order, wrapping as needed, onto the
/// requested future timestamps.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaiveForecast;

impl ForecastProvider for NaiveForecast {
    fn forecast(
        &self,
        village: &VillageId,
        history: &[ForecastPoint],
        request: &ForecastRequest,
    ) -> Result<Vec<ForecastPoint>> {
        let Some(last) = history.last() else {
            return Err(DispatchError::EmptyInput {
                village: village.clone(),
            });
        };
        request
            .timestamps(last.timestamp())
            .zip(history.iter().cycle())
            .map(|(ts, p)| ForecastPoint::new(ts, p.demand_kw(), p.solar_kw()))
            .collect()
    }
}
