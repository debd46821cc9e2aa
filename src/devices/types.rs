//! Common types and helpers for synthetic village profile generators.

use rand::{Rng, rngs::StdRng};

/// Timing information passed to a device for one sample.
#[derive(Debug, Clone, Copy)]
pub struct DeviceContext {
    /// Step index from the start of the generated series.
    pub timestep: usize,
    /// Duration of one step in hours.
    pub dt_hours: f64,
    /// Hour of day at step 0.
    pub start_hour: f64,
}

impl DeviceContext {
    /// Context for a series starting at midnight.
    pub fn new(timestep: usize, dt_hours: f64) -> Self {
        Self {
            timestep,
            dt_hours,
            start_hour: 0.0,
        }
    }

    pub fn with_start_hour(mut self, start_hour: f64) -> Self {
        self.start_hour = start_hour;
        self
    }

    /// Hour of day in `[0, 24)` at the start of this step.
    pub fn hour_of_day(&self) -> f64 {
        (self.start_hour + self.timestep as f64 * self.dt_hours).rem_euclid(24.0)
    }
}

/// A generator of non-negative power samples (kW).
pub trait Device {
    /// Returns the power at the given step in kilowatts.
    fn power_kw(&mut self, context: &DeviceContext) -> f64;
}

/// Gaussian noise via the Box-Muller transform.
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Half-sine daylight shape: 0 outside `[sunrise, sunset)`, 1 at solar noon.
pub fn daylight_frac(hour: f64, sunrise_hour: f64, sunset_hour: f64) -> f64 {
    if sunset_hour <= sunrise_hour || hour < sunrise_hour || hour >= sunset_hour {
        return 0.0;
    }
    let pos = (hour - sunrise_hour) / (sunset_hour - sunrise_hour);
    (std::f64::consts::PI * pos).sin().max(0.0)
}
