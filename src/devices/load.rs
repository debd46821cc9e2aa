use rand::{SeedableRng, rngs::StdRng};

use super::types::{Device, DeviceContext, gaussian_noise};

/// Village demand with a sinusoidal daily shape and Gaussian noise.
///
/// # Examples
///
/// ```
/// use village_dispatch::devices::{Device, DeviceContext, VillageLoad};
///
/// let mut load = VillageLoad::new(
///     20.0, // base_kw - average consumption
///     8.0,  // amp_kw - daily swing
///     1.2,  // phase_rad
///     0.0,  // noise_std - deterministic
///     7,    // seed
/// );
/// let kw = load.power_kw(&DeviceContext::new(18, 1.0));
/// assert!(kw >= 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct VillageLoad {
    /// Baseline consumption (kW).
    pub base_kw: f64,
    /// Amplitude of the daily sinusoid (kW).
    pub amp_kw: f64,
    /// Phase offset (radians).
    pub phase_rad: f64,
    /// Noise standard deviation (kW).
    pub noise_std: f64,
    rng: StdRng,
}

impl VillageLoad {
    pub fn new(base_kw: f64, amp_kw: f64, phase_rad: f64, noise_std: f64, seed: u64) -> Self {
        Self {
            base_kw,
            amp_kw,
            phase_rad,
            noise_std: noise_std.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Device for VillageLoad {
    /// Demand at the given step; never negative.
    fn power_kw(&mut self, context: &DeviceContext) -> f64 {
        let day_pos = context.hour_of_day() / 24.0;
        let angle = 2.0 * std::f64::consts::PI * day_pos + self.phase_rad;
        let noise = gaussian_noise(&mut self.rng, self.noise_std);
        (self.base_kw + self.amp_kw * angle.sin() + noise).max(0.0)
    }
}
