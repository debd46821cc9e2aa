use rand::{SeedableRng, rngs::StdRng};

use super::types::{Device, DeviceContext, daylight_frac, gaussian_noise};

/// A village solar array with a half-sine daylight profile.
///
/// Returns positive generation during daylight and zero at night. Noise is
/// multiplicative, so output stays zero outside daylight hours.
#[derive(Debug, Clone)]
pub struct SolarArray {
    /// Output at solar noon under clear sky (kW).
    pub kw_peak: f64,
    /// Hour of day generation starts (inclusive).
    pub sunrise_hour: f64,
    /// Hour of day generation ends (exclusive).
    pub sunset_hour: f64,
    /// Noise standard deviation as a fraction of output.
    pub noise_std: f64,
    rng: StdRng,
}

impl SolarArray {
    /// Creates a new array.
    ///
    /// A window with `sunset_hour <= sunrise_hour` produces no generation.
    pub fn new(kw_peak: f64, sunrise_hour: f64, sunset_hour: f64, noise_std: f64, seed: u64) -> Self {
        Self {
            kw_peak: kw_peak.max(0.0),
            sunrise_hour,
            sunset_hour,
            noise_std: noise_std.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Device for SolarArray {
    fn power_kw(&mut self, context: &DeviceContext) -> f64 {
        let frac = daylight_frac(context.hour_of_day(), self.sunrise_hour, self.sunset_hour);
        if frac <= 0.0 {
            return 0.0;
        }
        let noise_mult = 1.0 + gaussian_noise(&mut self.rng, self.noise_std);
        (self.kw_peak * frac * noise_mult).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_at_night() {
        let mut pv = SolarArray::new(40.0, 6.0, 18.0, 0.1, 1);
        for t in (0..6).chain(18..24) {
            assert_eq!(pv.power_kw(&DeviceContext::new(t, 1.0)), 0.0);
        }
    }

    #[test]
    fn noiseless_peak_at_noon() {
        let mut pv = SolarArray::new(40.0, 6.0, 18.0, 0.0, 1);
        let noon = pv.power_kw(&DeviceContext::new(12, 1.0));
        assert!((noon - 40.0).abs() < 1e-9);
    }

    #[test]
    fn inverted_window_generates_nothing() {
        let mut pv = SolarArray::new(40.0, 18.0, 6.0, 0.0, 1);
        assert_eq!(pv.power_kw(&DeviceContext::new(12, 1.0)), 0.0);
    }
}
