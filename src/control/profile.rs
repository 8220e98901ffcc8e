//! Generation-capacity profiles consulted by the PV availability tracker.

use std::f64::consts::PI;
use std::fmt;

/// Seconds in one day.
const DAY_S: f64 = 86_400.0;

/// Time-varying upper bound on what the PV array can produce.
pub trait GenerationProfile: fmt::Debug + Send {
    /// Maximum available generation at `time_s` seconds since run start (kW).
    fn available_kw(&self, time_s: f64) -> f64;
}

/// Flat capacity, the usual stand-in when no irradiance model is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantProfile {
    pub kw: f64,
}

impl ConstantProfile {
    pub fn new(kw: f64) -> Self {
        Self { kw: kw.max(0.0) }
    }
}

impl GenerationProfile for ConstantProfile {
    fn available_kw(&self, _time_s: f64) -> f64 {
        self.kw
    }
}

/// Clear-sky daylight curve: a half sine between sunrise and sunset that
/// repeats every 24 h.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarProfile {
    /// Output at solar noon (kW).
    pub peak_kw: f64,
    /// Sunrise, seconds after run start (inclusive).
    pub sunrise_s: f64,
    /// Sunset, seconds after run start (exclusive).
    pub sunset_s: f64,
}

impl SolarProfile {
    /// Creates a solar profile.
    ///
    /// # Panics
    ///
    /// Panics if `sunrise_s >= sunset_s` or the daylight window exceeds a day.
    pub fn new(peak_kw: f64, sunrise_s: f64, sunset_s: f64) -> Self {
        assert!(
            sunrise_s < sunset_s && sunset_s - sunrise_s <= DAY_S,
            "sunrise_s must be < sunset_s within one day"
        );
        Self {
            peak_kw: peak_kw.max(0.0),
            sunrise_s,
            sunset_s,
        }
    }

    /// Fraction of peak output at `time_s`, in `[0, 1]`.
    pub fn daylight_frac(&self, time_s: f64) -> f64 {
        let day_pos = (time_s - self.sunrise_s).rem_euclid(DAY_S);
        let length = self.sunset_s - self.sunrise_s;
        if day_pos >= length {
            return 0.0;
        }
        (PI * day_pos / length).sin().max(0.0)
    }
}

impl GenerationProfile for SolarProfile {
    fn available_kw(&self, time_s: f64) -> f64 {
        self.peak_kw * self.daylight_frac(time_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_is_flat() {
        let p = ConstantProfile::new(80.0);
        assert_eq!(p.available_kw(0.0), 80.0);
        assert_eq!(p.available_kw(1e6), 80.0);
        assert_eq!(ConstantProfile::new(-1.0).kw, 0.0);
    }

    #[test]
    fn solar_peaks_midway_and_is_dark_outside_window() {
        let p = SolarProfile::new(50.0, 0.0, 36_000.0);
        assert_eq!(p.available_kw(0.0), 0.0);
        assert!((p.available_kw(18_000.0) - 50.0).abs() < 1e-9);
        assert_eq!(p.available_kw(40_000.0), 0.0);
        assert!((p.daylight_frac(9_000.0) - p.daylight_frac(27_000.0)).abs() < 1e-12);
    }

    #[test]
    fn solar_repeats_daily() {
        let p = SolarProfile::new(10.0, 3_600.0, 30_000.0);
        let a = p.available_kw(12_000.0);
        let b = p.available_kw(12_000.0 + DAY_S);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    #[should_panic]
    fn solar_rejects_inverted_window() {
        SolarProfile::new(10.0, 5_000.0, 1_000.0);
    }
}
