use rand::{Rng, SeedableRng, rngs::StdRng};

use super::LoadSample;

/// An equipment class whose start-ups show up as short load impulses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpulseClass {
    /// Nominal impulse height (kW).
    pub power_kw: f64,
    /// Nominal impulse length (samples).
    pub duration: usize,
    /// Per-sample start probability.
    pub frequency: f64,
}

/// Start-up impulse classes of a typical light-industry floor.
pub const IMPULSE_CLASSES: [ImpulseClass; 4] = [
    ImpulseClass {
        power_kw: 7.5,
        duration: 4,
        frequency: 0.015,
    },
    ImpulseClass {
        power_kw: 12.0,
        duration: 5,
        frequency: 0.012,
    },
    ImpulseClass {
        power_kw: 15.5,
        duration: 6,
        frequency: 0.008,
    },
    ImpulseClass {
        power_kw: 9.0,
        duration: 3,
        frequency: 0.010,
    },
];

/// A synthetic factory load for an 08:00-18:00 working day.
///
/// `FactoryLoad` combines a piecewise-linear daily curve (morning ramp,
/// 10:00 peak, lunch trough, 14:30 peak, shutdown and night duty) with
/// random equipment start-up impulses and Gaussian measurement noise.
/// The working day is stretched over `duration_hours` regardless of its
/// length.
///
/// # Examples
///
/// ```
/// use backflow_guard::sim::synthetic::FactoryLoad;
///
/// let series = FactoryLoad::new(0.5, 1.0, 7).generate();
/// assert_eq!(series.len(), 1800);
/// assert!(series.iter().all(|s| s.load_kw >= 5.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryLoad {
    /// Series length in hours.
    pub duration_hours: f64,
    /// Sampling interval in seconds.
    pub interval_s: f64,
    /// Standard deviation of the measurement noise (kW).
    pub noise_std: f64,
    /// Lower clamp applied to every sample (kW).
    pub floor_kw: f64,
    /// Random seed for reproducible series.
    pub seed: u64,
}

impl FactoryLoad {
    /// Creates a generator with 1.5 kW noise and a 5 kW floor.
    ///
    /// # Arguments
    ///
    /// * `duration_hours` - Length of the series in hours
    /// * `interval_s` - Sampling interval in seconds
    /// * `seed` - Random seed for reproducible output
    pub fn new(duration_hours: f64, interval_s: f64, seed: u64) -> Self {
        Self {
            duration_hours,
            interval_s,
            noise_std: 1.5,
            floor_kw: 5.0,
            seed,
        }
    }

    /// Number of samples the series will contain.
    pub fn len(&self) -> usize {
        if self.interval_s <= 0.0 || self.duration_hours <= 0.0 {
            return 0;
        }
        (self.duration_hours * 3600.0 / self.interval_s) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Generates the full series. The same seed always yields the same
    /// series.
    pub fn generate(&self) -> Vec<LoadSample> {
        let n = self.len();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let impulses = equipment_impulses(n, &mut rng);
        let span_s = self.duration_hours * 3600.0;

        (0..n)
            .map(|i| {
                let time_s = i as f64 * self.interval_s;
                let hour = 8.0 + 10.0 * time_s / span_s;
                let noise = gaussian_noise(&mut rng, self.noise_std);
                let load = base_load_kw(hour) + impulses[i] + noise;
                LoadSample {
                    time_s,
                    load_kw: load.max(self.floor_kw),
                }
            })
            .collect()
    }
}

/// Daily base curve at wall-clock `hour` (8.0 to 18.0).
pub fn base_load_kw(hour: f64) -> f64 {
    if hour < 8.5 {
        15.0 + 30.0 * (hour - 8.0) / 0.5
    } else if hour < 10.0 {
        45.0 + 51.0 * (hour - 8.5) / 1.5
    } else if hour < 11.5 {
        96.0 - 8.0 * (hour - 10.0) / 1.5
    } else if hour < 12.0 {
        88.0 - 60.0 * (hour - 11.5)
    } else if hour < 12.5 {
        28.0
    } else if hour < 13.5 {
        28.0 + 57.0 * (hour - 12.5)
    } else if hour < 15.0 {
        85.0 + 11.0 * (hour - 13.5) / 1.5
    } else if hour < 16.5 {
        96.0 - 30.0 * (hour - 15.0) / 1.5
    } else if hour < 17.5 {
        66.0 - 47.0 * (hour - 16.5)
    } else {
        19.0 - 11.0 * (hour - 17.5) / 0.5
    }
}

/// Sums the start-up impulses of every equipment class over `n` samples.
fn equipment_impulses(n: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut impulses = vec![0.0; n];
    for class in IMPULSE_CLASSES {
        let mut i = 0;
        while i < n {
            if rng.random::<f64>() >= class.frequency {
                i += 1;
                continue;
            }
            let duration =
                (class.duration as f64 * (1.0 + rng.random_range(-0.3..0.3))) as usize;
            let power = class.power_kw * (1.0 + rng.random_range(-0.2..0.2));
            for (j, slot) in impulses.iter_mut().skip(i).take(duration).enumerate() {
                *slot += power * impulse_shape(j, duration);
            }
            i += duration + rng.random_range(3..10);
        }
    }
    impulses
}

/// Relative impulse height at sample `j` of a `duration`-sample impulse:
/// inrush, peak, plateau, tail.
fn impulse_shape(j: usize, duration: usize) -> f64 {
    match j {
        0 => 0.6,
        1 => 1.0,
        _ if j + 1 < duration => 0.9,
        _ => 0.5,
    }
}

/// Gaussian noise via the Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and the given
/// standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_curve_landmarks() {
        assert_eq!(base_load_kw(8.0), 15.0);
        assert_eq!(base_load_kw(10.0), 96.0);
        assert_eq!(base_load_kw(12.25), 28.0);
        assert!((base_load_kw(15.0) - 96.0).abs() < 1e-9);
        assert!((base_load_kw(17.999) - 8.0).abs() < 0.1);
    }

    #[test]
    fn same_seed_same_series() {
        let a = FactoryLoad::new(0.25, 1.0, 42).generate();
        let b = FactoryLoad::new(0.25, 1.0, 42).generate();
        let c = FactoryLoad::new(0.25, 1.0, 43).generate();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn series_respects_floor_and_spacing() {
        let load = FactoryLoad::new(0.1, 0.5, 1);
        let series = load.generate();
        assert_eq!(series.len(), 720);
        assert_eq!(series[1].time_s, 0.5);
        assert!(series.iter().all(|s| s.load_kw >= 5.0 && s.load_kw.is_finite()));
    }

    #[test]
    fn impulses_are_positive_and_bounded() {
        let mut rng = StdRng::seed_from_u64(3);
        let impulses = equipment_impulses(5000, &mut rng);
        assert!(impulses.iter().all(|v| *v >= 0.0));
        assert!(impulses.iter().any(|v| *v > 0.0));
        // At most every class overlapping at +20 % power.
        assert!(impulses.iter().all(|v| *v <= 1.2 * 44.0));
    }

    #[test]
    fn impulse_shape_profile() {
        let shape: Vec<f64> = (0..5).map(|j| impulse_shape(j, 5)).collect();
        assert_eq!(shape, vec![0.6, 1.0, 0.9, 0.9, 0.5]);
    }

    #[test]
    fn empty_for_degenerate_settings() {
        assert!(FactoryLoad::new(0.0, 1.0, 1).is_empty());
        assert!(FactoryLoad::new(1.0, 0.0, 1).generate().is_empty());
    }

    #[test]
    fn gaussian_noise_zero_std() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
    }
}
