//! Smoothed-trend unscented Kalman filter for load forecasting.
//!
//! The filter tracks a kinematic state `[level, rate, acceleration]` of the
//! measured site load and answers "what will the load be `h` seconds from
//! now, and how low could it plausibly be?".

use std::collections::VecDeque;

use nalgebra::{Cholesky, Matrix3, SymmetricEigen, Vector3};
use serde::Deserialize;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{ParamError, non_negative};

/// Dimension of the state vector.
pub const STATE_DIM: usize = 3;
/// Number of sigma points of the scaled unscented transform.
const SIGMA_POINTS: usize = 2 * STATE_DIM + 1;

/// Smallest time step accepted by [`LoadEstimator::update`] (s).
const MIN_DT_S: f64 = 0.01;
/// Initial variance on every state component.
const INITIAL_VARIANCE: f64 = 100.0;
/// Variance ceilings for level, rate and acceleration.
const VARIANCE_CEILING: [f64; STATE_DIM] = [1000.0, 100.0, 10.0];
/// Observed rate (kW/s) above which the level variance is inflated.
const INFLATION_RATE_THRESHOLD: f64 = 5.0;
/// Rate (kW/s) that adds a full unit of inflation.
const INFLATION_RATE_SCALE: f64 = 50.0;
/// Cap on the level-variance inflation factor.
const MAX_INFLATION: f64 = 1.5;

/// Noise and unscented-transform tuning for a [`LoadEstimator`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorConfig {
    /// Diagonal process-noise variance added per prediction step.
    pub process_noise: f64,
    /// Measurement-noise variance of a raw load reading.
    pub measurement_noise: f64,
    /// Sigma-point spread (UKF alpha).
    pub alpha_ukf: f64,
    /// Prior distribution knowledge (2 is optimal for Gaussians).
    pub beta_ukf: f64,
    /// Secondary scaling parameter.
    pub kappa_ukf: f64,
    /// Fading-memory factor in (0, 1]; smaller forgets faster.
    pub memory_decay: f64,
    /// Number of recent raw loads retained for local statistics.
    pub window_capacity: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.1,
            measurement_noise: 1.0,
            alpha_ukf: 1e-3,
            beta_ukf: 2.0,
            kappa_ukf: 0.0,
            memory_decay: 0.99,
            window_capacity: 50,
        }
    }
}

impl EstimatorConfig {
    /// Checks every field against its domain.
    ///
    /// # Errors
    ///
    /// Returns the first [`ParamError`] found.
    pub fn validate(&self) -> Result<(), ParamError> {
        non_negative("process_noise", self.process_noise)?;
        if !(self.measurement_noise.is_finite() && self.measurement_noise > 0.0) {
            return Err(ParamError::OutOfRange {
                field: "measurement_noise",
                range: "(0, inf)",
                value: self.measurement_noise,
            });
        }
        if !(self.alpha_ukf.is_finite() && self.alpha_ukf > 0.0 && self.alpha_ukf <= 1.0) {
            return Err(ParamError::OutOfRange {
                field: "alpha_ukf",
                range: "(0, 1]",
                value: self.alpha_ukf,
            });
        }
        non_negative("beta_ukf", self.beta_ukf)?;
        let spread = STATE_DIM as f64 + self.kappa_ukf;
        if !(spread.is_finite() && spread > 0.0) {
            return Err(ParamError::OutOfRange {
                field: "kappa_ukf",
                range: "(-3, inf)",
                value: self.kappa_ukf,
            });
        }
        if !(self.memory_decay > 0.0 && self.memory_decay <= 1.0) {
            return Err(ParamError::OutOfRange {
                field: "memory_decay",
                range: "(0, 1]",
                value: self.memory_decay,
            });
        }
        Ok(())
    }
}

/// Sigma-point weights, computed once per estimator.
#[derive(Debug, Clone)]
struct SigmaWeights {
    lambda: f64,
    mean: [f64; SIGMA_POINTS],
    covariance: [f64; SIGMA_POINTS],
}

impl SigmaWeights {
    fn new(alpha: f64, beta: f64, kappa: f64) -> Self {
        let n = STATE_DIM as f64;
        let lambda = alpha * alpha * (n + kappa) - n;
        let side = 1.0 / (2.0 * (n + lambda));

        let mut mean = [side; SIGMA_POINTS];
        let mut covariance = [side; SIGMA_POINTS];
        mean[0] = lambda / (n + lambda);
        covariance[0] = mean[0] + (1.0 - alpha * alpha + beta);

        Self {
            lambda,
            mean,
            covariance,
        }
    }
}

/// Kinematic transition over `dt` seconds.
fn transition(dt: f64) -> Matrix3<f64> {
    Matrix3::new(1.0, dt, 0.5 * dt * dt, 0.0, 1.0, dt, 0.0, 0.0, 1.0)
}

/// Square root of a symmetric matrix that is not positive definite.
///
/// Negative eigenvalues from round-off are clamped to zero, so the result
/// `S` satisfies `S * S^T = m` up to that clamping.
fn eigen_sqrt(m: Matrix3<f64>) -> Matrix3<f64> {
    let eigen = SymmetricEigen::new(m);
    let roots = eigen.eigenvalues.map(|v| v.max(0.0).sqrt());
    eigen.eigenvectors * Matrix3::from_diagonal(&roots)
}

fn symmetrize(m: &mut Matrix3<f64>) {
    *m = (*m + m.transpose()) * 0.5;
}

/// Recursive load estimator over a `[level, rate, acceleration]` state.
///
/// The estimator never fails on finite input; screening of invalid readings
/// is the caller's job.
///
/// # Examples
///
/// ```
/// use backflow_guard::estimator::{EstimatorConfig, LoadEstimator};
///
/// let mut est = LoadEstimator::new(50.0, EstimatorConfig::default());
/// for t in 1..=30 {
///     est.update(50.0, t as f64);
/// }
/// let (mean, lower) = est.predict_ahead(1.4, 0.999);
/// assert!((mean - 50.0).abs() < 1.0);
/// assert!(lower < mean);
/// ```
#[derive(Debug, Clone)]
pub struct LoadEstimator {
    x: Vector3<f64>,
    p: Matrix3<f64>,
    q: Matrix3<f64>,
    r: f64,
    weights: SigmaWeights,
    normal: Normal,
    memory_decay: f64,
    window: VecDeque<f64>,
    window_capacity: usize,
    last_load: f64,
    last_time: f64,
    samples: usize,
}

impl LoadEstimator {
    /// Creates an estimator at rest at `initial_load`, observed at time 0.
    pub fn new(initial_load: f64, config: EstimatorConfig) -> Self {
        let window_capacity = config.window_capacity.max(1);
        let mut window = VecDeque::with_capacity(window_capacity);
        window.push_back(initial_load);

        Self {
            x: Vector3::new(initial_load, 0.0, 0.0),
            p: Matrix3::from_diagonal_element(INITIAL_VARIANCE),
            q: Matrix3::from_diagonal_element(config.process_noise),
            r: config.measurement_noise,
            weights: SigmaWeights::new(config.alpha_ukf, config.beta_ukf, config.kappa_ukf),
            normal: Normal::standard(),
            memory_decay: config.memory_decay,
            window,
            window_capacity,
            last_load: initial_load,
            last_time: 0.0,
            samples: 1,
        }
    }

    /// Current state estimate `[level, rate, acceleration]`.
    pub fn state(&self) -> Vector3<f64> {
        self.x
    }

    /// Current state covariance.
    pub fn covariance(&self) -> Matrix3<f64> {
        self.p
    }

    /// Estimated load rate of change (kW/s).
    pub fn rate(&self) -> f64 {
        self.x[1]
    }

    /// Number of measurements seen, counting the initial load.
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Most recent raw loads, oldest first.
    pub fn recent_loads(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    /// Population standard deviation of the most recent `n` raw loads.
    ///
    /// Uses however many loads are retained when fewer than `n` are.
    pub fn local_std(&self, n: usize) -> f64 {
        let take = n.min(self.window.len());
        if take == 0 {
            return 0.0;
        }
        let recent = self.window.iter().skip(self.window.len() - take);
        let mean = recent.clone().sum::<f64>() / take as f64;
        let var = recent.map(|v| (v - mean) * (v - mean)).sum::<f64>() / take as f64;
        var.sqrt()
    }

    /// Propagates the state `dt` seconds forward through the motion model.
    ///
    /// # Returns
    ///
    /// `(level, level_std)` of the predicted state.
    pub fn predict(&mut self, dt: f64) -> (f64, f64) {
        let f = transition(dt);
        let propagated = self.sigma_points().map(|s| f * s);

        // Weighted mean taken relative to the centre point: the centre weight
        // is of order -1/alpha^2 and would otherwise cancel catastrophically.
        let center = propagated[0];
        let mut x_pred = center;
        for (w, point) in self.weights.mean.iter().zip(&propagated).skip(1) {
            x_pred += (point - center) * *w;
        }

        let mut spread = Matrix3::zeros();
        for (w, point) in self.weights.covariance.iter().zip(&propagated) {
            let d = point - x_pred;
            spread += d * d.transpose() * *w;
        }

        let mut p_pred = spread / self.memory_decay + self.q;
        symmetrize(&mut p_pred);

        self.x = x_pred;
        self.p = p_pred;
        (self.x[0], self.p[(0, 0)].max(0.0).sqrt())
    }

    /// Folds a raw load measurement taken at `time` into the estimate.
    pub fn update(&mut self, measurement: f64, time: f64) {
        let dt = (time - self.last_time).max(MIN_DT_S);
        let observed_rate = (measurement - self.last_load) / dt;

        self.predict(dt);

        let sigma = self.sigma_points();
        let z = sigma.map(|s| s[0]);
        let z_pred = z[0]
            + self
                .weights
                .mean
                .iter()
                .zip(&z)
                .skip(1)
                .map(|(w, v)| w * (v - z[0]))
                .sum::<f64>();

        let mut pzz = self.r;
        let mut pxz = Vector3::zeros();
        for ((w, point), zi) in self.weights.covariance.iter().zip(&sigma).zip(&z) {
            let dz = zi - z_pred;
            pzz += w * dz * dz;
            pxz += (point - self.x) * (w * dz);
        }

        let gain = pxz / pzz;
        let innovation = measurement - z_pred;
        self.x += gain * innovation;
        self.p -= gain * gain.transpose() * pzz;
        symmetrize(&mut self.p);

        // Abrupt transitions: widen the level variance so the next
        // corrections follow the jump faster.
        let abs_rate = observed_rate.abs();
        if abs_rate > INFLATION_RATE_THRESHOLD {
            let inflation = (1.0 + abs_rate / INFLATION_RATE_SCALE).min(MAX_INFLATION);
            self.p[(0, 0)] *= inflation;
        }
        for (k, ceiling) in VARIANCE_CEILING.iter().enumerate() {
            self.p[(k, k)] = self.p[(k, k)].min(*ceiling);
        }

        self.record(measurement, time);
    }

    /// Forecasts the level `horizon` seconds ahead.
    ///
    /// # Arguments
    ///
    /// * `horizon` - Lookahead in seconds
    /// * `confidence` - One-sided confidence of the lower bound (e.g. 0.999)
    ///
    /// # Returns
    ///
    /// `(mean, lower_bound)` of the predicted level. Does not mutate the
    /// estimator.
    pub fn predict_ahead(&self, horizon: f64, confidence: f64) -> (f64, f64) {
        let f = transition(horizon);
        let x_future = f * self.x;
        let p_future = f * self.p * f.transpose() + self.q * horizon;

        let mean = x_future[0];
        let std = p_future[(0, 0)].max(0.0).sqrt();
        let z = self.normal.inverse_cdf((1.0 - confidence).clamp(0.0, 1.0));
        (mean, mean + z * std)
    }

    fn record(&mut self, measurement: f64, time: f64) {
        if self.window.len() == self.window_capacity {
            self.window.pop_front();
        }
        self.window.push_back(measurement);
        self.last_load = measurement;
        self.last_time = time;
        self.samples += 1;
    }

    fn sigma_points(&self) -> [Vector3<f64>; SIGMA_POINTS] {
        let scaled = self.p * (STATE_DIM as f64 + self.weights.lambda);
        let root = match Cholesky::new(scaled) {
            Some(chol) => chol.l(),
            None => {
                tracing::trace!("covariance not positive definite, using eigen square root");
                eigen_sqrt(scaled)
            }
        };

        let mut points = [self.x; SIGMA_POINTS];
        for (i, column) in root.column_iter().enumerate() {
            points[i + 1] += column;
            points[STATE_DIM + i + 1] -= column;
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator(initial: f64) -> LoadEstimator {
        LoadEstimator::new(initial, EstimatorConfig::default())
    }

    #[test]
    fn weights_sum_to_one() {
        let w = SigmaWeights::new(1e-3, 2.0, 0.0);
        let sum: f64 = w.mean.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "mean weights sum to {sum}");
        assert!((w.lambda - (1e-6 * 3.0 - 3.0)).abs() < 1e-12);
    }

    #[test]
    fn converges_on_constant_load() {
        let mut est = estimator(40.0);
        for t in 1..=100 {
            est.update(50.0, t as f64);
        }
        let state = est.state();
        let (level, rate) = (state[0], state[1]);
        assert!((level - 50.0).abs() < 0.5, "level {level}");
        assert!(rate.abs() < 0.5, "rate {rate}");
    }

    #[test]
    fn learns_upward_trend() {
        let mut est = estimator(10.0);
        for t in 1..=60 {
            est.update(10.0 + 2.0 * t as f64, t as f64);
        }
        let rate = est.rate();
        assert!((rate - 2.0).abs() < 0.3, "rate {rate}");
    }

    #[test]
    fn covariance_stays_within_ceilings() {
        let mut est = estimator(10.0);
        for t in 1..=50 {
            let load = if t % 2 == 0 { 500.0 } else { 5.0 };
            est.update(load, t as f64 * 0.05);
        }
        let p = est.covariance();
        for (k, ceiling) in VARIANCE_CEILING.iter().enumerate() {
            assert!(p[(k, k)] <= *ceiling, "P[{k}][{k}] = {}", p[(k, k)]);
            assert!(p[(k, k)].is_finite());
        }
        assert!(est.state().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn predict_ahead_is_pure() {
        let mut est = estimator(30.0);
        for t in 1..=10 {
            est.update(30.0 + t as f64, t as f64);
        }
        let before = (est.state(), est.covariance(), est.sample_count());
        let first = est.predict_ahead(2.0, 0.99);
        let second = est.predict_ahead(2.0, 0.99);
        assert_eq!(first, second);
        assert_eq!(before, (est.state(), est.covariance(), est.sample_count()));
    }

    #[test]
    fn lower_bound_widens_with_confidence() {
        let mut est = estimator(60.0);
        for t in 1..=20 {
            est.update(60.0, t as f64);
        }
        let (mean, lb_90) = est.predict_ahead(1.0, 0.90);
        let (_, lb_999) = est.predict_ahead(1.0, 0.999);
        assert!(lb_999 < lb_90);
        assert!(lb_90 < mean);
    }

    #[test]
    fn window_is_bounded() {
        let config = EstimatorConfig {
            window_capacity: 5,
            ..EstimatorConfig::default()
        };
        let mut est = LoadEstimator::new(1.0, config);
        for t in 1..=20 {
            est.update(t as f64, t as f64);
        }
        let recent: Vec<f64> = est.recent_loads().collect();
        assert_eq!(recent, vec![16.0, 17.0, 18.0, 19.0, 20.0]);
        assert_eq!(est.sample_count(), 21);
        assert!((est.local_std(5) - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn tiny_time_steps_do_not_blow_up() {
        let mut est = estimator(20.0);
        est.update(21.0, 0.0);
        est.update(22.0, 0.0);
        assert!(est.state().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn eigen_sqrt_handles_singular_covariance() {
        let m = Matrix3::new(1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 2.0);
        assert!(Cholesky::new(m).is_none());
        let s = eigen_sqrt(m);
        assert!((s * s.transpose() - m).amax() < 1e-10);
    }

    #[test]
    fn sigma_points_are_symmetric_about_the_mean() {
        let mut est = estimator(25.0);
        for t in 1..=5 {
            est.update(25.0 + t as f64, t as f64);
        }
        let points = est.sigma_points();
        assert_eq!(points[0], est.state());
        for i in 1..=STATE_DIM {
            let mirrored = points[i] + points[STATE_DIM + i] - est.state() * 2.0;
            assert!(mirrored.amax() < 1e-9);
        }
    }

    #[test]
    fn lower_bound_matches_standard_normal_quantile() {
        let est = estimator(80.0);
        let (mean, lower) = est.predict_ahead(1.0, 0.975);
        let f = transition(1.0);
        let var = (f * est.covariance() * f.transpose())[(0, 0)] + est.q[(0, 0)];
        assert!((mean - 80.0).abs() < 1e-12);
        assert!((lower - (mean - 1.959_963_984_540_054 * var.sqrt())).abs() < 1e-6);
    }

    #[test]
    fn config_validation() {
        assert!(EstimatorConfig::default().validate().is_ok());
        let bad = EstimatorConfig {
            measurement_noise: 0.0,
            ..EstimatorConfig::default()
        };
        assert_eq!(
            bad.validate().map_err(|e| e.field()),
            Err("measurement_noise")
        );
        let bad = EstimatorConfig {
            memory_decay: 1.5,
            ..EstimatorConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
