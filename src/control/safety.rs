//! Safety and performance ceiling policy.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::estimator::LoadEstimator;

use super::params::ControlParams;

/// Estimated rate (kW/s) above which the load counts as rising.
const TREND_UP_THRESHOLD: f64 = 1.0;
/// Estimated rate (kW/s) below which the load counts as falling.
const TREND_DOWN_THRESHOLD: f64 = -1.0;
/// Bounds on the trend-adjusted tail probability.
const MIN_DYNAMIC_ALPHA: f64 = 1e-6;
const MAX_DYNAMIC_ALPHA: f64 = 0.2;
/// Estimated rate (kW/s) that counts as an abrupt drop.
const ABRUPT_DROP_RATE: f64 = -10.0;
/// Extrapolation margin applied to an abrupt drop.
const ABRUPT_DROP_MARGIN: f64 = 1.2;
/// Fraction of the lower bound kept in the low-load adaptive regime.
const LOW_LOAD_RATIO: f64 = 0.8;

/// Ceilings derived from one forecast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CeilingEstimate {
    /// Deterministic bound from the maximum drop rate, when configured.
    pub deterministic: Option<f64>,
    /// Bound from the statistical lower confidence limit.
    pub probabilistic: f64,
    pub predicted_mean: f64,
    pub lower_bound: f64,
}

impl CeilingEstimate {
    /// The safety ceiling U_A: the tighter of the two bounds.
    pub fn safety_ceiling(&self) -> f64 {
        match self.deterministic {
            Some(d) => d.min(self.probabilistic),
            None => self.probabilistic,
        }
    }
}

/// Turns estimator forecasts into output ceilings under a parameter set.
#[derive(Debug, Clone, Copy)]
pub struct SafetyPolicy<'a> {
    params: &'a ControlParams,
    normal: Normal,
}

impl<'a> SafetyPolicy<'a> {
    pub fn new(params: &'a ControlParams) -> Self {
        Self {
            params,
            normal: Normal::standard(),
        }
    }

    /// Computes the safety ceiling inputs for a forecast `horizon` seconds
    /// ahead, given the current raw `load`.
    pub fn safety_ceiling(
        &self,
        estimator: &LoadEstimator,
        load: f64,
        horizon: f64,
    ) -> CeilingEstimate {
        let p = self.params;
        let (predicted_mean, mut lower_bound) = if p.enable_dynamic_safety {
            self.dynamic_prediction(estimator, horizon)
        } else {
            estimator.predict_ahead(horizon, 1.0 - p.alpha)
        };

        // The filter already sees a steep fall: assume it continues over the
        // horizon and never be less conservative than that.
        let rate = estimator.rate();
        if estimator.sample_count() > 1 && rate < ABRUPT_DROP_RATE {
            let drop_bound = load - rate.abs() * horizon * ABRUPT_DROP_MARGIN;
            lower_bound = lower_bound.min(drop_bound);
        }

        let probabilistic = if p.adaptive_safety && p.use_buffer {
            self.adaptive_bound(lower_bound)
        } else {
            p.buffered(lower_bound)
        };

        let deterministic = p
            .s_down_max
            .map(|s_down| p.buffered(load - s_down * horizon));

        CeilingEstimate {
            deterministic,
            probabilistic,
            predicted_mean,
            lower_bound,
        }
    }

    /// Performance ceiling U_B from the predicted mean.
    pub fn performance_ceiling(&self, predicted_mean: f64) -> f64 {
        self.params.buffered(predicted_mean)
    }

    /// Tail probability after adjusting for the estimated load trend.
    pub fn effective_alpha(&self, rate: f64) -> f64 {
        let p = self.params;
        if !p.trend_adaptive {
            return p.alpha;
        }
        let risk_factor = if rate > TREND_UP_THRESHOLD {
            p.up_risk_factor
        } else if rate < TREND_DOWN_THRESHOLD {
            p.down_risk_factor
        } else {
            1.0
        };
        (p.alpha / risk_factor).clamp(MIN_DYNAMIC_ALPHA, MAX_DYNAMIC_ALPHA)
    }

    fn dynamic_prediction(&self, estimator: &LoadEstimator, horizon: f64) -> (f64, f64) {
        let alpha = self.effective_alpha(estimator.rate());
        let (mean, global_lower) = estimator.predict_ahead(horizon, 1.0 - alpha);

        let window = self.params.local_window_size;
        if estimator.sample_count() < window {
            return (mean, global_lower);
        }

        let local_std = estimator.local_std(window);
        let k = self.normal.inverse_cdf(1.0 - alpha / 2.0);
        let global_std = if k > 0.0 {
            (mean - global_lower) / k
        } else {
            local_std
        };
        let w = self.params.local_uncertainty_weight;
        let mixed_std = w * local_std + (1.0 - w) * global_std;
        (mean, mean - k * mixed_std)
    }

    fn adaptive_bound(&self, lower_bound: f64) -> f64 {
        let buffer = self.params.buffer;
        if lower_bound < 2.0 * buffer {
            (LOW_LOAD_RATIO * lower_bound).max(0.0)
        } else {
            (lower_bound - buffer).max(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::EstimatorConfig;

    fn settled(load: f64, steps: usize) -> LoadEstimator {
        let mut est = LoadEstimator::new(load, EstimatorConfig::default());
        for t in 1..=steps {
            est.update(load, t as f64);
        }
        est
    }

    fn static_params() -> ControlParams {
        ControlParams {
            enable_dynamic_safety: false,
            ..ControlParams::default()
        }
    }

    #[test]
    fn static_ceiling_is_buffered_lower_bound() {
        let params = ControlParams {
            adaptive_safety: false,
            ..static_params()
        };
        let est = settled(50.0, 30);
        let c = SafetyPolicy::new(&params).safety_ceiling(&est, 50.0, 1.4);
        let (mean, lb) = est.predict_ahead(1.4, 1.0 - params.alpha);
        assert_eq!(c.predicted_mean, mean);
        assert_eq!(c.lower_bound, lb);
        assert_eq!(c.probabilistic, (lb - 5.0).max(0.0));
        assert_eq!(c.deterministic, None);
        assert_eq!(c.safety_ceiling(), c.probabilistic);
    }

    #[test]
    fn adaptive_rule_switches_at_twice_the_buffer() {
        let params = static_params();
        let policy = SafetyPolicy::new(&params);
        assert_eq!(policy.adaptive_bound(8.0), 0.8 * 8.0);
        assert_eq!(policy.adaptive_bound(10.0), 5.0);
        assert_eq!(policy.adaptive_bound(-4.0), 0.0);
    }

    #[test]
    fn deterministic_bound_takes_the_minimum() {
        let params = ControlParams {
            s_down_max: Some(20.0),
            ..static_params()
        };
        let est = settled(50.0, 30);
        let c = SafetyPolicy::new(&params).safety_ceiling(&est, 50.0, 1.4);
        assert_eq!(c.deterministic, Some(50.0 - 20.0 * 1.4 - 5.0));
        assert_eq!(
            c.safety_ceiling(),
            c.probabilistic.min(50.0 - 20.0 * 1.4 - 5.0)
        );
    }

    #[test]
    fn trend_sets_effective_alpha() {
        let params = ControlParams::default();
        let policy = SafetyPolicy::new(&params);
        assert_eq!(policy.effective_alpha(0.0), 1e-3);
        assert!((policy.effective_alpha(3.0) - 2e-3).abs() < 1e-15);
        assert!((policy.effective_alpha(-3.0) - 5e-4).abs() < 1e-15);

        let loose = ControlParams {
            alpha: 0.3,
            ..ControlParams::default()
        };
        assert_eq!(SafetyPolicy::new(&loose).effective_alpha(5.0), 0.2);

        let fixed = ControlParams {
            trend_adaptive: false,
            ..ControlParams::default()
        };
        assert_eq!(SafetyPolicy::new(&fixed).effective_alpha(5.0), 1e-3);
    }

    #[test]
    fn local_blending_starts_once_window_is_full() {
        let params = ControlParams {
            local_window_size: 10,
            adaptive_safety: false,
            ..ControlParams::default()
        };
        let policy = SafetyPolicy::new(&params);

        let mut est = LoadEstimator::new(40.0, EstimatorConfig::default());
        for t in 1..=8 {
            est.update(40.0 + (t % 2) as f64 * 4.0, t as f64);
        }
        assert!(est.sample_count() < 10);
        let early = policy.safety_ceiling(&est, 40.0, 1.4);
        let alpha = policy.effective_alpha(est.rate());
        assert_eq!(
            (early.predicted_mean, early.lower_bound),
            est.predict_ahead(1.4, 1.0 - alpha)
        );

        est.update(44.0, 9.0);
        assert_eq!(est.sample_count(), 10);
        let blended = policy.safety_ceiling(&est, 44.0, 1.4);
        assert!(blended.lower_bound <= blended.predicted_mean);
        let alpha = policy.effective_alpha(est.rate());
        let (mean, global) = est.predict_ahead(1.4, 1.0 - alpha);
        let k = Normal::standard().inverse_cdf(1.0 - alpha / 2.0);
        let mixed = 0.7 * est.local_std(10) + 0.3 * (mean - global) / k;
        assert!((blended.lower_bound - (mean - k * mixed)).abs() < 1e-9);
    }

    #[test]
    fn abrupt_estimated_drop_tightens_lower_bound() {
        let params = static_params();
        let mut est = LoadEstimator::new(300.0, EstimatorConfig::default());
        for t in 1..=20 {
            est.update(300.0 - 15.0 * t as f64, t as f64);
        }
        assert!(est.rate() < ABRUPT_DROP_RATE, "rate {}", est.rate());
        let load = 0.0_f64.max(300.0 - 15.0 * 20.0);
        let c = SafetyPolicy::new(&params).safety_ceiling(&est, load, 1.4);
        assert!(c.lower_bound <= load - est.rate().abs() * 1.4 * 1.2 + 1e-12);
    }
}
