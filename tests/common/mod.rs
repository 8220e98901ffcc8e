//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use backflow_guard::control::{ControlOutput, ControlParams, Controller};
use backflow_guard::estimator::EstimatorConfig;
use backflow_guard::sim::LoadSample;

/// Stock parameters with the static confidence bound.
pub fn static_params() -> ControlParams {
    ControlParams {
        enable_dynamic_safety: false,
        ..ControlParams::default()
    }
}

/// Controller seeded with `initial_load` and the default estimator tuning.
pub fn controller(params: ControlParams, initial_load: f64) -> Controller {
    match Controller::new(params, initial_load, EstimatorConfig::default()) {
        Ok(ctrl) => ctrl,
        Err(e) => panic!("fixture parameters should be valid: {e}"),
    }
}

/// `n` readings of `load_kw`, one per second starting at t = 1.
pub fn constant_series(load_kw: f64, n: usize) -> Vec<LoadSample> {
    (1..=n)
        .map(|t| LoadSample {
            time_s: t as f64,
            load_kw,
        })
        .collect()
}

/// `n` readings rising linearly by `slope` kW/s from `start`.
pub fn ramp_series(start: f64, slope: f64, n: usize) -> Vec<LoadSample> {
    (1..=n)
        .map(|t| LoadSample {
            time_s: t as f64,
            load_kw: start + slope * t as f64,
        })
        .collect()
}

/// Feeds `samples` through `ctrl` and returns every output.
pub fn drive(ctrl: &mut Controller, samples: &[LoadSample]) -> Vec<ControlOutput> {
    samples
        .iter()
        .map(|s| ctrl.compute_control(s.load_kw, s.time_s))
        .collect()
}
