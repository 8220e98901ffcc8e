//! Control parameters and the per-step output record.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ParamError, non_negative};

/// Immutable configuration snapshot for one control run.
///
/// Power values are in kW, rates in kW/s and delays in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlParams {
    /// Safety margin subtracted from load-based ceilings.
    pub buffer: f64,
    /// Whether `buffer` is applied at all.
    pub use_buffer: bool,
    /// Apply the statistical safety ceiling; otherwise only `p_max` caps output.
    pub use_safety_ceiling: bool,
    /// Use a relative margin instead of `buffer` when the lower bound is small.
    pub adaptive_safety: bool,
    /// Upward ramp limit.
    pub r_up: f64,
    /// Downward ramp limit.
    pub r_down: f64,
    /// Tail probability of the lower confidence bound.
    pub alpha: f64,
    /// Maximum credible load-drop rate; enables the deterministic bound and
    /// emergency drop detection when set.
    pub s_down_max: Option<f64>,
    /// Inverter rating.
    pub p_max: f64,
    /// Measurement latency.
    pub tau_meas: f64,
    /// Communication latency.
    pub tau_com: f64,
    /// Execution latency.
    pub tau_exec: f64,
    /// Estimator fading-memory factor.
    pub memory_decay: f64,

    /// Enables trend-adaptive confidence and local-uncertainty blending.
    pub enable_dynamic_safety: bool,
    /// Scale alpha by the load trend direction.
    pub trend_adaptive: bool,
    /// Risk factor while load rises (below 1 relaxes the bound).
    pub up_risk_factor: f64,
    /// Risk factor while load falls (above 1 tightens the bound).
    pub down_risk_factor: f64,
    /// Weight of the local sample deviation in the blended deviation.
    pub local_uncertainty_weight: f64,
    /// Number of recent samples used for the local deviation.
    pub local_window_size: usize,

    /// Recovery speed of the believed PV availability.
    pub pv_recovery_rate: f64,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            buffer: 5.0,
            use_buffer: true,
            use_safety_ceiling: true,
            adaptive_safety: true,
            r_up: 10.0,
            r_down: 50.0,
            alpha: 1e-3,
            s_down_max: None,
            p_max: 100.0,
            tau_meas: 0.1,
            tau_com: 0.1,
            tau_exec: 0.2,
            memory_decay: 0.99,
            enable_dynamic_safety: true,
            trend_adaptive: true,
            up_risk_factor: 0.5,
            down_risk_factor: 2.0,
            local_uncertainty_weight: 0.7,
            local_window_size: 50,
            pv_recovery_rate: 1.0,
        }
    }
}

impl ControlParams {
    /// Total latency between a measurement and the effect of its command.
    pub fn pipeline_delay(&self) -> f64 {
        self.tau_meas + self.tau_com + self.tau_exec
    }

    /// Subtracts the buffer from `value` when enabled, never going below zero.
    pub fn buffered(&self, value: f64) -> f64 {
        apply_buffer(value, self.use_buffer, self.buffer)
    }

    /// Checks every field against its domain.
    ///
    /// # Errors
    ///
    /// Returns the first [`ParamError`] found.
    pub fn validate(&self) -> Result<(), ParamError> {
        non_negative("buffer", self.buffer)?;
        non_negative("r_up", self.r_up)?;
        non_negative("r_down", self.r_down)?;
        non_negative("p_max", self.p_max)?;
        non_negative("tau_meas", self.tau_meas)?;
        non_negative("tau_com", self.tau_com)?;
        non_negative("tau_exec", self.tau_exec)?;
        non_negative("pv_recovery_rate", self.pv_recovery_rate)?;
        if let Some(s) = self.s_down_max {
            non_negative("s_down_max", s)?;
        }

        // Above 0.5 the "lower" bound would sit above the mean.
        if !(self.alpha > 0.0 && self.alpha < 0.5) {
            return Err(ParamError::OutOfRange {
                field: "alpha",
                range: "(0, 0.5)",
                value: self.alpha,
            });
        }
        if !(self.memory_decay > 0.0 && self.memory_decay <= 1.0) {
            return Err(ParamError::OutOfRange {
                field: "memory_decay",
                range: "(0, 1]",
                value: self.memory_decay,
            });
        }
        for (field, value) in [
            ("up_risk_factor", self.up_risk_factor),
            ("down_risk_factor", self.down_risk_factor),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ParamError::OutOfRange {
                    field,
                    range: "(0, inf)",
                    value,
                });
            }
        }
        if !(0.0..=1.0).contains(&self.local_uncertainty_weight) {
            return Err(ParamError::OutOfRange {
                field: "local_uncertainty_weight",
                range: "[0, 1]",
                value: self.local_uncertainty_weight,
            });
        }
        if self.local_window_size < 2 {
            return Err(ParamError::OutOfRange {
                field: "local_window_size",
                range: "[2, inf)",
                value: self.local_window_size as f64,
            });
        }
        Ok(())
    }
}

/// Subtracts `buffer` from `value` when `use_buffer` is set; clamps at zero.
pub fn apply_buffer(value: f64, use_buffer: bool, buffer: f64) -> f64 {
    if use_buffer {
        (value - buffer).max(0.0)
    } else {
        value.max(0.0)
    }
}

/// Result of one control step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlOutput {
    /// Setpoint sent to the inverter (kW).
    pub command: f64,
    /// Statistical safety ceiling U_A (kW).
    pub safety_ceiling: f64,
    /// Forecast-based performance ceiling U_B (kW).
    pub performance_ceiling: f64,
    /// Ceiling actually fed to the rate limiter (kW).
    pub applied_ceiling: f64,
    /// Predicted mean load at the horizon (kW).
    pub predicted_mean: f64,
    /// Lower confidence bound of the predicted load (kW).
    pub predicted_lower_bound: f64,
    /// Ramp limiting was bypassed for an immediate downward snap.
    pub safety_bypass: bool,
    /// The controller wanted to move the command up.
    pub upward_intent: bool,
    /// The raw load-drop detector fired.
    pub emergency_drop: bool,
    /// The PV availability estimate was the binding constraint.
    pub pv_constrained: bool,
}

impl ControlOutput {
    /// Zero-command record used for unusable load readings.
    pub fn fail_safe() -> Self {
        Self {
            command: 0.0,
            safety_ceiling: 0.0,
            performance_ceiling: 0.0,
            applied_ceiling: 0.0,
            predicted_mean: 0.0,
            predicted_lower_bound: 0.0,
            safety_bypass: true,
            upward_intent: false,
            emergency_drop: false,
            pv_constrained: false,
        }
    }
}

impl fmt::Display for ControlOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cmd={:>7.2} kW | U_A={:>7.2}  U_B={:>7.2}  U={:>7.2} | \
             L_med={:>7.2}  L_lb={:>7.2} | bypass={} up={} emerg={} pv={}",
            self.command,
            self.safety_ceiling,
            self.performance_ceiling,
            self.applied_ceiling,
            self.predicted_mean,
            self.predicted_lower_bound,
            self.safety_bypass,
            self.upward_intent,
            self.emergency_drop,
            self.pv_constrained,
        )
    }
}
