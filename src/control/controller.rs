//! The setpoint controller: ceilings, ramp limiting and emergency handling.

use std::fmt;

use crate::error::ControlError;
use crate::estimator::{EstimatorConfig, LoadEstimator};

use super::history::{History, HistoryColumns, HistoryEntry};
use super::observer::{StepEvent, StepObserver, TracingObserver};
use super::params::{ControlOutput, ControlParams};
use super::profile::GenerationProfile;
use super::pv_tracker::PvTracker;
use super::safety::SafetyPolicy;

/// Step length assumed before the first valid sample (s).
const DEFAULT_DT_S: f64 = 1.0;
const MIN_DT_S: f64 = 0.1;
const MAX_DT_S: f64 = 10.0;
/// Ceiling dips smaller than this are filter round-off and hold the command.
const SNAP_TOLERANCE_KW: f64 = 1e-6;

/// Anti-backflow PV setpoint controller.
///
/// Feed it one load reading per control cycle with
/// [`compute_control`](Self::compute_control); the returned command never
/// exceeds `p_max`, never goes negative, and moves upward no faster than
/// `r_up`.
///
/// # Examples
///
/// ```
/// use backflow_guard::control::{ControlParams, Controller};
/// use backflow_guard::estimator::EstimatorConfig;
///
/// let mut ctrl = Controller::new(ControlParams::default(), 50.0, EstimatorConfig::default())
///     .expect("default parameters are valid");
/// let out = ctrl.compute_control(50.0, 1.0);
/// assert!(out.command >= 0.0 && out.command <= 10.0);
/// ```
pub struct Controller {
    params: ControlParams,
    estimator_config: EstimatorConfig,
    estimator: LoadEstimator,
    tracker: PvTracker,
    history: History,
    observer: Box<dyn StepObserver>,
    prev_command: f64,
    prev_time: Option<f64>,
    prev_load: f64,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("params", &self.params)
            .field("estimator", &self.estimator)
            .field("tracker", &self.tracker)
            .field("prev_command", &self.prev_command)
            .field("prev_time", &self.prev_time)
            .field("prev_load", &self.prev_load)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a controller seeded with `initial_load`.
    ///
    /// The estimator's `memory_decay` and `window_capacity` are taken from
    /// `params` (`memory_decay` and `local_window_size`); only the noise and
    /// sigma-point settings of `estimator` are used.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError`] if a parameter is out of its domain or the
    /// initial load is not finite and non-negative.
    pub fn new(
        params: ControlParams,
        initial_load: f64,
        estimator: EstimatorConfig,
    ) -> Result<Self, ControlError> {
        params.validate()?;
        if !(initial_load.is_finite() && initial_load >= 0.0) {
            return Err(ControlError::InitialLoad(initial_load));
        }
        let estimator_config = EstimatorConfig {
            memory_decay: params.memory_decay,
            window_capacity: params.local_window_size,
            ..estimator
        };
        estimator_config.validate()?;

        tracing::info!(
            initial_load_kw = initial_load,
            p_max_kw = params.p_max,
            buffer_kw = params.buffer,
            dynamic_safety = params.enable_dynamic_safety,
            "controller initialised"
        );

        Ok(Self {
            estimator: LoadEstimator::new(initial_load, estimator_config.clone()),
            tracker: PvTracker::new(params.p_max, params.pv_recovery_rate),
            history: History::new(),
            observer: Box::new(TracingObserver),
            prev_command: 0.0,
            prev_time: None,
            prev_load: initial_load,
            estimator_config,
            params,
        })
    }

    /// Replaces the step observer (default: [`TracingObserver`]).
    pub fn with_observer(mut self, observer: Box<dyn StepObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bounds the availability tracker by a time-varying generation profile.
    pub fn with_generation_profile(mut self, profile: Box<dyn GenerationProfile>) -> Self {
        self.tracker = PvTracker::with_profile(
            self.params.p_max,
            self.params.pv_recovery_rate,
            profile,
        );
        self
    }

    /// Keeps only the most recent `max_len` history entries.
    pub fn with_history_limit(mut self, max_len: usize) -> Self {
        self.history = History::with_capacity_limit(max_len);
        self
    }

    pub fn params(&self) -> &ControlParams {
        &self.params
    }

    pub fn estimator(&self) -> &LoadEstimator {
        &self.estimator
    }

    /// Believed PV availability at the last step time (kW).
    pub fn pv_available(&self) -> f64 {
        self.tracker.bound_at(self.prev_time.unwrap_or(0.0))
    }

    /// Command issued on the last valid step (0 before any).
    pub fn last_command(&self) -> f64 {
        self.prev_command
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Columnar snapshot of the recorded steps.
    pub fn get_history(&self) -> HistoryColumns {
        self.history.columns()
    }

    /// Computes the inverter setpoint for a load reading taken at `time`.
    ///
    /// Readings that are not finite or not strictly positive produce a
    /// zero command with `safety_bypass` set and leave all internal state
    /// apart from the history untouched.
    pub fn compute_control(&mut self, load: f64, time: f64) -> ControlOutput {
        if !(load.is_finite() && load > 0.0) {
            return self.reject(load, time);
        }

        let p = &self.params;
        let dt = self
            .prev_time
            .map_or(DEFAULT_DT_S, |prev| time - prev)
            .clamp(MIN_DT_S, MAX_DT_S);

        self.estimator.update(load, time);
        let horizon = dt + p.pipeline_delay();

        let policy = SafetyPolicy::new(p);
        let ceilings = policy.safety_ceiling(&self.estimator, load, horizon);
        let safety_ceiling = ceilings.safety_ceiling();
        let performance_ceiling = policy.performance_ceiling(ceilings.predicted_mean);

        let mut ceiling = if p.use_safety_ceiling {
            safety_ceiling.min(p.p_max)
        } else {
            p.p_max
        };

        let (constrained, pv_constrained) = self.tracker.apply_constraint(ceiling, time);
        ceiling = constrained;

        let prev = self.prev_command;
        let upward_intent = ceiling > prev || ceilings.predicted_mean > prev;
        if upward_intent {
            ceiling = ceiling.min(performance_ceiling);
        }

        // Raw-rate drop detector; runs even with the safety ceiling disabled.
        let emergency_drop = match p.s_down_max {
            Some(s_down) => (load - self.prev_load) / dt < -s_down,
            None => false,
        };
        if emergency_drop {
            ceiling = ceiling.min(p.buffered(load));
        }

        let mut safety_bypass = emergency_drop;
        let falling = ceiling < prev - SNAP_TOLERANCE_KW || (emergency_drop && ceiling < prev);
        let command = if falling {
            safety_bypass = true;
            ceiling.min(p.p_max).max(0.0)
        } else {
            let ramp_up = prev + p.r_up * dt;
            let ramp_down = prev - p.r_down * dt;
            ramp_down.max(0.0).max(ceiling.max(prev).min(ramp_up))
        };

        self.tracker
            .update(command, pv_constrained, safety_bypass, dt, time);
        self.prev_command = command;
        self.prev_time = Some(time);
        self.prev_load = load;

        let output = ControlOutput {
            command,
            safety_ceiling,
            performance_ceiling,
            applied_ceiling: ceiling,
            predicted_mean: ceilings.predicted_mean,
            predicted_lower_bound: ceilings.lower_bound,
            safety_bypass,
            upward_intent,
            emergency_drop,
            pv_constrained,
        };
        self.record(load, time, dt, horizon, &output, true);
        output
    }

    /// Restarts the controller at `initial_load` with the same settings.
    ///
    /// The generation profile and history limit are kept; recorded history
    /// is cleared.
    pub fn reset(&mut self, initial_load: f64) {
        tracing::info!(initial_load_kw = initial_load, "controller reset");
        self.estimator = LoadEstimator::new(initial_load, self.estimator_config.clone());
        self.tracker.reset();
        self.history.clear();
        self.prev_command = 0.0;
        self.prev_time = None;
        self.prev_load = initial_load;
    }

    fn reject(&mut self, load: f64, time: f64) -> ControlOutput {
        let output = ControlOutput::fail_safe();
        self.record(load, time, 0.0, 0.0, &output, false);
        output
    }

    fn record(
        &mut self,
        load: f64,
        time: f64,
        dt: f64,
        horizon: f64,
        out: &ControlOutput,
        valid: bool,
    ) {
        let pv_available = self.tracker.bound_at(time);
        self.history.push(HistoryEntry {
            time_s: time,
            load_kw: load,
            command_kw: out.command,
            safety_ceiling_kw: out.safety_ceiling,
            performance_ceiling_kw: out.performance_ceiling,
            predicted_mean_kw: out.predicted_mean,
            predicted_lower_kw: out.predicted_lower_bound,
            safety_bypass: out.safety_bypass,
            pv_available_kw: pv_available,
        });
        self.observer.on_step(&StepEvent {
            time_s: time,
            load_kw: load,
            valid,
            dt_s: dt,
            horizon_s: horizon,
            safety_ceiling_kw: out.safety_ceiling,
            performance_ceiling_kw: out.performance_ceiling,
            applied_ceiling_kw: out.applied_ceiling,
            predicted_mean_kw: out.predicted_mean,
            predicted_lower_kw: out.predicted_lower_bound,
            pv_constrained: out.pv_constrained,
            upward_intent: out.upward_intent,
            emergency_drop: out.emergency_drop,
            safety_bypass: out.safety_bypass,
            command_kw: out.command,
            pv_available_kw: pv_available,
        });
    }
}
