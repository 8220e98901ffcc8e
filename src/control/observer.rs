//! Step-level instrumentation hooks.
//!
//! The controller reports every step to a [`StepObserver`] instead of
//! writing to a logger directly, so hosts choose where events go.

use std::sync::{Arc, Mutex};

/// Everything the controller decided during one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    pub time_s: f64,
    pub load_kw: f64,
    /// False when the reading was rejected by the validity gate.
    pub valid: bool,
    pub dt_s: f64,
    pub horizon_s: f64,
    pub safety_ceiling_kw: f64,
    pub performance_ceiling_kw: f64,
    pub applied_ceiling_kw: f64,
    pub predicted_mean_kw: f64,
    pub predicted_lower_kw: f64,
    pub pv_constrained: bool,
    pub upward_intent: bool,
    pub emergency_drop: bool,
    pub safety_bypass: bool,
    pub command_kw: f64,
    pub pv_available_kw: f64,
}

pub trait StepObserver: Send {
    fn on_step(&mut self, event: &StepEvent);
}

/// Emits each step as a structured `tracing` event at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl StepObserver for TracingObserver {
    fn on_step(&mut self, e: &StepEvent) {
        if !e.valid {
            tracing::warn!(
                time_s = e.time_s,
                load_kw = e.load_kw,
                "rejected load reading, commanding zero"
            );
            return;
        }
        tracing::debug!(
            time_s = e.time_s,
            load_kw = e.load_kw,
            dt_s = e.dt_s,
            horizon_s = e.horizon_s,
            u_a = e.safety_ceiling_kw,
            u_b = e.performance_ceiling_kw,
            u = e.applied_ceiling_kw,
            l_med = e.predicted_mean_kw,
            l_lb = e.predicted_lower_kw,
            pv_constrained = e.pv_constrained,
            upward_intent = e.upward_intent,
            emergency_drop = e.emergency_drop,
            safety_bypass = e.safety_bypass,
            command_kw = e.command_kw,
            pv_available_kw = e.pv_available_kw,
            "control step"
        );
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl StepObserver for NullObserver {
    fn on_step(&mut self, _event: &StepEvent) {}
}

/// Keeps every event in memory. Clones share the same buffer, so a clone
/// handed to a controller can be read back through the original.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<StepEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<StepEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl StepObserver for RecordingObserver {
    fn on_step(&mut self, event: &StepEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(*event);
        }
    }
}
