//! Believed PV availability, kept apart from the load-based ceilings.
//!
//! The tracker answers whether output was held back because the array
//! itself could not deliver more, or for load and safety reasons.
//!
//! Two bounds are combined: a learned estimate that snaps down on a
//! confirmed shortfall and recovers toward `p_max`, and a known generation
//! profile evaluated at the step time.

use super::profile::{ConstantProfile, GenerationProfile};

#[derive(Debug)]
pub struct PvTracker {
    p_max: f64,
    recovery_rate: f64,
    available_kw: f64,
    profile: Box<dyn GenerationProfile>,
}

impl PvTracker {
    /// Creates a tracker with a flat `p_max` generation profile.
    pub fn new(p_max: f64, recovery_rate: f64) -> Self {
        Self::with_profile(p_max, recovery_rate, Box::new(ConstantProfile::new(p_max)))
    }

    /// Creates a tracker additionally capped by `profile`.
    pub fn with_profile(
        p_max: f64,
        recovery_rate: f64,
        profile: Box<dyn GenerationProfile>,
    ) -> Self {
        Self {
            p_max,
            recovery_rate,
            available_kw: p_max,
            profile,
        }
    }

    /// Learned availability estimate (kW), ignoring the profile.
    pub fn available_kw(&self) -> f64 {
        self.available_kw
    }

    /// Generation the profile allows at `time_s`, within `[0, p_max]`.
    pub fn ceiling_at(&self, time_s: f64) -> f64 {
        self.profile.available_kw(time_s).min(self.p_max).max(0.0)
    }

    /// Effective availability at `time_s`: the tighter of the estimate and
    /// the profile.
    pub fn bound_at(&self, time_s: f64) -> f64 {
        self.available_kw.min(self.ceiling_at(time_s))
    }

    /// Caps `ceiling` at the availability at `time_s`.
    ///
    /// # Returns
    ///
    /// `(constrained_ceiling, pv_constrained)` where the flag is set when
    /// availability was the binding bound.
    pub fn apply_constraint(&self, ceiling: f64, time_s: f64) -> (f64, bool) {
        let constrained = ceiling.min(self.bound_at(time_s));
        (constrained, constrained < ceiling)
    }

    /// Advances the estimate after a step has been commanded.
    ///
    /// A step that was both PV-constrained and bypassed, with the estimate
    /// rather than the profile binding, is taken as a confirmed shortfall:
    /// the estimate snaps to the command. An unconstrained step lets the
    /// estimate recover linearly toward `p_max`. Any other step leaves it
    /// unchanged.
    pub fn update(
        &mut self,
        command: f64,
        pv_constrained: bool,
        safety_bypassed: bool,
        dt: f64,
        time_s: f64,
    ) {
        match (pv_constrained, safety_bypassed) {
            (true, true) if self.available_kw <= self.ceiling_at(time_s) => {
                self.available_kw = command;
            }
            (false, _) => {
                self.available_kw = (self.available_kw + self.recovery_rate * dt).min(self.p_max);
            }
            _ => {}
        }
    }

    /// Restores the estimate to `p_max`.
    pub fn reset(&mut self) {
        self.available_kw = self.p_max;
    }
}
