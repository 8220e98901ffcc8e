//! Offline runs: synthetic load, batch execution and KPIs.

/// Post-hoc metrics over a controller history.
pub mod kpi;
pub mod runner;
/// Synthetic factory load series.
pub mod synthetic;

pub use runner::{LoadSample, RunError, RunResult, run_samples, run_scenario};
