//! Anti-backflow setpoint control.
//!
//! [`Controller`] turns a stream of site-load readings into inverter power
//! commands that stay below the load with high probability. The pieces:
//!
//! - [`safety`]: safety and performance ceilings from the load forecast
//! - [`pv_tracker`]: believed PV availability
//! - [`history`]: per-step log for export and metrics
//! - [`observer`]: per-step instrumentation hooks

pub mod controller;
pub mod history;
pub mod observer;
pub mod params;
pub mod profile;
pub mod pv_tracker;
pub mod safety;

pub use controller::Controller;
pub use history::{History, HistoryColumns, HistoryEntry};
pub use observer::{NullObserver, RecordingObserver, StepEvent, StepObserver, TracingObserver};
pub use params::{ControlOutput, ControlParams, apply_buffer};
pub use profile::{ConstantProfile, GenerationProfile, SolarProfile};
pub use pv_tracker::PvTracker;
pub use safety::{CeilingEstimate, SafetyPolicy};
