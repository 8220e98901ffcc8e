//! Anti-backflow PV power-injection controller.
//!
//! A behind-the-meter PV inverter may only feed the site load, never the
//! grid. This crate forecasts the site load with an unscented Kalman
//! filter and commands the inverter to a setpoint that stays below the
//! load with a configurable confidence.

pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod estimator;
pub mod io;
pub mod sim;
