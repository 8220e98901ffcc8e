//! Error types shared across the crate.

use thiserror::Error;

/// A configuration value outside its permitted domain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamError {
    #[error("{field} must be finite and non-negative, got {value}")]
    Negative { field: &'static str, value: f64 },
    #[error("{field} must be in {range}, got {value}")]
    OutOfRange {
        field: &'static str,
        range: &'static str,
        value: f64,
    },
}

impl ParamError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ParamError::Negative { field, .. } | ParamError::OutOfRange { field, .. } => field,
        }
    }
}

/// Errors raised while constructing a controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("invalid control parameters: {0}")]
    Params(#[from] ParamError),
    #[error("initial load must be finite and non-negative, got {0}")]
    InitialLoad(f64),
}

/// Checks that `value` is finite and `>= 0`.
pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<(), ParamError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParamError::Negative { field, value })
    }
}
