//! TOML-based scenario configuration and preset definitions.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::control::{ConstantProfile, ControlParams, GenerationProfile, SolarProfile};
use crate::estimator::EstimatorConfig;

/// Seconds in one day; a solar window may not exceed it.
const DAY_S: f64 = 86_400.0;

/// Top-level scenario configuration parsed from TOML.
///
/// Every section is optional and falls back to the `default` preset. Load
/// from TOML with [`ScenarioConfig::from_toml_file`] or pick a built-in
/// preset with [`ScenarioConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Controller parameters.
    pub control: ControlParams,
    /// Load estimator noise and sigma-point tuning.
    pub estimator: EstimatorSection,
    /// Where load samples come from.
    pub input: InputConfig,
    /// PV generation bound for the availability tracker.
    pub generation: GenerationConfig,
    /// History retention.
    pub history: HistoryConfig,
}

/// Load estimator tuning. Memory decay and the local window are taken from
/// the `[control]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimatorSection {
    pub process_noise: f64,
    pub measurement_noise: f64,
    pub alpha_ukf: f64,
    pub beta_ukf: f64,
    pub kappa_ukf: f64,
}

impl Default for EstimatorSection {
    fn default() -> Self {
        let d = EstimatorConfig::default();
        Self {
            process_noise: d.process_noise,
            measurement_noise: d.measurement_noise,
            alpha_ukf: d.alpha_ukf,
            beta_ukf: d.beta_ukf,
            kappa_ukf: d.kappa_ukf,
        }
    }
}

impl EstimatorSection {
    /// Full estimator configuration under the given control parameters.
    pub fn to_config(&self, control: &ControlParams) -> EstimatorConfig {
        EstimatorConfig {
            process_noise: self.process_noise,
            measurement_noise: self.measurement_noise,
            alpha_ukf: self.alpha_ukf,
            beta_ukf: self.beta_ukf,
            kappa_ukf: self.kappa_ukf,
            memory_decay: control.memory_decay,
            window_capacity: control.local_window_size,
        }
    }
}

/// Load sample source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// `"synthetic"` (generated factory load) or `"csv"`.
    pub source: String,
    /// CSV file, required when `source = "csv"`.
    pub path: Option<PathBuf>,
    /// Length of the synthetic series (hours).
    pub duration_hours: f64,
    /// Synthetic sampling interval (s).
    pub interval_s: f64,
    /// Random seed for the synthetic series.
    pub seed: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            source: "synthetic".to_string(),
            path: None,
            duration_hours: 10.0,
            interval_s: 1.0,
            seed: 42,
        }
    }
}

/// PV generation bound.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    /// `"constant"` or `"solar"`.
    pub profile: String,
    /// Peak (or flat) generation; defaults to `control.p_max`.
    pub peak_kw: Option<f64>,
    /// Solar sunrise, seconds after run start.
    pub sunrise_s: f64,
    /// Solar sunset, seconds after run start.
    pub sunset_s: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            profile: "constant".to_string(),
            peak_kw: None,
            sunrise_s: 0.0,
            sunset_s: 43_200.0,
        }
    }
}

impl GenerationConfig {
    /// Builds the configured profile.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an unknown profile name or an invalid
    /// solar window.
    pub fn build(&self, p_max: f64) -> Result<Box<dyn GenerationProfile>, ConfigError> {
        let peak = self.peak_kw.unwrap_or(p_max);
        match self.profile.as_str() {
            "constant" => Ok(Box::new(ConstantProfile::new(peak))),
            "solar" => {
                if !(self.sunrise_s < self.sunset_s && self.sunset_s - self.sunrise_s <= DAY_S) {
                    return Err(ConfigError::new(
                        "generation.sunrise_s",
                        "must be < generation.sunset_s, within one day",
                    ));
                }
                Ok(Box::new(SolarProfile::new(
                    peak,
                    self.sunrise_s,
                    self.sunset_s,
                )))
            }
            other => Err(ConfigError::new(
                "generation.profile",
                format!("must be \"constant\" or \"solar\", got \"{other}\""),
            )),
        }
    }
}

/// History retention.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    /// Keep only the most recent `max_len` steps; unbounded when unset.
    pub max_len: Option<usize>,
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"control.alpha"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ScenarioConfig {
    /// Returns the default scenario: the stock controller on a synthetic
    /// factory day.
    pub fn default_preset() -> Self {
        Self::default()
    }

    /// Shared settings of the three strategy presets: fast ramps, a
    /// 500 kW inverter and the static confidence bound without the safety
    /// ceiling.
    fn strategy(buffer: f64) -> Self {
        Self {
            control: ControlParams {
                buffer,
                use_safety_ceiling: false,
                adaptive_safety: false,
                r_up: 1000.0,
                r_down: 1000.0,
                alpha: 0.01,
                p_max: 500.0,
                enable_dynamic_safety: false,
                ..ControlParams::default()
            },
            ..Self::default()
        }
    }

    /// Returns the aggressive strategy preset.
    pub fn aggressive() -> Self {
        Self::strategy(4.0)
    }

    /// Returns the balanced strategy preset.
    pub fn balanced() -> Self {
        Self::strategy(3.5)
    }

    /// Returns the conservative strategy preset.
    pub fn conservative() -> Self {
        Self::strategy(6.0)
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["default", "aggressive", "balanced", "conservative"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "default" => Ok(Self::default_preset()),
            "aggressive" => Ok(Self::aggressive()),
            "balanced" => Ok(Self::balanced()),
            "conservative" => Ok(Self::conservative()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Estimator configuration for this scenario.
    pub fn estimator_config(&self) -> EstimatorConfig {
        self.estimator.to_config(&self.control)
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if let Err(e) = self.control.validate() {
            errors.push(ConfigError::new(format!("control.{}", e.field()), e.to_string()));
        }
        if let Err(e) = self.estimator_config().validate() {
            // Decay is a control field and was reported above.
            if e.field() != "memory_decay" {
                errors.push(ConfigError::new(
                    format!("estimator.{}", e.field()),
                    e.to_string(),
                ));
            }
        }

        let input = &self.input;
        match input.source.as_str() {
            "synthetic" => {
                if !(input.duration_hours.is_finite() && input.duration_hours > 0.0) {
                    errors.push(ConfigError::new("input.duration_hours", "must be > 0"));
                }
                if !(input.interval_s.is_finite() && input.interval_s > 0.0) {
                    errors.push(ConfigError::new("input.interval_s", "must be > 0"));
                }
            }
            "csv" => {
                if input.path.is_none() {
                    errors.push(ConfigError::new(
                        "input.path",
                        "required when input.source = \"csv\"",
                    ));
                }
            }
            other => errors.push(ConfigError::new(
                "input.source",
                format!("must be \"synthetic\" or \"csv\", got \"{other}\""),
            )),
        }

        let generation = &self.generation;
        if let Some(peak) = generation.peak_kw {
            if !(peak.is_finite() && peak >= 0.0) {
                errors.push(ConfigError::new("generation.peak_kw", "must be >= 0"));
            }
        }
        if let Err(e) = generation.build(self.control.p_max) {
            errors.push(e);
        }

        if self.history.max_len == Some(0) {
            errors.push(ConfigError::new("history.max_len", "must be > 0"));
        }

        errors
    }
}
