//! Batch runs of the controller over a load series.

use thiserror::Error;

use crate::config::{ConfigError, ScenarioConfig};
use crate::control::{ControlOutput, Controller, HistoryColumns};
use crate::error::ControlError;
use crate::io::ingest::{self, IngestError, IngestReport};

use super::kpi::KpiReport;
use super::synthetic::FactoryLoad;

/// One timestamped load reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSample {
    /// Seconds since the start of the series.
    pub time_s: f64,
    /// Measured site load (kW).
    pub load_kw: f64,
}

/// Errors that stop a scenario run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid scenario: {}", join_errors(.0))]
    Config(Vec<ConfigError>),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("load series is empty")]
    EmptySeries,
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Everything a scenario run produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Per-sample controller outputs, in input order.
    pub outputs: Vec<ControlOutput>,
    /// Controller history (possibly capped by `[history] max_len`).
    pub history: HistoryColumns,
    pub kpi: KpiReport,
}

/// Loads the scenario's input series.
///
/// # Returns
///
/// The samples plus the cleaning report when the input came from CSV.
///
/// # Errors
///
/// Returns [`RunError::Ingest`] if the CSV cannot be read, or
/// [`RunError::Config`] if the input section is incomplete.
pub fn load_samples(
    cfg: &ScenarioConfig,
) -> Result<(Vec<LoadSample>, Option<IngestReport>), RunError> {
    let input = &cfg.input;
    match (input.source.as_str(), &input.path) {
        ("csv", Some(path)) => {
            let ingested = ingest::read_load_csv(path)?;
            tracing::info!(
                path = %path.display(),
                samples = ingested.samples.len(),
                "loaded load series"
            );
            Ok((ingested.samples, Some(ingested.report)))
        }
        ("synthetic", _) => {
            let samples =
                FactoryLoad::new(input.duration_hours, input.interval_s, input.seed).generate();
            tracing::info!(
                samples = samples.len(),
                seed = input.seed,
                "generated synthetic factory load"
            );
            Ok((samples, None))
        }
        _ => Err(RunError::Config(cfg.validate())),
    }
}

/// Builds a controller for `cfg`, seeded with `initial_load`.
///
/// # Errors
///
/// Returns [`RunError::Config`] if the scenario does not validate, or
/// [`RunError::Control`] if the initial load is unusable.
pub fn build_controller(cfg: &ScenarioConfig, initial_load: f64) -> Result<Controller, RunError> {
    let errors = cfg.validate();
    if !errors.is_empty() {
        return Err(RunError::Config(errors));
    }
    let profile = cfg
        .generation
        .build(cfg.control.p_max)
        .map_err(|e| RunError::Config(vec![e]))?;

    let mut controller =
        Controller::new(cfg.control.clone(), initial_load, cfg.estimator_config())?
            .with_generation_profile(profile);
    if let Some(max_len) = cfg.history.max_len {
        controller = controller.with_history_limit(max_len);
    }
    Ok(controller)
}

/// Feeds every sample through `controller` in order.
pub fn run_samples(controller: &mut Controller, samples: &[LoadSample]) -> Vec<ControlOutput> {
    samples
        .iter()
        .map(|s| controller.compute_control(s.load_kw, s.time_s))
        .collect()
}

/// Runs a scenario over `samples`, seeding the controller with the first
/// reading.
///
/// # Errors
///
/// Returns a [`RunError`] if the series is empty, the scenario does not
/// validate, or the first reading cannot seed the estimator.
pub fn run_scenario(cfg: &ScenarioConfig, samples: &[LoadSample]) -> Result<RunResult, RunError> {
    let first = samples.first().ok_or(RunError::EmptySeries)?;
    let mut controller = build_controller(cfg, first.load_kw)?;

    tracing::info!(
        samples = samples.len(),
        initial_load_kw = first.load_kw,
        "run started"
    );
    let outputs = run_samples(&mut controller, samples);

    let zero_commands = outputs.iter().filter(|o| o.command == 0.0).count();
    let max_command = outputs.iter().map(|o| o.command).fold(0.0, f64::max);
    let mean_command = outputs.iter().map(|o| o.command).sum::<f64>() / outputs.len() as f64;
    tracing::info!(
        mean_command_kw = mean_command,
        max_command_kw = max_command,
        zero_commands,
        "run finished"
    );
    if zero_commands * 2 > outputs.len() {
        tracing::warn!(
            zero_commands,
            samples = outputs.len(),
            "more than half of the commands were zero"
        );
    }

    let history = controller.get_history();
    let kpi = KpiReport::from_history(&history);
    Ok(RunResult {
        outputs,
        history,
        kpi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(load: f64, n: usize) -> Vec<LoadSample> {
        (0..n)
            .map(|i| LoadSample {
                time_s: i as f64,
                load_kw: load,
            })
            .collect()
    }

    #[test]
    fn runs_one_output_per_sample() {
        let cfg = ScenarioConfig::default_preset();
        let result = run_scenario(&cfg, &constant(60.0, 50)).ok();
        assert_eq!(result.as_ref().map(|r| r.outputs.len()), Some(50));
        assert_eq!(result.as_ref().map(|r| r.history.len()), Some(50));
        assert_eq!(result.map(|r| r.kpi.steps), Some(50));
    }

    #[test]
    fn empty_series_is_an_error() {
        let cfg = ScenarioConfig::default_preset();
        assert!(matches!(
            run_scenario(&cfg, &[]),
            Err(RunError::EmptySeries)
        ));
    }

    #[test]
    fn invalid_config_is_reported() {
        let mut cfg = ScenarioConfig::default_preset();
        cfg.control.alpha = 2.0;
        let err = run_scenario(&cfg, &constant(10.0, 3)).err();
        assert!(matches!(err, Some(RunError::Config(ref e)) if e[0].field == "control.alpha"));
        assert!(err.map(|e| e.to_string()).unwrap_or_default().contains("control.alpha"));
    }

    #[test]
    fn history_limit_applies() {
        let mut cfg = ScenarioConfig::default_preset();
        cfg.history.max_len = Some(10);
        let result = run_scenario(&cfg, &constant(60.0, 30)).ok();
        assert_eq!(result.as_ref().map(|r| r.outputs.len()), Some(30));
        assert_eq!(result.map(|r| r.history.len()), Some(10));
    }

    #[test]
    fn synthetic_input_is_seeded() {
        let mut cfg = ScenarioConfig::default_preset();
        cfg.input.duration_hours = 0.05;
        let a = load_samples(&cfg).ok().map(|(s, _)| s);
        let b = load_samples(&cfg).ok().map(|(s, _)| s);
        assert_eq!(a.as_ref().map(Vec::len), Some(180));
        assert_eq!(a, b);
    }
}
