//! Command-line argument parsing for the `backflow-guard` binary.

use std::env;
use std::path::PathBuf;

/// Preset used when neither `--scenario` nor `--preset` is given.
pub const DEFAULT_PRESET: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub scenario: Option<PathBuf>,
    pub preset: Option<String>,
    /// Load CSV overriding the scenario's input section.
    pub input: Option<PathBuf>,
    /// Seed overriding `[input] seed`.
    pub seed: Option<u64>,
    pub telemetry_out: Option<PathBuf>,
    pub report_json: Option<PathBuf>,
    /// Suppress per-step output.
    pub quiet: bool,
}

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(CliOptions),
    Help,
}

/// Parses the process arguments.
///
/// # Errors
///
/// Returns a message describing the first invalid argument.
pub fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

/// Parses an argument list (without the program name).
///
/// # Errors
///
/// Returns a message describing the first invalid argument.
pub fn parse_args_from(args: Vec<String>) -> Result<Command, String> {
    let mut i = 0usize;
    let mut scenario = None;
    let mut preset = None;
    let mut input = None;
    let mut seed = None;
    let mut telemetry_out = None;
    let mut report_json = None;
    let mut quiet = false;

    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => {
                i += 1;
                let path = args.next_or_err(
                    i,
                    "missing value for --scenario (expected a TOML file path)",
                )?;
                if scenario.replace(PathBuf::from(path)).is_some() {
                    return Err("--scenario provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name =
                    args.next_or_err(i, "missing value for --preset (expected a preset name)")?;
                if preset.replace(name.to_string()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--input" => {
                i += 1;
                let path =
                    args.next_or_err(i, "missing value for --input (expected a CSV file path)")?;
                if input.replace(PathBuf::from(path)).is_some() {
                    return Err("--input provided more than once".to_string());
                }
            }
            "--seed" => {
                i += 1;
                let value = args.next_or_err(i, "missing value for --seed (expected a u64)")?;
                let parsed = value
                    .parse::<u64>()
                    .map_err(|_| format!("--seed value \"{value}\" is not a valid u64"))?;
                if seed.replace(parsed).is_some() {
                    return Err("--seed provided more than once".to_string());
                }
            }
            "--telemetry-out" => {
                i += 1;
                let path = args.next_or_err(
                    i,
                    "missing value for --telemetry-out (expected a file path)",
                )?;
                if telemetry_out.replace(PathBuf::from(path)).is_some() {
                    return Err("--telemetry-out provided more than once".to_string());
                }
            }
            "--report-json" => {
                i += 1;
                let path = args.next_or_err(
                    i,
                    "missing value for --report-json (expected a file path)",
                )?;
                if report_json.replace(PathBuf::from(path)).is_some() {
                    return Err("--report-json provided more than once".to_string());
                }
            }
            "--quiet" | "-q" => quiet = true,
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if scenario.is_some() && preset.is_some() {
        return Err(
            "arguments `--scenario` and `--preset` are mutually exclusive; choose one source"
                .to_string(),
        );
    }

    if scenario.is_none() && preset.is_none() {
        preset = Some(DEFAULT_PRESET.to_string());
    }

    Ok(Command::Run(CliOptions {
        scenario,
        preset,
        input,
        seed,
        telemetry_out,
        report_json,
        quiet,
    }))
}

trait SliceArgExt {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String>;
}

impl SliceArgExt for [String] {
    fn next_or_err(&self, index: usize, err: &str) -> Result<&str, String> {
        self.get(index)
            .map(String::as_str)
            .ok_or_else(|| err.to_string())
    }
}

pub fn print_usage() {
    eprintln!("backflow-guard: anti-backflow PV setpoint controller");
    eprintln!();
    eprintln!("Usage: backflow-guard [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!("  --preset <name>          Use a built-in preset (default, aggressive, balanced, conservative)");
    eprintln!("  --input <path>           Read the load series from a CSV file");
    eprintln!("  --seed <u64>             Override the synthetic load seed");
    eprintln!("  --telemetry-out <path>   Export step history to CSV");
    eprintln!("  --report-json <path>     Export the KPI report to JSON");
    eprintln!("  --quiet, -q              Do not print per-step lines");
    eprintln!("  --help, -h               Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the default preset is used.");
    eprintln!("Set RUST_LOG (e.g. RUST_LOG=debug) for controller logs on stderr.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run_options(list: &[&str]) -> CliOptions {
        match parse_args_from(args(list)) {
            Ok(Command::Run(opts)) => opts,
            other => panic!("expected run options, got {other:?}"),
        }
    }

    #[test]
    fn supports_scenario_cli() {
        let opts = run_options(&["--scenario", "scenario.toml"]);
        assert_eq!(
            opts.scenario.as_deref().and_then(|p| p.to_str()),
            Some("scenario.toml")
        );
        assert!(opts.preset.is_none());
    }

    #[test]
    fn supports_preset_cli() {
        let opts = run_options(&["--preset", "balanced"]);
        assert_eq!(opts.preset.as_deref(), Some("balanced"));
        assert!(opts.scenario.is_none());
    }

    #[test]
    fn defaults_to_default_preset() {
        let opts = run_options(&[]);
        assert_eq!(opts.preset.as_deref(), Some(DEFAULT_PRESET));
        assert!(!opts.quiet);
    }

    #[test]
    fn parses_outputs_and_overrides() {
        let opts = run_options(&[
            "--input",
            "load.csv",
            "--seed",
            "7",
            "--telemetry-out",
            "out.csv",
            "--report-json",
            "kpi.json",
            "-q",
        ]);
        assert_eq!(opts.input, Some(PathBuf::from("load.csv")));
        assert_eq!(opts.seed, Some(7));
        assert_eq!(opts.telemetry_out, Some(PathBuf::from("out.csv")));
        assert_eq!(opts.report_json, Some(PathBuf::from("kpi.json")));
        assert!(opts.quiet);
    }

    #[test]
    fn rejects_conflicting_sources() {
        let err = parse_args_from(args(&["--scenario", "a.toml", "--preset", "default"]));
        assert!(err.is_err_and(|e| e.contains("mutually exclusive")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_args_from(args(&["--seed", "abc"])).is_err());
        assert!(parse_args_from(args(&["--seed"])).is_err());
        assert!(parse_args_from(args(&["--preset", "a", "--preset", "b"])).is_err());
        let err = parse_args_from(args(&["--seed", "1", "--seed", "2"]));
        assert!(err.is_err_and(|e| e.contains("--seed provided more than once")));
        assert!(parse_args_from(args(&["--frobnicate"])).is_err());
    }

    #[test]
    fn help_short_circuits() {
        assert_eq!(
            parse_args_from(args(&["--quiet", "--help"])),
            Ok(Command::Help)
        );
    }
}
