//! backflow-guard entry point: CLI wiring and config-driven scenario runs.

use std::process;

use tracing_subscriber::EnvFilter;

use backflow_guard::cli::{self, CliOptions, Command};
use backflow_guard::config::ScenarioConfig;
use backflow_guard::io::export::{export_history_csv, export_kpi_json};
use backflow_guard::sim::runner::{load_samples, run_scenario};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolves the scenario named on the command line and applies overrides.
fn load_scenario(opts: &CliOptions) -> Result<ScenarioConfig, String> {
    let mut scenario = match (&opts.scenario, &opts.preset) {
        (Some(path), _) => ScenarioConfig::from_toml_file(path),
        (None, Some(name)) => ScenarioConfig::from_preset(name),
        (None, None) => Ok(ScenarioConfig::default_preset()),
    }
    .map_err(|e| e.to_string())?;

    if let Some(ref path) = opts.input {
        scenario.input.source = "csv".to_string();
        scenario.input.path = Some(path.clone());
    }
    if let Some(seed) = opts.seed {
        scenario.input.seed = seed;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        return Err(errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"));
    }
    Ok(scenario)
}

fn run(opts: &CliOptions) -> Result<(), String> {
    let scenario = load_scenario(opts)?;
    let (samples, report) = load_samples(&scenario).map_err(|e| e.to_string())?;

    if let Some(report) = report {
        eprintln!(
            "Input: {} rows read, {} dropped, {} readings replaced",
            report.rows,
            report.dropped_rows,
            report.replaced()
        );
    }

    let result = run_scenario(&scenario, &samples).map_err(|e| e.to_string())?;

    if !opts.quiet {
        for (sample, output) in samples.iter().zip(&result.outputs) {
            println!(
                "t={:>9.1}s load={:>7.2} kW | {output}",
                sample.time_s, sample.load_kw
            );
        }
        println!();
    }
    println!("{}", result.kpi);

    if let Some(ref path) = opts.telemetry_out {
        export_history_csv(&result.history, path)
            .map_err(|e| format!("error: failed to write CSV: {e}"))?;
        eprintln!("Telemetry written to {}", path.display());
    }
    if let Some(ref path) = opts.report_json {
        export_kpi_json(&result.kpi, path)
            .map_err(|e| format!("error: failed to write KPI report: {e}"))?;
        eprintln!("KPI report written to {}", path.display());
    }
    Ok(())
}

fn main() {
    init_tracing();

    let opts = match cli::parse_args() {
        Ok(Command::Run(opts)) => opts,
        Ok(Command::Help) => {
            cli::print_usage();
            return;
        }
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(2);
        }
    };

    if let Err(e) = run(&opts) {
        eprintln!("{e}");
        process::exit(1);
    }
}
