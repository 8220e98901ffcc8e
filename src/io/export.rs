//! CSV export of controller history and JSON export of KPI reports.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use thiserror::Error;

use crate::control::HistoryColumns;
use crate::sim::kpi::KpiReport;

/// Column header for the history export.
const HEADER: &str = "time_s,load_kw,command_kw,safety_ceiling_kw,\
                      performance_ceiling_kw,predicted_mean_kw,predicted_lower_kw,\
                      safety_bypass,pv_available_kw";

/// Errors raised while writing exports.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Exports a controller history to a CSV file at the given path.
///
/// Writes a header row followed by one data row per step. Produces
/// deterministic output for identical inputs.
///
/// # Arguments
///
/// * `history` - Columnar controller history
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `ExportError` if file creation or writing fails.
pub fn export_history_csv(history: &HistoryColumns, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_history_csv(history, io::BufWriter::new(file))
}

/// Writes a controller history as CSV to any writer.
///
/// # Errors
///
/// Returns an `ExportError` if writing fails.
pub fn write_history_csv(history: &HistoryColumns, writer: impl Write) -> Result<(), ExportError> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for i in 0..history.len() {
        wtr.write_record(&[
            format!("{:.3}", history.time[i]),
            format!("{:.4}", history.load[i]),
            format!("{:.4}", history.command[i]),
            format!("{:.4}", history.safety_ceiling[i]),
            format!("{:.4}", history.performance_ceiling[i]),
            format!("{:.4}", history.predicted_mean[i]),
            format!("{:.4}", history.predicted_lower[i]),
            history.safety_bypass[i].to_string(),
            format!("{:.4}", history.pv_available[i]),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Writes a KPI report as pretty-printed JSON to any writer.
///
/// # Errors
///
/// Returns an `ExportError` if serialization or writing fails.
pub fn write_kpi_json(kpi: &KpiReport, mut writer: impl Write) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut writer, kpi)?;
    writeln!(writer)?;
    Ok(())
}

/// Exports a KPI report as JSON to a file at the given path.
///
/// # Errors
///
/// Returns an `ExportError` if file creation or writing fails.
pub fn export_kpi_json(kpi: &KpiReport, path: &Path) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let mut buf = io::BufWriter::new(file);
    write_kpi_json(kpi, &mut buf)?;
    buf.flush()?;
    Ok(())
}
