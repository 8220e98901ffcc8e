//! CSV ingestion of measured load series.
//!
//! Column names are matched against a fixed list of common spellings
//! (English and Chinese metering exports). Load values are cleaned rather
//! than rejected: the controller needs an unbroken series.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;
use thiserror::Error;

use crate::sim::LoadSample;

/// Accepted time column headers, in priority order.
pub const TIME_COLUMNS: &[&str] = &[
    "UTC时间",
    "UTC",
    "time",
    "时间",
    "时间戳",
    "timestamp",
    "datetime",
    "Time",
    "DateTime",
];

/// Accepted load column headers, in priority order.
pub const LOAD_COLUMNS: &[&str] = &[
    "负载数据", "load", "负载", "power", "Load", "Power", "功率", "kW",
];

/// Readings above this are treated as meter glitches (kW).
pub const MAX_LOAD_KW: f64 = 10_000.0;

/// Errors raised while reading a load CSV.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot open \"{}\": {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("no time column found, expected one of: {}", TIME_COLUMNS.join(", "))]
    MissingTimeColumn,
    #[error("no load column found, expected one of: {}", LOAD_COLUMNS.join(", "))]
    MissingLoadColumn,
    #[error("no usable rows")]
    Empty,
}

/// What the cleaning pass changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Data rows read, before any were dropped.
    pub rows: usize,
    /// Rows dropped for an unparsable timestamp.
    pub dropped_rows: usize,
    /// Loads that were empty or not numeric.
    pub missing: usize,
    /// Negative loads.
    pub negative: usize,
    /// Loads above [`MAX_LOAD_KW`].
    pub oversized: usize,
    /// Loads that could not be filled from a neighbour and were set to 0.
    pub zero_filled: usize,
    /// No row had a usable timestamp; the row index was used as time.
    pub used_row_index: bool,
}

impl IngestReport {
    /// Number of load values replaced during cleaning.
    pub fn replaced(&self) -> usize {
        self.missing + self.negative + self.oversized
    }
}

/// A cleaned load series.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub samples: Vec<LoadSample>,
    pub report: IngestReport,
}

/// Reads and cleans a load CSV file.
///
/// # Errors
///
/// Returns an [`IngestError`] if the file cannot be read, is not valid
/// CSV, lacks a recognised time or load column, or has no usable rows.
pub fn read_load_csv(path: &Path) -> Result<Ingested, IngestError> {
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_load_csv(io::BufReader::new(file))
}

/// Parses and cleans a load CSV from any reader.
///
/// Time values may be plain seconds or `[YYYY-MM-DD[ T]]HH:MM[:SS[.f]]`
/// stamps; they are rebased so the first kept row is at 0 s.
///
/// # Errors
///
/// See [`read_load_csv`].
pub fn parse_load_csv(reader: impl Read) -> Result<Ingested, IngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let find = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| headers.iter().position(|h| h == *name))
    };
    let time_col = find(TIME_COLUMNS).ok_or(IngestError::MissingTimeColumn)?;
    let load_col = find(LOAD_COLUMNS).ok_or(IngestError::MissingLoadColumn)?;

    let mut raw = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let time = record.get(time_col).and_then(parse_timestamp);
        let load = record.get(load_col).map(str::to_string).unwrap_or_default();
        raw.push((time, load));
    }

    let mut report = IngestReport {
        rows: raw.len(),
        ..IngestReport::default()
    };

    let rows: Vec<(f64, &str)> = if raw.iter().all(|(t, _)| t.is_none()) {
        report.used_row_index = !raw.is_empty();
        raw.iter()
            .enumerate()
            .map(|(i, (_, load))| (i as f64, load.as_str()))
            .collect()
    } else {
        raw.iter()
            .filter_map(|(t, load)| t.map(|t| (t, load.as_str())))
            .collect()
    };
    report.dropped_rows = raw.len() - rows.len();

    let Some(&(t0, _)) = rows.first() else {
        return Err(IngestError::Empty);
    };

    let loads: Vec<Option<f64>> = rows
        .iter()
        .map(|(_, text)| screen_load(text, &mut report))
        .collect();
    let loads = fill_gaps(&loads, &mut report);

    let samples = rows
        .iter()
        .zip(loads)
        .map(|(&(time, _), load)| LoadSample {
            time_s: time - t0,
            load_kw: load.clamp(0.0, MAX_LOAD_KW),
        })
        .collect();

    if report.used_row_index {
        tracing::warn!("no parsable timestamps, using row index as time");
    }
    if report.dropped_rows > 0 || report.replaced() > 0 {
        tracing::warn!(
            rows = report.rows,
            dropped = report.dropped_rows,
            missing = report.missing,
            negative = report.negative,
            oversized = report.oversized,
            zero_filled = report.zero_filled,
            "cleaned load data"
        );
    }

    Ok(Ingested { samples, report })
}

/// Parses one load cell; out-of-range values count as missing.
fn screen_load(text: &str, report: &mut IngestReport) -> Option<f64> {
    match text.parse::<f64>() {
        Ok(v) if v.is_nan() => {
            report.missing += 1;
            None
        }
        Ok(v) if v < 0.0 => {
            report.negative += 1;
            None
        }
        Ok(v) if v > MAX_LOAD_KW => {
            report.oversized += 1;
            None
        }
        Ok(v) => Some(v),
        Err(_) => {
            report.missing += 1;
            None
        }
    }
}

/// Forward fill, then backward fill, then zero.
fn fill_gaps(loads: &[Option<f64>], report: &mut IngestReport) -> Vec<f64> {
    let mut filled = Vec::with_capacity(loads.len());
    let mut last = None;
    for v in loads {
        last = v.or(last);
        filled.push(last);
    }

    let mut next = None;
    for v in filled.iter_mut().rev() {
        match v {
            Some(x) => next = Some(*x),
            None => *v = next,
        }
    }

    filled
        .into_iter()
        .map(|v| {
            v.unwrap_or_else(|| {
                report.zero_filled += 1;
                0.0
            })
        })
        .collect()
}

/// Date-and-clock layouts accepted in a time column.
const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%dT%H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];
const CLOCK_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];

/// Parses plain seconds or an ISO-like date/clock stamp into seconds.
///
/// Stamps with a date are counted from 1970-01-01 UTC; bare clock times from
/// midnight. Only differences between rows matter.
pub fn parse_timestamp(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(v) = text.parse::<f64>() {
        return v.is_finite().then_some(v);
    }
    let text = text.trim_end_matches('Z');

    let stamp = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        });
    if let Some(stamp) = stamp {
        return Some(stamp.and_utc().timestamp_micros() as f64 / 1e6);
    }

    CLOCK_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(text, f).ok())
        .map(|t| f64::from(t.num_seconds_from_midnight()) + f64::from(t.nanosecond()) * 1e-9)
}
