//! Step history kept by the controller for export and metrics.

use std::collections::VecDeque;

use serde::Serialize;

/// One recorded control step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub time_s: f64,
    pub load_kw: f64,
    pub command_kw: f64,
    pub safety_ceiling_kw: f64,
    pub performance_ceiling_kw: f64,
    pub predicted_mean_kw: f64,
    pub predicted_lower_kw: f64,
    pub safety_bypass: bool,
    pub pv_available_kw: f64,
}

/// Append-only, time-ordered step log.
///
/// Unbounded by default. With a capacity limit the oldest entries are
/// evicted first, which keeps long-running loops at constant memory.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    max_len: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a history that retains at most `max_len` entries.
    pub fn with_capacity_limit(max_len: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len.min(4096)),
            max_len: Some(max_len.max(1)),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        if let Some(max) = self.max_len {
            while self.entries.len() >= max {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Columnar copy of the retained entries.
    pub fn columns(&self) -> HistoryColumns {
        let mut cols = HistoryColumns::with_capacity(self.entries.len());
        for e in &self.entries {
            cols.time.push(e.time_s);
            cols.load.push(e.load_kw);
            cols.command.push(e.command_kw);
            cols.safety_ceiling.push(e.safety_ceiling_kw);
            cols.performance_ceiling.push(e.performance_ceiling_kw);
            cols.predicted_mean.push(e.predicted_mean_kw);
            cols.predicted_lower.push(e.predicted_lower_kw);
            cols.safety_bypass.push(e.safety_bypass);
            cols.pv_available.push(e.pv_available_kw);
        }
        cols
    }
}

/// History laid out one vector per field, for plotting and export.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryColumns {
    pub time: Vec<f64>,
    pub load: Vec<f64>,
    pub command: Vec<f64>,
    pub safety_ceiling: Vec<f64>,
    pub performance_ceiling: Vec<f64>,
    pub predicted_mean: Vec<f64>,
    pub predicted_lower: Vec<f64>,
    pub safety_bypass: Vec<bool>,
    pub pv_available: Vec<f64>,
}

impl HistoryColumns {
    fn with_capacity(n: usize) -> Self {
        Self {
            time: Vec::with_capacity(n),
            load: Vec::with_capacity(n),
            command: Vec::with_capacity(n),
            safety_ceiling: Vec::with_capacity(n),
            performance_ceiling: Vec::with_capacity(n),
            predicted_mean: Vec::with_capacity(n),
            predicted_lower: Vec::with_capacity(n),
            safety_bypass: Vec::with_capacity(n),
            pv_available: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}
