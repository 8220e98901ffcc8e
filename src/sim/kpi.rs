//! Post-hoc KPI computation from a controller history.

use std::fmt;

use serde::Serialize;

use crate::control::HistoryColumns;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Aggregate key performance indicators derived from a complete run.
///
/// Computed post-hoc from [`HistoryColumns`] so the report always agrees
/// with the exported step data. Energies integrate each step's power over
/// the interval since the previous step; the first step contributes no
/// energy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiReport {
    /// Number of recorded steps.
    pub steps: usize,
    /// Time covered by the history (s).
    pub duration_s: f64,
    /// Site load energy (kWh).
    pub load_energy_kwh: f64,
    /// Commanded PV energy (kWh).
    pub output_energy_kwh: f64,
    /// Share of the load energy covered by PV output (%).
    pub utilization_pct: f64,
    /// Steps where the command exceeded the measured load.
    pub backflow_count: usize,
    /// Backflow steps as a share of all steps (%).
    pub backflow_pct: f64,
    /// Largest command-over-load excess (kW).
    pub max_backflow_kw: f64,
    /// Steps that bypassed the ramp limiter.
    pub safety_bypass_count: usize,
    /// Mean of the positive command slopes (kW/s).
    pub mean_up_rate: f64,
    /// Largest positive command slope (kW/s).
    pub max_up_rate: f64,
    /// Mean magnitude of the negative command slopes (kW/s).
    pub mean_down_rate: f64,
    /// Largest negative command slope magnitude (kW/s).
    pub max_down_rate: f64,
    /// Available PV energy that was not commanded (kWh).
    pub curtailed_energy_kwh: f64,
    /// Curtailed share of the available PV energy (%).
    pub curtailment_pct: f64,
    /// Largest instantaneous curtailment (kW).
    pub max_curtailment_kw: f64,
    /// Mean command (kW).
    pub mean_command_kw: f64,
}

impl KpiReport {
    /// Computes all KPIs from a columnar history.
    ///
    /// # Arguments
    ///
    /// * `history` - Complete controller history
    ///
    /// # Returns
    ///
    /// A `KpiReport` with all fields populated; all zero for an empty history.
    pub fn from_history(history: &HistoryColumns) -> Self {
        let n = history.len();
        if n == 0 {
            return Self::empty();
        }

        let mut load_energy = 0.0;
        let mut output_energy = 0.0;
        let mut available_energy = 0.0;
        let mut curtailed_energy = 0.0;
        let mut max_curtailment = 0.0_f64;
        let mut backflow_count = 0;
        let mut max_backflow = 0.0_f64;
        let mut up_rates = Vec::new();
        let mut down_rates = Vec::new();

        for i in 0..n {
            let load = finite_non_negative(history.load[i]);
            let command = history.command[i];
            let available = history.pv_available[i];
            let curtailed = (available - command).max(0.0);

            if command > 0.0 && command > load {
                backflow_count += 1;
                max_backflow = max_backflow.max(command - load);
            }
            max_curtailment = max_curtailment.max(curtailed);

            if i == 0 {
                continue;
            }
            // Out-of-order rows contribute no energy; their command change
            // still counts as a per-step ramp.
            let dt = history.time[i] - history.time[i - 1];
            let dt_rate = if dt > 0.0 {
                load_energy += load * dt;
                output_energy += command * dt;
                available_energy += available * dt;
                curtailed_energy += curtailed * dt;
                dt
            } else {
                1.0
            };
            let slope = (command - history.command[i - 1]) / dt_rate;
            if slope > 0.0 {
                up_rates.push(slope);
            } else if slope < 0.0 {
                down_rates.push(-slope);
            }
        }

        let (mean_up_rate, max_up_rate) = mean_and_max(&up_rates);
        let (mean_down_rate, max_down_rate) = mean_and_max(&down_rates);

        Self {
            steps: n,
            duration_s: history.time[n - 1] - history.time[0],
            load_energy_kwh: load_energy / SECONDS_PER_HOUR,
            output_energy_kwh: output_energy / SECONDS_PER_HOUR,
            utilization_pct: percent(output_energy, load_energy),
            backflow_count,
            backflow_pct: percent(backflow_count as f64, n as f64),
            max_backflow_kw: max_backflow,
            safety_bypass_count: history.safety_bypass.iter().filter(|b| **b).count(),
            mean_up_rate,
            max_up_rate,
            mean_down_rate,
            max_down_rate,
            curtailed_energy_kwh: curtailed_energy / SECONDS_PER_HOUR,
            curtailment_pct: percent(curtailed_energy, available_energy),
            max_curtailment_kw: max_curtailment,
            mean_command_kw: history.command.iter().sum::<f64>() / n as f64,
        }
    }

    fn empty() -> Self {
        Self {
            steps: 0,
            duration_s: 0.0,
            load_energy_kwh: 0.0,
            output_energy_kwh: 0.0,
            utilization_pct: 0.0,
            backflow_count: 0,
            backflow_pct: 0.0,
            max_backflow_kw: 0.0,
            safety_bypass_count: 0,
            mean_up_rate: 0.0,
            max_up_rate: 0.0,
            mean_down_rate: 0.0,
            max_down_rate: 0.0,
            curtailed_energy_kwh: 0.0,
            curtailment_pct: 0.0,
            max_curtailment_kw: 0.0,
            mean_command_kw: 0.0,
        }
    }
}

fn finite_non_negative(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        100.0 * part / whole
    } else {
        0.0
    }
}

fn mean_and_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    (mean, max)
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(
            f,
            "Steps:                 {} ({:.1} s)",
            self.steps, self.duration_s
        )?;
        writeln!(f, "Load energy:           {:.3} kWh", self.load_energy_kwh)?;
        writeln!(f, "PV output energy:      {:.3} kWh", self.output_energy_kwh)?;
        writeln!(f, "Utilization:           {:.2}%", self.utilization_pct)?;
        writeln!(
            f,
            "Backflow steps:        {} ({:.2}%, max {:.3} kW)",
            self.backflow_count, self.backflow_pct, self.max_backflow_kw
        )?;
        writeln!(f, "Safety bypasses:       {}", self.safety_bypass_count)?;
        writeln!(
            f,
            "Up ramp rate:          {:.2} kW/s mean, {:.2} kW/s max",
            self.mean_up_rate, self.max_up_rate
        )?;
        writeln!(
            f,
            "Down ramp rate:        {:.2} kW/s mean, {:.2} kW/s max",
            self.mean_down_rate, self.max_down_rate
        )?;
        writeln!(
            f,
            "Curtailment:           {:.3} kWh ({:.2}%, max {:.2} kW)",
            self.curtailed_energy_kwh, self.curtailment_pct, self.max_curtailment_kw
        )?;
        write!(f, "Mean command:          {:.2} kW", self.mean_command_kw)
    }
}
