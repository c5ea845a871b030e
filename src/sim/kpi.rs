//! Post-hoc KPI computation from an evaluated schedule.

use std::fmt;

use super::core::Evaluation;
use super::objective::WS_PER_KWH;
use crate::commodity::AncillaryCommodity;

/// Aggregate key performance indicators of one evaluation.
///
/// Computed from the recorded ancillary balances so that the reported
/// figures always match what the optimizer paid for.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiReport {
    /// Peak grid import (W, positive).
    pub peak_import_w: f64,
    /// Peak grid export (W, positive magnitude).
    pub peak_export_w: f64,
    /// Imported electrical energy (kWh).
    pub imported_kwh: f64,
    /// Exported electrical energy (kWh).
    pub exported_kwh: f64,
    /// Gas drawn from the network (kWh).
    pub gas_kwh: f64,
    /// Net energy cost.
    pub energy_cost: f64,
    /// Sum of device costs.
    pub device_cost: f64,
    /// Soft limit penalty.
    pub limit_penalty: f64,
    /// Number of steps where a power limit was violated.
    pub limit_violation_count: usize,
    /// Whether the run ended early on a hard constraint.
    pub terminated_early: bool,
}

impl KpiReport {
    /// Computes all KPIs from an evaluation.
    ///
    /// # Arguments
    ///
    /// * `evaluation` - Result of [`SimulationCore::evaluate`](super::core::SimulationCore::evaluate)
    ///
    /// # Returns
    ///
    /// A `KpiReport` with all fields populated.
    pub fn from_evaluation(evaluation: &Evaluation) -> Self {
        let active = evaluation
            .balances
            .series(AncillaryCommodity::ActivePowerExternal);
        let gas = evaluation
            .balances
            .series(AncillaryCommodity::NaturalGasPowerExternal);
        let step_s = active.resolution() as f64;
        let simulated = evaluation.steps;

        let mut peak_import = 0.0_f64;
        let mut peak_export = 0.0_f64;
        let mut imported = 0.0;
        let mut exported = 0.0;
        for &w in active.values().iter().take(simulated) {
            peak_import = peak_import.max(w);
            peak_export = peak_export.max(-w);
            if w > 0.0 {
                imported += w * step_s;
            } else {
                exported -= w * step_s;
            }
        }
        let gas_ws: f64 = gas
            .values()
            .iter()
            .take(simulated)
            .map(|w| w.max(0.0) * step_s)
            .sum();

        let o = &evaluation.objectives;
        Self {
            peak_import_w: peak_import,
            peak_export_w: peak_export,
            imported_kwh: imported / WS_PER_KWH,
            exported_kwh: exported / WS_PER_KWH,
            gas_kwh: gas_ws / WS_PER_KWH,
            energy_cost: o.energy_cost,
            device_cost: o.device_cost,
            limit_penalty: o.limit_penalty,
            limit_violation_count: evaluation.violation_steps,
            terminated_early: evaluation.terminated_at.is_some(),
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "Peak import:           {:.1} W", self.peak_import_w)?;
        writeln!(f, "Peak export:           {:.1} W", self.peak_export_w)?;
        writeln!(f, "Imported energy:       {:.3} kWh", self.imported_kwh)?;
        writeln!(f, "Exported energy:       {:.3} kWh", self.exported_kwh)?;
        writeln!(f, "Gas energy:            {:.3} kWh", self.gas_kwh)?;
        writeln!(f, "Energy cost:           {:.4}", self.energy_cost)?;
        writeln!(f, "Device cost:           {:.4}", self.device_cost)?;
        writeln!(f, "Limit penalty:         {:.4}", self.limit_penalty)?;
        writeln!(f, "Limit violations:      {}", self.limit_violation_count)?;
        write!(f, "Terminated early:      {}", self.terminated_early)
    }
}
