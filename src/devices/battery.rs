use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DeviceModel;
use super::types::{PlanningContext, check_positive, check_range, require_positive_secs};
use crate::commodity::{AncillaryCommodity, Commodity, LimitedCommodityStateMap};
use crate::error::{ConfigError, ProblemPartError};
use crate::problem::{
    Capabilities, DecisionVariables, DeviceStrategy, PartRun, PartStep, PartWindow, SegmentCodec,
    StepContext, StorageMode,
};
use crate::profile::Schedule;
use crate::series::TimeSeries;
use crate::sim::objective::WS_PER_KWH;

/// How the battery is operated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryMode {
    /// The optimizer picks charge/idle/discharge per slot.
    #[default]
    Scheduled,
    /// Charges from surplus and discharges into demand seen on the meter.
    SelfConsumption,
}

/// A stationary battery with charge/discharge limits and efficiencies.
///
/// # Power Flow Convention
/// - Positive power: charging (consumption)
/// - Negative power: discharging (generation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Battery {
    pub id: String,
    pub mode: BatteryMode,
    pub capacity_wh: f64,
    /// State of charge as a fraction (0.0 to 1.0).
    pub soc: f64,
    pub max_charge_w: f64,
    pub max_discharge_w: f64,
    /// Charging efficiency (0..1.0).
    pub eta_c: f64,
    /// Discharging efficiency (0..1.0).
    pub eta_d: f64,
    /// Width of one decision slot in seconds (scheduled mode).
    pub slot_secs: i64,
    /// Device cost per kWh moved through the terminals.
    pub wear_cost_per_kwh: f64,
}

impl Default for Battery {
    fn default() -> Self {
        Self {
            id: "battery".to_string(),
            mode: BatteryMode::Scheduled,
            capacity_wh: 10_000.0,
            soc: 0.5,
            max_charge_w: 3000.0,
            max_discharge_w: 3000.0,
            eta_c: 0.95,
            eta_d: 0.95,
            slot_secs: 900,
            wear_cost_per_kwh: 0.02,
        }
    }
}

/// Charge bookkeeping shared by both modes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub capacity_wh: f64,
    pub soc: f64,
    pub max_charge_w: f64,
    pub max_discharge_w: f64,
    pub eta_c: f64,
    pub eta_d: f64,
}

impl Cell {
    /// Applies a setpoint for `dt_hours` and returns the power actually drawn.
    ///
    /// Enforces charge/discharge power limits, SOC bounds, and efficiency losses.
    pub fn apply(&mut self, setpoint_w: f64, dt_hours: f64) -> f64 {
        if dt_hours <= 0.0 {
            return 0.0;
        }
        // Enforce power limits
        let cmd_w = if setpoint_w >= 0.0 {
            setpoint_w.min(self.max_charge_w)
        } else {
            setpoint_w.max(-self.max_discharge_w)
        };

        if cmd_w > 0.0 {
            // Charging: limit by available capacity
            let max_wh_this_step = (1.0 - self.soc) * self.capacity_wh / self.eta_c;
            let actual_w = cmd_w.min((max_wh_this_step / dt_hours).max(0.0));
            self.soc += actual_w * dt_hours * self.eta_c / self.capacity_wh;
            self.soc = self.soc.clamp(0.0, 1.0);
            actual_w
        } else if cmd_w < 0.0 {
            // Discharging: limit by available energy
            let max_wh_this_step = self.soc * self.capacity_wh * self.eta_d;
            let actual_abs_w = (-cmd_w).min((max_wh_this_step / dt_hours).max(0.0));
            self.soc -= actual_abs_w * dt_hours / (self.capacity_wh * self.eta_d);
            self.soc = self.soc.clamp(0.0, 1.0);
            -actual_abs_w
        } else {
            0.0
        }
    }
}

impl Battery {
    pub fn cell(&self) -> Cell {
        Cell {
            capacity_wh: self.capacity_wh,
            soc: self.soc,
            max_charge_w: self.max_charge_w,
            max_discharge_w: self.max_discharge_w,
            eta_c: self.eta_c,
            eta_d: self.eta_d,
        }
    }
}

impl DeviceModel for Battery {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "battery"
    }

    fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        check_positive(&mut errors, format!("{prefix}.capacity_wh"), self.capacity_wh);
        check_range(&mut errors, format!("{prefix}.soc"), self.soc, 0.0, 1.0);
        if self.max_charge_w < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.max_charge_w"), "must be >= 0"));
        }
        if self.max_discharge_w < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.max_discharge_w"), "must be >= 0"));
        }
        for (field, eta) in [("eta_c", self.eta_c), ("eta_d", self.eta_d)] {
            if !(eta > 0.0 && eta <= 1.0) {
                errors.push(ConfigError::new(format!("{prefix}.{field}"), "must be in (0.0, 1.0]"));
            }
        }
        check_positive(&mut errors, format!("{prefix}.slot_secs"), self.slot_secs as f64);
        if self.wear_cost_per_kwh < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.wear_cost_per_kwh"), "must be >= 0"));
        }
        errors
    }

    fn strategy(&self, ctx: &PlanningContext) -> Result<Arc<dyn DeviceStrategy>, ProblemPartError> {
        if self.mode == BatteryMode::Scheduled {
            require_positive_secs(&self.id, "slot_secs", self.slot_secs)?;
        }
        Ok(Arc::new(BatteryStrategy {
            params: self.clone(),
            slots: match self.mode {
                BatteryMode::Scheduled => ctx.slots(self.slot_secs),
                BatteryMode::SelfConsumption => 0,
            },
        }))
    }

    /// Replays the chosen plan's terminal power up to `until` to move the SOC.
    fn advance(
        &mut self,
        _decisions: &DecisionVariables,
        schedule: &Schedule,
        plan_start: i64,
        until: i64,
    ) {
        let Some(series) = schedule.profile().series(Commodity::ActivePower) else {
            return;
        };
        let to = (until - plan_start).min(schedule.profile().end_time());
        if to <= 0 {
            return;
        }
        let (Ok(charged_ws), Ok(discharged_ws)) = (series.sum_positive(0, to), series.sum_negative(0, to))
        else {
            return;
        };
        let stored_wh = charged_ws / 3600.0 * self.eta_c + discharged_ws / 3600.0 / self.eta_d;
        self.soc = (self.soc + stored_wh / self.capacity_wh).clamp(0.0, 1.0);
        debug!(device = %self.id, soc = self.soc, "battery state advanced");
    }
}

#[derive(Debug)]
struct BatteryStrategy {
    params: Battery,
    slots: usize,
}

impl DeviceStrategy for BatteryStrategy {
    fn kind(&self) -> &'static str {
        "battery"
    }

    fn capabilities(&self) -> Capabilities {
        match self.params.mode {
            BatteryMode::Scheduled => Capabilities {
                controllable: self.slots > 0,
                ..Capabilities::PASSIVE
            },
            BatteryMode::SelfConsumption => Capabilities {
                needs_ancillary_meter_state: true,
                ..Capabilities::PASSIVE
            },
        }
    }

    fn codec(&self) -> SegmentCodec {
        match self.params.mode {
            BatteryMode::Scheduled => SegmentCodec::SlotModes { slots: self.slots },
            BatteryMode::SelfConsumption => SegmentCodec::Empty,
        }
    }

    fn output_commodities(&self) -> &[Commodity] {
        &[Commodity::ActivePower]
    }

    fn start(
        &self,
        window: &PartWindow,
        decisions: &DecisionVariables,
    ) -> Result<Box<dyn PartRun>, ProblemPartError> {
        let modes = match (self.params.mode, decisions) {
            (BatteryMode::Scheduled, DecisionVariables::SlotModes { modes }) => Some(modes.clone()),
            (BatteryMode::Scheduled, DecisionVariables::None) if self.slots == 0 => Some(Vec::new()),
            (BatteryMode::SelfConsumption, DecisionVariables::None) => None,
            (_, other) => {
                return Err(ProblemPartError::Model {
                    device: self.params.id.clone(),
                    message: format!("battery cannot use `{}` decisions", other.kind()),
                });
            }
        };
        Ok(Box::new(BatteryRun {
            cell: self.params.cell(),
            reference_time: window.reference_time,
            slot_secs: self.params.slot_secs,
            modes,
            last_power: 0.0,
            wear_cost_per_kwh: self.params.wear_cost_per_kwh,
        }))
    }
}

struct BatteryRun {
    cell: Cell,
    reference_time: i64,
    slot_secs: i64,
    /// `None` in self-consumption mode.
    modes: Option<Vec<StorageMode>>,
    last_power: f64,
    wear_cost_per_kwh: f64,
}

impl BatteryRun {
    fn setpoint(&self, ctx: &StepContext<'_>) -> f64 {
        match &self.modes {
            Some(modes) => {
                let slot = ((ctx.time - self.reference_time) / self.slot_secs) as usize;
                match modes.get(slot).copied().unwrap_or(StorageMode::Idle) {
                    StorageMode::Idle => 0.0,
                    StorageMode::Charge => self.cell.max_charge_w,
                    StorageMode::Discharge => -self.cell.max_discharge_w,
                }
            }
            None => {
                // net exchange of everything else last step; cancel it
                let meter = ctx
                    .meter
                    .map_or(0.0, |m| m.get(AncillaryCommodity::ActivePowerExternal));
                -(meter - self.last_power)
            }
        }
    }
}

impl PartRun for BatteryRun {
    fn step(
        &mut self,
        ctx: &StepContext<'_>,
        out: &mut LimitedCommodityStateMap,
    ) -> Result<PartStep, ProblemPartError> {
        let setpoint = self.setpoint(ctx);
        let power = self.cell.apply(setpoint, ctx.dt_hours());
        self.last_power = power;
        out.set_power(Commodity::ActivePower, power);
        let throughput_kwh = power.abs() * ctx.step_size as f64 / WS_PER_KWH;
        Ok(PartStep {
            cost: throughput_kwh * self.wear_cost_per_kwh,
            infeasible: false,
        })
    }
}
