use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::DeviceModel;
use super::types::{PlanningContext, check_positive, require_positive_secs};
use crate::commodity::{Commodity, LimitedCommodityStateMap};
use crate::error::{ConfigError, ProblemPartError};
use crate::problem::{
    Capabilities, DecisionVariables, DeviceStrategy, PartRun, PartStep, PartWindow, SegmentCodec,
    StepContext,
};

/// Combined heat and power unit feeding the hot-water tank.
///
/// The optimizer requests on/off per slot. The unit overrides the request
/// to honour its minimum runtime, to switch on when the tank temperature
/// falls below `force_on_below_c`, and to switch off above
/// `force_off_above_c`.
///
/// # Power Flow Convention
/// Electrical and thermal outputs are **negative** (production); gas input
/// is **positive**.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Chp {
    pub id: String,
    pub electrical_w: f64,
    pub thermal_w: f64,
    pub gas_w: f64,
    /// Width of one decision slot in seconds.
    pub slot_secs: i64,
    pub min_runtime_secs: i64,
    /// Device cost booked on every start.
    pub start_cost: f64,
    pub force_on_below_c: f64,
    pub force_off_above_c: f64,
    /// Unit is running when the cycle starts.
    pub initially_on: bool,
}

impl Default for Chp {
    fn default() -> Self {
        Self {
            id: "chp".to_string(),
            electrical_w: 1000.0,
            thermal_w: 2500.0,
            gas_w: 4000.0,
            slot_secs: 900,
            min_runtime_secs: 1800,
            start_cost: 0.05,
            force_on_below_c: 45.0,
            force_off_above_c: 80.0,
            initially_on: false,
        }
    }
}

impl DeviceModel for Chp {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "chp"
    }

    fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        check_positive(&mut errors, format!("{prefix}.electrical_w"), self.electrical_w);
        check_positive(&mut errors, format!("{prefix}.thermal_w"), self.thermal_w);
        check_positive(&mut errors, format!("{prefix}.gas_w"), self.gas_w);
        check_positive(&mut errors, format!("{prefix}.slot_secs"), self.slot_secs as f64);
        if self.min_runtime_secs < 0 {
            errors.push(ConfigError::new(format!("{prefix}.min_runtime_secs"), "must be >= 0"));
        }
        if self.start_cost < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.start_cost"), "must be >= 0"));
        }
        if self.force_off_above_c <= self.force_on_below_c {
            errors.push(ConfigError::new(
                format!("{prefix}.force_off_above_c"),
                format!("must be above force_on_below_c ({})", self.force_on_below_c),
            ));
        }
        errors
    }

    fn strategy(&self, ctx: &PlanningContext) -> Result<Arc<dyn DeviceStrategy>, ProblemPartError> {
        require_positive_secs(&self.id, "slot_secs", self.slot_secs)?;
        Ok(Arc::new(ChpStrategy {
            params: self.clone(),
            slots: ctx.slots(self.slot_secs),
        }))
    }
}

#[derive(Debug)]
struct ChpStrategy {
    params: Chp,
    slots: usize,
}

impl DeviceStrategy for ChpStrategy {
    fn kind(&self) -> &'static str {
        "chp"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            controllable: self.slots > 0,
            needs_ancillary_meter_state: false,
            reacts_to_input_states: true,
        }
    }

    fn codec(&self) -> SegmentCodec {
        SegmentCodec::SlotFlags { slots: self.slots }
    }

    fn output_commodities(&self) -> &[Commodity] {
        &[
            Commodity::ActivePower,
            Commodity::NaturalGasPower,
            Commodity::HeatingHotWaterPower,
        ]
    }

    fn input_commodities(&self) -> &[Commodity] {
        &[Commodity::HeatingHotWaterPower]
    }

    fn start(
        &self,
        window: &PartWindow,
        decisions: &DecisionVariables,
    ) -> Result<Box<dyn PartRun>, ProblemPartError> {
        let flags = match decisions {
            DecisionVariables::SlotFlags { flags } => flags.clone(),
            DecisionVariables::None if self.slots == 0 => Vec::new(),
            other => {
                return Err(ProblemPartError::Model {
                    device: self.params.id.clone(),
                    message: format!("CHP cannot use `{}` decisions", other.kind()),
                });
            }
        };
        Ok(Box::new(ChpRun {
            params: self.params.clone(),
            reference_time: window.reference_time,
            flags,
            on: self.params.initially_on,
            // a unit already running counts as past its minimum runtime
            running_secs: if self.params.initially_on {
                self.params.min_runtime_secs
            } else {
                0
            },
        }))
    }
}

struct ChpRun {
    params: Chp,
    reference_time: i64,
    flags: Vec<bool>,
    on: bool,
    running_secs: i64,
}

impl ChpRun {
    fn requested(&self, t: i64) -> bool {
        let slot = ((t - self.reference_time) / self.params.slot_secs) as usize;
        self.flags.get(slot).copied().unwrap_or(false)
    }
}

impl PartRun for ChpRun {
    fn step(
        &mut self,
        ctx: &StepContext<'_>,
        out: &mut LimitedCommodityStateMap,
    ) -> Result<PartStep, ProblemPartError> {
        let p = &self.params;
        let temperature = ctx.inputs.temperature(Commodity::HeatingHotWaterPower);
        let mut want = self.requested(ctx.time);
        if self.on && self.running_secs < p.min_runtime_secs {
            want = true;
        }
        match temperature {
            Some(temp) if temp < p.force_on_below_c => want = true,
            Some(temp) if temp > p.force_off_above_c => want = false,
            _ => {}
        }

        let mut cost = 0.0;
        if want && !self.on {
            cost = p.start_cost;
            self.running_secs = 0;
        }
        self.on = want;
        if self.on {
            self.running_secs += ctx.step_size;
        }

        let scale = if self.on { 1.0 } else { 0.0 };
        out.set_power(Commodity::ActivePower, -p.electrical_w * scale);
        out.set_power(Commodity::HeatingHotWaterPower, -p.thermal_w * scale);
        out.set_power(Commodity::NaturalGasPower, p.gas_w * scale);
        Ok(PartStep {
            cost,
            infeasible: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::CompressionPolicy;

    fn run_with(chp: &Chp, flags: Vec<bool>, temps: &[Option<f64>]) -> (Vec<bool>, f64) {
        let ctx = PlanningContext {
            reference_time: 0,
            horizon: temps.len() as i64 * 900,
            seed: 0,
            compression: CompressionPolicy::None,
        };
        let strategy = chp.strategy(&ctx).unwrap();
        let window = PartWindow {
            reference_time: 0,
            horizon: ctx.horizon,
            step_size: 900,
        };
        let mut run = strategy
            .start(&window, &DecisionVariables::SlotFlags { flags })
            .unwrap();
        let mut out = LimitedCommodityStateMap::new();
        let mut on = Vec::new();
        let mut cost = 0.0;
        for (k, temp) in temps.iter().enumerate() {
            let mut inputs = LimitedCommodityStateMap::new();
            if let Some(t) = temp {
                inputs.set_temperature(Commodity::HeatingHotWaterPower, *t);
            }
            let step = StepContext {
                time: k as i64 * 900,
                step_size: 900,
                inputs: &inputs,
                meter: None,
            };
            cost += run.step(&step, &mut out).unwrap().cost;
            on.push(out.power(Commodity::ActivePower) < 0.0);
        }
        (on, cost)
    }

    #[test]
    fn test_follows_flags_with_start_cost() {
        let chp = Chp {
            min_runtime_secs: 0,
            ..Chp::default()
        };
        let (on, cost) = run_with(&chp, vec![true, false, true, true], &[Some(60.0); 4]);
        assert_eq!(on, vec![true, false, true, true]);
        assert!((cost - 2.0 * chp.start_cost).abs() < 1e-12);
    }

    #[test]
    fn test_minimum_runtime_extends_run() {
        let chp = Chp {
            min_runtime_secs: 2700,
            ..Chp::default()
        };
        let (on, _) = run_with(&chp, vec![true, false, false, false], &[Some(60.0); 4]);
        assert_eq!(on, vec![true, true, true, false]);
    }

    #[test]
    fn test_tank_temperature_forces_state() {
        let chp = Chp::default();
        let (on, _) = run_with(
            &chp,
            vec![false, true, false],
            &[Some(40.0), Some(85.0), None],
        );
        assert_eq!(on, vec![true, false, false]);
    }

    #[test]
    fn test_slot_count_from_horizon() {
        let chp = Chp::default();
        let ctx = PlanningContext {
            reference_time: 0,
            horizon: 3600,
            seed: 0,
            compression: CompressionPolicy::None,
        };
        let strategy = chp.strategy(&ctx).unwrap();
        assert_eq!(strategy.codec().bit_len(), 4);
        assert!(strategy.capabilities().reacts_to_input_states);
    }

    #[test]
    fn test_zero_slot_width_fails_fast() {
        let chp = Chp {
            slot_secs: 0,
            ..Chp::default()
        };
        let ctx = PlanningContext {
            reference_time: 0,
            horizon: 3600,
            seed: 0,
            compression: CompressionPolicy::None,
        };
        assert!(matches!(
            chp.strategy(&ctx),
            Err(ProblemPartError::Model { .. })
        ));
    }
}
