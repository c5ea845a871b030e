use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::DeviceModel;
use super::types::{PlanningContext, check_positive, check_range};
use crate::commodity::{Commodity, LimitedCommodityStateMap};
use crate::error::{ConfigError, ProblemPartError};
use crate::problem::{
    Capabilities, DecisionVariables, DeviceStrategy, PartRun, PartStep, PartWindow, StepContext,
};

/// Gas boiler backing up the hot-water tank with a two-point controller.
///
/// Switches on below `on_below_c` and off above `off_above_c`, reading the
/// temperature the tank published on the previous step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GasBoiler {
    pub id: String,
    pub thermal_w: f64,
    /// Thermal output per unit of gas input.
    pub efficiency: f64,
    pub on_below_c: f64,
    pub off_above_c: f64,
}

impl Default for GasBoiler {
    fn default() -> Self {
        Self {
            id: "boiler".to_string(),
            thermal_w: 8000.0,
            efficiency: 0.9,
            on_below_c: 40.0,
            off_above_c: 50.0,
        }
    }
}

impl DeviceModel for GasBoiler {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "gas_boiler"
    }

    fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        check_positive(&mut errors, format!("{prefix}.thermal_w"), self.thermal_w);
        check_range(&mut errors, format!("{prefix}.efficiency"), self.efficiency, 0.01, 1.2);
        if self.off_above_c <= self.on_below_c {
            errors.push(ConfigError::new(
                format!("{prefix}.off_above_c"),
                format!("must be above on_below_c ({})", self.on_below_c),
            ));
        }
        errors
    }

    fn strategy(&self, _ctx: &PlanningContext) -> Result<Arc<dyn DeviceStrategy>, ProblemPartError> {
        Ok(Arc::new(self.clone()))
    }
}

impl DeviceStrategy for GasBoiler {
    fn kind(&self) -> &'static str {
        "gas_boiler"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reacts_to_input_states: true,
            ..Capabilities::PASSIVE
        }
    }

    fn output_commodities(&self) -> &[Commodity] {
        &[Commodity::NaturalGasPower, Commodity::HeatingHotWaterPower]
    }

    fn input_commodities(&self) -> &[Commodity] {
        &[Commodity::HeatingHotWaterPower]
    }

    fn start(
        &self,
        _window: &PartWindow,
        _decisions: &DecisionVariables,
    ) -> Result<Box<dyn PartRun>, ProblemPartError> {
        Ok(Box::new(BoilerRun {
            params: self.clone(),
            on: false,
        }))
    }
}

struct BoilerRun {
    params: GasBoiler,
    on: bool,
}

impl PartRun for BoilerRun {
    fn step(
        &mut self,
        ctx: &StepContext<'_>,
        out: &mut LimitedCommodityStateMap,
    ) -> Result<PartStep, ProblemPartError> {
        let p = &self.params;
        match ctx.inputs.temperature(Commodity::HeatingHotWaterPower) {
            Some(t) if t < p.on_below_c => self.on = true,
            Some(t) if t > p.off_above_c => self.on = false,
            // no tank published a temperature: nothing to control
            None => self.on = false,
            _ => {}
        }
        let thermal = if self.on { p.thermal_w } else { 0.0 };
        out.set_power(Commodity::HeatingHotWaterPower, -thermal);
        out.set_power(Commodity::NaturalGasPower, thermal / p.efficiency);
        Ok(PartStep::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hysteresis() {
        let boiler = GasBoiler::default();
        let window = PartWindow {
            reference_time: 0,
            horizon: 3600,
            step_size: 600,
        };
        let mut run = boiler.start(&window, &DecisionVariables::None).unwrap();
        let mut out = LimitedCommodityStateMap::new();
        let mut states = Vec::new();
        for (k, temp) in [45.0, 39.0, 45.0, 51.0, 45.0].into_iter().enumerate() {
            let mut inputs = LimitedCommodityStateMap::new();
            inputs.set_temperature(Commodity::HeatingHotWaterPower, temp);
            let step = StepContext {
                time: k as i64 * 600,
                step_size: 600,
                inputs: &inputs,
                meter: None,
            };
            run.step(&step, &mut out).unwrap();
            states.push(out.power(Commodity::HeatingHotWaterPower) < 0.0);
        }
        assert_eq!(states, vec![false, true, true, false, false]);
        assert!((out.power(Commodity::NaturalGasPower)).abs() < 1e-12);
    }

    #[test]
    fn test_gas_input_reflects_efficiency() {
        let boiler = GasBoiler {
            thermal_w: 9000.0,
            efficiency: 0.9,
            ..GasBoiler::default()
        };
        let window = PartWindow {
            reference_time: 0,
            horizon: 600,
            step_size: 600,
        };
        let mut run = boiler.start(&window, &DecisionVariables::None).unwrap();
        let mut inputs = LimitedCommodityStateMap::new();
        inputs.set_temperature(Commodity::HeatingHotWaterPower, 20.0);
        let mut out = LimitedCommodityStateMap::new();
        let step = StepContext {
            time: 0,
            step_size: 600,
            inputs: &inputs,
            meter: None,
        };
        run.step(&step, &mut out).unwrap();
        assert!((out.power(Commodity::NaturalGasPower) - 10_000.0).abs() < 1e-9);
    }
}
