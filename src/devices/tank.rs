use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::DeviceModel;
use super::types::{PlanningContext, check_positive};
use crate::commodity::{Commodity, CommodityState, LimitedCommodityStateMap};
use crate::error::{ConfigError, ProblemPartError};
use crate::problem::{
    Capabilities, DecisionVariables, DeviceStrategy, PartRun, PartStep, PartWindow, StepContext,
};

/// Specific heat of water in J/(kg*K); one litre weighs one kilogram.
const WATER_J_PER_KG_K: f64 = 4186.0;

/// Stratification-free hot-water storage tank.
///
/// Integrates the heat balance of the previous step (heating supply,
/// domestic draw, standing losses) and publishes the resulting temperature
/// on [`Commodity::HeatingHotWaterPower`]. Temperatures below
/// `comfort_min_c` cost `comfort_cost_per_kelvin_hour`; exceeding
/// `max_temp_c` is a hard breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HotWaterTank {
    pub id: String,
    pub volume_l: f64,
    pub initial_temp_c: f64,
    pub ambient_c: f64,
    /// Standing loss in W per kelvin above ambient.
    pub loss_w_per_k: f64,
    pub comfort_min_c: f64,
    pub comfort_cost_per_kelvin_hour: f64,
    pub max_temp_c: f64,
}

impl Default for HotWaterTank {
    fn default() -> Self {
        Self {
            id: "tank".to_string(),
            volume_l: 300.0,
            initial_temp_c: 60.0,
            ambient_c: 20.0,
            loss_w_per_k: 2.0,
            comfort_min_c: 45.0,
            comfort_cost_per_kelvin_hour: 0.1,
            max_temp_c: 95.0,
        }
    }
}

impl HotWaterTank {
    /// Heat capacity in J/K.
    pub fn capacity_j_per_k(&self) -> f64 {
        self.volume_l * WATER_J_PER_KG_K
    }
}

impl DeviceModel for HotWaterTank {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "hot_water_tank"
    }

    fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        check_positive(&mut errors, format!("{prefix}.volume_l"), self.volume_l);
        if self.loss_w_per_k < 0.0 {
            errors.push(ConfigError::new(format!("{prefix}.loss_w_per_k"), "must be >= 0"));
        }
        if self.comfort_cost_per_kelvin_hour < 0.0 {
            errors.push(ConfigError::new(
                format!("{prefix}.comfort_cost_per_kelvin_hour"),
                "must be >= 0",
            ));
        }
        if self.initial_temp_c > self.max_temp_c {
            errors.push(ConfigError::new(
                format!("{prefix}.initial_temp_c"),
                format!("must not exceed max_temp_c ({})", self.max_temp_c),
            ));
        }
        if self.comfort_min_c >= self.max_temp_c {
            errors.push(ConfigError::new(
                format!("{prefix}.comfort_min_c"),
                format!("must be below max_temp_c ({})", self.max_temp_c),
            ));
        }
        errors
    }

    fn strategy(&self, _ctx: &PlanningContext) -> Result<Arc<dyn DeviceStrategy>, ProblemPartError> {
        Ok(Arc::new(self.clone()))
    }
}

impl DeviceStrategy for HotWaterTank {
    fn kind(&self) -> &'static str {
        "hot_water_tank"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            reacts_to_input_states: true,
            ..Capabilities::PASSIVE
        }
    }

    fn output_commodities(&self) -> &[Commodity] {
        &[Commodity::HeatingHotWaterPower]
    }

    fn input_commodities(&self) -> &[Commodity] {
        &[
            Commodity::HeatingHotWaterPower,
            Commodity::DomesticHotWaterPower,
        ]
    }

    fn start(
        &self,
        _window: &PartWindow,
        _decisions: &DecisionVariables,
    ) -> Result<Box<dyn PartRun>, ProblemPartError> {
        Ok(Box::new(TankRun {
            params: self.clone(),
            temperature: self.initial_temp_c,
        }))
    }
}

struct TankRun {
    params: HotWaterTank,
    temperature: f64,
}

impl PartRun for TankRun {
    fn initial_state(&self) -> LimitedCommodityStateMap {
        let mut state = LimitedCommodityStateMap::new();
        state.set_temperature(Commodity::HeatingHotWaterPower, self.temperature);
        state
    }

    fn step(
        &mut self,
        ctx: &StepContext<'_>,
        out: &mut LimitedCommodityStateMap,
    ) -> Result<PartStep, ProblemPartError> {
        let p = &self.params;
        // producers report heat as negative power, consumers as positive
        let supplied = -ctx.inputs.power(Commodity::HeatingHotWaterPower);
        let drawn = ctx.inputs.power(Commodity::DomesticHotWaterPower);
        let loss = p.loss_w_per_k * (self.temperature - p.ambient_c);
        let net_w = supplied - drawn - loss;
        self.temperature += net_w * ctx.step_size as f64 / p.capacity_j_per_k();

        out.set(
            Commodity::HeatingHotWaterPower,
            CommodityState {
                power: 0.0,
                temperature: Some(self.temperature),
            },
        );
        let shortfall = (p.comfort_min_c - self.temperature).max(0.0);
        Ok(PartStep {
            cost: shortfall * ctx.dt_hours() * p.comfort_cost_per_kelvin_hour,
            infeasible: self.temperature > p.max_temp_c,
        })
    }
}
