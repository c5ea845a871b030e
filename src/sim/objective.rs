//! Objective vector, penalty parameters, and the per-run cost ledger.

use serde::{Deserialize, Serialize};

use super::meter::AncillaryMeterState;
use super::signals::SignalSnapshot;
use crate::commodity::AncillaryCommodity;

/// Watt-seconds per kilowatt-hour.
pub const WS_PER_KWH: f64 = 3.6e6;

/// Penalty parameters applied during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PenaltySettings {
    /// Penalty per kWh of power above or below a limit signal.
    pub limit_penalty_per_kwh: f64,
    /// Excess (W) above which a limit breach terminates the run; `None`
    /// keeps all limit violations soft.
    pub hard_limit_excess_w: Option<f64>,
    /// Fixed penalty added on early termination.
    pub infeasible_base: f64,
    /// Penalty per step left unsimulated after early termination.
    pub infeasible_per_step: f64,
}

impl Default for PenaltySettings {
    fn default() -> Self {
        Self {
            limit_penalty_per_kwh: 1.0,
            hard_limit_excess_w: None,
            infeasible_base: 1.0e4,
            infeasible_per_step: 10.0,
        }
    }
}

/// Cost components of one evaluated candidate; all are minimized.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Objectives {
    /// Net energy cost (import cost minus export revenue).
    pub energy_cost: f64,
    /// Sum of device-reported costs.
    pub device_cost: f64,
    /// Penalty for soft limit violations.
    pub limit_penalty: f64,
    /// Early-termination penalty.
    pub infeasibility: f64,
}

impl Objectives {
    /// Scalar fitness: sum of every component.
    pub fn scalar(&self) -> f64 {
        self.energy_cost + self.device_cost + self.limit_penalty + self.infeasibility
    }

    /// Multi-objective axes: `[energy, device]`, each carrying the penalties.
    pub fn axes(&self) -> [f64; 2] {
        let penalties = self.limit_penalty + self.infeasibility;
        [self.energy_cost + penalties, self.device_cost + penalties]
    }

    /// Whether the run ended early.
    pub fn is_feasible(&self) -> bool {
        self.infeasibility == 0.0
    }
}

/// Accumulates energy cost and limit penalties step by step.
#[derive(Debug, Clone, Default)]
pub(crate) struct CostLedger {
    pub energy_cost: f64,
    pub limit_penalty: f64,
    pub violation_steps: usize,
    pub infeasibility: f64,
}

impl CostLedger {
    /// Books one step.
    ///
    /// # Returns
    ///
    /// `true` if a limit excess exceeded the hard threshold.
    pub fn book_step(
        &mut self,
        t: i64,
        step_size: i64,
        meter: &AncillaryMeterState,
        signals: &SignalSnapshot,
        penalties: &PenaltySettings,
    ) -> bool {
        let mut violated = false;
        let mut hard = false;
        for commodity in AncillaryCommodity::ALL {
            let power = meter.get(commodity);
            if let Some(price) = signals.price(commodity) {
                self.energy_cost += power * step_size as f64 / WS_PER_KWH * price.price_at(t, power);
            }
            if let Some(limit) = signals.limit(commodity) {
                let excess = limit.excess(t, power);
                if excess > 0.0 {
                    violated = true;
                    self.limit_penalty +=
                        excess * step_size as f64 / WS_PER_KWH * penalties.limit_penalty_per_kwh;
                    hard |= penalties.hard_limit_excess_w.is_some_and(|h| excess > h);
                }
            }
        }
        if violated {
            self.violation_steps += 1;
        }
        hard
    }

    /// Books early termination with `remaining_steps` left unsimulated.
    pub fn terminate(&mut self, remaining_steps: usize, penalties: &PenaltySettings) {
        self.infeasibility =
            penalties.infeasible_base + penalties.infeasible_per_step * remaining_steps as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commodity::{Commodity, CommodityStateMap, LimitedCommodityStateMap};
    use crate::sim::signals::{PowerLimitSignal, PriceSignal};

    fn meter(active_w: f64) -> AncillaryMeterState {
        let mut out = LimitedCommodityStateMap::new();
        out.set_power(Commodity::ActivePower, active_w);
        let mut balance = CommodityStateMap::new();
        balance.accumulate(&out);
        AncillaryMeterState::measure(&balance)
    }

    #[test]
    fn test_energy_cost_per_kwh() {
        let signals = SignalSnapshot::new().with_price(
            AncillaryCommodity::ActivePowerExternal,
            PriceSignal::flat(0.30, 0.10),
        );
        let mut ledger = CostLedger::default();
        // 1 kW for one hour
        ledger.book_step(0, 3600, &meter(1000.0), &signals, &PenaltySettings::default());
        assert!((ledger.energy_cost - 0.30).abs() < 1e-12);
        // 2 kW export for half an hour earns 1 kWh * 0.10
        ledger.book_step(3600, 1800, &meter(-2000.0), &signals, &PenaltySettings::default());
        assert!((ledger.energy_cost - 0.20).abs() < 1e-12);
    }

    #[test]
    fn test_limit_penalty_and_hard_breach() {
        let signals = SignalSnapshot::new().with_limit(
            AncillaryCommodity::ActivePowerExternal,
            PowerLimitSignal::constant(1000.0, -1000.0),
        );
        let penalties = PenaltySettings {
            limit_penalty_per_kwh: 2.0,
            hard_limit_excess_w: Some(5000.0),
            ..PenaltySettings::default()
        };
        let mut ledger = CostLedger::default();
        assert!(!ledger.book_step(0, 3600, &meter(2000.0), &signals, &penalties));
        assert!((ledger.limit_penalty - 2.0).abs() < 1e-12);
        assert_eq!(ledger.violation_steps, 1);
        assert!(ledger.book_step(3600, 3600, &meter(7000.0), &signals, &penalties));
        ledger.terminate(4, &penalties);
        assert_eq!(ledger.infeasibility, penalties.infeasible_base + 40.0);
    }

    #[test]
    fn test_objective_axes_carry_penalties() {
        let o = Objectives {
            energy_cost: 1.0,
            device_cost: 2.0,
            limit_penalty: 0.5,
            infeasibility: 0.0,
        };
        assert_eq!(o.scalar(), 3.5);
        assert_eq!(o.axes(), [1.5, 2.5]);
        assert!(o.is_feasible());
    }
}
