//! Price and power-limit signals applied to ancillary commodities.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::commodity::AncillaryCommodity;
use crate::series::SparseSeries;

/// Import and export prices over time, in currency per kWh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSignal {
    import: SparseSeries,
    export: SparseSeries,
}

impl PriceSignal {
    /// Times are absolute seconds.
    pub fn new(import: SparseSeries, export: SparseSeries) -> Self {
        Self { import, export }
    }

    /// Constant prices.
    pub fn flat(import: f64, export: f64) -> Self {
        Self {
            import: SparseSeries::from_points([(0, import)], 1).unwrap_or_default(),
            export: SparseSeries::from_points([(0, export)], 1).unwrap_or_default(),
        }
    }

    /// Price applicable to `power` at time `t`: the import price for
    /// consumption, the export price for production.
    pub fn price_at(&self, t: i64, power: f64) -> f64 {
        if power >= 0.0 {
            self.import.value_at(t)
        } else {
            self.export.value_at(t)
        }
    }

    pub fn import(&self) -> &SparseSeries {
        &self.import
    }

    pub fn export(&self) -> &SparseSeries {
        &self.export
    }
}

/// Upper and lower bounds on net exchange, in watts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerLimitSignal {
    upper: SparseSeries,
    lower: SparseSeries,
}

impl PowerLimitSignal {
    /// Times are absolute seconds. `lower` is usually negative (export cap).
    pub fn new(upper: SparseSeries, lower: SparseSeries) -> Self {
        Self { upper, lower }
    }

    /// Time-invariant limits.
    pub fn constant(upper: f64, lower: f64) -> Self {
        Self {
            upper: SparseSeries::from_points([(0, upper)], 1).unwrap_or_default(),
            lower: SparseSeries::from_points([(0, lower)], 1).unwrap_or_default(),
        }
    }

    /// Watts by which `power` leaves `[lower, upper]` at `t`; 0 when inside.
    pub fn excess(&self, t: i64, power: f64) -> f64 {
        let upper = self.upper.value_at(t);
        let lower = self.lower.value_at(t);
        if power > upper {
            power - upper
        } else if power < lower {
            lower - power
        } else {
            0.0
        }
    }
}

/// Signals in force for one optimization run.
///
/// Shared as an `Arc` and replaced wholesale; a run captures the current
/// snapshot once and never observes later updates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalSnapshot {
    prices: BTreeMap<AncillaryCommodity, PriceSignal>,
    limits: BTreeMap<AncillaryCommodity, PowerLimitSignal>,
}

impl SignalSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, commodity: AncillaryCommodity, price: PriceSignal) -> Self {
        self.prices.insert(commodity, price);
        self
    }

    pub fn with_limit(mut self, commodity: AncillaryCommodity, limit: PowerLimitSignal) -> Self {
        self.limits.insert(commodity, limit);
        self
    }

    pub fn price(&self, commodity: AncillaryCommodity) -> Option<&PriceSignal> {
        self.prices.get(&commodity)
    }

    pub fn limit(&self, commodity: AncillaryCommodity) -> Option<&PowerLimitSignal> {
        self.limits.get(&commodity)
    }
}
