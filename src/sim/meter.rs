//! Ancillary meter: converts per-commodity balances into market-facing quantities.

use crate::commodity::{AncillaryCommodity, Commodity, CommodityStateMap};

/// Net exchange of every ancillary commodity for one step.
///
/// Net convention as on a feeder:
/// - Positive values are import (consumption from the grid)
/// - Negative values are export (generation into the grid)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AncillaryMeterState {
    values: [f64; AncillaryCommodity::ALL.len()],
}

impl AncillaryMeterState {
    /// Reads the meter from a step's commodity balance.
    pub fn measure(balance: &CommodityStateMap) -> Self {
        let mut state = Self::default();
        for commodity in Commodity::ALL {
            if let Some(ancillary) = commodity.ancillary() {
                state.values[ancillary.index()] += balance.power(commodity);
            }
        }
        state
    }

    /// Net power of `commodity` in watts.
    pub fn get(&self, commodity: AncillaryCommodity) -> f64 {
        self.values[commodity.index()]
    }

    /// Import part (`>= 0`) of `commodity`.
    pub fn import(&self, commodity: AncillaryCommodity) -> f64 {
        self.get(commodity).max(0.0)
    }

    /// Export magnitude (`>= 0`) of `commodity`.
    pub fn export(&self, commodity: AncillaryCommodity) -> f64 {
        (-self.get(commodity)).max(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AncillaryCommodity, f64)> + '_ {
        AncillaryCommodity::ALL
            .into_iter()
            .map(|c| (c, self.values[c.index()]))
    }
}
