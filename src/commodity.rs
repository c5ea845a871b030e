//! Commodities exchanged between devices and the per-step state maps that carry them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A physical flow type exchanged between devices.
///
/// Sign convention: positive values are consumption, negative values are
/// production (the same convention as a feeder meter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Commodity {
    ActivePower,
    ReactivePower,
    NaturalGasPower,
    HeatingHotWaterPower,
    DomesticHotWaterPower,
    ColdWaterPower,
}

impl Commodity {
    /// Every commodity, in index order.
    pub const ALL: [Commodity; 6] = [
        Commodity::ActivePower,
        Commodity::ReactivePower,
        Commodity::NaturalGasPower,
        Commodity::HeatingHotWaterPower,
        Commodity::DomesticHotWaterPower,
        Commodity::ColdWaterPower,
    ];

    /// Dense index used by fixed-size state arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The market-facing aggregate this commodity is metered into, if any.
    ///
    /// Thermal flows stay inside the building and are balanced by storage.
    pub const fn ancillary(self) -> Option<AncillaryCommodity> {
        match self {
            Commodity::ActivePower => Some(AncillaryCommodity::ActivePowerExternal),
            Commodity::ReactivePower => Some(AncillaryCommodity::ReactivePowerExternal),
            Commodity::NaturalGasPower => Some(AncillaryCommodity::NaturalGasPowerExternal),
            Commodity::HeatingHotWaterPower
            | Commodity::DomesticHotWaterPower
            | Commodity::ColdWaterPower => None,
        }
    }

    /// Short snake-case label used in exports.
    pub const fn label(self) -> &'static str {
        match self {
            Commodity::ActivePower => "active_power",
            Commodity::ReactivePower => "reactive_power",
            Commodity::NaturalGasPower => "natural_gas_power",
            Commodity::HeatingHotWaterPower => "heating_hot_water_power",
            Commodity::DomesticHotWaterPower => "domestic_hot_water_power",
            Commodity::ColdWaterPower => "cold_water_power",
        }
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A market-facing aggregate quantity governed by price and power-limit signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncillaryCommodity {
    ActivePowerExternal,
    ReactivePowerExternal,
    NaturalGasPowerExternal,
}

impl AncillaryCommodity {
    /// Every ancillary commodity, in index order.
    pub const ALL: [AncillaryCommodity; 3] = [
        AncillaryCommodity::ActivePowerExternal,
        AncillaryCommodity::ReactivePowerExternal,
        AncillaryCommodity::NaturalGasPowerExternal,
    ];

    /// Dense index used by fixed-size meter arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short snake-case label used in exports.
    pub const fn label(self) -> &'static str {
        match self {
            AncillaryCommodity::ActivePowerExternal => "active_power_external",
            AncillaryCommodity::ReactivePowerExternal => "reactive_power_external",
            AncillaryCommodity::NaturalGasPowerExternal => "natural_gas_power_external",
        }
    }
}

impl fmt::Display for AncillaryCommodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// State of one commodity flow during a step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CommodityState {
    /// Power in watts (positive = consumption).
    pub power: f64,
    /// Temperature in degrees Celsius, published by thermal storage.
    pub temperature: Option<f64>,
}

/// One time-slice of commodity states exchanged between a problem part and
/// the simulation core.
///
/// Only holds the commodities relevant to the part that produced or receives
/// it, so it stays small and cheap to clear between steps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LimitedCommodityStateMap {
    entries: Vec<(Commodity, CommodityState)>,
}

impl LimitedCommodityStateMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, commodity: Commodity) -> &mut CommodityState {
        let pos = match self.entries.binary_search_by_key(&commodity, |(c, _)| *c) {
            Ok(pos) => pos,
            Err(pos) => {
                self.entries
                    .insert(pos, (commodity, CommodityState::default()));
                pos
            }
        };
        &mut self.entries[pos].1
    }

    /// Sets the power of `commodity`, keeping any published temperature.
    pub fn set_power(&mut self, commodity: Commodity, power: f64) {
        self.slot(commodity).power = power;
    }

    /// Publishes the temperature of `commodity`.
    pub fn set_temperature(&mut self, commodity: Commodity, temperature: f64) {
        self.slot(commodity).temperature = Some(temperature);
    }

    /// Replaces the full state of `commodity`.
    pub fn set(&mut self, commodity: Commodity, state: CommodityState) {
        *self.slot(commodity) = state;
    }

    /// Returns the state of `commodity` if present.
    pub fn get(&self, commodity: Commodity) -> Option<&CommodityState> {
        self.entries
            .binary_search_by_key(&commodity, |(c, _)| *c)
            .ok()
            .map(|pos| &self.entries[pos].1)
    }

    /// Power of `commodity`, or 0 when absent.
    pub fn power(&self, commodity: Commodity) -> f64 {
        self.get(commodity).map_or(0.0, |s| s.power)
    }

    /// Temperature of `commodity`, if one was published.
    pub fn temperature(&self, commodity: Commodity) -> Option<f64> {
        self.get(commodity).and_then(|s| s.temperature)
    }

    /// Iterates entries in commodity order.
    pub fn iter(&self) -> impl Iterator<Item = (Commodity, &CommodityState)> {
        self.entries.iter().map(|(c, s)| (*c, s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// System-wide balance of every commodity for one step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommodityStateMap {
    states: [CommodityState; Commodity::ALL.len()],
}

impl CommodityStateMap {
    /// Creates an all-zero balance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a part's output: powers are summed, published temperatures
    /// overwrite the current one.
    pub fn accumulate(&mut self, output: &LimitedCommodityStateMap) {
        for (commodity, state) in output.iter() {
            let slot = &mut self.states[commodity.index()];
            slot.power += state.power;
            if state.temperature.is_some() {
                slot.temperature = state.temperature;
            }
        }
    }

    pub fn power(&self, commodity: Commodity) -> f64 {
        self.states[commodity.index()].power
    }

    pub fn temperature(&self, commodity: Commodity) -> Option<f64> {
        self.states[commodity.index()].temperature
    }

    pub fn state(&self, commodity: Commodity) -> CommodityState {
        self.states[commodity.index()]
    }

    /// Copies the listed commodities into `target`, replacing its contents.
    pub fn restrict_into(&self, commodities: &[Commodity], target: &mut LimitedCommodityStateMap) {
        target.clear();
        for &commodity in commodities {
            target.set(commodity, self.state(commodity));
        }
    }
}
