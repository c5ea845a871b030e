//! Per-device behaviour plugged into a [`ProblemPart`](super::ProblemPart).

use std::fmt;

use super::codec::{DecisionVariables, SegmentCodec};
use crate::commodity::{Commodity, LimitedCommodityStateMap};
use crate::error::ProblemPartError;
use crate::sim::meter::AncillaryMeterState;

/// The closed set of behaviours a part can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Owns a non-empty encoding segment.
    pub controllable: bool,
    /// Receives the previous step's ancillary meter state.
    pub needs_ancillary_meter_state: bool,
    /// Receives the previous step's commodity states for its input commodities.
    pub reacts_to_input_states: bool,
}

impl Capabilities {
    /// Exogenous output, nothing to decide.
    pub const PASSIVE: Capabilities = Capabilities {
        controllable: false,
        needs_ancillary_meter_state: false,
        reacts_to_input_states: false,
    };
}

/// Time frame handed to a strategy when a run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartWindow {
    /// First simulated step, absolute seconds.
    pub reference_time: i64,
    /// End of the simulation, absolute seconds (exclusive).
    pub horizon: i64,
    /// Step width in seconds.
    pub step_size: i64,
}

/// Inputs of a single step.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Start of the step, absolute seconds.
    pub time: i64,
    pub step_size: i64,
    /// Previous step's states of the part's input commodities; empty unless
    /// the part reacts to inputs.
    pub inputs: &'a LimitedCommodityStateMap,
    /// Previous step's meter reading; `None` unless requested.
    pub meter: Option<&'a AncillaryMeterState>,
}

impl StepContext<'_> {
    /// Step duration in hours.
    pub fn dt_hours(&self) -> f64 {
        self.step_size as f64 / 3600.0
    }
}

/// Result of one step besides the written outputs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PartStep {
    /// Cost incurred during the step; must be `>= 0`.
    pub cost: f64,
    /// A hard physical constraint was breached.
    pub infeasible: bool,
}

/// Stateless, shareable description of a device for one scheduling cycle.
///
/// A strategy is built once per cycle from the device's observed state and
/// then started many times, once per candidate evaluation.
pub trait DeviceStrategy: fmt::Debug + Send + Sync {
    /// Short device type name, e.g. `"battery"`.
    fn kind(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Bit layout of the decision segment.
    fn codec(&self) -> SegmentCodec {
        SegmentCodec::Empty
    }

    /// Commodities written on every step.
    fn output_commodities(&self) -> &[Commodity];

    /// Commodities whose aggregated state is fed back when
    /// `reacts_to_input_states` is set.
    fn input_commodities(&self) -> &[Commodity] {
        &[]
    }

    /// Starts a run for one candidate.
    fn start(
        &self,
        window: &PartWindow,
        decisions: &DecisionVariables,
    ) -> Result<Box<dyn PartRun>, ProblemPartError>;
}

/// Mutable state of a strategy during one candidate evaluation.
pub trait PartRun: Send + Sync {
    /// States visible to other parts before the first step.
    fn initial_state(&self) -> LimitedCommodityStateMap {
        LimitedCommodityStateMap::new()
    }

    /// Computes one step, writing the part's outputs into `out`.
    fn step(
        &mut self,
        ctx: &StepContext<'_>,
        out: &mut LimitedCommodityStateMap,
    ) -> Result<PartStep, ProblemPartError>;
}
