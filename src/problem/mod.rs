//! Device-side optimization interface.
//!
//! A [`ProblemPart`] is what each device contributes to a scheduling cycle:
//! its identity, time frame, capabilities and a [`DeviceStrategy`] that does
//! the device-specific work. The simulation core drives parts through
//! `Created -> Initialized -> Stepping -> Finalized` once per candidate.

pub mod codec;
pub mod strategy;

pub use codec::{DecisionVariables, SegmentCodec, StorageMode};
pub use strategy::{Capabilities, DeviceStrategy, PartRun, PartStep, PartWindow, StepContext};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::commodity::{Commodity, CommodityStateMap, LimitedCommodityStateMap};
use crate::error::ProblemPartError;
use crate::profile::{LoadProfile, Schedule};
use crate::sim::clock::step_width;
use crate::sim::meter::AncillaryMeterState;

/// Identifier of a device in the registry; its ordering fixes the layout
/// of solution encodings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lifecycle position of a part within one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartState {
    Created,
    Initialized,
    Stepping,
    Finalized,
}

impl PartState {
    fn label(self) -> &'static str {
        match self {
            PartState::Created => "created",
            PartState::Initialized => "initialized",
            PartState::Stepping => "stepping",
            PartState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for PartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Records part outputs as a sparse profile, writing only on change.
#[derive(Debug, Default)]
struct ProfileRecorder {
    profile: LoadProfile,
    last: [Option<f64>; Commodity::ALL.len()],
}

impl ProfileRecorder {
    fn reset(&mut self, end_time: i64) {
        self.profile = LoadProfile::new(end_time);
        self.last = [None; Commodity::ALL.len()];
    }

    fn record(&mut self, commodity: Commodity, t: i64, value: f64) -> Result<(), ProblemPartError> {
        let slot = &mut self.last[commodity.index()];
        if *slot != Some(value) {
            self.profile.set_load(commodity, t, value)?;
            *slot = Some(value);
        }
        Ok(())
    }
}

/// One device's contribution to a scheduling cycle.
///
/// Profiles recorded during a run are relative to `reference_time`.
pub struct ProblemPart {
    device_id: DeviceId,
    reference_time: i64,
    horizon: i64,
    strategy: Arc<dyn DeviceStrategy>,
    codec: SegmentCodec,
    state: PartState,
    run: Option<Box<dyn PartRun>>,
    cursor: i64,
    step_size: i64,
    /// End of the current run; the last step is clipped to it.
    run_end: i64,
    inputs: LimitedCommodityStateMap,
    outputs: LimitedCommodityStateMap,
    recorder: ProfileRecorder,
    cost: f64,
    infeasible: bool,
}

impl fmt::Debug for ProblemPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProblemPart")
            .field("device_id", &self.device_id)
            .field("kind", &self.strategy.kind())
            .field("reference_time", &self.reference_time)
            .field("horizon", &self.horizon)
            .field("state", &self.state)
            .field("cursor", &self.cursor)
            .field("cost", &self.cost)
            .finish()
    }
}

impl Clone for ProblemPart {
    /// Clones the definition only; the copy starts in `Created`.
    fn clone(&self) -> Self {
        self.fresh()
    }
}

impl ProblemPart {
    /// Creates a part in the `Created` state.
    ///
    /// # Arguments
    ///
    /// * `device_id` - Registry key of the owning device
    /// * `reference_time` - Absolute time the part's plan starts at (seconds)
    /// * `horizon` - Absolute end of the part's planning interest (seconds)
    /// * `strategy` - Device behaviour for this cycle
    ///
    /// # Errors
    ///
    /// Returns `ProblemPartError::Model` if `horizon <= reference_time`.
    pub fn new(
        device_id: DeviceId,
        reference_time: i64,
        horizon: i64,
        strategy: Arc<dyn DeviceStrategy>,
    ) -> Result<Self, ProblemPartError> {
        if horizon <= reference_time {
            return Err(ProblemPartError::Model {
                device: device_id.to_string(),
                message: format!("horizon {horizon}s must be after reference time {reference_time}s"),
            });
        }
        let codec = strategy.codec();
        Ok(Self {
            device_id,
            reference_time,
            horizon,
            strategy,
            codec,
            state: PartState::Created,
            run: None,
            cursor: reference_time,
            step_size: 0,
            run_end: horizon,
            inputs: LimitedCommodityStateMap::new(),
            outputs: LimitedCommodityStateMap::new(),
            recorder: ProfileRecorder::default(),
            cost: 0.0,
            infeasible: false,
        })
    }

    /// A copy of the definition in the `Created` state.
    pub fn fresh(&self) -> Self {
        Self {
            device_id: self.device_id.clone(),
            reference_time: self.reference_time,
            horizon: self.horizon,
            strategy: Arc::clone(&self.strategy),
            codec: self.codec,
            state: PartState::Created,
            run: None,
            cursor: self.reference_time,
            step_size: 0,
            run_end: self.horizon,
            inputs: LimitedCommodityStateMap::new(),
            outputs: LimitedCommodityStateMap::new(),
            recorder: ProfileRecorder::default(),
            cost: 0.0,
            infeasible: false,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn kind(&self) -> &'static str {
        self.strategy.kind()
    }

    pub fn reference_time(&self) -> i64 {
        self.reference_time
    }

    pub fn horizon(&self) -> i64 {
        self.horizon
    }

    pub fn capabilities(&self) -> Capabilities {
        self.strategy.capabilities()
    }

    pub fn is_controllable(&self) -> bool {
        self.capabilities().controllable
    }

    pub fn needs_ancillary_meter_state(&self) -> bool {
        self.capabilities().needs_ancillary_meter_state
    }

    pub fn reacts_to_input_states(&self) -> bool {
        self.capabilities().reacts_to_input_states
    }

    /// Number of bits this part owns in a solution encoding.
    pub fn encoded_segment_length(&self) -> usize {
        self.codec.bit_len()
    }

    pub fn codec(&self) -> SegmentCodec {
        self.codec
    }

    pub fn output_commodities(&self) -> &[Commodity] {
        self.strategy.output_commodities()
    }

    pub fn input_commodities(&self) -> &[Commodity] {
        self.strategy.input_commodities()
    }

    pub fn state(&self) -> PartState {
        self.state
    }

    /// Accumulated device cost of the current run.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Whether any step so far reported a hard constraint breach.
    pub fn is_infeasible(&self) -> bool {
        self.infeasible
    }

    /// Decodes this part's encoding segment.
    ///
    /// # Errors
    ///
    /// Returns `SegmentLength` if `bits` does not match the segment length.
    pub fn decode(&self, bits: &[bool]) -> Result<DecisionVariables, ProblemPartError> {
        let expected = self.encoded_segment_length();
        if bits.len() != expected {
            return Err(ProblemPartError::SegmentLength {
                device: self.device_id.to_string(),
                expected,
                actual: bits.len(),
            });
        }
        Ok(self.codec.decode(bits))
    }

    fn invalid_state(&self, action: &'static str) -> ProblemPartError {
        ProblemPartError::InvalidState {
            device: self.device_id.to_string(),
            action,
            state: self.state.label(),
        }
    }

    /// Prepares a run for one candidate; allowed from any state.
    ///
    /// # Arguments
    ///
    /// * `horizon` - Absolute end of the simulation (seconds)
    /// * `bits` - This part's segment of the candidate encoding
    /// * `step_size` - Step width in seconds
    pub fn initialize_interdependent_calculation(
        &mut self,
        horizon: i64,
        bits: &[bool],
        step_size: i64,
    ) -> Result<(), ProblemPartError> {
        if step_size <= 0 || horizon <= self.reference_time {
            return Err(ProblemPartError::Model {
                device: self.device_id.to_string(),
                message: format!("invalid run window: horizon {horizon}s, step {step_size}s"),
            });
        }
        let decisions = self.decode(bits)?;
        let window = PartWindow {
            reference_time: self.reference_time,
            horizon,
            step_size,
        };
        self.run = Some(self.strategy.start(&window, &decisions)?);
        self.cursor = self.reference_time;
        self.step_size = step_size;
        self.run_end = horizon;
        self.recorder.reset(horizon - self.reference_time);
        self.cost = 0.0;
        self.infeasible = false;
        self.state = PartState::Initialized;
        Ok(())
    }

    /// States this part exposes before the first step.
    pub fn initial_state(&self) -> Result<LimitedCommodityStateMap, ProblemPartError> {
        match (&self.run, self.state) {
            (Some(run), PartState::Initialized) => Ok(run.initial_state()),
            _ => Err(self.invalid_state("report its initial state")),
        }
    }

    /// Advances the run by one step.
    ///
    /// # Arguments
    ///
    /// * `balance` - Previous step's aggregated commodity states; only the
    ///   part's input commodities are forwarded, and only if it reacts
    /// * `meter` - Previous step's meter reading; forwarded only if requested
    ///
    /// # Returns
    ///
    /// The outputs written during this step.
    pub fn calculate_next_step(
        &mut self,
        balance: &CommodityStateMap,
        meter: Option<&AncillaryMeterState>,
    ) -> Result<&LimitedCommodityStateMap, ProblemPartError> {
        if !matches!(self.state, PartState::Initialized | PartState::Stepping) {
            return Err(self.invalid_state("step"));
        }
        let caps = self.strategy.capabilities();
        if caps.reacts_to_input_states {
            balance.restrict_into(self.strategy.input_commodities(), &mut self.inputs);
        } else {
            self.inputs.clear();
        }
        let ctx = StepContext {
            time: self.cursor,
            step_size: step_width(self.cursor, self.run_end, self.step_size),
            inputs: &self.inputs,
            meter: meter.filter(|_| caps.needs_ancillary_meter_state),
        };

        self.outputs.clear();
        let Some(run) = self.run.as_mut() else {
            return Err(self.invalid_state("step"));
        };
        let step = run.step(&ctx, &mut self.outputs)?;
        if !(step.cost >= 0.0) {
            return Err(ProblemPartError::Model {
                device: self.device_id.to_string(),
                message: format!("step cost {} at {}s is negative or NaN", step.cost, self.cursor),
            });
        }
        self.cost += step.cost;
        self.infeasible |= step.infeasible;

        let rel = self.cursor - self.reference_time;
        for &commodity in self.strategy.output_commodities() {
            let power = self.outputs.power(commodity);
            self.recorder.record(commodity, rel, power)?;
        }
        self.cursor += self.step_size;
        self.state = PartState::Stepping;
        Ok(&self.outputs)
    }

    /// Closes the run and returns the schedule it produced.
    ///
    /// The profile ends where stepping stopped, which is before the horizon
    /// when the simulation terminated early.
    pub fn final_interdependent_schedule(&mut self) -> Result<Schedule, ProblemPartError> {
        if !matches!(self.state, PartState::Initialized | PartState::Stepping) {
            return Err(self.invalid_state("finalize"));
        }
        let mut profile = std::mem::take(&mut self.recorder.profile);
        profile.set_end_time(self.cursor - self.reference_time)?;
        self.run = None;
        self.state = PartState::Finalized;
        Ok(Schedule::new(
            profile,
            self.cost,
            format!("{}:{}", self.strategy.kind(), self.device_id),
        ))
    }
}
