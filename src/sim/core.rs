//! Interdependent simulation of every problem part for one candidate encoding.

use std::sync::Arc;

use tracing::trace;

use super::clock::{Clock, step_count};
use super::meter::AncillaryMeterState;
use super::objective::{CostLedger, Objectives, PenaltySettings};
use super::signals::SignalSnapshot;
use crate::commodity::{AncillaryCommodity, CommodityStateMap};
use crate::error::SimulationError;
use crate::ga::encoding::{BitString, SegmentLayout};
use crate::ga::{Fitness, Problem};
use crate::problem::{DeviceId, ProblemPart};
use crate::profile::Schedule;
use crate::series::{DenseSeries, TimeSeries};

/// Time frame and penalties of a simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    /// First step, absolute seconds.
    pub reference_time: i64,
    /// End of the run, absolute seconds (exclusive).
    pub horizon: i64,
    /// Step width in seconds.
    pub step_size: i64,
    pub penalties: PenaltySettings,
}

/// Per-step net exchange of each ancillary commodity.
///
/// Cell `i` covers `[reference_time + i*step, reference_time + (i+1)*step)`.
#[derive(Debug, Clone, PartialEq)]
pub struct AncillaryBalances {
    series: [DenseSeries; AncillaryCommodity::ALL.len()],
    reference_time: i64,
}

impl AncillaryBalances {
    fn new(steps: usize, step_size: i64, reference_time: i64) -> Self {
        Self {
            series: std::array::from_fn(|_| DenseSeries::zeros(steps, step_size)),
            reference_time,
        }
    }

    fn record(&mut self, t: i64, meter: &AncillaryMeterState) -> Result<(), SimulationError> {
        for (commodity, value) in meter.iter() {
            self.series[commodity.index()].set(t - self.reference_time, value)?;
        }
        Ok(())
    }

    /// Balance series of `commodity`, relative to the reference time.
    pub fn series(&self, commodity: AncillaryCommodity) -> &DenseSeries {
        &self.series[commodity.index()]
    }

    pub fn reference_time(&self) -> i64 {
        self.reference_time
    }
}

/// Outcome of evaluating one encoding.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub objectives: Objectives,
    /// Schedules in layout order.
    pub schedules: Vec<(DeviceId, Schedule)>,
    pub balances: AncillaryBalances,
    /// Steps with at least one limit violation.
    pub violation_steps: usize,
    /// Steps actually simulated.
    pub steps: usize,
    /// Start of the step at which a hard breach ended the run.
    pub terminated_at: Option<i64>,
}

/// Drives fresh copies of every part from the reference time to the horizon.
///
/// Holds only immutable templates and a signal snapshot, so one core can
/// evaluate many candidates concurrently.
#[derive(Debug)]
pub struct SimulationCore {
    parts: Vec<ProblemPart>,
    layout: SegmentLayout,
    signals: Arc<SignalSnapshot>,
    settings: SimulationSettings,
}

impl SimulationCore {
    /// Creates a core over `parts`, ordering them by device id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidWindow` for a non-positive step or empty window, and
    /// `MisalignedPart` if a part does not start at the reference time.
    pub fn new(
        mut parts: Vec<ProblemPart>,
        signals: Arc<SignalSnapshot>,
        settings: SimulationSettings,
    ) -> Result<Self, SimulationError> {
        if settings.step_size <= 0 || settings.horizon <= settings.reference_time {
            return Err(SimulationError::InvalidWindow {
                reference_time: settings.reference_time,
                horizon: settings.horizon,
                step_size: settings.step_size,
            });
        }
        if let Some(part) = parts
            .iter()
            .find(|p| p.reference_time() != settings.reference_time)
        {
            return Err(SimulationError::MisalignedPart {
                device: part.device_id().to_string(),
                part_reference: part.reference_time(),
                reference_time: settings.reference_time,
            });
        }
        parts.sort_by(|a, b| a.device_id().cmp(b.device_id()));
        let layout = SegmentLayout::for_parts(&parts);
        Ok(Self {
            parts,
            layout,
            signals,
            settings,
        })
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn signals(&self) -> &Arc<SignalSnapshot> {
        &self.signals
    }

    /// Part templates in layout order.
    pub fn parts(&self) -> &[ProblemPart] {
        &self.parts
    }

    /// Simulates one candidate encoding.
    ///
    /// Each step, reacting parts see the previous step's aggregated states
    /// (initial states on the first step) and meter-reading parts see the
    /// previous step's meter. A part reporting infeasibility, or a limit
    /// excess above the hard threshold, ends the run early with an
    /// infeasibility penalty.
    ///
    /// # Errors
    ///
    /// Returns a `SimulationError` for a wrong encoding length or a part
    /// failure. Infeasibility is never an error.
    pub fn evaluate(&self, encoding: &BitString) -> Result<Evaluation, SimulationError> {
        if encoding.len() != self.layout.total_len() {
            return Err(SimulationError::EncodingLength {
                expected: self.layout.total_len(),
                actual: encoding.len(),
            });
        }
        let SimulationSettings {
            reference_time,
            horizon,
            step_size,
            ref penalties,
        } = self.settings;

        let mut parts: Vec<ProblemPart> = self.parts.iter().map(ProblemPart::fresh).collect();
        for (part, (_, range)) in parts.iter_mut().zip(self.layout.segments()) {
            part.initialize_interdependent_calculation(
                horizon,
                &encoding.bits()[range],
                step_size,
            )?;
        }

        let mut previous = CommodityStateMap::new();
        for part in &parts {
            previous.accumulate(&part.initial_state()?);
        }
        let mut meter = AncillaryMeterState::default();
        let mut balances =
            AncillaryBalances::new(step_count(reference_time, horizon, step_size), step_size, reference_time);
        let mut ledger = CostLedger::default();
        let mut clock = Clock::new(reference_time, horizon, step_size);
        let mut steps = 0;
        let mut terminated_at = None;

        while let Some((t, dt)) = clock.tick_span() {
            let mut balance = CommodityStateMap::new();
            let mut infeasible = false;
            for part in parts.iter_mut() {
                let out = part.calculate_next_step(&previous, Some(&meter))?;
                balance.accumulate(out);
                infeasible |= part.is_infeasible();
            }
            meter = AncillaryMeterState::measure(&balance);
            balances.record(t, &meter)?;
            let hard = ledger.book_step(t, dt, &meter, &self.signals, penalties);
            previous = balance;
            steps += 1;

            if infeasible || hard {
                trace!(t, infeasible, hard, "terminating run early");
                ledger.terminate(clock.remaining(), penalties);
                terminated_at = Some(t);
                break;
            }
        }

        let mut schedules = Vec::with_capacity(parts.len());
        let mut device_cost = 0.0;
        for part in parts.iter_mut() {
            let schedule = part.final_interdependent_schedule()?;
            device_cost += schedule.cost();
            schedules.push((part.device_id().clone(), schedule));
        }

        Ok(Evaluation {
            objectives: Objectives {
                energy_cost: ledger.energy_cost,
                device_cost,
                limit_penalty: ledger.limit_penalty,
                infeasibility: ledger.infeasibility,
            },
            schedules,
            balances,
            violation_steps: ledger.violation_steps,
            steps,
            terminated_at,
        })
    }
}

impl Problem for SimulationCore {
    type Error = SimulationError;

    fn encoding_len(&self) -> usize {
        self.layout.total_len()
    }

    fn objective_count(&self) -> usize {
        2
    }

    fn evaluate(&self, encoding: &BitString) -> Result<Fitness, SimulationError> {
        let objectives = SimulationCore::evaluate(self, encoding)?.objectives;
        Ok(Fitness {
            objectives: objectives.axes().to_vec(),
            scalar: objectives.scalar(),
        })
    }
}
