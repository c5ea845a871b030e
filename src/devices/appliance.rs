use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DeviceModel;
use super::types::{PlanningContext, check_positive, require_positive_secs};
use crate::commodity::{Commodity, LimitedCommodityStateMap};
use crate::error::{ConfigError, ProblemPartError};
use crate::problem::{
    Capabilities, DecisionVariables, DeviceStrategy, PartRun, PartStep, PartWindow, SegmentCodec,
    StepContext,
};
use crate::profile::Schedule;

/// One phase of an appliance run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppliancePhase {
    pub duration_secs: i64,
    pub power_w: f64,
}

/// A shiftable appliance (dishwasher, washing machine) with one run per
/// window.
///
/// The optimizer picks the start time on a `start_resolution_secs` grid so
/// that the run fits in `[earliest_start, latest_end]`. Once a chosen run
/// has started it is committed and no longer optimized.
///
/// # Power Flow Convention
/// Returns **positive** values (consumption).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Appliance {
    pub id: String,
    pub phases: Vec<AppliancePhase>,
    /// Absolute seconds.
    pub earliest_start: i64,
    /// Absolute seconds; the run must end by then.
    pub latest_end: i64,
    pub start_resolution_secs: i64,
    /// Device cost per hour of delay past `earliest_start`.
    pub delay_cost_per_hour: f64,
    /// Start of a run already under way.
    #[serde(skip)]
    committed_start: Option<i64>,
    /// The run for this window has finished.
    #[serde(skip)]
    completed: bool,
}

impl Default for Appliance {
    fn default() -> Self {
        Self {
            id: "appliance".to_string(),
            phases: vec![
                AppliancePhase {
                    duration_secs: 1800,
                    power_w: 2000.0,
                },
                AppliancePhase {
                    duration_secs: 1800,
                    power_w: 150.0,
                },
            ],
            earliest_start: 0,
            latest_end: 86_400,
            start_resolution_secs: 900,
            delay_cost_per_hour: 0.0,
            committed_start: None,
            completed: false,
        }
    }
}

impl Appliance {
    /// An appliance with default resolution and no delay cost.
    pub fn new(
        id: impl Into<String>,
        phases: Vec<AppliancePhase>,
        earliest_start: i64,
        latest_end: i64,
    ) -> Self {
        Self {
            id: id.into(),
            phases,
            earliest_start,
            latest_end,
            ..Self::default()
        }
    }

    /// Total run duration in seconds.
    pub fn run_secs(&self) -> i64 {
        self.phases.iter().map(|p| p.duration_secs).sum()
    }

    pub fn committed_start(&self) -> Option<i64> {
        self.committed_start
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Start-time codec for a cycle starting at `reference_time`; `None`
    /// when nothing is left to decide.
    fn start_codec(&self, reference_time: i64) -> Option<SegmentCodec> {
        if self.completed || self.committed_start.is_some() {
            return None;
        }
        let res = self.start_resolution_secs;
        let mut earliest = self.earliest_start;
        if reference_time > earliest {
            earliest += (reference_time - earliest + res - 1) / res * res;
        }
        let latest = (self.latest_end - self.run_secs()).max(earliest);
        Some(SegmentCodec::StartTime {
            earliest,
            latest,
            resolution: res,
        })
    }
}

impl DeviceModel for Appliance {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "appliance"
    }

    fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.phases.is_empty() {
            errors.push(ConfigError::new(format!("{prefix}.phases"), "must not be empty"));
        }
        for (i, p) in self.phases.iter().enumerate() {
            check_positive(
                &mut errors,
                format!("{prefix}.phases[{i}].duration_secs"),
                p.duration_secs as f64,
            );
            if !p.power_w.is_finite() || p.power_w < 0.0 {
                errors.push(ConfigError::new(
                    format!("{prefix}.phases[{i}].power_w"),
                    "must be finite and >= 0",
                ));
            }
        }
        check_positive(
            &mut errors,
            format!("{prefix}.start_resolution_secs"),
            self.start_resolution_secs as f64,
        );
        if self.latest_end - self.earliest_start < self.run_secs() {
            errors.push(ConfigError::new(
                format!("{prefix}.latest_end"),
                format!(
                    "window [{}, {}] is shorter than the {}s run",
                    self.earliest_start,
                    self.latest_end,
                    self.run_secs()
                ),
            ));
        }
        if self.delay_cost_per_hour < 0.0 {
            errors.push(ConfigError::new(
                format!("{prefix}.delay_cost_per_hour"),
                "must be >= 0",
            ));
        }
        errors
    }

    fn strategy(&self, ctx: &PlanningContext) -> Result<Arc<dyn DeviceStrategy>, ProblemPartError> {
        require_positive_secs(&self.id, "start_resolution_secs", self.start_resolution_secs)?;
        let codec = self.start_codec(ctx.reference_time);
        let fixed_start = if self.completed {
            None
        } else {
            self.committed_start
        };
        Ok(Arc::new(ApplianceStrategy {
            id: self.id.clone(),
            phases: self.phases.clone(),
            codec,
            fixed_start,
            earliest_start: self.earliest_start,
            delay_cost_per_hour: self.delay_cost_per_hour,
        }))
    }

    fn advance(
        &mut self,
        decisions: &DecisionVariables,
        _schedule: &Schedule,
        _plan_start: i64,
        until: i64,
    ) {
        let start = match (self.committed_start, decisions) {
            (Some(start), _) => start,
            (None, DecisionVariables::StartTime { start }) => *start,
            _ => return,
        };
        if start + self.run_secs() <= until {
            debug!(device = %self.id, start, "appliance run completed");
            self.completed = true;
            self.committed_start = None;
        } else if start < until {
            debug!(device = %self.id, start, "appliance run committed");
            self.committed_start = Some(start);
        }
    }
}

#[derive(Debug)]
struct ApplianceStrategy {
    id: String,
    phases: Vec<AppliancePhase>,
    codec: Option<SegmentCodec>,
    fixed_start: Option<i64>,
    earliest_start: i64,
    delay_cost_per_hour: f64,
}

impl DeviceStrategy for ApplianceStrategy {
    fn kind(&self) -> &'static str {
        "appliance"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            controllable: self.codec.is_some_and(|c| c.bit_len() > 0),
            ..Capabilities::PASSIVE
        }
    }

    fn codec(&self) -> SegmentCodec {
        self.codec.unwrap_or(SegmentCodec::Empty)
    }

    fn output_commodities(&self) -> &[Commodity] {
        &[Commodity::ActivePower]
    }

    fn start(
        &self,
        _window: &PartWindow,
        decisions: &DecisionVariables,
    ) -> Result<Box<dyn PartRun>, ProblemPartError> {
        let start = match (decisions, self.fixed_start, self.codec) {
            (DecisionVariables::StartTime { start }, _, _) => Some(*start),
            (DecisionVariables::None, Some(fixed), _) => Some(fixed),
            // zero-bit start codec: the only position is the earliest one
            (DecisionVariables::None, None, Some(codec)) => match codec.decode(&[]) {
                DecisionVariables::StartTime { start } => Some(start),
                _ => None,
            },
            (DecisionVariables::None, None, None) => None,
            (other, _, _) => {
                return Err(ProblemPartError::Model {
                    device: self.id.clone(),
                    message: format!("appliance cannot use `{}` decisions", other.kind()),
                });
            }
        };
        let delay_cost = match (start, self.fixed_start) {
            (Some(s), None) => {
                (s - self.earliest_start).max(0) as f64 / 3600.0 * self.delay_cost_per_hour
            }
            _ => 0.0,
        };
        Ok(Box::new(ApplianceRun {
            start,
            phases: self.phases.clone(),
            delay_cost,
        }))
    }
}

struct ApplianceRun {
    start: Option<i64>,
    phases: Vec<AppliancePhase>,
    delay_cost: f64,
}

impl ApplianceRun {
    /// Energy of the run inside `[from, to)` in watt-seconds.
    fn energy(&self, start: i64, from: i64, to: i64) -> f64 {
        let mut phase_start = start;
        let mut energy = 0.0;
        for phase in &self.phases {
            let phase_end = phase_start + phase.duration_secs;
            let overlap = (to.min(phase_end) - from.max(phase_start)).max(0);
            energy += overlap as f64 * phase.power_w;
            phase_start = phase_end;
        }
        energy
    }
}

impl PartRun for ApplianceRun {
    fn step(
        &mut self,
        ctx: &StepContext<'_>,
        out: &mut LimitedCommodityStateMap,
    ) -> Result<PartStep, ProblemPartError> {
        let power = match self.start {
            Some(start) => self.energy(start, ctx.time, ctx.time + ctx.step_size) / ctx.step_size as f64,
            None => 0.0,
        };
        out.set_power(Commodity::ActivePower, power);
        // the delay cost is booked once, on the first step
        let cost = std::mem::take(&mut self.delay_cost);
        Ok(PartStep {
            cost,
            infeasible: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{CompressionPolicy, LoadProfile};

    fn ctx(reference_time: i64) -> PlanningContext {
        PlanningContext {
            reference_time,
            horizon: reference_time + 28_800,
            seed: 0,
            compression: CompressionPolicy::None,
        }
    }

    fn one_hour_run() -> Appliance {
        Appliance {
            phases: vec![AppliancePhase {
                duration_secs: 3600,
                power_w: 1200.0,
            }],
            earliest_start: 0,
            latest_end: 28_800,
            start_resolution_secs: 900,
            ..Appliance::default()
        }
    }

    fn powers(strategy: &dyn DeviceStrategy, decisions: &DecisionVariables) -> Vec<f64> {
        let window = PartWindow {
            reference_time: 0,
            horizon: 28_800,
            step_size: 900,
        };
        let mut run = strategy.start(&window, decisions).unwrap();
        let inputs = LimitedCommodityStateMap::new();
        let mut out = LimitedCommodityStateMap::new();
        (0..32)
            .map(|k| {
                let step = StepContext {
                    time: k * 900,
                    step_size: 900,
                    inputs: &inputs,
                    meter: None,
                };
                run.step(&step, &mut out).unwrap();
                out.power(Commodity::ActivePower)
            })
            .collect()
    }

    #[test]
    fn test_runs_only_inside_chosen_slot() {
        let strategy = one_hour_run().strategy(&ctx(0)).unwrap();
        let p = powers(strategy.as_ref(), &DecisionVariables::StartTime { start: 7200 });
        assert!(p[..8].iter().all(|&w| w == 0.0));
        assert!(p[8..12].iter().all(|&w| w == 1200.0));
        assert!(p[12..].iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_unaligned_start_is_averaged() {
        let app = Appliance {
            start_resolution_secs: 300,
            ..one_hour_run()
        };
        let strategy = app.strategy(&ctx(0)).unwrap();
        let p = powers(strategy.as_ref(), &DecisionVariables::StartTime { start: 600 });
        assert!((p[0] - 400.0).abs() < 1e-9);
        assert_eq!(p[1], 1200.0);
        assert!((p[4] - 800.0).abs() < 1e-9);
    }

    #[test]
    fn test_codec_window() {
        let strategy = one_hour_run().strategy(&ctx(1000)).unwrap();
        assert_eq!(
            strategy.codec(),
            SegmentCodec::StartTime {
                earliest: 1800,
                latest: 25_200,
                resolution: 900
            }
        );
        assert!(strategy.capabilities().controllable);
    }

    #[test]
    fn test_delay_cost_booked_once() {
        let app = Appliance {
            delay_cost_per_hour: 0.5,
            ..one_hour_run()
        };
        let strategy = app.strategy(&ctx(0)).unwrap();
        let window = PartWindow {
            reference_time: 0,
            horizon: 28_800,
            step_size: 900,
        };
        let mut run = strategy
            .start(&window, &DecisionVariables::StartTime { start: 7200 })
            .unwrap();
        let inputs = LimitedCommodityStateMap::new();
        let mut out = LimitedCommodityStateMap::new();
        let step = |t| StepContext {
            time: t,
            step_size: 900,
            inputs: &inputs,
            meter: None,
        };
        assert_eq!(run.step(&step(0), &mut out).unwrap().cost, 1.0);
        assert_eq!(run.step(&step(900), &mut out).unwrap().cost, 0.0);
    }

    #[test]
    fn test_advance_commits_then_completes() {
        let mut app = one_hour_run();
        let decisions = DecisionVariables::StartTime { start: 7200 };
        let schedule = Schedule::new(LoadProfile::new(28_800), 0.0, "a");
        app.advance(&decisions, &schedule, 0, 3600);
        assert_eq!(app.committed_start(), None);
        app.advance(&decisions, &schedule, 0, 9000);
        assert_eq!(app.committed_start(), Some(7200));
        let strategy = app.strategy(&ctx(9000)).unwrap();
        assert_eq!(strategy.codec(), SegmentCodec::Empty);
        assert!(!strategy.capabilities().controllable);

        app.advance(&DecisionVariables::None, &schedule, 9000, 12_000);
        assert!(app.is_completed());
        let strategy = app.strategy(&ctx(12_000)).unwrap();
        let p = powers(strategy.as_ref(), &DecisionVariables::None);
        assert!(p.iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_short_window_rejected() {
        let app = Appliance {
            latest_end: 1800,
            ..one_hour_run()
        };
        assert!(app
            .validate("devices[2]")
            .iter()
            .any(|e| e.field == "devices[2].latest_end"));
    }

    #[test]
    fn test_zero_start_resolution_fails_fast() {
        let app = Appliance {
            start_resolution_secs: 0,
            ..Appliance::default()
        };
        let result = app.strategy(&ctx(100));
        assert!(matches!(
            result,
            Err(ProblemPartError::Model { ref device, .. }) if device == "appliance"
        ));
    }
}
