//! Scheduling coordinator: collects problem parts, runs the optimizer over
//! a simulation core and publishes the winning plan back to every device.

pub mod controller;
pub mod registry;
pub mod trigger;

pub use controller::{DeviceController, ModelController};
pub use registry::{DeviceSchedule, Registry, Topic};
pub use trigger::{Admission, RunGuard, TriggerGate, TriggerReason};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, unbounded};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::devices::PlanningContext;
use crate::diagnostics::{DiagnosticsSink, GenerationRecord, RunLog};
use crate::error::{ConfigError, CoordinatorError, Result};
use crate::ga::{BitString, EngineSettings, GeneticEngine, StopReason};
use crate::io::export::ExportError;
use crate::profile::CompressionPolicy;
use crate::sim::{
    AncillaryBalances, KpiReport, Objectives, PenaltySettings, SignalSnapshot, SimulationCore,
    SimulationSettings,
};

/// Timing of scheduling cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorSettings {
    /// Length of the planning window in seconds.
    pub horizon_secs: i64,
    /// Simulation step in seconds.
    pub step_size: i64,
    /// Simulated time between consecutive cycles in seconds.
    pub period_secs: i64,
    /// Seed the initial population with the previous winner.
    pub warm_start: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            horizon_secs: 86_400,
            step_size: 300,
            period_secs: 3600,
            warm_start: true,
        }
    }
}

impl CoordinatorSettings {
    /// Validates the section, prefixing field paths with `prefix`.
    pub fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.step_size <= 0 {
            errors.push(ConfigError::new(format!("{prefix}.step_size"), "must be > 0"));
        }
        if self.horizon_secs <= 0 {
            errors.push(ConfigError::new(format!("{prefix}.horizon_secs"), "must be > 0"));
        } else if self.step_size > 0 && self.horizon_secs % self.step_size != 0 {
            errors.push(ConfigError::new(
                format!("{prefix}.horizon_secs"),
                format!("must be a multiple of step_size ({})", self.step_size),
            ));
        }
        if self.period_secs <= 0 {
            errors.push(ConfigError::new(format!("{prefix}.period_secs"), "must be > 0"));
        }
        errors
    }
}

/// Summary of one scheduling cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub reference_time: i64,
    pub horizon: i64,
    pub reasons: Vec<TriggerReason>,
    /// Devices that took part.
    pub devices: usize,
    pub encoding_bits: usize,
    pub generations: usize,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    pub stop_reason: StopReason,
    /// Non-dominated candidates at the end of the run.
    pub front_size: usize,
    /// Objectives of the published plan.
    pub objectives: Objectives,
    pub kpis: KpiReport,
    /// Per-step meter balances of the published plan.
    pub balances: AncillaryBalances,
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reasons: Vec<String> = self.reasons.iter().map(ToString::to_string).collect();
        writeln!(
            f,
            "=== Cycle {} @ {}s (horizon {}s) ===",
            self.cycle, self.reference_time, self.horizon
        )?;
        writeln!(f, "Triggers:              {}", reasons.join(", "))?;
        writeln!(
            f,
            "Devices / bits:        {} / {}",
            self.devices, self.encoding_bits
        )?;
        writeln!(
            f,
            "Generations:           {} ({} evaluations, {} failed)",
            self.generations, self.evaluations, self.failed_evaluations
        )?;
        writeln!(f, "Stopped on:            {}", self.stop_reason)?;
        writeln!(f, "Pareto front size:     {}", self.front_size)?;
        writeln!(f, "Fitness:               {:.4}", self.objectives.scalar())?;
        write!(f, "{}", self.kpis)
    }
}

/// Forwards records of every run into one long-lived sink.
#[derive(Debug, Clone)]
struct SharedSink(Arc<Mutex<Box<dyn DiagnosticsSink>>>);

impl DiagnosticsSink for SharedSink {
    fn record(&mut self, record: &GenerationRecord) -> std::result::Result<(), ExportError> {
        self.0.lock().record(record)
    }

    fn flush(&mut self) -> std::result::Result<(), ExportError> {
        self.0.lock().flush()
    }
}

/// Handle of a background scheduling loop started by
/// [`SchedulingCoordinator::serve`].
#[derive(Debug)]
pub struct ServeHandle {
    reports: Receiver<CycleReport>,
    handle: JoinHandle<()>,
}

impl ServeHandle {
    /// Reports of completed cycles, in order.
    pub fn reports(&self) -> &Receiver<CycleReport> {
        &self.reports
    }

    /// Waits for the loop to exit after [`SchedulingCoordinator::shutdown`].
    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("scheduling loop panicked");
        }
    }
}

/// Drives scheduling cycles over the registered devices.
///
/// At most one cycle runs at a time. Triggers arriving during a cycle are
/// coalesced into a single follow-up cycle.
pub struct SchedulingCoordinator {
    settings: CoordinatorSettings,
    engine: GeneticEngine,
    penalties: PenaltySettings,
    compression: CompressionPolicy,
    device_seed: u64,
    registry: Arc<Registry>,
    signals: RwLock<Arc<SignalSnapshot>>,
    gate: TriggerGate,
    controllers: Mutex<Vec<Box<dyn DeviceController>>>,
    sink: Option<SharedSink>,
    history: Mutex<Vec<GenerationRecord>>,
    cycles: AtomicU64,
}

impl fmt::Debug for SchedulingCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulingCoordinator")
            .field("settings", &self.settings)
            .field("controllers", &self.controllers.lock().len())
            .field("cycles", &self.cycles.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SchedulingCoordinator {
    /// Creates a coordinator with no devices.
    ///
    /// # Arguments
    ///
    /// * `settings` - Cycle timing
    /// * `engine` - Optimizer settings
    /// * `penalties` - Penalty constants of the simulation core
    /// * `signals` - Initial price and power-limit signals
    pub fn new(
        settings: CoordinatorSettings,
        engine: EngineSettings,
        penalties: PenaltySettings,
        signals: SignalSnapshot,
    ) -> Self {
        Self {
            settings,
            engine: GeneticEngine::new(engine),
            penalties,
            compression: CompressionPolicy::default(),
            device_seed: 0,
            registry: Arc::new(Registry::new()),
            signals: RwLock::new(Arc::new(signals)),
            gate: TriggerGate::new(),
            controllers: Mutex::new(Vec::new()),
            sink: None,
            history: Mutex::new(Vec::new()),
            cycles: AtomicU64::new(0),
        }
    }

    /// Compression applied to predicted device profiles.
    pub fn with_compression(mut self, policy: CompressionPolicy) -> Self {
        self.compression = policy;
        self
    }

    /// Seed handed to device predictions.
    pub fn with_device_seed(mut self, seed: u64) -> Self {
        self.device_seed = seed;
        self
    }

    /// Streams every generation record of every cycle into `sink`.
    pub fn with_diagnostics_sink(mut self, sink: Box<dyn DiagnosticsSink>) -> Self {
        self.sink = Some(SharedSink(Arc::new(Mutex::new(sink))));
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Adds a device. Its part is rebuilt at the start of every cycle.
    pub fn register(&self, controller: Box<dyn DeviceController>) {
        info!(device = %controller.device_id(), "device registered");
        self.controllers.lock().push(controller);
    }

    /// Current signal snapshot.
    pub fn signals(&self) -> Arc<SignalSnapshot> {
        self.signals.read().clone()
    }

    /// Replaces the signal snapshot and requests a cycle.
    ///
    /// A cycle already running keeps the snapshot it started with.
    ///
    /// # Errors
    ///
    /// Returns `ShutDown` after [`shutdown`](Self::shutdown).
    pub fn update_signals(&self, signals: SignalSnapshot) -> Result<()> {
        *self.signals.write() = Arc::new(signals);
        self.trigger(TriggerReason::Signals)
    }

    /// Requests a cycle on behalf of `device`.
    ///
    /// # Errors
    ///
    /// Returns `ShutDown` after [`shutdown`](Self::shutdown).
    pub fn request_reschedule(&self, device: &str) -> Result<()> {
        self.trigger(TriggerReason::Reschedule(device.into()))
    }

    /// Records a trigger without running anything.
    ///
    /// # Errors
    ///
    /// Returns `ShutDown` after [`shutdown`](Self::shutdown).
    pub fn trigger(&self, reason: TriggerReason) -> Result<()> {
        debug!(%reason, "trigger received");
        if self.gate.trigger(reason) {
            Ok(())
        } else {
            Err(CoordinatorError::ShutDown)
        }
    }

    /// Runs a cycle planning from `now`, waiting for a running one first.
    ///
    /// Pending triggers are consumed by this cycle.
    ///
    /// # Errors
    ///
    /// Returns `NoParts` when nothing is registered, `ShutDown` after
    /// shutdown, or the simulation error that prevented publishing.
    pub fn run_cycle(&self, now: i64) -> Result<CycleReport> {
        self.trigger(TriggerReason::Manual)?;
        match self.gate.wait(None) {
            Admission::Run(reasons) => {
                let _running = self.gate.finish_on_drop();
                self.execute(now, reasons)
            }
            Admission::TimedOut | Admission::Closed => Err(CoordinatorError::ShutDown),
        }
    }

    /// Runs a cycle only if a trigger is pending and none is running.
    ///
    /// # Errors
    ///
    /// As [`run_cycle`](Self::run_cycle).
    pub fn run_pending(&self, now: i64) -> Result<Option<CycleReport>> {
        let Some(reasons) = self.gate.try_begin() else {
            return Ok(None);
        };
        let _running = self.gate.finish_on_drop();
        self.execute(now, reasons).map(Some)
    }

    /// Starts a background loop that runs a cycle whenever triggered.
    ///
    /// `clock` supplies the planning time of each cycle. With a `timer`,
    /// a cycle is also triggered whenever that long passes without one.
    pub fn serve<C>(self: &Arc<Self>, clock: C, timer: Option<Duration>) -> ServeHandle
    where
        C: Fn() -> i64 + Send + 'static,
    {
        let (tx, reports) = unbounded();
        let this = Arc::clone(self);
        let handle = thread::spawn(move || {
            loop {
                match this.gate.wait(timer) {
                    Admission::Run(reasons) => {
                        let result = {
                            let _running = this.gate.finish_on_drop();
                            this.execute(clock(), reasons)
                        };
                        match result {
                            Ok(report) => {
                                if tx.send(report).is_err() {
                                    debug!("report receiver dropped");
                                }
                            }
                            Err(e) => warn!(error = %e, "scheduling cycle failed"),
                        }
                    }
                    Admission::TimedOut => {
                        this.gate.trigger(TriggerReason::Timer);
                    }
                    Admission::Closed => break,
                }
            }
            info!("scheduling loop stopped");
        });
        ServeHandle { reports, handle }
    }

    /// Stops accepting triggers. A running cycle completes.
    pub fn shutdown(&self) {
        self.gate.close();
    }

    /// Generation records of every completed cycle.
    pub fn diagnostics(&self) -> Vec<GenerationRecord> {
        self.history.lock().clone()
    }

    /// Latest published plan per device, ordered by device id.
    pub fn published(&self) -> Vec<DeviceSchedule> {
        self.registry
            .schedules
            .snapshot()
            .into_iter()
            .map(|(_, plan)| DeviceSchedule::clone(&plan))
            .collect()
    }

    fn planning_context(&self, now: i64) -> PlanningContext {
        PlanningContext {
            reference_time: now,
            horizon: now + self.settings.horizon_secs,
            seed: self.device_seed,
            compression: self.compression,
        }
    }

    fn refresh_parts(&self, ctx: &PlanningContext) {
        let mut controllers = self.controllers.lock();
        for controller in controllers.iter_mut() {
            let id = controller.device_id().clone();
            match controller.problem_part(ctx) {
                Ok(part) => {
                    self.registry.parts.publish(id, part);
                }
                Err(e) => {
                    warn!(device = %id, error = %e, "device could not describe itself; leaving it out");
                    self.registry.parts.remove(&id);
                }
            }
        }
    }

    /// Encodes the previous plans into the new layout where they still fit.
    fn warm_start_seed(&self, core: &SimulationCore) -> Option<BitString> {
        let mut bits = vec![false; core.layout().total_len()];
        let mut reused = 0;
        for (part, (id, range)) in core.parts().iter().zip(core.layout().segments()) {
            if range.is_empty() {
                continue;
            }
            let Some(previous) = self.registry.schedules.get(id) else {
                continue;
            };
            if let Ok(segment) = part.codec().encode(&previous.decisions) {
                if segment.len() == range.len() {
                    bits[range].copy_from_slice(&segment);
                    reused += 1;
                }
            }
        }
        debug!(reused, "warm start segments");
        (reused > 0).then(|| BitString::new(bits))
    }

    fn execute(&self, now: i64, reasons: Vec<TriggerReason>) -> Result<CycleReport> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("scheduling_cycle", cycle, reference_time = now);
        let _guard = span.enter();

        let ctx = self.planning_context(now);
        self.refresh_parts(&ctx);

        let mut parts = Vec::new();
        for (id, part) in self.registry.parts.snapshot() {
            if part.reference_time() != ctx.reference_time || part.horizon() != ctx.horizon {
                warn!(
                    device = %id,
                    part_reference = part.reference_time(),
                    part_horizon = part.horizon(),
                    "dropping stale problem part"
                );
                self.registry.parts.remove(&id);
                continue;
            }
            parts.push(part.fresh());
        }
        if parts.is_empty() {
            return Err(CoordinatorError::NoParts);
        }

        let core = SimulationCore::new(
            parts,
            self.signals(),
            SimulationSettings {
                reference_time: ctx.reference_time,
                horizon: ctx.horizon,
                step_size: self.settings.step_size,
                penalties: self.penalties.clone(),
            },
        )?;
        let seeds: Vec<BitString> = if self.settings.warm_start {
            self.warm_start_seed(&core).into_iter().collect()
        } else {
            Vec::new()
        };
        let log = match &self.sink {
            Some(sink) => RunLog::with_sink(cycle, Box::new(sink.clone())),
            None => RunLog::new(cycle),
        };

        info!(
            devices = core.parts().len(),
            bits = core.layout().total_len(),
            "scheduling cycle started"
        );
        let outcome = self.engine.run(&core, &seeds, log);
        if outcome.best.failed {
            warn!("no candidate evaluated successfully; publishing the least bad one");
        }
        if outcome.stop_reason != StopReason::Plateau {
            debug!(stop = %outcome.stop_reason, "optimizer stopped before converging");
        }

        let evaluation = core.evaluate(&outcome.best.encoding)?;
        let bits = outcome.best.encoding.bits();
        let mut plans = Vec::with_capacity(core.parts().len());
        for ((part, (id, range)), (_, schedule)) in core
            .parts()
            .iter()
            .zip(core.layout().segments())
            .zip(&evaluation.schedules)
        {
            let decisions = part.decode(&bits[range])?;
            let plan = self.registry.schedules.publish(
                id.clone(),
                DeviceSchedule {
                    device_id: id.clone(),
                    cycle,
                    reference_time: ctx.reference_time,
                    decisions,
                    schedule: schedule.clone(),
                },
            );
            plans.push(plan);
        }
        {
            let mut controllers = self.controllers.lock();
            for plan in &plans {
                if let Some(c) = controllers
                    .iter_mut()
                    .find(|c| c.device_id() == &plan.device_id)
                {
                    c.accept(Arc::clone(plan));
                }
            }
        }

        let report = CycleReport {
            cycle,
            reference_time: ctx.reference_time,
            horizon: ctx.horizon,
            reasons,
            devices: core.parts().len(),
            encoding_bits: core.layout().total_len(),
            generations: outcome.generations,
            evaluations: outcome.evaluations,
            failed_evaluations: outcome.failed_evaluations,
            stop_reason: outcome.stop_reason,
            front_size: outcome.front.len(),
            objectives: evaluation.objectives,
            kpis: KpiReport::from_evaluation(&evaluation),
            balances: evaluation.balances,
        };
        self.history.lock().extend(outcome.log.into_records());
        info!(
            fitness = report.objectives.scalar(),
            generations = report.generations,
            evaluations = report.evaluations,
            "plan published"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commodity::AncillaryCommodity;
    use crate::devices::{Appliance, AppliancePhase, BaseLoad};
    use crate::ga::StoppingRule;
    use crate::problem::DecisionVariables;
    use crate::sim::PriceSignal;

    fn coordinator() -> SchedulingCoordinator {
        let settings = CoordinatorSettings {
            horizon_secs: 4 * 3600,
            step_size: 900,
            period_secs: 3600,
            warm_start: true,
        };
        let engine = EngineSettings {
            population_size: 12,
            parallel: false,
            stopping: StoppingRule {
                max_generations: Some(8),
                ..StoppingRule::default()
            },
            ..EngineSettings::default()
        };
        let signals = SignalSnapshot::new()
            .with_price(AncillaryCommodity::ActivePowerExternal, PriceSignal::flat(0.3, 0.1));
        SchedulingCoordinator::new(settings, engine, PenaltySettings::default(), signals)
            .with_compression(CompressionPolicy::None)
    }

    fn washer() -> Appliance {
        Appliance::new(
            "washer",
            vec![AppliancePhase {
                duration_secs: 3600,
                power_w: 2000.0,
            }],
            0,
            4 * 3600,
        )
    }

    #[test]
    fn test_no_devices_is_an_error() {
        let c = coordinator();
        assert!(matches!(c.run_cycle(0), Err(CoordinatorError::NoParts)));
        // the failed cycle must release the gate
        assert!(matches!(c.run_cycle(0), Err(CoordinatorError::NoParts)));
    }

    #[test]
    fn test_cycle_publishes_every_device() {
        let c = coordinator();
        c.register(Box::new(ModelController::new(Box::new(washer()))));
        c.register(Box::new(ModelController::new(Box::new(BaseLoad::default()))));
        let washer_rx = c.registry().schedules.subscribe(Some("washer".into()));

        let report = c.run_cycle(0).unwrap();
        assert_eq!(report.devices, 2);
        assert_eq!(report.reasons, vec![TriggerReason::Manual]);

        let published = c.published();
        let ids: Vec<&str> = published.iter().map(|p| p.device_id.as_str()).collect();
        assert_eq!(ids, vec!["base_load", "washer"]);
        let plan = washer_rx.try_recv().unwrap();
        assert!(matches!(plan.decisions, DecisionVariables::StartTime { .. }));
        assert_eq!(c.diagnostics().len(), report.generations);
    }

    #[test]
    fn test_pending_triggers_run_once() {
        let c = coordinator();
        c.register(Box::new(ModelController::new(Box::new(BaseLoad::default()))));
        assert!(c.run_pending(0).unwrap().is_none());

        c.request_reschedule("base_load").unwrap();
        c.update_signals(SignalSnapshot::new()).unwrap();
        let report = c.run_pending(0).unwrap().unwrap();
        assert_eq!(report.reasons.len(), 2);
        assert!(c.run_pending(0).unwrap().is_none());
    }

    #[test]
    fn test_stale_parts_are_dropped() {
        let c = coordinator();
        c.register(Box::new(ModelController::new(Box::new(BaseLoad::default()))));
        let stale = ModelController::new(Box::new(washer()))
            .problem_part(&c.planning_context(-3600))
            .unwrap();
        c.registry().parts.publish("old".into(), stale);
        let report = c.run_cycle(0).unwrap();
        assert_eq!(report.devices, 1);
        assert!(c.registry().parts.get(&"old".into()).is_none());
        assert_eq!(c.registry().parts.len(), 1);
    }

    #[test]
    fn test_shutdown_rejects_triggers() {
        let c = coordinator();
        c.shutdown();
        assert!(matches!(c.run_cycle(0), Err(CoordinatorError::ShutDown)));
        assert!(c.request_reschedule("x").is_err());
    }

    #[test]
    fn test_settings_validation() {
        let settings = CoordinatorSettings {
            horizon_secs: 1000,
            step_size: 300,
            ..CoordinatorSettings::default()
        };
        let errors = settings.validate("coordinator");
        assert!(errors.iter().any(|e| e.field == "coordinator.horizon_secs"));
        assert!(CoordinatorSettings::default().validate("coordinator").is_empty());
    }
}
