//! Integration tests for scheduling cycles driven through the coordinator.

mod common;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use hems_sched::commodity::Commodity;
use hems_sched::coordinator::{
    CoordinatorSettings, DeviceController, DeviceSchedule, ModelController,
    SchedulingCoordinator, TriggerReason,
};
use hems_sched::devices::{BaseLoad, PlanningContext};
use hems_sched::error::ProblemPartError;
use hems_sched::ga::Algorithm;
use hems_sched::problem::{DecisionVariables, DeviceId, ProblemPart};
use hems_sched::profile::CompressionPolicy;
use hems_sched::sim::PenaltySettings;

const WAIT: Duration = Duration::from_secs(60);

fn build_coordinator() -> SchedulingCoordinator {
    let coordinator = empty_coordinator();
    coordinator.register(Box::new(ModelController::new(Box::new(common::default_washer()))));
    coordinator.register(Box::new(ModelController::new(Box::new(BaseLoad::default()))));
    coordinator
}

fn empty_coordinator() -> SchedulingCoordinator {
    let settings = CoordinatorSettings {
        horizon_secs: 4 * 3600,
        step_size: 900,
        period_secs: 3600,
        warm_start: true,
    };
    let coordinator = SchedulingCoordinator::new(
        settings,
        common::small_engine(Algorithm::Single, 21),
        PenaltySettings::default(),
        common::falling_tariff(),
    )
    .with_compression(CompressionPolicy::None);
    coordinator
}

/// Base load whose first problem part blocks until released.
struct GatedBaseLoad {
    inner: ModelController,
    started: Sender<()>,
    release: Receiver<()>,
    calls: usize,
}

impl DeviceController for GatedBaseLoad {
    fn device_id(&self) -> &DeviceId {
        self.inner.device_id()
    }

    fn problem_part(&mut self, ctx: &PlanningContext) -> Result<ProblemPart, ProblemPartError> {
        self.calls += 1;
        if self.calls == 1 {
            let _ = self.started.send(());
            let _ = self.release.recv_timeout(WAIT);
        }
        self.inner.problem_part(ctx)
    }

    fn accept(&mut self, plan: Arc<DeviceSchedule>) {
        self.inner.accept(plan);
    }

    fn current_plan(&self) -> Option<&DeviceSchedule> {
        self.inner.current_plan()
    }
}

/// Base load that panics while describing itself the first time.
struct PanicsOnce {
    inner: ModelController,
    panicked: bool,
}

impl DeviceController for PanicsOnce {
    fn device_id(&self) -> &DeviceId {
        self.inner.device_id()
    }

    fn problem_part(&mut self, ctx: &PlanningContext) -> Result<ProblemPart, ProblemPartError> {
        if !self.panicked {
            self.panicked = true;
            panic!("device driver crashed");
        }
        self.inner.problem_part(ctx)
    }

    fn accept(&mut self, plan: Arc<DeviceSchedule>) {
        self.inner.accept(plan);
    }

    fn current_plan(&self) -> Option<&DeviceSchedule> {
        self.inner.current_plan()
    }
}

fn washer_start(coordinator: &SchedulingCoordinator) -> Option<i64> {
    let plan = coordinator
        .registry()
        .schedules
        .get(&DeviceId::new("washer"))?;
    match plan.decisions {
        DecisionVariables::StartTime { start } => Some(start),
        _ => None,
    }
}

#[test]
fn cycle_moves_the_washer_into_the_cheap_window() {
    let coordinator = build_coordinator();
    let report = coordinator.run_cycle(0).expect("cycle should run");
    assert_eq!(report.devices, 2);
    assert_eq!(report.encoding_bits, 4);
    assert!(washer_start(&coordinator).is_some_and(|s| s >= 7200));
    assert_eq!(coordinator.published().len(), 2);
}

#[test]
fn started_run_is_committed_in_the_next_cycle() {
    let coordinator = build_coordinator();
    coordinator.run_cycle(0).expect("first cycle");
    let start = washer_start(&coordinator).expect("washer plan");

    let report = coordinator.run_cycle(start + 900).expect("second cycle");
    // nothing is left to decide for a running washer
    assert_eq!(report.encoding_bits, 0);

    let plan = coordinator
        .registry()
        .schedules
        .get(&DeviceId::new("washer"))
        .expect("washer plan");
    assert_eq!(plan.cycle, 1);
    assert_eq!(plan.reference_time, start + 900);
    let profile = plan.schedule.profile();
    assert_eq!(profile.load_at(Commodity::ActivePower, 0), 2000.0);
    assert_eq!(profile.load_at(Commodity::ActivePower, 2700), 0.0);
}

#[test]
fn serve_loop_runs_on_reschedule_request() {
    let coordinator = Arc::new(build_coordinator());
    let washer_plans = coordinator
        .registry()
        .schedules
        .subscribe(Some(DeviceId::new("washer")));
    let handle = coordinator.serve(|| 0, None);

    coordinator.request_reschedule("washer").expect("trigger accepted");
    let report = handle.reports().recv_timeout(WAIT).expect("cycle report");
    assert!(report
        .reasons
        .contains(&TriggerReason::Reschedule(DeviceId::new("washer"))));

    let plan = washer_plans.recv_timeout(WAIT).expect("washer plan");
    assert_eq!(plan.device_id.as_str(), "washer");
    assert!(washer_plans.try_recv().is_err(), "base_load plans are filtered out");

    coordinator.shutdown();
    handle.join();
    assert!(coordinator.request_reschedule("washer").is_err());
}

#[test]
fn serve_loop_runs_on_new_signals() {
    let coordinator = Arc::new(build_coordinator());
    let handle = coordinator.serve(|| 3600, None);

    coordinator
        .update_signals(common::capped_signals())
        .expect("signals accepted");
    let report = handle.reports().recv_timeout(WAIT).expect("cycle report");
    assert_eq!(report.reasons, vec![TriggerReason::Signals]);
    assert_eq!(report.reference_time, 3600);

    coordinator.shutdown();
    handle.join();
}

#[test]
fn timer_triggers_cycles_without_requests() {
    let coordinator = Arc::new(build_coordinator());
    let handle = coordinator.serve(|| 0, Some(Duration::from_millis(10)));
    let report = handle.reports().recv_timeout(WAIT).expect("timer cycle");
    assert_eq!(report.reasons, vec![TriggerReason::Timer]);
    coordinator.shutdown();
    handle.join();
}

#[test]
fn diagnostics_accumulate_over_cycles() {
    let coordinator = build_coordinator();
    coordinator.run_cycle(0).expect("first cycle");
    let after_first = coordinator.diagnostics().len();
    coordinator.run_cycle(3600).expect("second cycle");
    let records = coordinator.diagnostics();
    assert!(after_first > 0);
    assert!(records.len() > after_first);
    let run_ids: Vec<u64> = records.iter().map(|r| r.run_id).collect();
    assert!(run_ids.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn reschedules_during_a_cycle_collapse_into_one_follow_up() {
    let (started_tx, started_rx) = bounded(1);
    let (release_tx, release_rx) = bounded(1);
    let coordinator = Arc::new(empty_coordinator());
    coordinator.register(Box::new(GatedBaseLoad {
        inner: ModelController::new(Box::new(BaseLoad::default())),
        started: started_tx,
        release: release_rx,
        calls: 0,
    }));
    coordinator.register(Box::new(ModelController::new(Box::new(common::default_washer()))));
    let handle = coordinator.serve(|| 0, None);

    coordinator.request_reschedule("washer").expect("trigger accepted");
    started_rx.recv_timeout(WAIT).expect("first cycle started");
    coordinator.request_reschedule("washer").expect("trigger accepted");
    coordinator.request_reschedule("base_load").expect("trigger accepted");
    release_tx.send(()).expect("release first cycle");

    let first = handle.reports().recv_timeout(WAIT).expect("first report");
    assert_eq!(first.cycle, 0);
    assert_eq!(
        first.reasons,
        vec![TriggerReason::Reschedule(DeviceId::new("washer"))]
    );

    let second = handle.reports().recv_timeout(WAIT).expect("follow-up report");
    assert_eq!(second.cycle, 1);
    assert_eq!(second.reasons.len(), 2);
    assert!(second
        .reasons
        .contains(&TriggerReason::Reschedule(DeviceId::new("base_load"))));

    assert!(
        handle
            .reports()
            .recv_timeout(Duration::from_millis(300))
            .is_err(),
        "exactly one follow-up cycle"
    );
    coordinator.shutdown();
    handle.join();
}

#[test]
fn panicking_cycle_releases_the_coordinator() {
    let coordinator = empty_coordinator();
    coordinator.register(Box::new(PanicsOnce {
        inner: ModelController::new(Box::new(BaseLoad::default())),
        panicked: false,
    }));

    let crashed = catch_unwind(AssertUnwindSafe(|| coordinator.run_cycle(0)));
    assert!(crashed.is_err());

    let report = coordinator.run_cycle(0).expect("next cycle should run");
    assert_eq!(report.devices, 1);
}
