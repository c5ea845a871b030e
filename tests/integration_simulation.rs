//! Integration tests for the simulation core on device problem parts.

mod common;

use std::sync::Arc;

use hems_sched::commodity::{AncillaryCommodity, Commodity};
use hems_sched::devices::{BaseLoad, DeviceModel, PlanningContext};
use hems_sched::error::SimulationError;
use hems_sched::ga::BitString;
use hems_sched::problem::DecisionVariables;
use hems_sched::series::TimeSeries;
use hems_sched::sim::{
    KpiReport, PenaltySettings, PriceSignal, SignalSnapshot, SimulationCore, SimulationSettings,
};

fn washer_core(signals: SignalSnapshot, penalties: PenaltySettings) -> SimulationCore {
    let ctx = common::default_context();
    let washer = common::default_washer();
    common::core_for(vec![common::part_for(&washer, &ctx)], signals, penalties)
}

#[test]
fn washer_start_is_a_four_bit_segment() {
    let core = washer_core(common::falling_tariff(), PenaltySettings::default());
    // 13 start positions between 0 and 3h
    assert_eq!(core.layout().total_len(), 4);
}

#[test]
fn early_start_pays_the_high_tariff() {
    let core = washer_core(common::falling_tariff(), PenaltySettings::default());
    let eval = core.evaluate(&BitString::new(vec![false; 4])).expect("evaluation");
    assert!((eval.objectives.energy_cost - 0.6).abs() < 1e-9, "{:?}", eval.objectives);
    assert_eq!(eval.steps, 16);
    assert_eq!(eval.terminated_at, None);
}

#[test]
fn late_start_pays_the_low_tariff() {
    let core = washer_core(common::falling_tariff(), PenaltySettings::default());
    // index 8 -> start at 2h
    let eval = core
        .evaluate(&BitString::new(vec![true, false, false, false]))
        .expect("evaluation");
    assert!((eval.objectives.energy_cost - 0.2).abs() < 1e-9, "{:?}", eval.objectives);

    let (id, schedule) = &eval.schedules[0];
    assert_eq!(id.as_str(), "washer");
    assert_eq!(schedule.profile().load_at(Commodity::ActivePower, 3600), 0.0);
    assert_eq!(schedule.profile().load_at(Commodity::ActivePower, 7200), 2000.0);

    let ctx = common::default_context();
    let part = common::part_for(&common::default_washer(), &ctx);
    assert_eq!(
        part.decode(&[true, false, false, false]).ok(),
        Some(DecisionVariables::StartTime { start: 7200 })
    );
}

#[test]
fn kpis_follow_the_meter() {
    let core = washer_core(common::falling_tariff(), PenaltySettings::default());
    let eval = core.evaluate(&BitString::new(vec![false; 4])).expect("evaluation");
    let kpi = KpiReport::from_evaluation(&eval);
    assert!((kpi.imported_kwh - 2.0).abs() < 1e-9);
    assert_eq!(kpi.exported_kwh, 0.0);
    assert_eq!(kpi.peak_import_w, 2000.0);
    assert!(!kpi.terminated_early);

    let active = eval.balances.series(AncillaryCommodity::ActivePowerExternal);
    assert!((active.sum(0, 4 * 3600).expect("sum") - 2000.0 * 3600.0).abs() < 1e-6);
}

#[test]
fn limit_excess_is_penalized_per_step() {
    let penalties = PenaltySettings {
        hard_limit_excess_w: None,
        ..PenaltySettings::default()
    };
    let core = washer_core(common::capped_signals(), penalties.clone());
    let eval = core.evaluate(&BitString::new(vec![false; 4])).expect("evaluation");
    assert_eq!(eval.violation_steps, 4);
    let expected = 1.0 * penalties.limit_penalty_per_kwh;
    assert!((eval.objectives.limit_penalty - expected).abs() < 1e-9);
    assert!(eval.objectives.is_feasible());
}

#[test]
fn hard_limit_ends_the_run() {
    let penalties = PenaltySettings {
        hard_limit_excess_w: Some(500.0),
        ..PenaltySettings::default()
    };
    let core = washer_core(common::capped_signals(), penalties.clone());
    let eval = core.evaluate(&BitString::new(vec![false; 4])).expect("evaluation");
    assert_eq!(eval.terminated_at, Some(0));
    assert_eq!(eval.steps, 1);
    let expected = penalties.infeasible_base + penalties.infeasible_per_step * 15.0;
    assert!((eval.objectives.infeasibility - expected).abs() < 1e-9);
    assert!(!eval.objectives.is_feasible());
}

#[test]
fn wrong_encoding_length_is_rejected() {
    let core = washer_core(common::falling_tariff(), PenaltySettings::default());
    let err = core.evaluate(&BitString::new(vec![false; 3]));
    assert!(matches!(
        err,
        Err(SimulationError::EncodingLength {
            expected: 4,
            actual: 3
        })
    ));
}

#[test]
fn determinism_two_identical_runs_produce_identical_results() {
    let ctx = common::default_context();
    let base = BaseLoad::default();
    let washer = common::default_washer();
    let build = || {
        common::core_for(
            vec![common::part_for(&base, &ctx), common::part_for(&washer, &ctx)],
            common::falling_tariff(),
            PenaltySettings::default(),
        )
    };
    let encoding = BitString::new(vec![false, true, true, false]);
    let a = build().evaluate(&encoding).expect("first evaluation");
    let b = build().evaluate(&encoding).expect("second evaluation");
    assert_eq!(a.objectives, b.objectives);
    assert_eq!(a.schedules, b.schedules);
    // layout is ordered by device id
    let ids: Vec<&str> = a.schedules.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec![base.id(), washer.id()]);
}

#[test]
fn trailing_partial_step_books_only_its_width() {
    // 3h10m window on a 15-minute grid: the last step is 10 minutes wide
    let horizon = 3 * 3600 + 600;
    let ctx = PlanningContext {
        horizon,
        ..common::default_context()
    };
    let flat_load = BaseLoad {
        base_w: 1000.0,
        amplitude_w: 0.0,
        noise_std_w: 0.0,
        ..BaseLoad::default()
    };
    let signals = SignalSnapshot::new().with_price(
        AncillaryCommodity::ActivePowerExternal,
        PriceSignal::flat(0.30, 0.0),
    );
    let core = SimulationCore::new(
        vec![common::part_for(&flat_load, &ctx)],
        Arc::new(signals),
        SimulationSettings {
            reference_time: 0,
            horizon,
            step_size: 900,
            penalties: PenaltySettings::default(),
        },
    )
    .expect("core should build");

    let eval = core.evaluate(&BitString::new(Vec::new())).expect("evaluation");
    assert_eq!(eval.steps, 13);
    // 1 kW for 3h10m at 0.30 per kWh
    let expected = 1.0 * horizon as f64 / 3600.0 * 0.30;
    assert!(
        (eval.objectives.energy_cost - expected).abs() < 1e-9,
        "{:?}",
        eval.objectives
    );
}
