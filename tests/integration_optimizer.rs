//! Integration tests for the genetic engine on simulated device problems.

mod common;

use hems_sched::diagnostics::RunLog;
use hems_sched::ga::{Algorithm, BitString, GeneticEngine};
use hems_sched::problem::DecisionVariables;
use hems_sched::sim::{PenaltySettings, SimulationCore};

fn washer_problem() -> SimulationCore {
    let ctx = common::default_context();
    let washer = common::default_washer();
    common::core_for(
        vec![common::part_for(&washer, &ctx)],
        common::falling_tariff(),
        PenaltySettings::default(),
    )
}

fn decoded_start(core: &SimulationCore, encoding: &BitString) -> Option<i64> {
    let (_, range) = core.layout().segments().next()?;
    match core.parts()[0].decode(&encoding.bits()[range]).ok()? {
        DecisionVariables::StartTime { start } => Some(start),
        _ => None,
    }
}

#[test]
fn every_variant_moves_the_washer_into_the_cheap_window() {
    let core = washer_problem();
    for algorithm in [Algorithm::Single, Algorithm::Nsga2, Algorithm::Archive] {
        let engine = GeneticEngine::new(common::small_engine(algorithm, 7));
        let outcome = engine.run(&core, &[], RunLog::new(1));
        assert!(
            (outcome.best.fitness - 0.2).abs() < 1e-9,
            "{algorithm}: best fitness {}",
            outcome.best.fitness
        );
        let start = decoded_start(&core, &outcome.best.encoding);
        assert!(
            start.is_some_and(|s| s >= 7200),
            "{algorithm}: start {start:?}"
        );
        assert_eq!(outcome.failed_evaluations, 0);
    }
}

#[test]
fn same_seed_gives_same_outcome() {
    let core = washer_problem();
    let engine = GeneticEngine::new(common::small_engine(Algorithm::Nsga2, 11));
    let a = engine.run(&core, &[], RunLog::new(1));
    let b = engine.run(&core, &[], RunLog::new(1));
    assert_eq!(a.best.encoding, b.best.encoding);
    assert_eq!(a.generations, b.generations);
    assert_eq!(a.evaluations, b.evaluations);
}

#[test]
fn run_log_has_one_record_per_generation() {
    let core = washer_problem();
    let engine = GeneticEngine::new(common::small_engine(Algorithm::Single, 3));
    let outcome = engine.run(&core, &[], RunLog::new(9));
    let records = outcome.log.records();
    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.run_id == 9));
    assert!(records.iter().all(|r| r.best_fitness <= r.worst_fitness));
    assert!(records.windows(2).all(|w| w[0].evaluations <= w[1].evaluations));
    assert!(records.iter().all(|r| r.evaluations <= outcome.evaluations));
}

#[test]
fn warm_start_seed_enters_the_population() {
    let core = washer_problem();
    let mut settings = common::small_engine(Algorithm::Single, 5);
    settings.stopping.max_generations = Some(1);
    let seed = BitString::new(vec![true, false, true, false]);
    let outcome = GeneticEngine::new(settings).run(&core, std::slice::from_ref(&seed), RunLog::new(1));
    // the seed is already optimal, so the elitist engine cannot lose it
    assert!((outcome.best.fitness - 0.2).abs() < 1e-9);
}
