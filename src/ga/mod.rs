//! Genetic optimization over fixed-length bit strings.
//!
//! The engine knows nothing about devices: it evaluates encodings through
//! the [`Problem`] trait. Three variants share one driver:
//!
//! - [`Algorithm::Single`]: elitist GA on the scalar fitness
//! - [`Algorithm::Nsga2`]: non-dominated sorting with crowding distance
//! - [`Algorithm::Archive`]: bounded Pareto archive with grid density

use std::fmt;

pub mod archive;
pub mod candidate;
pub mod encoding;
pub mod engine;
pub mod nsga2;
pub mod operators;
pub mod pareto;
pub mod single;
pub mod stopping;

pub use candidate::{Candidate, CandidateOrder};
pub use encoding::{BitString, SegmentLayout};
pub use engine::{
    Algorithm, CrossoverKind, EngineSettings, GeneticEngine, RunOutcome, SelectionKind,
};
pub use operators::Operators;
pub use stopping::{StopReason, StoppingRule};

/// Evaluated quality of one encoding. All values are minimized.
#[derive(Debug, Clone, PartialEq)]
pub struct Fitness {
    /// One value per objective axis.
    pub objectives: Vec<f64>,
    /// Single value used by the single-objective engine and for reporting.
    pub scalar: f64,
}

impl Fitness {
    /// Single-axis fitness.
    pub fn scalar(value: f64) -> Self {
        Self {
            objectives: vec![value],
            scalar: value,
        }
    }
}

/// Something the engine can optimize.
///
/// `evaluate` is called concurrently from the rayon pool, so it must not
/// rely on shared mutable state.
pub trait Problem: Sync {
    type Error: fmt::Display;

    /// Number of bits in every encoding.
    fn encoding_len(&self) -> usize;

    fn objective_count(&self) -> usize {
        1
    }

    fn evaluate(&self, encoding: &BitString) -> Result<Fitness, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RunLog;

    /// Minimize the number of set bits.
    struct OneMax(usize);

    impl Problem for OneMax {
        type Error = String;

        fn encoding_len(&self) -> usize {
            self.0
        }

        fn evaluate(&self, encoding: &BitString) -> Result<Fitness, String> {
            Ok(Fitness::scalar(
                encoding.bits().iter().filter(|&&b| b).count() as f64,
            ))
        }
    }

    /// Two conflicting axes: set bits and unset bits.
    struct Split(usize);

    impl Problem for Split {
        type Error = String;

        fn encoding_len(&self) -> usize {
            self.0
        }

        fn objective_count(&self) -> usize {
            2
        }

        fn evaluate(&self, encoding: &BitString) -> Result<Fitness, String> {
            let ones = encoding.bits().iter().filter(|&&b| b).count() as f64;
            let zeros = self.0 as f64 - ones;
            Ok(Fitness {
                objectives: vec![ones, zeros],
                scalar: ones + zeros,
            })
        }
    }

    /// Fails on every encoding starting with a set bit; panics on `11`.
    struct Flaky;

    impl Problem for Flaky {
        type Error = String;

        fn encoding_len(&self) -> usize {
            8
        }

        fn evaluate(&self, encoding: &BitString) -> Result<Fitness, String> {
            match (encoding.bits()[0], encoding.bits()[1]) {
                (true, true) => panic!("boom"),
                (true, false) => Err("bad encoding".into()),
                _ => Ok(Fitness::scalar(1.0)),
            }
        }
    }

    fn settings(algorithm: Algorithm) -> EngineSettings {
        EngineSettings {
            algorithm,
            population_size: 20,
            stopping: StoppingRule {
                max_generations: Some(30),
                plateau_generations: None,
                ..StoppingRule::default()
            },
            parallel: false,
            ..EngineSettings::default()
        }
    }

    #[test]
    fn test_single_objective_improves_monotonically() {
        let engine = GeneticEngine::new(settings(Algorithm::Single));
        let outcome = engine.run(&OneMax(24), &[], RunLog::new(0));
        let history = outcome.log.best_history();
        assert_eq!(history.len(), 31);
        for w in history.windows(2) {
            assert!(w[1] <= w[0], "best fitness regressed: {w:?}");
        }
        assert!(outcome.best.fitness < history[0]);
        assert_eq!(outcome.stop_reason, StopReason::MaxGenerations);
        assert_eq!(outcome.evaluations, 20 + 30 * 18);
    }

    #[test]
    fn test_same_seed_same_result() {
        let engine = GeneticEngine::new(settings(Algorithm::Single));
        let a = engine.run(&OneMax(16), &[], RunLog::new(0));
        let b = engine.run(&OneMax(16), &[], RunLog::new(1));
        assert_eq!(a.best.encoding, b.best.encoding);
        assert_eq!(a.log.best_history(), b.log.best_history());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let sequential = GeneticEngine::new(settings(Algorithm::Single));
        let parallel = GeneticEngine::new(EngineSettings {
            parallel: true,
            ..settings(Algorithm::Single)
        });
        let a = sequential.run(&OneMax(16), &[], RunLog::new(0));
        let b = parallel.run(&OneMax(16), &[], RunLog::new(0));
        assert_eq!(a.best.encoding, b.best.encoding);
    }

    #[test]
    fn test_seed_injected_into_initial_population() {
        let engine = GeneticEngine::new(EngineSettings {
            stopping: StoppingRule {
                max_generations: Some(0),
                ..StoppingRule::default()
            },
            ..settings(Algorithm::Single)
        });
        let seed = BitString::zeros(24);
        let outcome = engine.run(&OneMax(24), &[seed.clone(), BitString::zeros(3)], RunLog::new(0));
        assert_eq!(outcome.best.encoding, seed);
        assert_eq!(outcome.best.fitness, 0.0);
        assert_eq!(outcome.generations, 1);
    }

    #[test]
    fn test_failed_evaluations_are_penalized() {
        let engine = GeneticEngine::new(settings(Algorithm::Single));
        let outcome = engine.run(&Flaky, &[], RunLog::new(0));
        assert!(outcome.failed_evaluations > 0);
        assert_eq!(outcome.best.fitness, 1.0);
        assert!(!outcome.best.failed);
    }

    #[test]
    fn test_max_evaluations_never_exceeded() {
        let engine = GeneticEngine::new(EngineSettings {
            stopping: StoppingRule {
                max_evaluations: Some(100),
                max_generations: None,
                plateau_generations: None,
                plateau_delta: 0.0,
            },
            ..settings(Algorithm::Nsga2)
        });
        let outcome = engine.run(&Split(12), &[], RunLog::new(0));
        assert!(outcome.evaluations <= 100);
        assert_eq!(outcome.evaluations, 100);
        assert_eq!(outcome.stop_reason, StopReason::MaxEvaluations);
    }

    #[test]
    fn test_nsga2_front_is_non_dominated() {
        let engine = GeneticEngine::new(settings(Algorithm::Nsga2));
        let outcome = engine.run(&Split(10), &[], RunLog::new(0));
        assert!(!outcome.front.is_empty());
        for a in &outcome.front {
            assert!(outcome.front.iter().all(|b| !b.dominates(a)));
        }
        assert_eq!(outcome.population.len(), 20);
    }

    #[test]
    fn test_archive_bounded() {
        let engine = GeneticEngine::new(EngineSettings {
            archive_size: 5,
            ..settings(Algorithm::Archive)
        });
        let outcome = engine.run(&Split(10), &[], RunLog::new(0));
        assert!(!outcome.front.is_empty());
        assert!(outcome.front.len() <= 5);
        for a in &outcome.front {
            assert!(outcome.front.iter().all(|b| !b.dominates(a)));
        }
    }
}
