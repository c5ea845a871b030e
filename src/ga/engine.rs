//! Engine settings, the shared generation driver, and algorithm dispatch.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use super::candidate::{Candidate, CandidateOrder};
use super::encoding::BitString;
use super::operators::Operators;
use super::stopping::{DEFAULT_MAX_GENERATIONS, Progress, StopReason, StoppingRule};
use super::{Problem, archive, nsga2, single};
use crate::diagnostics::{GenerationRecord, RunLog};
use crate::error::ConfigError;

/// Which engine variant runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Elitist generational GA on the scalar fitness.
    #[default]
    Single,
    /// NSGA-II on the objective vector.
    Nsga2,
    /// Bounded non-dominated archive with grid density.
    Archive,
}

impl Algorithm {
    pub const NAMES: &[&str] = &["single", "nsga2", "archive"];
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Algorithm::Single),
            "nsga2" => Ok(Algorithm::Nsga2),
            "archive" => Ok(Algorithm::Archive),
            other => Err(ConfigError::new(
                "optimizer.algorithm",
                format!("unknown algorithm '{other}'; expected one of {}", Self::NAMES.join(", ")),
            )),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Algorithm::Single => "single",
            Algorithm::Nsga2 => "nsga2",
            Algorithm::Archive => "archive",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    Tournament,
    LinearRanking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverKind {
    SinglePoint,
    TwoPoint,
    Uniform,
}

/// Optimizer parameters (`[optimizer]` section of a scenario).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    pub algorithm: Algorithm,
    /// Candidates per generation (>= 2).
    pub population_size: usize,
    /// Candidates carried over unchanged by the single-objective engine.
    pub elite_count: usize,
    /// Master seed of the run.
    pub seed: u64,
    pub selection: SelectionKind,
    pub tournament_size: usize,
    /// Linear ranking pressure in `[1, 2]`.
    pub ranking_pressure: f64,
    pub crossover: CrossoverKind,
    pub crossover_probability: f64,
    /// Per-bit flip probability; `None` means `1 / encoding length`.
    pub mutation_rate: Option<f64>,
    pub stopping: StoppingRule,
    /// Hamming distance counted as "close to best" in diagnostics.
    pub homogeneity_bits: usize,
    /// Grid cells per objective axis for the archive engine.
    pub grid_divisions: usize,
    /// Maximum archive size for the archive engine.
    pub archive_size: usize,
    /// Evaluate candidates on the rayon pool.
    pub parallel: bool,
    /// Objective value assigned to a candidate whose evaluation failed.
    pub failed_evaluation_penalty: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Single,
            population_size: 40,
            elite_count: 2,
            seed: 42,
            selection: SelectionKind::Tournament,
            tournament_size: 2,
            ranking_pressure: 1.5,
            crossover: CrossoverKind::TwoPoint,
            crossover_probability: 0.9,
            mutation_rate: None,
            stopping: StoppingRule::default(),
            homogeneity_bits: 2,
            grid_divisions: 8,
            archive_size: 40,
            parallel: true,
            failed_evaluation_penalty: 1.0e9,
        }
    }
}

impl EngineSettings {
    /// Checks all parameters, reporting fields under `prefix`.
    pub fn validate(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let field = |name: &str| format!("{prefix}.{name}");

        if self.population_size < 2 {
            errors.push(ConfigError::new(field("population_size"), "must be >= 2"));
        }
        if self.elite_count >= self.population_size {
            errors.push(ConfigError::new(
                field("elite_count"),
                format!(
                    "must be less than population_size ({})",
                    self.population_size
                ),
            ));
        }
        if self.algorithm == Algorithm::Single && self.elite_count == 0 {
            errors.push(ConfigError::new(
                field("elite_count"),
                "must be >= 1 for the single-objective engine",
            ));
        }
        if self.tournament_size == 0 {
            errors.push(ConfigError::new(field("tournament_size"), "must be >= 1"));
        }
        if !(1.0..=2.0).contains(&self.ranking_pressure) {
            errors.push(ConfigError::new(
                field("ranking_pressure"),
                "must be in [1.0, 2.0]",
            ));
        }
        if !(0.0..=1.0).contains(&self.crossover_probability) {
            errors.push(ConfigError::new(
                field("crossover_probability"),
                "must be in [0.0, 1.0]",
            ));
        }
        if let Some(rate) = self.mutation_rate {
            if !(rate > 0.0 && rate <= 1.0) {
                errors.push(ConfigError::new(field("mutation_rate"), "must be in (0.0, 1.0]"));
            }
        }
        if self.grid_divisions == 0 {
            errors.push(ConfigError::new(field("grid_divisions"), "must be >= 1"));
        }
        if self.archive_size == 0 {
            errors.push(ConfigError::new(field("archive_size"), "must be >= 1"));
        }
        if !self.failed_evaluation_penalty.is_finite() {
            errors.push(ConfigError::new(
                field("failed_evaluation_penalty"),
                "must be finite",
            ));
        }
        if let Some(max) = self.stopping.max_evaluations {
            // the initial population is always evaluated in full
            if max < self.population_size {
                errors.push(ConfigError::new(
                    field("stopping.max_evaluations"),
                    format!(
                        "must be at least population_size ({})",
                        self.population_size
                    ),
                ));
            }
        }
        if self.stopping.plateau_delta < 0.0 {
            errors.push(ConfigError::new(
                field("stopping.plateau_delta"),
                "must be >= 0",
            ));
        }
        errors
    }
}

/// Result of an engine run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Lowest scalar fitness among the final candidates.
    pub best: Candidate,
    /// Non-dominated final candidates (just `best` for the single-objective engine).
    pub front: Vec<Candidate>,
    /// Final population.
    pub population: Vec<Candidate>,
    /// Generations recorded, including the initial population.
    pub generations: usize,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    pub stop_reason: StopReason,
    pub log: RunLog,
}

/// Bookkeeping shared by all engine variants: RNG, operators, evaluation
/// budget and diagnostics.
pub(crate) struct Driver<'a> {
    pub settings: &'a EngineSettings,
    pub operators: &'a Operators,
    pub rng: StdRng,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    generation_failures: usize,
    best_history: Vec<f64>,
    pub log: RunLog,
}

impl<'a> Driver<'a> {
    pub fn new(settings: &'a EngineSettings, operators: &'a Operators, log: RunLog) -> Self {
        Self {
            settings,
            operators,
            rng: StdRng::seed_from_u64(settings.seed),
            evaluations: 0,
            failed_evaluations: 0,
            generation_failures: 0,
            best_history: Vec::new(),
            log,
        }
    }

    /// Initial encodings: valid seeds first, random strings for the rest.
    pub fn initial_encodings(&mut self, len: usize, seeds: &[BitString]) -> Vec<BitString> {
        let size = self.settings.population_size;
        let mut encodings: Vec<BitString> = seeds
            .iter()
            .filter(|s| s.len() == len)
            .take(size)
            .cloned()
            .collect();
        if encodings.len() < seeds.len().min(size) {
            warn!(
                expected_len = len,
                "discarding warm-start seeds with a stale encoding length"
            );
        }
        while encodings.len() < size {
            encodings.push(BitString::random(len, &mut self.rng));
        }
        encodings
    }

    /// `count` children bred from `parents`.
    pub fn breed(
        &mut self,
        parents: &[Candidate],
        count: usize,
        order: CandidateOrder,
    ) -> Vec<BitString> {
        let mut children = Vec::with_capacity(count);
        while children.len() < count {
            let a = self.operators.selection.select(parents, order, &mut self.rng);
            let b = self.operators.selection.select(parents, order, &mut self.rng);
            let (mut x, mut y) =
                self.operators
                    .crossover
                    .crossover(&a.encoding, &b.encoding, &mut self.rng);
            self.operators.mutation.mutate(&mut x, &mut self.rng);
            children.push(x);
            if children.len() < count {
                self.operators.mutation.mutate(&mut y, &mut self.rng);
                children.push(y);
            }
        }
        children
    }

    /// Evaluates a batch; failures are penalized, never propagated.
    pub fn evaluate<P: Problem>(&mut self, problem: &P, encodings: Vec<BitString>) -> Vec<Candidate> {
        let penalty = self.settings.failed_evaluation_penalty;
        let axes = problem.objective_count();
        let evaluate_one = |encoding: BitString| -> Candidate {
            match catch_unwind(AssertUnwindSafe(|| problem.evaluate(&encoding))) {
                Ok(Ok(fitness)) => Candidate::new(encoding, fitness.objectives, fitness.scalar),
                Ok(Err(e)) => {
                    warn!(error = %e, "candidate evaluation failed; applying penalty");
                    Candidate::penalized(encoding, axes, penalty)
                }
                Err(_) => {
                    warn!("candidate evaluation panicked; applying penalty");
                    Candidate::penalized(encoding, axes, penalty)
                }
            }
        };
        let n = encodings.len();
        let candidates: Vec<Candidate> = if self.settings.parallel {
            encodings.into_par_iter().map(evaluate_one).collect()
        } else {
            encodings.into_iter().map(evaluate_one).collect()
        };
        let failures = candidates.iter().filter(|c| c.failed).count();
        self.evaluations += n;
        self.failed_evaluations += failures;
        self.generation_failures += failures;
        candidates
    }

    /// Records generation statistics and checks the stopping rule.
    ///
    /// # Arguments
    ///
    /// * `generation` - Index of the generation just completed
    /// * `population` - Candidates the statistics are computed over
    /// * `best` - Candidate the engine ranks first
    /// * `next_batch` - Evaluations the next generation would need
    pub fn observe(
        &mut self,
        generation: usize,
        population: &[Candidate],
        best: &Candidate,
        next_batch: usize,
    ) -> Option<StopReason> {
        if let Some(record) = GenerationRecord::from_population(
            self.log.run_id(),
            generation,
            self.evaluations,
            self.generation_failures,
            population,
            best,
            self.settings.homogeneity_bits,
        ) {
            self.best_history.push(record.best_fitness);
            self.log.record(record);
        }
        self.generation_failures = 0;
        self.settings.stopping.check(&Progress {
            generation,
            evaluations: self.evaluations,
            next_batch,
            best_history: &self.best_history,
        })
    }

    pub fn finish(
        mut self,
        best: Candidate,
        front: Vec<Candidate>,
        population: Vec<Candidate>,
        generations: usize,
        stop_reason: StopReason,
    ) -> RunOutcome {
        self.log.finish();
        info!(
            run_id = self.log.run_id(),
            generations,
            evaluations = self.evaluations,
            failed = self.failed_evaluations,
            best = best.fitness,
            %stop_reason,
            "optimizer run finished"
        );
        RunOutcome {
            best,
            front,
            population,
            generations,
            evaluations: self.evaluations,
            failed_evaluations: self.failed_evaluations,
            stop_reason,
            log: self.log,
        }
    }
}

fn warn_if_unbounded(stopping: &StoppingRule) {
    if !stopping.is_bounded() {
        warn!(
            max_generations = DEFAULT_MAX_GENERATIONS,
            "no stopping criterion configured, falling back to the default generation limit"
        );
    }
}

/// Runs the configured engine variant.
#[derive(Debug)]
pub struct GeneticEngine {
    settings: EngineSettings,
    operators: Operators,
}

impl GeneticEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let operators = Operators::from_settings(&settings);
        warn_if_unbounded(&settings.stopping);
        Self {
            settings,
            operators,
        }
    }

    /// Uses custom operators instead of the ones named in `settings`.
    pub fn with_operators(settings: EngineSettings, operators: Operators) -> Self {
        warn_if_unbounded(&settings.stopping);
        Self {
            settings,
            operators,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Optimizes `problem`.
    ///
    /// # Arguments
    ///
    /// * `seeds` - Encodings injected into the initial population (warm start);
    ///   seeds of the wrong length are skipped
    /// * `log` - Per-run diagnostics handle
    pub fn run<P: Problem>(&self, problem: &P, seeds: &[BitString], log: RunLog) -> RunOutcome {
        let span = info_span!("optimizer_run", run_id = log.run_id(), algorithm = %self.settings.algorithm);
        let _guard = span.enter();
        let driver = Driver::new(&self.settings, &self.operators, log);
        match self.settings.algorithm {
            Algorithm::Single => single::run(driver, problem, seeds),
            Algorithm::Nsga2 => nsga2::run(driver, problem, seeds),
            Algorithm::Archive => archive::run(driver, problem, seeds),
        }
    }
}
