//! Per-generation optimizer diagnostics.
//!
//! Every engine run owns a [`RunLog`] handle. It keeps the records of that
//! run in memory and forwards each one to an optional [`DiagnosticsSink`]
//! (for example a CSV file), so concurrent runs never share counters.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::ga::candidate::Candidate;
use crate::io::export::ExportError;

/// Population statistics of one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRecord {
    pub run_id: u64,
    /// 0 is the initial population.
    pub generation: usize,
    /// Evaluations spent so far, including this generation.
    pub evaluations: usize,
    /// Failed evaluations in this generation.
    pub failed_evaluations: usize,
    pub best_fitness: f64,
    pub worst_fitness: f64,
    pub mean_fitness: f64,
    /// `worst_fitness - best_fitness`.
    pub fitness_spread: f64,
    /// Fraction of candidates within the configured Hamming distance of the best.
    pub homogeneity: f64,
    /// Per-axis minimum.
    pub best_objectives: Vec<f64>,
    /// Per-axis maximum.
    pub worst_objectives: Vec<f64>,
}

impl GenerationRecord {
    /// Summarizes a population.
    ///
    /// # Arguments
    ///
    /// * `best` - The candidate the engine currently ranks first
    /// * `homogeneity_bits` - Maximum Hamming distance counted as "close to best"
    ///
    /// Returns `None` for an empty population.
    pub fn from_population(
        run_id: u64,
        generation: usize,
        evaluations: usize,
        failed_evaluations: usize,
        population: &[Candidate],
        best: &Candidate,
        homogeneity_bits: usize,
    ) -> Option<Self> {
        let first = population.first()?;
        let axes = first.objectives.len();
        let mut best_objectives = vec![f64::INFINITY; axes];
        let mut worst_objectives = vec![f64::NEG_INFINITY; axes];
        let mut best_fitness = f64::INFINITY;
        let mut worst_fitness = f64::NEG_INFINITY;
        let mut total = 0.0;
        let mut close = 0usize;

        for c in population {
            for (i, &v) in c.objectives.iter().enumerate().take(axes) {
                best_objectives[i] = best_objectives[i].min(v);
                worst_objectives[i] = worst_objectives[i].max(v);
            }
            best_fitness = best_fitness.min(c.fitness);
            worst_fitness = worst_fitness.max(c.fitness);
            total += c.fitness;
            if c.encoding.hamming(&best.encoding) <= homogeneity_bits {
                close += 1;
            }
        }

        let n = population.len() as f64;
        Some(Self {
            run_id,
            generation,
            evaluations,
            failed_evaluations,
            best_fitness,
            worst_fitness,
            mean_fitness: total / n,
            fitness_spread: worst_fitness - best_fitness,
            homogeneity: close as f64 / n,
            best_objectives,
            worst_objectives,
        })
    }
}

impl fmt::Display for GenerationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gen {:>4} | evals {:>6} | best {:.4} | mean {:.4} | spread {:.4} | homogeneity {:.2}",
            self.generation,
            self.evaluations,
            self.best_fitness,
            self.mean_fitness,
            self.fitness_spread,
            self.homogeneity
        )
    }
}

/// Destination for generation records.
pub trait DiagnosticsSink: Send + fmt::Debug {
    fn record(&mut self, record: &GenerationRecord) -> Result<(), ExportError>;

    fn flush(&mut self) -> Result<(), ExportError> {
        Ok(())
    }
}

/// Collects records of one engine run.
#[derive(Debug, Default)]
pub struct RunLog {
    run_id: u64,
    records: Vec<GenerationRecord>,
    sink: Option<Box<dyn DiagnosticsSink>>,
}

impl RunLog {
    pub fn new(run_id: u64) -> Self {
        Self {
            run_id,
            records: Vec::new(),
            sink: None,
        }
    }

    /// Also forwards every record to `sink`.
    pub fn with_sink(run_id: u64, sink: Box<dyn DiagnosticsSink>) -> Self {
        Self {
            run_id,
            records: Vec::new(),
            sink: Some(sink),
        }
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Appends a record; sink failures are logged and do not stop the run.
    pub fn record(&mut self, record: GenerationRecord) {
        debug!(
            run_id = self.run_id,
            generation = record.generation,
            evaluations = record.evaluations,
            best = record.best_fitness,
            mean = record.mean_fitness,
            homogeneity = record.homogeneity,
            "generation complete"
        );
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.record(&record) {
                warn!(run_id = self.run_id, error = %e, "diagnostics sink failed; dropping it");
                self.sink = None;
            }
        }
        self.records.push(record);
    }

    /// Flushes the sink, if any.
    pub fn finish(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush() {
                warn!(run_id = self.run_id, error = %e, "failed to flush diagnostics sink");
            }
        }
    }

    pub fn records(&self) -> &[GenerationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<GenerationRecord> {
        self.records
    }

    /// Best fitness of every recorded generation.
    pub fn best_history(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.best_fitness).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ga::encoding::BitString;

    fn candidate(bits: &[bool], objectives: &[f64]) -> Candidate {
        Candidate::new(
            BitString::new(bits.to_vec()),
            objectives.to_vec(),
            objectives.iter().sum(),
        )
    }

    #[test]
    fn test_record_statistics() {
        let pop = vec![
            candidate(&[false, false, false], &[1.0, 2.0]),
            candidate(&[false, false, true], &[3.0, 1.0]),
            candidate(&[true, true, true], &[5.0, 5.0]),
        ];
        let r = GenerationRecord::from_population(7, 3, 30, 1, &pop, &pop[0], 1).unwrap();
        assert_eq!(r.best_fitness, 3.0);
        assert_eq!(r.worst_fitness, 10.0);
        assert!((r.mean_fitness - 17.0 / 3.0).abs() < 1e-12);
        assert_eq!(r.fitness_spread, 7.0);
        assert_eq!(r.best_objectives, vec![1.0, 1.0]);
        assert_eq!(r.worst_objectives, vec![5.0, 5.0]);
        assert!((r.homogeneity - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(r.run_id, 7);
    }

    #[test]
    fn test_empty_population_has_no_record() {
        let best = candidate(&[true], &[0.0]);
        assert!(GenerationRecord::from_population(0, 0, 0, 0, &[], &best, 0).is_none());
    }

    #[test]
    fn test_run_log_history() {
        let pop = vec![candidate(&[true], &[2.0])];
        let mut log = RunLog::new(1);
        for g in 0..3 {
            let r = GenerationRecord::from_population(1, g, g * 10, 0, &pop, &pop[0], 0).unwrap();
            log.record(r);
        }
        assert_eq!(log.best_history(), vec![2.0, 2.0, 2.0]);
        assert_eq!(log.records().len(), 3);
    }
}
