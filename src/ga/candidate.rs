//! Candidates and the orderings engines rank them by.

use std::cmp::Ordering;

use serde::Serialize;

use super::encoding::BitString;

/// An evaluated encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub encoding: BitString,
    /// Objective vector (minimized).
    pub objectives: Vec<f64>,
    /// Scalar fitness (minimized).
    pub fitness: f64,
    /// Pareto front index, 0 = non-dominated.
    pub rank: usize,
    /// Crowding distance or grid-density score; higher is more isolated.
    pub diversity: f64,
    /// Evaluation failed and the candidate carries the failure penalty.
    pub failed: bool,
}

impl Candidate {
    pub fn new(encoding: BitString, objectives: Vec<f64>, fitness: f64) -> Self {
        Self {
            encoding,
            objectives,
            fitness,
            rank: 0,
            diversity: 0.0,
            failed: false,
        }
    }

    /// Candidate whose evaluation failed: every objective is `penalty`.
    pub fn penalized(encoding: BitString, objective_count: usize, penalty: f64) -> Self {
        Self {
            failed: true,
            ..Self::new(encoding, vec![penalty; objective_count.max(1)], penalty)
        }
    }

    /// Pareto dominance for minimization.
    pub fn dominates(&self, other: &Candidate) -> bool {
        let mut strictly = false;
        for (a, b) in self.objectives.iter().zip(&other.objectives) {
            if a > b {
                return false;
            }
            if a < b {
                strictly = true;
            }
        }
        strictly
    }
}

/// How engines compare candidates; `Ordering::Less` means "better".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrder {
    /// Lower scalar fitness wins.
    Fitness,
    /// Lower front wins, then higher diversity, then lower fitness.
    Crowded,
}

impl CandidateOrder {
    pub fn compare(self, a: &Candidate, b: &Candidate) -> Ordering {
        match self {
            CandidateOrder::Fitness => a.fitness.total_cmp(&b.fitness),
            CandidateOrder::Crowded => a
                .rank
                .cmp(&b.rank)
                .then_with(|| b.diversity.total_cmp(&a.diversity))
                .then_with(|| a.fitness.total_cmp(&b.fitness)),
        }
    }

    /// Index of the best candidate; ties keep the earliest.
    pub fn best_index(self, population: &[Candidate]) -> Option<usize> {
        (0..population.len()).reduce(|best, i| {
            if self.compare(&population[i], &population[best]) == Ordering::Less {
                i
            } else {
                best
            }
        })
    }

    /// Stable in-place sort, best first.
    pub fn sort(self, population: &mut [Candidate]) {
        population.sort_by(|a, b| self.compare(a, b));
    }
}
