//! Stopping rules for engine runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generation budget used when no rule is configured.
pub const DEFAULT_MAX_GENERATIONS: usize = 100;

/// When a run ends. Every configured criterion is checked; the first one
/// that fires stops the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoppingRule {
    /// Stop before a generation would exceed this many evaluations.
    pub max_evaluations: Option<usize>,
    /// Stop after this many generations (the initial population is generation 0).
    pub max_generations: Option<usize>,
    /// Stop when the best fitness improved by at most `plateau_delta` over
    /// this many generations.
    pub plateau_generations: Option<usize>,
    pub plateau_delta: f64,
}

impl Default for StoppingRule {
    fn default() -> Self {
        Self {
            max_evaluations: None,
            max_generations: Some(DEFAULT_MAX_GENERATIONS),
            plateau_generations: Some(20),
            plateau_delta: 1e-6,
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxEvaluations,
    MaxGenerations,
    Plateau,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::MaxEvaluations => "max evaluations",
            StopReason::MaxGenerations => "max generations",
            StopReason::Plateau => "fitness plateau",
        })
    }
}

/// State of a run as seen by the stopping rule.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// Index of the generation just recorded.
    pub generation: usize,
    /// Evaluations spent so far.
    pub evaluations: usize,
    /// Evaluations the next generation would need.
    pub next_batch: usize,
    /// Best fitness of each recorded generation.
    pub best_history: &'a [f64],
}

impl StoppingRule {
    /// Whether any criterion is configured.
    pub fn is_bounded(&self) -> bool {
        self.max_evaluations.is_some()
            || self.max_generations.is_some()
            || self.plateau_generations.is_some()
    }

    /// Generation limit in force, falling back to
    /// [`DEFAULT_MAX_GENERATIONS`] when no criterion is configured.
    pub fn effective_max_generations(&self) -> Option<usize> {
        match self.max_generations {
            Some(max) => Some(max),
            None if !self.is_bounded() => Some(DEFAULT_MAX_GENERATIONS),
            None => None,
        }
    }

    /// Checks every criterion against `progress`.
    pub fn check(&self, progress: &Progress<'_>) -> Option<StopReason> {
        if let Some(max) = self.max_evaluations {
            if progress.evaluations + progress.next_batch > max {
                return Some(StopReason::MaxEvaluations);
            }
        }
        if let Some(max) = self.effective_max_generations() {
            if progress.generation >= max {
                return Some(StopReason::MaxGenerations);
            }
        }
        if let Some(window) = self.plateau_generations {
            let h = progress.best_history;
            if window > 0 && h.len() > window {
                let then = h[h.len() - 1 - window];
                let now = h[h.len() - 1];
                if then - now <= self.plateau_delta {
                    return Some(StopReason::Plateau);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(generation: usize, evaluations: usize, history: &[f64]) -> Progress<'_> {
        Progress {
            generation,
            evaluations,
            next_batch: 10,
            best_history: history,
        }
    }

    #[test]
    fn test_max_evaluations_looks_ahead() {
        let rule = StoppingRule {
            max_evaluations: Some(100),
            max_generations: None,
            plateau_generations: None,
            plateau_delta: 0.0,
        };
        assert_eq!(rule.check(&progress(5, 90, &[])), None);
        assert_eq!(
            rule.check(&progress(6, 91, &[])),
            Some(StopReason::MaxEvaluations)
        );
    }

    #[test]
    fn test_max_generations() {
        let rule = StoppingRule {
            plateau_generations: None,
            max_generations: Some(3),
            ..StoppingRule::default()
        };
        assert_eq!(rule.check(&progress(2, 0, &[])), None);
        assert_eq!(rule.check(&progress(3, 0, &[])), Some(StopReason::MaxGenerations));
    }

    #[test]
    fn test_plateau() {
        let rule = StoppingRule {
            max_generations: None,
            plateau_generations: Some(2),
            plateau_delta: 0.01,
            ..StoppingRule::default()
        };
        assert_eq!(rule.check(&progress(2, 0, &[5.0, 4.0, 3.0])), None);
        assert_eq!(
            rule.check(&progress(3, 0, &[5.0, 3.0, 3.0, 2.995])),
            Some(StopReason::Plateau)
        );
    }

    #[test]
    fn test_unbounded_rule_falls_back() {
        let rule = StoppingRule {
            max_evaluations: None,
            max_generations: None,
            plateau_generations: None,
            plateau_delta: 0.0,
        };
        assert!(!rule.is_bounded());
        assert_eq!(rule.effective_max_generations(), Some(DEFAULT_MAX_GENERATIONS));
        assert_eq!(
            rule.check(&progress(DEFAULT_MAX_GENERATIONS, 0, &[])),
            Some(StopReason::MaxGenerations)
        );
    }
}
