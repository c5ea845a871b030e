//! Selection, crossover and mutation operators.
//!
//! All operators draw from the engine's seeded `StdRng` on the driving
//! thread, so a run is reproducible from its seed.

use std::fmt;

use rand::Rng;
use rand::rngs::StdRng;

use super::candidate::{Candidate, CandidateOrder};
use super::encoding::BitString;
use super::engine::{CrossoverKind, EngineSettings, SelectionKind};

/// Picks a parent from the population.
pub trait Selection: fmt::Debug + Send + Sync {
    /// # Panics
    ///
    /// Panics if `population` is empty.
    fn select<'a>(
        &self,
        population: &'a [Candidate],
        order: CandidateOrder,
        rng: &mut StdRng,
    ) -> &'a Candidate;
}

/// Best of `size` uniformly drawn candidates (with replacement).
#[derive(Debug, Clone, Copy)]
pub struct TournamentSelection {
    pub size: usize,
}

impl Selection for TournamentSelection {
    fn select<'a>(
        &self,
        population: &'a [Candidate],
        order: CandidateOrder,
        rng: &mut StdRng,
    ) -> &'a Candidate {
        let mut best = &population[rng.random_range(0..population.len())];
        for _ in 1..self.size.max(1) {
            let challenger = &population[rng.random_range(0..population.len())];
            if order.compare(challenger, best).is_lt() {
                best = challenger;
            }
        }
        best
    }
}

/// Linear ranking: the best candidate is drawn with probability
/// `pressure / n`, the worst with `(2 - pressure) / n`.
#[derive(Debug, Clone, Copy)]
pub struct LinearRankingSelection {
    /// Selection pressure in `[1, 2]`.
    pub pressure: f64,
}

impl Selection for LinearRankingSelection {
    fn select<'a>(
        &self,
        population: &'a [Candidate],
        order: CandidateOrder,
        rng: &mut StdRng,
    ) -> &'a Candidate {
        let n = population.len();
        if n == 1 {
            return &population[0];
        }
        let mut ranked: Vec<usize> = (0..n).collect();
        ranked.sort_by(|&a, &b| order.compare(&population[a], &population[b]));

        let s = self.pressure.clamp(1.0, 2.0);
        let mut target = rng.random::<f64>();
        for (rank, &idx) in ranked.iter().enumerate() {
            let p = (s - (2.0 * s - 2.0) * rank as f64 / (n - 1) as f64) / n as f64;
            if target < p {
                return &population[idx];
            }
            target -= p;
        }
        &population[ranked[n - 1]]
    }
}

/// Recombines two parents into two children.
pub trait Crossover: fmt::Debug + Send + Sync {
    fn crossover(&self, a: &BitString, b: &BitString, rng: &mut StdRng) -> (BitString, BitString);
}

fn swap_range(a: &mut BitString, b: &mut BitString, from: usize, to: usize) {
    let (a, b) = (a.bits_mut(), b.bits_mut());
    for i in from..to {
        std::mem::swap(&mut a[i], &mut b[i]);
    }
}

/// Swaps the tails after one random cut point.
#[derive(Debug, Clone, Copy)]
pub struct SinglePointCrossover {
    pub probability: f64,
}

impl Crossover for SinglePointCrossover {
    fn crossover(&self, a: &BitString, b: &BitString, rng: &mut StdRng) -> (BitString, BitString) {
        let (mut x, mut y) = (a.clone(), b.clone());
        let len = x.len().min(y.len());
        if len >= 2 && rng.random_bool(self.probability.clamp(0.0, 1.0)) {
            let cut = rng.random_range(1..len);
            swap_range(&mut x, &mut y, cut, len);
        }
        (x, y)
    }
}

/// Swaps the segment between two random cut points.
#[derive(Debug, Clone, Copy)]
pub struct TwoPointCrossover {
    pub probability: f64,
}

impl Crossover for TwoPointCrossover {
    fn crossover(&self, a: &BitString, b: &BitString, rng: &mut StdRng) -> (BitString, BitString) {
        let (mut x, mut y) = (a.clone(), b.clone());
        let len = x.len().min(y.len());
        if len >= 2 && rng.random_bool(self.probability.clamp(0.0, 1.0)) {
            let p = rng.random_range(0..len);
            let q = rng.random_range(0..len);
            let (from, to) = if p <= q { (p, q + 1) } else { (q, p + 1) };
            swap_range(&mut x, &mut y, from, to);
        }
        (x, y)
    }
}

/// Swaps each bit independently with probability one half.
#[derive(Debug, Clone, Copy)]
pub struct UniformCrossover {
    pub probability: f64,
}

impl Crossover for UniformCrossover {
    fn crossover(&self, a: &BitString, b: &BitString, rng: &mut StdRng) -> (BitString, BitString) {
        let (mut x, mut y) = (a.clone(), b.clone());
        let len = x.len().min(y.len());
        if len >= 1 && rng.random_bool(self.probability.clamp(0.0, 1.0)) {
            let (xs, ys) = (x.bits_mut(), y.bits_mut());
            for i in 0..len {
                if rng.random::<bool>() {
                    std::mem::swap(&mut xs[i], &mut ys[i]);
                }
            }
        }
        (x, y)
    }
}

/// Perturbs a child in place.
pub trait Mutation: fmt::Debug + Send + Sync {
    /// Returns the number of flipped bits.
    fn mutate(&self, bits: &mut BitString, rng: &mut StdRng) -> usize;
}

/// Flips every bit independently with probability `rate` (default `1/len`).
#[derive(Debug, Clone, Copy, Default)]
pub struct BitFlipMutation {
    pub rate: Option<f64>,
}

impl Mutation for BitFlipMutation {
    fn mutate(&self, bits: &mut BitString, rng: &mut StdRng) -> usize {
        let len = bits.len();
        if len == 0 {
            return 0;
        }
        let rate = self.rate.unwrap_or(1.0 / len as f64);
        let mut flipped = 0;
        for i in 0..len {
            if rng.random::<f64>() < rate {
                bits.flip(i);
                flipped += 1;
            }
        }
        flipped
    }
}

/// The operator set of one engine.
#[derive(Debug)]
pub struct Operators {
    pub selection: Box<dyn Selection>,
    pub crossover: Box<dyn Crossover>,
    pub mutation: Box<dyn Mutation>,
}

impl Operators {
    /// Builds the operators named in `settings`.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        let selection: Box<dyn Selection> = match settings.selection {
            SelectionKind::Tournament => Box::new(TournamentSelection {
                size: settings.tournament_size,
            }),
            SelectionKind::LinearRanking => Box::new(LinearRankingSelection {
                pressure: settings.ranking_pressure,
            }),
        };
        let probability = settings.crossover_probability;
        let crossover: Box<dyn Crossover> = match settings.crossover {
            CrossoverKind::SinglePoint => Box::new(SinglePointCrossover { probability }),
            CrossoverKind::TwoPoint => Box::new(TwoPointCrossover { probability }),
            CrossoverKind::Uniform => Box::new(UniformCrossover { probability }),
        };
        Self {
            selection,
            crossover,
            mutation: Box::new(BitFlipMutation {
                rate: settings.mutation_rate,
            }),
        }
    }
}
