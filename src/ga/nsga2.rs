//! NSGA-II: non-dominated sorting with crowding-distance truncation.

use super::Problem;
use super::candidate::{Candidate, CandidateOrder};
use super::encoding::BitString;
use super::engine::{Driver, RunOutcome};
use super::pareto::{assign_crowding_distance, non_dominated_sort};

/// Assigns front ranks and crowding distances; returns the fronts.
fn rank(population: &mut [Candidate]) -> Vec<Vec<usize>> {
    let fronts = non_dominated_sort(population);
    for front in &fronts {
        assign_crowding_distance(population, front);
    }
    fronts
}

/// Keeps `size` candidates of `combined`, filling whole fronts first and
/// cutting the last one by crowding distance.
fn truncate(mut combined: Vec<Candidate>, size: usize) -> Vec<Candidate> {
    let fronts = rank(&mut combined);
    let mut keep: Vec<usize> = Vec::with_capacity(size);
    for front in fronts {
        if keep.len() + front.len() <= size {
            keep.extend(front);
        } else {
            let mut last = front;
            last.sort_by(|&a, &b| combined[b].diversity.total_cmp(&combined[a].diversity));
            keep.extend(last.into_iter().take(size - keep.len()));
        }
        if keep.len() == size {
            break;
        }
    }
    keep.sort_unstable();

    let mut next = Vec::with_capacity(size);
    let mut it = keep.into_iter().peekable();
    for (i, c) in combined.into_iter().enumerate() {
        if it.peek() == Some(&i) {
            next.push(c);
            it.next();
        }
    }
    rank(&mut next);
    next
}

pub(crate) fn run<P: Problem>(mut driver: Driver<'_>, problem: &P, seeds: &[BitString]) -> RunOutcome {
    let size = driver.settings.population_size;
    let initial = driver.initial_encodings(problem.encoding_len(), seeds);
    let mut population = driver.evaluate(problem, initial);
    rank(&mut population);

    let mut generation = 0;
    let stop_reason = loop {
        let best = CandidateOrder::Fitness.best_index(&population).unwrap_or(0);
        if let Some(reason) = driver.observe(generation, &population, &population[best], size) {
            break reason;
        }
        let children = driver.breed(&population, size, CandidateOrder::Crowded);
        let mut combined = population;
        combined.extend(driver.evaluate(problem, children));
        population = truncate(combined, size);
        generation += 1;
    };

    let front: Vec<Candidate> = population.iter().filter(|c| c.rank == 0).cloned().collect();
    let best = population[CandidateOrder::Fitness.best_index(&population).unwrap_or(0)].clone();
    driver.finish(best, front, population, generation + 1, stop_reason)
}
