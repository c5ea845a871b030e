//! Elitist generational GA on the scalar fitness.
//!
//! The best `elite_count` candidates survive unchanged, so the best fitness
//! of a run never gets worse from one generation to the next.

use super::Problem;
use super::candidate::CandidateOrder;
use super::encoding::BitString;
use super::engine::{Driver, RunOutcome};

pub(crate) fn run<P: Problem>(mut driver: Driver<'_>, problem: &P, seeds: &[BitString]) -> RunOutcome {
    let order = CandidateOrder::Fitness;
    let size = driver.settings.population_size;
    let elites = driver.settings.elite_count.min(size.saturating_sub(1)).max(1);
    let batch = size - elites;

    let initial = driver.initial_encodings(problem.encoding_len(), seeds);
    let mut population = driver.evaluate(problem, initial);
    order.sort(&mut population);

    let mut generation = 0;
    let stop_reason = loop {
        if let Some(reason) = driver.observe(generation, &population, &population[0], batch) {
            break reason;
        }
        let children = driver.breed(&population, batch, order);
        let mut next: Vec<_> = population[..elites].to_vec();
        next.extend(driver.evaluate(problem, children));
        order.sort(&mut next);
        population = next;
        generation += 1;
    };

    let best = population[0].clone();
    driver.finish(best.clone(), vec![best], population, generation + 1, stop_reason)
}
