//! Archive-based multi-objective GA.
//!
//! Non-dominated candidates are kept in a bounded archive. When the archive
//! overflows, members of the most crowded grid cell are dropped first.
//! Parents are drawn from the archive, favouring isolated members.

use super::Problem;
use super::candidate::{Candidate, CandidateOrder};
use super::encoding::BitString;
use super::engine::{Driver, RunOutcome};
use super::pareto::assign_grid_density;

#[derive(Debug, Default)]
pub(crate) struct Archive {
    members: Vec<Candidate>,
}

impl Archive {
    /// Offers candidates to the archive; returns how many were accepted.
    pub fn offer(&mut self, candidates: &[Candidate], capacity: usize, divisions: usize) -> usize {
        let mut accepted = 0;
        for c in candidates.iter().filter(|c| !c.failed) {
            if self
                .members
                .iter()
                .any(|m| m.dominates(c) || m.encoding == c.encoding)
            {
                continue;
            }
            self.members.retain(|m| !c.dominates(m));
            let mut member = c.clone();
            member.rank = 0;
            self.members.push(member);
            accepted += 1;
        }
        self.shrink(capacity.max(1), divisions);
        accepted
    }

    fn shrink(&mut self, capacity: usize, divisions: usize) {
        let all: Vec<usize> = (0..self.members.len()).collect();
        assign_grid_density(&mut self.members, &all, divisions);
        while self.members.len() > capacity {
            // lowest diversity = most crowded cell; ties drop the worse fitness
            let worst = (0..self.members.len())
                .reduce(|a, b| {
                    let (ma, mb) = (&self.members[a], &self.members[b]);
                    match ma.diversity.total_cmp(&mb.diversity) {
                        std::cmp::Ordering::Less => a,
                        std::cmp::Ordering::Greater => b,
                        std::cmp::Ordering::Equal if mb.fitness > ma.fitness => b,
                        std::cmp::Ordering::Equal => a,
                    }
                })
                .unwrap_or(0);
            self.members.remove(worst);
            let all: Vec<usize> = (0..self.members.len()).collect();
            assign_grid_density(&mut self.members, &all, divisions);
        }
    }

    pub fn members(&self) -> &[Candidate] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn best(&self) -> Option<&Candidate> {
        CandidateOrder::Fitness
            .best_index(&self.members)
            .map(|i| &self.members[i])
    }
}

pub(crate) fn run<P: Problem>(mut driver: Driver<'_>, problem: &P, seeds: &[BitString]) -> RunOutcome {
    let size = driver.settings.population_size;
    let capacity = driver.settings.archive_size;
    let divisions = driver.settings.grid_divisions;

    let initial = driver.initial_encodings(problem.encoding_len(), seeds);
    let mut population = driver.evaluate(problem, initial);
    let mut archive = Archive::default();
    archive.offer(&population, capacity, divisions);

    let mut generation = 0;
    let stop_reason = loop {
        let best = match archive.best() {
            Some(b) => b.clone(),
            None => population[CandidateOrder::Fitness.best_index(&population).unwrap_or(0)].clone(),
        };
        if let Some(reason) = driver.observe(generation, &population, &best, size) {
            break reason;
        }
        let children = if archive.len() >= 2 {
            driver.breed(archive.members(), size, CandidateOrder::Crowded)
        } else {
            driver.breed(&population, size, CandidateOrder::Fitness)
        };
        population = driver.evaluate(problem, children);
        archive.offer(&population, capacity, divisions);
        generation += 1;
    };

    let front = archive.members().to_vec();
    let best = match archive.best() {
        Some(b) => b.clone(),
        None => population[CandidateOrder::Fitness.best_index(&population).unwrap_or(0)].clone(),
    };
    driver.finish(best, front, population, generation + 1, stop_reason)
}
