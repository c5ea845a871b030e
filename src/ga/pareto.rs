//! Pareto ranking and density estimators for the multi-objective engines.

use std::collections::HashMap;

use super::candidate::Candidate;

/// Sorts `population` into non-dominated fronts and stores each
/// candidate's front index in `rank`.
///
/// Returns the fronts as index lists, best front first.
pub fn non_dominated_sort(population: &mut [Candidate]) -> Vec<Vec<usize>> {
    let n = population.len();
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];
    let mut fronts: Vec<Vec<usize>> = vec![Vec::new()];

    for i in 0..n {
        for j in (i + 1)..n {
            if population[i].dominates(&population[j]) {
                dominated_by[i].push(j);
                domination_count[j] += 1;
            } else if population[j].dominates(&population[i]) {
                dominated_by[j].push(i);
                domination_count[i] += 1;
            }
        }
    }
    for (i, &count) in domination_count.iter().enumerate() {
        if count == 0 {
            fronts[0].push(i);
        }
    }

    let mut k = 0;
    while !fronts[k].is_empty() {
        let mut next = Vec::new();
        for &i in &fronts[k] {
            population[i].rank = k;
            for &j in &dominated_by[i] {
                domination_count[j] -= 1;
                if domination_count[j] == 0 {
                    next.push(j);
                }
            }
        }
        next.sort_unstable();
        fronts.push(next);
        k += 1;
    }
    fronts.pop();
    fronts
}

/// Assigns NSGA-II crowding distance to the members of one front.
///
/// Boundary candidates on every axis get infinite distance.
pub fn assign_crowding_distance(population: &mut [Candidate], front: &[usize]) {
    for &i in front {
        population[i].diversity = 0.0;
    }
    if front.len() <= 2 {
        for &i in front {
            population[i].diversity = f64::INFINITY;
        }
        return;
    }
    let axes = population[front[0]].objectives.len();
    let mut sorted = front.to_vec();
    for m in 0..axes {
        sorted.sort_by(|&a, &b| {
            population[a].objectives[m].total_cmp(&population[b].objectives[m])
        });
        let lo = population[sorted[0]].objectives[m];
        let hi = population[sorted[sorted.len() - 1]].objectives[m];
        population[sorted[0]].diversity = f64::INFINITY;
        population[sorted[sorted.len() - 1]].diversity = f64::INFINITY;
        let range = hi - lo;
        if range <= 0.0 || !range.is_finite() {
            continue;
        }
        for w in 1..sorted.len() - 1 {
            let gap = population[sorted[w + 1]].objectives[m] - population[sorted[w - 1]].objectives[m];
            population[sorted[w]].diversity += gap / range;
        }
    }
}

/// Hypercube grid density: each axis is split into `divisions` cells over
/// the range of `members`; a candidate's diversity is the reciprocal of its
/// cell's occupancy.
pub fn assign_grid_density(population: &mut [Candidate], members: &[usize], divisions: usize) {
    if members.is_empty() {
        return;
    }
    let divisions = divisions.max(1);
    let axes = population[members[0]].objectives.len();
    let mut lo = vec![f64::INFINITY; axes];
    let mut hi = vec![f64::NEG_INFINITY; axes];
    for &i in members {
        for (m, &v) in population[i].objectives.iter().enumerate().take(axes) {
            lo[m] = lo[m].min(v);
            hi[m] = hi[m].max(v);
        }
    }

    let cell_of = |c: &Candidate| -> Vec<usize> {
        (0..axes)
            .map(|m| {
                let range = hi[m] - lo[m];
                if range <= 0.0 || !range.is_finite() {
                    0
                } else {
                    let x = ((c.objectives[m] - lo[m]) / range * divisions as f64) as usize;
                    x.min(divisions - 1)
                }
            })
            .collect()
    };

    let cells: Vec<Vec<usize>> = members.iter().map(|&i| cell_of(&population[i])).collect();
    let mut occupancy: HashMap<&[usize], usize> = HashMap::new();
    for cell in &cells {
        *occupancy.entry(cell.as_slice()).or_insert(0) += 1;
    }
    for (&i, cell) in members.iter().zip(&cells) {
        let count = occupancy.get(cell.as_slice()).copied().unwrap_or(1);
        population[i].diversity = 1.0 / count as f64;
    }
}
