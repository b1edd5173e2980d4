use crate::core::ewald::summation::EwaldSummation;
use crate::engine::config::RemovalGroup;
use crate::engine::energy_matrix::EnergyMatrix;
use crate::engine::error::EngineError;
use crate::engine::state::{Manipulation, Solution};
use std::collections::HashSet;
use tracing::{debug, instrument, trace};

/// Greedy ordering: repeatedly manipulates the undecided site with the
/// highest `2 * row_sum - diagonal` among groups that still need decisions.
/// Produces exactly one solution with no optimality guarantee.
#[instrument(skip_all, name = "best_first_ordering_task", fields(groups = groups.len()))]
pub fn run(ewald: &EwaldSummation, groups: &[RemovalGroup]) -> Result<Solution, EngineError> {
    let mut matrix = EnergyMatrix::from_ewald(ewald);
    let mut done = vec![0usize; groups.len()];
    let mut decided: HashSet<usize> = HashSet::new();
    let mut manipulations = Vec::new();

    let total: usize = groups.iter().map(|g| g.count).sum();
    for step in 0..total {
        let Some((g, index, score)) = pick(&matrix, groups, &done, &decided) else {
            return Err(EngineError::Internal(format!(
                "no undecided site left at step {} of {}",
                step + 1,
                total
            )));
        };
        trace!(index, score, "Greedy pick.");

        matrix.scale_site(index, groups[g].scale);
        decided.insert(index);
        done[g] += 1;
        manipulations.push(Manipulation {
            index,
            replacement: groups[g].replacement,
        });
    }

    let energy = matrix.exact_total();
    debug!(energy, decisions = manipulations.len(), "Best-first ordering finished.");
    Ok(Solution::new(energy, manipulations))
}

/// Highest-scoring undecided site as `(group, index, score)`; equal scores go
/// to the lowest site index.
fn pick(
    matrix: &EnergyMatrix,
    groups: &[RemovalGroup],
    done: &[usize],
    decided: &HashSet<usize>,
) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for (g, group) in groups.iter().enumerate() {
        if done[g] >= group.count {
            continue;
        }
        for &index in group.indices.iter().filter(|i| !decided.contains(i)) {
            let score = 2.0 * matrix.row_sum(index) - matrix.get(index, index);
            let better = match best {
                None => true,
                Some((_, current_index, current)) => {
                    score > current || (score == current && index < current_index)
                }
            };
            if better {
                best = Some((g, index, score));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ewald::params::EwaldParams;
    use crate::core::models::{lattice::Lattice, site::Site, species::Species, structure::Structure};
    use nalgebra::{DMatrix, Vector3};

    fn structure() -> Structure {
        let sp = |s: &str| -> Species { s.parse().unwrap() };
        let lattice = Lattice::orthorhombic(4.0, 5.0, 6.0).unwrap();
        let mut sites = vec![
            Site::ordered(sp("O2-"), Vector3::new(0.0, 0.0, 0.0)),
            Site::ordered(sp("O2-"), Vector3::new(0.5, 0.5, 0.5)),
        ];
        for f in [
            Vector3::new(0.5, 0.0, 0.1),
            Vector3::new(0.0, 0.5, 0.2),
            Vector3::new(0.2, 0.3, 0.7),
            Vector3::new(0.7, 0.8, 0.4),
        ] {
            sites.push(Site::new(vec![(sp("Li+"), 0.5)], f));
        }
        for f in [Vector3::new(0.25, 0.75, 0.0), Vector3::new(0.75, 0.25, 0.9)] {
            sites.push(Site::new(vec![(sp("Mg2+"), 0.5)], f));
        }
        Structure::new(lattice, sites)
    }

    fn group(indices: Vec<usize>, count: usize) -> RemovalGroup {
        RemovalGroup {
            indices,
            count,
            replacement: None,
            scale: 0.0,
        }
    }

    #[test]
    fn produces_exact_counts_per_group() {
        let s = structure();
        let ewald = EwaldSummation::new(&s, &EwaldParams::default()).unwrap();
        let groups = vec![group(vec![2, 3, 4, 5], 2), group(vec![6, 7], 1)];
        let solution = run(&ewald, &groups).unwrap();

        let indices: Vec<usize> = solution.indices().collect();
        assert_eq!(indices.len(), 3);
        assert_eq!(indices.iter().filter(|&&i| (2..6).contains(&i)).count(), 2);
        assert_eq!(indices.iter().filter(|&&i| (6..8).contains(&i)).count(), 1);
    }

    #[test]
    fn reported_energy_matches_partial_energy() {
        let s = structure();
        let ewald = EwaldSummation::new(&s, &EwaldParams::default()).unwrap();
        let groups = vec![group(vec![2, 3, 4, 5], 2)];
        let solution = run(&ewald, &groups).unwrap();
        let removed: Vec<usize> = solution.indices().collect();
        let expected = ewald.compute_partial_energy(&removed).unwrap();
        assert!((solution.energy - expected).abs() < 1e-8);
    }

    #[test]
    fn no_work_returns_the_total_energy() {
        let s = structure();
        let ewald = EwaldSummation::new(&s, &EwaldParams::default()).unwrap();
        let solution = run(&ewald, &[group(vec![2, 3], 0)]).unwrap();
        assert!(solution.manipulations.is_empty());
        assert!((solution.energy - ewald.total_energy()).abs() < 1e-9);
    }

    #[test]
    fn equal_scores_go_to_the_lowest_site_index() {
        let matrix = EnergyMatrix::new(DMatrix::from_element(7, 7, 1.0));
        let groups = vec![group(vec![5, 6], 1), group(vec![2, 3], 1)];
        let picked = pick(&matrix, &groups, &[0, 0], &HashSet::new());
        assert_eq!(picked.map(|(g, index, _)| (g, index)), Some((1, 2)));

        let decided: HashSet<usize> = [2].into_iter().collect();
        let picked = pick(&matrix, &groups, &[0, 1], &decided);
        assert_eq!(picked.map(|(g, index, _)| (g, index)), Some((0, 5)));
    }
}
