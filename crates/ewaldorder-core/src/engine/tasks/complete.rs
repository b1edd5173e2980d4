use crate::core::ewald::EwaldError;
use crate::core::ewald::summation::EwaldSummation;
use crate::core::models::site::Site;
use crate::core::models::structure::Structure;
use crate::core::symmetry::SymmetryOracle;
use crate::core::utils::combinatorics::total_combinations;
use crate::engine::config::{RemovalGroup, SearchBudget};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::{Manipulation, Solution};
use itertools::Itertools;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const BATCH_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct CompleteSettings {
    /// Per-remaining-site energy difference below which two orderings are
    /// checked for symmetry equivalence.
    pub energy_tolerance: f64,
    pub symmetry_tolerance: f64,
    pub budget: SearchBudget,
}

#[derive(Debug, Clone)]
pub struct CompleteResult {
    /// Symmetrically distinct orderings, ascending by energy then index list.
    pub solutions: Vec<Solution>,
    pub evaluated: u64,
    pub budget_exhausted: bool,
}

struct Accepted {
    solution: Solution,
    sites: Vec<Site>,
}

/// Enumerates every combination of per-group choices, evaluates each exactly
/// and keeps one representative per symmetry class.
#[instrument(skip_all, name = "complete_ordering_task", fields(groups = groups.len()))]
pub fn run(
    structure: &Structure,
    ewald: &EwaldSummation,
    groups: &[RemovalGroup],
    settings: &CompleteSettings,
    oracle: &dyn SymmetryOracle,
    reporter: &ProgressReporter,
) -> Result<CompleteResult, EngineError> {
    let started = Instant::now();
    let total = total_combinations(groups.iter().map(|g| (g.len(), g.count)));
    info!(total, "Enumerating all orderings.");
    reporter.start_task(total);

    let mut accepted: Vec<Accepted> = Vec::new();
    let mut evaluated: u64 = 0;
    let mut budget_exhausted = false;

    let choices = enumerate(groups);
    for batch in &choices.chunks(BATCH_SIZE) {
        let mut batch: Vec<Vec<Manipulation>> = batch.collect();
        if let Some(max) = settings.budget.max_nodes {
            let allowed = max.saturating_sub(evaluated);
            if (batch.len() as u64) > allowed {
                batch.truncate(allowed as usize);
                budget_exhausted = true;
            }
        }

        let energies = batch_energies(ewald, groups, &batch)?;
        let steps = batch.len() as u64;
        evaluated += steps;

        for (manipulations, energy) in batch.into_iter().zip(energies) {
            let removals = manipulations.iter().filter(|m| m.replacement.is_none()).count();
            let remaining = structure.len().saturating_sub(removals).max(1) as f64;
            let sites = manipulated_sites(structure, &manipulations);
            let site_refs: Vec<&Site> = sites.iter().collect();

            let duplicate = accepted.iter().any(|known| {
                ((energy - known.solution.energy) / remaining).abs() < settings.energy_tolerance
                    && oracle.are_equivalent(
                        &site_refs,
                        &known.sites.iter().collect::<Vec<_>>(),
                        settings.symmetry_tolerance,
                    )
            });
            if !duplicate {
                accepted.push(Accepted {
                    solution: Solution::new(energy, manipulations),
                    sites,
                });
            }
        }

        reporter.report(Progress::TaskAdvance { steps });
        debug!(
            evaluated,
            distinct = accepted.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Complete ordering progress."
        );

        if let Some(limit) = settings.budget.time_limit {
            if started.elapsed() >= limit {
                budget_exhausted = true;
            }
        }
        if budget_exhausted {
            warn!(
                evaluated,
                total,
                "Search budget exhausted; returning the distinct orderings found so far."
            );
            break;
        }
    }
    reporter.report(Progress::TaskFinish);

    let mut solutions: Vec<Solution> = accepted.into_iter().map(|a| a.solution).collect();
    solutions.sort();

    info!(
        evaluated,
        distinct = solutions.len(),
        "Complete ordering finished."
    );

    if solutions.is_empty() {
        return Err(EngineError::NoSolution);
    }
    Ok(CompleteResult {
        solutions,
        evaluated,
        budget_exhausted,
    })
}

/// Lazily yields every assignment as a manipulation list, in lexicographic
/// order of the per-group combinations.
fn enumerate(groups: &[RemovalGroup]) -> Box<dyn Iterator<Item = Vec<Manipulation>> + '_> {
    if groups.is_empty() {
        return Box::new(std::iter::once(Vec::new()));
    }
    Box::new(
        groups
            .iter()
            .map(|g| g.indices.iter().copied().combinations(g.count))
            .multi_cartesian_product()
            .map(move |parts| {
                parts
                    .into_iter()
                    .zip(groups)
                    .flat_map(|(chosen, group)| {
                        chosen.into_iter().map(move |index| Manipulation {
                            index,
                            replacement: group.replacement,
                        })
                    })
                    .collect()
            }),
    )
}

fn batch_energies(
    ewald: &EwaldSummation,
    groups: &[RemovalGroup],
    batch: &[Vec<Manipulation>],
) -> Result<Vec<f64>, EwaldError> {
    let scale_of = |index: usize| {
        groups
            .iter()
            .find(|g| g.indices.binary_search(&index).is_ok())
            .map_or(0.0, |g| g.scale)
    };
    let energy = |manipulations: &Vec<Manipulation>| {
        let scales: Vec<(usize, f64)> = manipulations
            .iter()
            .map(|m| (m.index, scale_of(m.index)))
            .collect();
        ewald.compute_scaled_energy(&scales)
    };

    #[cfg(not(feature = "parallel"))]
    let energies = batch.iter().map(energy).collect();

    #[cfg(feature = "parallel")]
    let energies = batch.par_iter().map(energy).collect();

    energies
}

/// The sites touched by an assignment as the symmetry oracle should see them:
/// removed sites as they were, replaced sites carrying their new species.
fn manipulated_sites(structure: &Structure, manipulations: &[Manipulation]) -> Vec<Site> {
    manipulations
        .iter()
        .filter_map(|m| {
            let site = structure.site(m.index)?;
            Some(match m.replacement {
                None => site.clone(),
                Some(species) => Site::ordered(species, site.frac_coords),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ewald::params::EwaldParams;
    use crate::core::models::{lattice::Lattice, species::Species};
    use crate::core::symmetry::{SymmetryOperation, SymmetryOperations, TrivialSymmetry};
    use nalgebra::{Matrix3, Vector3};

    fn sp(s: &str) -> Species {
        s.parse().unwrap()
    }

    /// Rock-salt LiF; Li at indices 0..4.
    fn lif() -> Structure {
        let lattice = Lattice::cubic(4.0).unwrap();
        let fcc = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.5, 0.5, 0.0),
            Vector3::new(0.5, 0.0, 0.5),
            Vector3::new(0.0, 0.5, 0.5),
        ];
        let mut sites: Vec<Site> = fcc.iter().map(|&f| Site::ordered(sp("Li+"), f)).collect();
        for f in fcc {
            let shifted = (f + Vector3::new(0.5, 0.0, 0.0)).map(|x| x % 1.0);
            sites.push(Site::ordered(sp("F-"), shifted));
        }
        Structure::new(lattice, sites)
    }

    fn fcc_translations() -> Vec<SymmetryOperation> {
        with_fcc_translations(Matrix3::identity())
    }

    fn with_fcc_translations(rotation: Matrix3<i8>) -> Vec<SymmetryOperation> {
        [(0.5, 0.5, 0.0), (0.5, 0.0, 0.5), (0.0, 0.5, 0.5), (0.0, 0.0, 0.0)]
            .into_iter()
            .map(|(x, y, z)| SymmetryOperation::new(rotation, Vector3::new(x, y, z)))
            .collect()
    }

    fn settings() -> CompleteSettings {
        CompleteSettings {
            energy_tolerance: 1e-5,
            symmetry_tolerance: 0.1,
            budget: SearchBudget::unlimited(),
        }
    }

    fn li_group() -> Vec<RemovalGroup> {
        vec![RemovalGroup {
            indices: vec![0, 1, 2, 3],
            count: 2,
            replacement: None,
            scale: 0.0,
        }]
    }

    fn run_with(oracle: &dyn SymmetryOracle, settings: &CompleteSettings) -> CompleteResult {
        let s = lif();
        let ewald = EwaldSummation::new(&s, &EwaldParams::default()).unwrap();
        run(&s, &ewald, &li_group(), settings, oracle, &ProgressReporter::new()).unwrap()
    }

    #[test]
    fn identity_only_keeps_every_combination() {
        let result = run_with(&TrivialSymmetry, &settings());
        assert_eq!(result.evaluated, 6);
        assert_eq!(result.solutions.len(), 6);
        let first: Vec<usize> = result.solutions[0].indices().collect();
        assert_eq!(first, vec![0, 1]);
    }

    #[test]
    fn translations_merge_parallel_pairs() {
        let oracle = SymmetryOperations::new(fcc_translations());
        let result = run_with(&oracle, &settings());
        assert_eq!(result.solutions.len(), 3);
    }

    #[test]
    fn cubic_operations_leave_one_class() {
        let mut ops = fcc_translations();
        ops.extend(with_fcc_translations(Matrix3::new(0, 0, 1, 1, 0, 0, 0, 1, 0)));
        ops.extend(with_fcc_translations(Matrix3::new(0, 1, 0, 0, 0, 1, 1, 0, 0)));
        let result = run_with(&SymmetryOperations::new(ops), &settings());
        assert_eq!(result.solutions.len(), 1);
    }

    #[test]
    fn zero_energy_tolerance_disables_deduplication() {
        let oracle = SymmetryOperations::new(fcc_translations());
        let strict = CompleteSettings {
            energy_tolerance: 0.0,
            ..settings()
        };
        assert_eq!(run_with(&oracle, &strict).solutions.len(), 6);
    }

    #[test]
    fn energies_match_partial_energies() {
        let s = lif();
        let ewald = EwaldSummation::new(&s, &EwaldParams::default()).unwrap();
        let result = run(
            &s,
            &ewald,
            &li_group(),
            &settings(),
            &TrivialSymmetry,
            &ProgressReporter::new(),
        )
        .unwrap();
        for solution in &result.solutions {
            let removed: Vec<usize> = solution.indices().collect();
            let expected = ewald.compute_partial_energy(&removed).unwrap();
            assert!((solution.energy - expected).abs() < 1e-10);
        }
    }

    #[test]
    fn node_budget_limits_evaluations() {
        let limited = CompleteSettings {
            budget: SearchBudget {
                max_nodes: Some(2),
                time_limit: None,
            },
            ..settings()
        };
        let result = run_with(&TrivialSymmetry, &limited);
        assert!(result.budget_exhausted);
        assert_eq!(result.evaluated, 2);
        assert_eq!(result.solutions.len(), 2);
    }

    #[test]
    fn no_groups_yield_the_original_energy() {
        let s = lif();
        let ewald = EwaldSummation::new(&s, &EwaldParams::default()).unwrap();
        let result = run(&s, &ewald, &[], &settings(), &TrivialSymmetry, &ProgressReporter::new())
            .unwrap();
        assert_eq!(result.solutions.len(), 1);
        assert!((result.solutions[0].energy - ewald.total_energy()).abs() < 1e-12);
    }

    #[test]
    fn replacements_are_seen_with_their_new_species() {
        let s = lif();
        let ewald = EwaldSummation::new(&s, &EwaldParams::default()).unwrap();
        let groups = vec![RemovalGroup {
            indices: vec![0, 1, 2, 3],
            count: 1,
            replacement: Some(sp("Mg2+")),
            scale: 2.0,
        }];
        let oracle = SymmetryOperations::new(fcc_translations());
        let result = run(&s, &ewald, &groups, &settings(), &oracle, &ProgressReporter::new()).unwrap();
        assert_eq!(result.solutions.len(), 1);
        assert_eq!(result.solutions[0].manipulations[0].replacement, Some(sp("Mg2+")));
    }
}
