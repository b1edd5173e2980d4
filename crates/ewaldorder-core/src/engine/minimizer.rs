use super::config::{RemovalGroup, SearchBudget};
use super::energy_matrix::EnergyMatrix;
use super::state::{Manipulation, Solution, SolutionSet};
use crate::core::models::species::Species;
use slotmap::{SlotMap, new_key_type};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

new_key_type! {
    /// Handle to a pending node of the search tree.
    pub struct NodeId;
}

const BUDGET_CHECK_INTERVAL: u64 = 1024;

#[derive(Debug, Clone)]
struct ActiveGroup {
    candidates: Vec<usize>,
    remaining: usize,
    scale: f64,
    replacement: Option<Species>,
}

impl From<&RemovalGroup> for ActiveGroup {
    fn from(group: &RemovalGroup) -> Self {
        Self {
            candidates: group.indices.clone(),
            remaining: group.count,
            scale: group.scale,
            replacement: group.replacement,
        }
    }
}

/// A partial assignment: the working matrix with every decision so far
/// applied, the groups still open, and the manipulations made.
#[derive(Debug, Clone)]
pub struct SearchNode {
    matrix: EnergyMatrix,
    groups: Vec<ActiveGroup>,
    manipulations: Vec<Manipulation>,
}

#[derive(Debug, Clone)]
pub struct MinimizerOutcome {
    /// Ascending by energy, then by manipulated index list.
    pub solutions: Vec<Solution>,
    pub nodes_expanded: u64,
    pub budget_exhausted: bool,
}

/// Branch-and-bound search for the lowest-energy ways to apply `groups` to a
/// pair-energy matrix.
///
/// The last open group is decided first. At each node it picks the candidate
/// that lowers the working total the most and branches on applying the
/// manipulation to it (explored first) or leaving it untouched. A node is
/// pruned when its best-case bound exceeds the energy of the worst solution
/// kept, once `num_to_return` solutions exist.
pub struct EwaldMinimizer {
    matrix: EnergyMatrix,
    groups: Vec<RemovalGroup>,
    num_to_return: usize,
    budget: SearchBudget,
}

impl EwaldMinimizer {
    pub fn new(
        matrix: EnergyMatrix,
        groups: Vec<RemovalGroup>,
        num_to_return: usize,
        budget: SearchBudget,
    ) -> Self {
        Self {
            matrix,
            groups,
            num_to_return: num_to_return.max(1),
            budget,
        }
    }

    pub fn minimize(self) -> MinimizerOutcome {
        let Self {
            matrix,
            groups,
            num_to_return,
            budget,
        } = self;
        let started = Instant::now();
        let mut solutions = SolutionSet::new(num_to_return);
        let mut arena: SlotMap<NodeId, SearchNode> = SlotMap::with_key();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut nodes_expanded: u64 = 0;
        let mut pruned: u64 = 0;
        let mut budget_exhausted = false;

        stack.push(arena.insert(SearchNode {
            matrix,
            groups: groups.iter().map(ActiveGroup::from).collect(),
            manipulations: Vec::new(),
        }));

        while let Some(id) = stack.pop() {
            let Some(mut node) = arena.remove(id) else {
                continue;
            };
            nodes_expanded += 1;

            if budget_exceeded(&budget, nodes_expanded, started) {
                warn!(
                    nodes_expanded,
                    kept = solutions.len(),
                    "Search budget exhausted; returning the best orderings found so far."
                );
                budget_exhausted = true;
                break;
            }

            while node.groups.last().is_some_and(|g| g.remaining == 0) {
                node.groups.pop();
            }

            let Some(group) = node.groups.last() else {
                let energy = node.matrix.exact_total();
                if energy <= solutions.threshold() {
                    trace!(energy, "Complete assignment reached.");
                    solutions.offer(Solution::new(energy, node.manipulations));
                }
                continue;
            };

            if group.remaining > group.candidates.len() {
                continue;
            }

            let (candidates, scales) = pending_work(&node.groups);
            let bound = node.matrix.best_case(&candidates, &scales);
            if bound > solutions.threshold() {
                pruned += 1;
                continue;
            }

            let scale = group.scale;
            let replacement = group.replacement;
            let Some(index) = node.matrix.next_index(&group.candidates, scale) else {
                continue;
            };

            let mut applied = node.clone();
            if let Some(g) = applied.groups.last_mut() {
                g.candidates.retain(|&i| i != index);
                g.remaining -= 1;
            }
            applied.matrix.scale_site(index, scale);
            applied.manipulations.push(Manipulation { index, replacement });

            if let Some(g) = node.groups.last_mut() {
                g.candidates.retain(|&i| i != index);
            }

            stack.push(arena.insert(node));
            stack.push(arena.insert(applied));

            if nodes_expanded % (BUDGET_CHECK_INTERVAL * 64) == 0 {
                debug!(
                    nodes_expanded,
                    pruned,
                    frontier = stack.len(),
                    threshold = solutions.threshold(),
                    "Search progress."
                );
            }
        }

        info!(
            nodes_expanded,
            pruned,
            found = solutions.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Minimization finished."
        );

        MinimizerOutcome {
            solutions: solutions.into_sorted_vec(),
            nodes_expanded,
            budget_exhausted,
        }
    }
}

/// Node count is checked every node, wall time every `BUDGET_CHECK_INTERVAL` nodes.
fn budget_exceeded(budget: &SearchBudget, nodes_expanded: u64, started: Instant) -> bool {
    if budget.max_nodes.is_some_and(|max_nodes| nodes_expanded > max_nodes) {
        return true;
    }
    budget
        .time_limit
        .is_some_and(|limit| nodes_expanded % BUDGET_CHECK_INTERVAL == 0 && started.elapsed() >= limit)
}

/// Undecided candidates of all open groups and one scale per manipulation
/// still to make.
fn pending_work(groups: &[ActiveGroup]) -> (Vec<usize>, Vec<f64>) {
    let mut candidates = Vec::new();
    let mut scales = Vec::new();
    for group in groups {
        candidates.extend_from_slice(&group.candidates);
        scales.extend(std::iter::repeat_n(group.scale, group.remaining));
    }
    (candidates, scales)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use nalgebra::DMatrix;
    use std::time::Duration;

    fn random_symmetric(n: usize, seed: u64) -> DMatrix<f64> {
        let mut state = seed;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        };
        let mut m = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                let v = next();
                m[(i, j)] = v;
                m[(j, i)] = v;
            }
        }
        m
    }

    fn removal_group(indices: Vec<usize>, count: usize) -> RemovalGroup {
        RemovalGroup {
            indices,
            count,
            replacement: None,
            scale: 0.0,
        }
    }

    fn brute_force(m: &DMatrix<f64>, groups: &[RemovalGroup]) -> Vec<(f64, Vec<usize>)> {
        let mut results: Vec<(f64, Vec<usize>)> = groups
            .iter()
            .map(|g| g.indices.iter().copied().combinations(g.count))
            .multi_cartesian_product()
            .map(|choice| {
                let mut em = EnergyMatrix::new(m.clone());
                let mut chosen = Vec::new();
                for (group, sites) in groups.iter().zip(choice) {
                    for i in sites {
                        em.scale_site(i, group.scale);
                        chosen.push(i);
                    }
                }
                chosen.sort_unstable();
                (em.exact_total(), chosen)
            })
            .collect();
        results.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        results
    }

    fn indices(solution: &Solution) -> Vec<usize> {
        solution.indices().collect()
    }

    #[test]
    fn finds_the_global_minimum() {
        for seed in 1..6 {
            let m = random_symmetric(8, seed);
            let groups = vec![removal_group(vec![0, 1, 2, 3], 2), removal_group(vec![4, 5, 6, 7], 1)];
            let expected = brute_force(&m, &groups);
            let outcome =
                EwaldMinimizer::new(EnergyMatrix::new(m), groups, 1, SearchBudget::unlimited())
                    .minimize();
            assert_eq!(outcome.solutions.len(), 1);
            assert!(!outcome.budget_exhausted);
            assert!((outcome.solutions[0].energy - expected[0].0).abs() < 1e-9);
        }
    }

    #[test]
    fn returns_the_n_best_distinct_assignments() {
        let m = random_symmetric(6, 42);
        let groups = vec![removal_group(vec![0, 1, 2, 3, 4, 5], 3)];
        let expected = brute_force(&m, &groups);
        let outcome =
            EwaldMinimizer::new(EnergyMatrix::new(m), groups, 4, SearchBudget::unlimited()).minimize();
        assert_eq!(outcome.solutions.len(), 4);
        for (solution, (energy, _)) in outcome.solutions.iter().zip(&expected) {
            assert!((solution.energy - energy).abs() < 1e-9);
        }
        let distinct: std::collections::HashSet<Vec<usize>> =
            outcome.solutions.iter().map(indices).collect();
        assert_eq!(distinct.len(), 4);
    }

    #[test]
    fn zero_counts_return_the_untouched_total() {
        let m = random_symmetric(4, 7);
        let total = m.sum();
        let outcome = EwaldMinimizer::new(
            EnergyMatrix::new(m),
            vec![removal_group(vec![0, 1], 0)],
            1,
            SearchBudget::unlimited(),
        )
        .minimize();
        assert_eq!(outcome.solutions.len(), 1);
        assert!(outcome.solutions[0].manipulations.is_empty());
        assert!((outcome.solutions[0].energy - total).abs() < 1e-12);
    }

    #[test]
    fn replacements_scale_instead_of_removing() {
        let m = random_symmetric(5, 11);
        let group = RemovalGroup {
            indices: vec![1, 2, 3],
            count: 1,
            replacement: Some("Al3+".parse().unwrap()),
            scale: 1.5,
        };
        let outcome =
            EwaldMinimizer::new(EnergyMatrix::new(m.clone()), vec![group], 3, SearchBudget::unlimited())
                .minimize();
        assert_eq!(outcome.solutions.len(), 3);
        for solution in &outcome.solutions {
            let index = solution.manipulations[0].index;
            let mut em = EnergyMatrix::new(m.clone());
            em.scale_site(index, 1.5);
            assert!((solution.energy - em.exact_total()).abs() < 1e-12);
            assert!(solution.manipulations[0].replacement.is_some());
        }
    }

    #[test]
    fn charge_raising_replacements_reach_the_global_minimum() {
        for seed in 1..40 {
            let m = random_symmetric(8, seed);
            let groups = vec![RemovalGroup {
                indices: (0..8).collect(),
                count: 3,
                replacement: Some("Al3+".parse().unwrap()),
                scale: 3.0,
            }];
            let expected = brute_force(&m, &groups);
            let outcome =
                EwaldMinimizer::new(EnergyMatrix::new(m), groups, 1, SearchBudget::unlimited()).minimize();
            assert!(
                (outcome.solutions[0].energy - expected[0].0).abs() < 1e-9,
                "seed {}: {} vs {}",
                seed,
                outcome.solutions[0].energy,
                expected[0].0
            );
        }
    }

    #[test]
    fn mixed_removal_and_replacement_groups_reach_the_global_minimum() {
        for seed in 40..60 {
            let m = random_symmetric(8, seed);
            let groups = vec![
                removal_group(vec![0, 1, 2, 3], 2),
                RemovalGroup {
                    indices: vec![4, 5, 6, 7],
                    count: 2,
                    replacement: Some("Mg2+".parse().unwrap()),
                    scale: 2.0,
                },
            ];
            let expected = brute_force(&m, &groups);
            let outcome =
                EwaldMinimizer::new(EnergyMatrix::new(m), groups, 1, SearchBudget::unlimited()).minimize();
            assert!((outcome.solutions[0].energy - expected[0].0).abs() < 1e-9, "seed {}", seed);
        }
    }

    #[test]
    fn node_budget_stops_the_search_early() {
        let m = random_symmetric(12, 3);
        let budget = SearchBudget {
            max_nodes: Some(5),
            time_limit: None,
        };
        let outcome = EwaldMinimizer::new(
            EnergyMatrix::new(m),
            vec![removal_group((0..12).collect(), 6)],
            1,
            budget,
        )
        .minimize();
        assert!(outcome.budget_exhausted);
        assert!(outcome.nodes_expanded <= 6);
    }

    #[test]
    fn generous_budget_does_not_change_the_result() {
        let m = random_symmetric(8, 9);
        let groups = vec![removal_group((0..8).collect(), 4)];
        let unlimited =
            EwaldMinimizer::new(EnergyMatrix::new(m.clone()), groups.clone(), 1, SearchBudget::unlimited())
                .minimize();
        let limited = EwaldMinimizer::new(
            EnergyMatrix::new(m),
            groups,
            1,
            SearchBudget {
                max_nodes: Some(1_000_000),
                time_limit: Some(Duration::from_secs(60)),
            },
        )
        .minimize();
        assert!(!limited.budget_exhausted);
        assert_eq!(indices(&unlimited.solutions[0]), indices(&limited.solutions[0]));
    }
}
