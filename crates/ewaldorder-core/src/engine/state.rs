use crate::core::models::species::Species;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A decision on one site: removal (`replacement == None`) or a species swap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Manipulation {
    pub index: usize,
    pub replacement: Option<Species>,
}

impl Manipulation {
    pub fn remove(index: usize) -> Self {
        Self {
            index,
            replacement: None,
        }
    }

    pub fn replace(index: usize, species: Species) -> Self {
        Self {
            index,
            replacement: Some(species),
        }
    }
}

/// A complete assignment and its electrostatic energy. Manipulations are kept
/// sorted by site index.
#[derive(Debug, Clone)]
pub struct Solution {
    pub energy: f64,
    pub manipulations: Vec<Manipulation>,
}

impl Solution {
    pub fn new(energy: f64, mut manipulations: Vec<Manipulation>) -> Self {
        manipulations.sort_by_key(|m| m.index);
        Self {
            energy,
            manipulations,
        }
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.manipulations.iter().map(|m| m.index)
    }

    /// Ranking: energy first, then the manipulated index list lexicographically.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.energy
            .total_cmp(&other.energy)
            .then_with(|| self.indices().cmp(other.indices()))
    }
}

impl PartialEq for Solution {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}
impl Eq for Solution {}

impl PartialOrd for Solution {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Solution {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// The best `capacity` solutions seen so far. Backed by a max-heap so the
/// worst retained solution, which defines the pruning threshold, is at the top.
#[derive(Debug, Clone)]
pub struct SolutionSet {
    capacity: usize,
    heap: BinaryHeap<Solution>,
}

impl SolutionSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// `+inf` until the set is full, then the energy of the worst kept solution.
    pub fn threshold(&self) -> f64 {
        if self.is_full() {
            self.heap.peek().map_or(f64::INFINITY, |worst| worst.energy)
        } else {
            f64::INFINITY
        }
    }

    /// Returns whether the solution was kept.
    pub fn offer(&mut self, solution: Solution) -> bool {
        if self.is_full() {
            match self.heap.peek() {
                Some(worst) if solution < *worst => {}
                _ => return false,
            }
        }
        self.heap.push(solution);
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
        true
    }

    pub fn into_sorted_vec(self) -> Vec<Solution> {
        self.heap.into_sorted_vec()
    }
}
