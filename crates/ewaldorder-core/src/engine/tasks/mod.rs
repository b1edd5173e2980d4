//! Ordering strategies over a precomputed Ewald energy matrix.
//!
//! Each task turns validated [`RemovalGroup`](super::config::RemovalGroup)s into
//! ranked [`Solution`](super::state::Solution)s:
//!
//! - [`fast`] - branch-and-bound, exact for the best ordering
//! - [`complete`] - exhaustive enumeration with symmetry deduplication
//! - [`best_first`] - greedy single pass for cells too large to search

pub mod best_first;
pub mod complete;
pub mod fast;
