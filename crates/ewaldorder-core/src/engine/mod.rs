//! # Engine Module
//!
//! The stateful layer that searches for low-energy orderings.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Group requests, algorithm choice, budgets and their validation
//! - **Working Matrix** ([`energy_matrix`]) - Pair-energy matrix with incremental row/column updates
//! - **Minimizer** ([`minimizer`]) - Branch-and-bound over an explicit node arena
//! - **Tasks** ([`tasks`]) - The `fast`, `complete` and `best_first` strategies
//! - **State Tracking** ([`state`]) - Manipulations, solutions and the bounded solution set
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress reporting
//! - **Error Handling** ([`error`]) - Engine error type
//!
//! A working matrix is owned by exactly one search and dropped when it ends;
//! only the immutable Ewald result is shared, read-only, across threads.

pub mod config;
pub mod energy_matrix;
pub mod error;
pub mod minimizer;
pub mod progress;
pub mod state;
pub mod tasks;
