//! # ewaldorder
//!
//! Orders crystal structures with partially occupied sites by minimizing
//! their electrostatic (Ewald) energy.
//!
//! Given a structure whose sites carry fractional occupancies and a set of
//! site groups with the fraction of sites to remove (or replace) in each,
//! the library searches the discrete assignments and returns the
//! lowest-energy ordered structures.
//!
//! ## Architectural Philosophy
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Structure`), the
//!   Ewald summation and the symmetry oracle.
//!
//! - **[`engine`]: The Logic Core.** The working `EnergyMatrix` with
//!   incremental row/column updates, the branch-and-bound minimizer, and the
//!   ordering tasks (`fast`, `best_first`, `complete`).
//!
//! - **[`workflows`]: The Public API.** Validates a request, builds the
//!   energy matrix, dispatches to a task and materializes ranked ordered
//!   structures.

pub mod core;
pub mod engine;
pub mod workflows;
