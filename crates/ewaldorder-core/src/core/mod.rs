//! # Core Module
//!
//! The foundation layer: stateless data models, the Ewald summation that
//! serves as the ordering objective, and the symmetry-equivalence oracle.
//!
//! ## Architecture
//!
//! - **Structure Representation** ([`models`]) - Elements, species, lattices, sites and structures
//! - **Electrostatics** ([`ewald`]) - Ewald summation and the per-site energy matrix
//! - **Symmetry** ([`symmetry`]) - Equivalence queries over sets of sites
//! - **Utilities** ([`utils`]) - Combinatorial counting helpers
//!
//! Nothing in this layer holds mutable state across calls; the element table
//! is a compile-time map.

pub mod ewald;
pub mod models;
pub mod symmetry;
pub mod utils;
