//! # Ewald Module
//!
//! Periodic electrostatic energies of point-charge assemblies via Ewald
//! summation.
//!
//! The energy is split into a real-space sum of screened (`erfc`) Coulomb
//! terms, a reciprocal-space sum over lattice vectors `G`, a point (self)
//! correction and a neutralizing-background correction for charged cells.
//! Every term is folded into a single symmetric per-site matrix whose sum is
//! the total energy, so the energy of any subset of sites can be obtained by
//! zeroing (or scaling) rows and columns instead of repeating the summation.
//!
//! - [`params`] - Numerical controls (`eta`, cutoffs, target precision)
//! - [`summation`] - The summation itself and the energy-matrix queries

pub mod params;
pub mod summation;

use crate::core::models::error::ModelError;
use thiserror::Error;

/// `e^2 / (4 pi eps0)` in eV·Å.
pub const COULOMB_CONSTANT_EV_ANGSTROM: f64 = 14.399645351950548;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EwaldError {
    #[error("Structure is not usable for an Ewald summation: {0}")]
    Model(#[from] ModelError),

    #[error("Invalid Ewald parameter '{name}': {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Site index {index} is out of range for an assembly of {len} charges")]
    IndexOutOfBounds { index: usize, len: usize },
}
