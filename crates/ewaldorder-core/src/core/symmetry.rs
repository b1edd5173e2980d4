//! Symmetry-equivalence queries used to deduplicate orderings.
//!
//! Space-group detection is not performed here: callers either supply the
//! operations of their structure ([`SymmetryOperations`]) or fall back to
//! [`TrivialSymmetry`], under which two site sets are equivalent only when
//! they coincide.

use crate::core::models::lattice::Lattice;
use crate::core::models::site::Site;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

const SPECIES_OCCUPANCY_TOLERANCE: f64 = 1e-6;

/// Answers whether two sets of sites are related by a symmetry operation of
/// the parent structure.
pub trait SymmetryOracle: Sync {
    /// `tolerance` is a fractional-coordinate distance.
    fn are_equivalent(&self, sites_a: &[&Site], sites_b: &[&Site], tolerance: f64) -> bool;
}

/// A rotation (integer matrix in the fractional basis) followed by a
/// fractional translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymmetryOperation {
    pub rotation: Matrix3<i8>,
    pub translation: Vector3<f64>,
}

impl SymmetryOperation {
    pub fn new(rotation: Matrix3<i8>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    pub fn apply(&self, frac: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.map(f64::from) * frac + self.translation
    }

    pub fn is_identity(&self) -> bool {
        self.rotation == Matrix3::identity() && self.translation.norm() < 1e-10
    }

    /// Whether the image of every site of `sites_a` is a site of `sites_b`
    /// with the same species, pairing each site of `sites_b` at most once.
    pub fn maps_onto(&self, sites_a: &[&Site], sites_b: &[&Site], tolerance: f64) -> bool {
        if sites_a.len() != sites_b.len() {
            return false;
        }
        let mut used = vec![false; sites_b.len()];
        sites_a.iter().all(|a| {
            let image = self.apply(&a.frac_coords);
            let hit = sites_b.iter().enumerate().position(|(k, b)| {
                !used[k]
                    && a.same_species_as(b, SPECIES_OCCUPANCY_TOLERANCE)
                    && Lattice::wrapped_fractional_difference(&image, &b.frac_coords).norm()
                        <= tolerance
            });
            match hit {
                Some(k) => {
                    used[k] = true;
                    true
                }
                None => false,
            }
        })
    }
}

/// Caller-supplied symmetry operations of a structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymmetryOperations {
    operations: Vec<SymmetryOperation>,
}

impl SymmetryOperations {
    /// The identity is always included, whether or not it is listed.
    pub fn new(operations: Vec<SymmetryOperation>) -> Self {
        let mut operations = operations;
        if !operations.iter().any(SymmetryOperation::is_identity) {
            operations.insert(0, SymmetryOperation::identity());
        }
        Self { operations }
    }

    pub fn operations(&self) -> &[SymmetryOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl SymmetryOracle for SymmetryOperations {
    fn are_equivalent(&self, sites_a: &[&Site], sites_b: &[&Site], tolerance: f64) -> bool {
        self.operations
            .iter()
            .any(|op| op.maps_onto(sites_a, sites_b, tolerance))
    }
}

/// Identity-only symmetry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrivialSymmetry;

impl SymmetryOracle for TrivialSymmetry {
    fn are_equivalent(&self, sites_a: &[&Site], sites_b: &[&Site], tolerance: f64) -> bool {
        SymmetryOperation::identity().maps_onto(sites_a, sites_b, tolerance)
    }
}
