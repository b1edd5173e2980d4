use super::error::ModelError;
use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const MIN_VOLUME: f64 = 1e-10;

/// A periodic lattice. The columns of `matrix` are the lattice vectors
/// `a`, `b`, `c` in Angstroms, so `cartesian = matrix * fractional`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Lattice {
    matrix: Matrix3<f64>,
    inverse: Matrix3<f64>,
}

impl Lattice {
    pub fn new(a: Vector3<f64>, b: Vector3<f64>, c: Vector3<f64>) -> Result<Self, ModelError> {
        Self::from_matrix(Matrix3::from_columns(&[a, b, c]))
    }

    pub fn from_matrix(matrix: Matrix3<f64>) -> Result<Self, ModelError> {
        let volume = matrix.determinant().abs();
        if volume < MIN_VOLUME {
            return Err(ModelError::DegenerateLattice { volume });
        }
        let inverse = matrix
            .try_inverse()
            .ok_or(ModelError::DegenerateLattice { volume })?;
        Ok(Self { matrix, inverse })
    }

    pub fn cubic(a: f64) -> Result<Self, ModelError> {
        Self::orthorhombic(a, a, a)
    }

    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<Self, ModelError> {
        Self::from_matrix(Matrix3::from_diagonal(&Vector3::new(a, b, c)))
    }

    /// Builds a lattice from cell lengths (Angstroms) and angles (degrees),
    /// with `a` along x and `b` in the xy-plane.
    pub fn from_parameters(
        a: f64,
        b: f64,
        c: f64,
        alpha: f64,
        beta: f64,
        gamma: f64,
    ) -> Result<Self, ModelError> {
        let (alpha, beta, gamma) = (alpha.to_radians(), beta.to_radians(), gamma.to_radians());
        let va = Vector3::new(a, 0.0, 0.0);
        let vb = Vector3::new(b * gamma.cos(), b * gamma.sin(), 0.0);
        let cx = c * beta.cos();
        let cy = c * (alpha.cos() - beta.cos() * gamma.cos()) / gamma.sin();
        let cz_sq = c * c - cx * cx - cy * cy;
        if cz_sq <= 0.0 {
            return Err(ModelError::DegenerateLattice { volume: 0.0 });
        }
        Self::new(va, vb, Vector3::new(cx, cy, cz_sq.sqrt()))
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn vector(&self, axis: usize) -> Vector3<f64> {
        self.matrix.column(axis).into_owned()
    }

    pub fn lengths(&self) -> [f64; 3] {
        [0, 1, 2].map(|k| self.matrix.column(k).norm())
    }

    pub fn volume(&self) -> f64 {
        self.matrix.determinant().abs()
    }

    /// Reciprocal lattice including the 2π factor; columns are `b1`, `b2`, `b3`.
    pub fn reciprocal_matrix(&self) -> Matrix3<f64> {
        self.inverse.transpose() * (2.0 * PI)
    }

    pub fn to_cartesian(&self, frac: &Vector3<f64>) -> Point3<f64> {
        Point3::from(self.matrix * frac)
    }

    pub fn to_fractional(&self, cart: &Point3<f64>) -> Vector3<f64> {
        self.inverse * cart.coords
    }

    /// Cartesian translation for the integer image `n`.
    pub fn translation(&self, n: &Vector3<i32>) -> Vector3<f64> {
        self.matrix * n.map(f64::from)
    }

    /// Per-axis image counts needed so that every lattice translation within
    /// `radius` of a vector inside the cell is covered.
    pub fn real_space_bounds(&self, radius: f64) -> [i32; 3] {
        let recip = self.reciprocal_matrix();
        [0, 1, 2].map(|k| {
            let plane_spacing = 2.0 * PI / recip.column(k).norm();
            (radius / plane_spacing).ceil() as i32 + 1
        })
    }

    /// Per-axis reciprocal index bounds covering all `G` with `|G| <= radius`.
    pub fn reciprocal_space_bounds(&self, radius: f64) -> [i32; 3] {
        [0, 1, 2].map(|k| {
            let plane_spacing = 2.0 * PI / self.matrix.column(k).norm();
            (radius / plane_spacing).ceil() as i32
        })
    }

    /// Shortest periodic difference `b - a` between two fractional positions.
    pub fn wrapped_fractional_difference(a: &Vector3<f64>, b: &Vector3<f64>) -> Vector3<f64> {
        (b - a).map(|d| d - d.round())
    }
}

impl TryFrom<[[f64; 3]; 3]> for Lattice {
    type Error = ModelError;

    fn try_from(vectors: [[f64; 3]; 3]) -> Result<Self, Self::Error> {
        Self::new(
            Vector3::from(vectors[0]),
            Vector3::from(vectors[1]),
            Vector3::from(vectors[2]),
        )
    }
}

impl From<Lattice> for [[f64; 3]; 3] {
    fn from(lattice: Lattice) -> Self {
        [0, 1, 2].map(|k| {
            let v = lattice.matrix.column(k);
            [v[0], v[1], v[2]]
        })
    }
}
