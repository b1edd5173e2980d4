use super::params::{EwaldParams, ResolvedEwaldParams};
use super::{COULOMB_CONSTANT_EV_ANGSTROM as CONV, EwaldError};
use crate::core::models::lattice::Lattice;
use crate::core::models::structure::Structure;
use nalgebra::{DMatrix, Vector3};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const COINCIDENCE_DISTANCE: f64 = 1e-10;
const NEUTRALITY_TOLERANCE: f64 = 1e-8;

/// Ewald summation over the sites of a structure, treating each site as a
/// point charge `q_i = sum(oxidation_state * occupancy)`.
///
/// All energies are in eV. The decomposition is exposed both as totals and as
/// the symmetric [`total_energy_matrix`](Self::total_energy_matrix), whose
/// element sum equals [`total_energy`](Self::total_energy).
#[derive(Debug, Clone)]
pub struct EwaldSummation {
    charges: Vec<f64>,
    params: ResolvedEwaldParams,
    volume: f64,
    real_space: DMatrix<f64>,
    reciprocal_space: DMatrix<f64>,
    point: Vec<f64>,
    charged_cell_energy: f64,
    total_matrix: DMatrix<f64>,
    row_sums: Vec<f64>,
    total_energy: f64,
}

impl EwaldSummation {
    #[instrument(skip_all, name = "ewald_summation", fields(sites = structure.len()))]
    pub fn new(structure: &Structure, params: &EwaldParams) -> Result<Self, EwaldError> {
        let started = Instant::now();
        let charges = structure.site_charges()?;
        let lattice = structure.lattice();
        let volume = lattice.volume();
        let resolved = params.resolve(charges.len(), volume)?;

        let total_charge: f64 = charges.iter().sum();
        if total_charge.abs() > NEUTRALITY_TOLERANCE {
            warn!(
                total_charge,
                "Charge assembly is not neutral; a uniform neutralizing background is included."
            );
        }

        let fracs: Vec<Vector3<f64>> = structure
            .sites()
            .iter()
            .map(|site| site.frac_coords)
            .collect();

        let real_space = compute_real_space(lattice, &fracs, &charges, &resolved);
        let reciprocal_space = compute_reciprocal_space(lattice, &fracs, &charges, &resolved);

        let point: Vec<f64> = charges
            .iter()
            .map(|q| -q * q * (resolved.eta / PI).sqrt() * CONV)
            .collect();

        let background = -CONV * PI / (2.0 * volume * resolved.eta);
        let charged_cell_energy = background * total_charge * total_charge;

        let n = charges.len();
        let mut total_matrix = &real_space + &reciprocal_space;
        for i in 0..n {
            for j in 0..n {
                total_matrix[(i, j)] += background * charges[i] * charges[j];
            }
            total_matrix[(i, i)] += point[i];
        }

        let row_sums: Vec<f64> = (0..n).map(|i| total_matrix.row(i).sum()).collect();
        let total_energy = row_sums.iter().sum();

        info!(
            total_energy,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Ewald summation complete."
        );

        Ok(Self {
            charges,
            params: resolved,
            volume,
            real_space,
            reciprocal_space,
            point,
            charged_cell_energy,
            total_matrix,
            row_sums,
            total_energy,
        })
    }

    pub fn num_sites(&self) -> usize {
        self.charges.len()
    }

    pub fn charges(&self) -> &[f64] {
        &self.charges
    }

    pub fn params(&self) -> &ResolvedEwaldParams {
        &self.params
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn total_energy(&self) -> f64 {
        self.total_energy
    }

    pub fn real_space_energy(&self) -> f64 {
        self.real_space.sum()
    }

    pub fn reciprocal_space_energy(&self) -> f64 {
        self.reciprocal_space.sum()
    }

    pub fn point_energy(&self) -> f64 {
        self.point.iter().sum()
    }

    pub fn charged_cell_energy(&self) -> f64 {
        self.charged_cell_energy
    }

    pub fn real_space_energy_matrix(&self) -> &DMatrix<f64> {
        &self.real_space
    }

    pub fn reciprocal_space_energy_matrix(&self) -> &DMatrix<f64> {
        &self.reciprocal_space
    }

    /// Symmetric per-site energy matrix; its element sum is the total energy.
    pub fn total_energy_matrix(&self) -> &DMatrix<f64> {
        &self.total_matrix
    }

    /// Energy attributed to site `index` (its row of the total matrix).
    pub fn site_energy(&self, index: usize) -> Result<f64, EwaldError> {
        self.row_sums
            .get(index)
            .copied()
            .ok_or(EwaldError::IndexOutOfBounds {
                index,
                len: self.num_sites(),
            })
    }

    /// Energy of the assembly with the given sites removed.
    ///
    /// Equivalent to zeroing their rows and columns in a copy of the total
    /// matrix and summing it; evaluated in closed form without the copy.
    pub fn compute_partial_energy(&self, excluded: &[usize]) -> Result<f64, EwaldError> {
        let scales: Vec<(usize, f64)> = excluded.iter().map(|&i| (i, 0.0)).collect();
        self.compute_scaled_energy(&scales)
    }

    /// Energy after scaling the charge of selected sites (`0.0` removes a
    /// site, `q_new / q_old` swaps its species). Rows and columns of the
    /// selected sites are scaled; duplicate indices keep the last scale.
    pub fn compute_scaled_energy(&self, scales: &[(usize, f64)]) -> Result<f64, EwaldError> {
        let mut deltas = BTreeMap::new();
        for &(index, scale) in scales {
            if index >= self.num_sites() {
                return Err(EwaldError::IndexOutOfBounds {
                    index,
                    len: self.num_sites(),
                });
            }
            deltas.insert(index, scale - 1.0);
        }

        // sum(s_i s_j M_ij) = sum(M) + 2 sum_i d_i R_i + sum_ij d_i d_j M_ij, with d = s - 1
        let mut energy = self.total_energy;
        for (&i, &d_i) in &deltas {
            energy += 2.0 * d_i * self.row_sums[i];
            for (&j, &d_j) in &deltas {
                energy += d_i * d_j * self.total_matrix[(i, j)];
            }
        }
        Ok(energy)
    }
}

fn compute_real_space(
    lattice: &Lattice,
    fracs: &[Vector3<f64>],
    charges: &[f64],
    params: &ResolvedEwaldParams,
) -> DMatrix<f64> {
    let n = fracs.len();
    let rmax = params.real_space_cutoff;
    let bounds = lattice.real_space_bounds(rmax);
    let translations: Vec<Vector3<f64>> = image_indices(bounds)
        .map(|image| lattice.translation(&image))
        .collect();

    debug!(
        translations = translations.len(),
        cutoff = rmax,
        "Computing real-space sum."
    );

    let upper_row = |i: usize| -> (Vec<f64>, usize) {
        let mut row = vec![0.0; n - i];
        let mut coincident = 0;
        for j in i..n {
            let d = lattice.matrix() * Lattice::wrapped_fractional_difference(&fracs[i], &fracs[j]);
            let mut acc = 0.0;
            for t in &translations {
                let r = (d + t).norm();
                if r < COINCIDENCE_DISTANCE {
                    if i != j {
                        coincident += 1;
                    }
                    continue;
                }
                if r < rmax {
                    acc += libm::erfc(params.sqrt_eta * r) / r;
                }
            }
            row[j - i] = 0.5 * charges[i] * charges[j] * acc * CONV;
        }
        (row, coincident)
    };

    #[cfg(not(feature = "parallel"))]
    let rows: Vec<(Vec<f64>, usize)> = (0..n).map(upper_row).collect();

    #[cfg(feature = "parallel")]
    let rows: Vec<(Vec<f64>, usize)> = (0..n).into_par_iter().map(upper_row).collect();

    let mut matrix = DMatrix::zeros(n, n);
    let mut coincident_pairs = 0;
    for (i, (row, coincident)) in rows.into_iter().enumerate() {
        coincident_pairs += coincident;
        for (offset, value) in row.into_iter().enumerate() {
            let j = i + offset;
            matrix[(i, j)] = value;
            matrix[(j, i)] = value;
        }
    }
    if coincident_pairs > 0 {
        warn!(
            coincident_pairs,
            "Distinct sites share a position; their mutual real-space term is skipped."
        );
    }
    matrix
}

fn compute_reciprocal_space(
    lattice: &Lattice,
    fracs: &[Vector3<f64>],
    charges: &[f64],
    params: &ResolvedEwaldParams,
) -> DMatrix<f64> {
    let n = fracs.len();
    let gmax = params.recip_space_cutoff;
    let recip = lattice.reciprocal_matrix();
    let positions: Vec<Vector3<f64>> = fracs.iter().map(|f| lattice.matrix() * f).collect();

    let mut acc = DMatrix::<f64>::zeros(n, n);
    let mut g_count = 0usize;
    let mut cos_gr = vec![0.0; n];
    let mut sin_gr = vec![0.0; n];

    for image in image_indices(lattice.reciprocal_space_bounds(gmax)) {
        if image == Vector3::zeros() {
            continue;
        }
        let g = recip * image.map(f64::from);
        let g2 = g.norm_squared();
        if g2 > gmax * gmax {
            continue;
        }
        g_count += 1;
        let weight = (-g2 / (4.0 * params.eta)).exp() / g2;
        for (k, r) in positions.iter().enumerate() {
            let (s, c) = g.dot(r).sin_cos();
            sin_gr[k] = s;
            cos_gr[k] = c;
        }
        for i in 0..n {
            for j in i..n {
                acc[(i, j)] += weight * (cos_gr[i] * cos_gr[j] + sin_gr[i] * sin_gr[j]);
            }
        }
    }

    debug!(g_vectors = g_count, cutoff = gmax, "Computed reciprocal-space sum.");

    let prefactor = 2.0 * PI / lattice.volume() * CONV;
    let mut matrix = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            let value = prefactor * charges[i] * charges[j] * acc[(i, j)];
            matrix[(i, j)] = value;
            matrix[(j, i)] = value;
        }
    }
    matrix
}

fn image_indices(bounds: [i32; 3]) -> impl Iterator<Item = Vector3<i32>> {
    let [na, nb, nc] = bounds;
    (-na..=na).flat_map(move |a| {
        (-nb..=nb).flat_map(move |b| (-nc..=nc).map(move |c| Vector3::new(a, b, c)))
    })
}
