use crate::core::ewald::summation::EwaldSummation;
use nalgebra::DMatrix;
use tracing::trace;

/// Working copy of a symmetric pair-energy matrix with cached row sums and
/// total, updated incrementally as site charges are scaled.
///
/// Scaling site `i` by `s` multiplies row `i` and column `i` by `s`; removal
/// is `s = 0`. Each update costs `O(N)` for the caches plus the row/column
/// write.
#[derive(Debug, Clone)]
pub struct EnergyMatrix {
    matrix: DMatrix<f64>,
    row_sums: Vec<f64>,
    total: f64,
}

impl EnergyMatrix {
    pub fn new(matrix: DMatrix<f64>) -> Self {
        let row_sums: Vec<f64> = (0..matrix.nrows()).map(|i| matrix.row(i).sum()).collect();
        let total = row_sums.iter().sum();
        Self {
            matrix,
            row_sums,
            total,
        }
    }

    pub fn from_ewald(ewald: &EwaldSummation) -> Self {
        Self::new(ewald.total_energy_matrix().clone())
    }

    pub fn len(&self) -> usize {
        self.row_sums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_sums.is_empty()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Cached total, accumulated through incremental updates.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Total recomputed from the matrix elements.
    pub fn exact_total(&self) -> f64 {
        self.matrix.sum()
    }

    pub fn row_sum(&self, index: usize) -> f64 {
        self.row_sums[index]
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix[(i, j)]
    }

    pub fn scale_site(&mut self, index: usize, scale: f64) {
        let d = scale - 1.0;
        let diag = self.matrix[(index, index)];
        let row_sum = self.row_sums[index];

        self.total += 2.0 * d * row_sum + d * d * diag;
        for j in 0..self.len() {
            if j != index {
                self.row_sums[j] += d * self.matrix[(j, index)];
            }
        }
        self.row_sums[index] = scale * (row_sum - diag) + scale * scale * diag;

        self.matrix.row_mut(index).scale_mut(scale);
        self.matrix.column_mut(index).scale_mut(scale);

        trace!(index, scale, total = self.total, "Scaled site.");
    }

    /// Zeroes row and column `index`.
    pub fn remove_site(&mut self, index: usize) {
        self.scale_site(index, 0.0);
    }

    /// The candidate whose manipulation lowers the total the most: largest
    /// row sum when the charge shrinks (`scale < 1`), smallest otherwise.
    /// Ties go to the first candidate in `candidates`.
    pub fn next_index(&self, candidates: &[usize], scale: f64) -> Option<usize> {
        let shrinking = scale < 1.0;
        let mut best: Option<(usize, f64)> = None;
        for &index in candidates {
            let value = self.row_sums[index];
            let better = match best {
                None => true,
                Some((_, current)) if shrinking => value > current,
                Some((_, current)) => value < current,
            };
            if better {
                best = Some((index, value));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Lower estimate of the total reachable by applying the pending
    /// manipulations (`scales`, one entry per manipulation still to make) to
    /// sites drawn from `candidates`.
    ///
    /// With weights `w = 1 - f` the scaled total is
    /// `total - 2 * sum(w_i * row_i) + sum_ij(w_i * w_j * M_ij)`. The linear part
    /// pairs the largest `2 * row_sum` values with the smallest scales. For the
    /// pairwise part each candidate row gets the least and greatest weighted
    /// sums its entries can reach; shrinking sites (`w > 0`) take the least
    /// rows, growing sites (`w < 0`) the greatest one.
    pub fn best_case(&self, candidates: &[usize], scales: &[f64]) -> f64 {
        let n = candidates.len();
        if n == 0 {
            return self.total;
        }

        let mut fractions = vec![1.0; n];
        for (slot, &scale) in fractions.iter_mut().zip(scales) {
            *slot = scale;
        }
        fractions.sort_by(f64::total_cmp);

        let mut sums: Vec<f64> = candidates.iter().map(|&i| 2.0 * self.row_sums[i]).collect();
        sums.sort_by(|a, b| b.total_cmp(a));
        let single: f64 = sums
            .iter()
            .zip(&fractions)
            .map(|(sum, f)| sum * (f - 1.0))
            .sum();

        // Descending.
        let weights: Vec<f64> = fractions.iter().map(|f| 1.0 - f).collect();

        let mut lowest_rows = Vec::with_capacity(n);
        let mut highest_row = f64::NEG_INFINITY;
        for &i in candidates {
            let mut row: Vec<f64> = candidates.iter().map(|&j| self.matrix[(i, j)]).collect();
            row.sort_by(f64::total_cmp);
            lowest_rows.push(row.iter().zip(&weights).map(|(m, w)| m * w).sum::<f64>());
            highest_row = highest_row.max(row.iter().zip(weights.iter().rev()).map(|(m, w)| m * w).sum::<f64>());
        }
        lowest_rows.sort_by(f64::total_cmp);

        let shrinking: f64 = lowest_rows
            .iter()
            .zip(weights.iter().filter(|&&w| w > 0.0))
            .map(|(row, w)| row * w)
            .sum();
        let growing: f64 = weights.iter().filter(|&&w| w < 0.0).map(|w| w * highest_row).sum();

        self.total + single + shrinking + growing
    }
}
