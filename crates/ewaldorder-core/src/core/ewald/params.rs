use super::EwaldError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

/// Estimated truncation error above which a parameter set is reported as
/// ill-conditioned.
const DEGENERACY_THRESHOLD: f64 = 1e-4;

/// User-facing numerical controls. Unset values are derived from the target
/// precision `accuracy_factor` (number of significant decimal digits).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EwaldParams {
    pub eta: Option<f64>,
    pub real_space_cutoff: Option<f64>,
    pub recip_space_cutoff: Option<f64>,
    pub accuracy_factor: f64,
}

impl Default for EwaldParams {
    fn default() -> Self {
        Self {
            eta: None,
            real_space_cutoff: None,
            recip_space_cutoff: None,
            accuracy_factor: 8.0,
        }
    }
}

/// Parameters actually used by a summation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedEwaldParams {
    pub eta: f64,
    pub sqrt_eta: f64,
    pub real_space_cutoff: f64,
    pub recip_space_cutoff: f64,
}

impl EwaldParams {
    pub fn with_eta(mut self, eta: f64) -> Self {
        self.eta = Some(eta);
        self
    }

    pub fn with_cutoffs(mut self, real_space: f64, recip_space: f64) -> Self {
        self.real_space_cutoff = Some(real_space);
        self.recip_space_cutoff = Some(recip_space);
        self
    }

    pub fn with_accuracy_factor(mut self, accuracy_factor: f64) -> Self {
        self.accuracy_factor = accuracy_factor;
        self
    }

    pub fn resolve(&self, num_sites: usize, volume: f64) -> Result<ResolvedEwaldParams, EwaldError> {
        if !(self.accuracy_factor > 0.0) {
            return Err(EwaldError::InvalidParameter {
                name: "accuracy_factor",
                value: self.accuracy_factor,
            });
        }
        for (name, value) in [
            ("eta", self.eta),
            ("real_space_cutoff", self.real_space_cutoff),
            ("recip_space_cutoff", self.recip_space_cutoff),
        ] {
            if let Some(v) = value {
                if !(v > 0.0) || !v.is_finite() {
                    return Err(EwaldError::InvalidParameter { name, value: v });
                }
            }
        }

        let w = 1.0 / 2f64.powf(1.0 / 6.0);
        let eta = self
            .eta
            .unwrap_or_else(|| (num_sites.max(1) as f64 * w / (volume * volume)).powf(1.0 / 3.0) * PI);
        let sqrt_eta = eta.sqrt();
        let acc = (10f64.powf(self.accuracy_factor)).ln().sqrt();

        let resolved = ResolvedEwaldParams {
            eta,
            sqrt_eta,
            real_space_cutoff: self.real_space_cutoff.unwrap_or(acc / sqrt_eta),
            recip_space_cutoff: self.recip_space_cutoff.unwrap_or(2.0 * sqrt_eta * acc),
        };

        debug!(
            eta = resolved.eta,
            real_space_cutoff = resolved.real_space_cutoff,
            recip_space_cutoff = resolved.recip_space_cutoff,
            "Resolved Ewald parameters."
        );
        resolved.report_conditioning();
        Ok(resolved)
    }
}

impl ResolvedEwaldParams {
    /// Magnitude of the first neglected real-space term, relative to its
    /// unscreened value.
    pub fn real_space_truncation(&self) -> f64 {
        libm::erfc(self.sqrt_eta * self.real_space_cutoff)
    }

    /// Gaussian weight of the first neglected reciprocal-space term.
    pub fn recip_space_truncation(&self) -> f64 {
        (-(self.recip_space_cutoff * self.recip_space_cutoff) / (4.0 * self.eta)).exp()
    }

    pub fn is_well_conditioned(&self) -> bool {
        self.real_space_truncation() <= DEGENERACY_THRESHOLD
            && self.recip_space_truncation() <= DEGENERACY_THRESHOLD
    }

    fn report_conditioning(&self) {
        if !self.is_well_conditioned() {
            warn!(
                real_space_truncation = self.real_space_truncation(),
                recip_space_truncation = self.recip_space_truncation(),
                "Ewald parameters are ill-conditioned; energies carry a truncation error above {:e}.",
                DEGENERACY_THRESHOLD
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_parameters_target_eight_digits() {
        let params = EwaldParams::default();
        assert_eq!(params.accuracy_factor, 8.0);
        let resolved = params.resolve(8, 64.0).unwrap();
        assert!(resolved.is_well_conditioned());
        assert!(resolved.real_space_truncation() < 1e-8);
        assert!(resolved.recip_space_truncation() <= 1e-8 * 1.0000001);
    }

    #[test]
    fn derived_cutoffs_follow_eta() {
        let resolved = EwaldParams::default().with_eta(0.25).resolve(2, 10.0).unwrap();
        let acc = (1e8f64).ln().sqrt();
        assert!((resolved.eta - 0.25).abs() < 1e-15);
        assert!((resolved.real_space_cutoff - acc / 0.5).abs() < 1e-12);
        assert!((resolved.recip_space_cutoff - 2.0 * 0.5 * acc).abs() < 1e-12);
    }

    #[test]
    fn explicit_cutoffs_are_kept() {
        let resolved = EwaldParams::default()
            .with_eta(0.3)
            .with_cutoffs(12.0, 5.0)
            .resolve(4, 100.0)
            .unwrap();
        assert_eq!(resolved.real_space_cutoff, 12.0);
        assert_eq!(resolved.recip_space_cutoff, 5.0);
    }

    #[test]
    fn short_cutoffs_are_flagged_as_ill_conditioned() {
        let resolved = EwaldParams::default()
            .with_eta(0.3)
            .with_cutoffs(1.0, 0.5)
            .resolve(4, 100.0)
            .unwrap();
        assert!(!resolved.is_well_conditioned());
    }

    #[test]
    fn non_positive_values_are_rejected() {
        let err = EwaldParams::default().with_eta(-1.0).resolve(4, 10.0);
        assert!(matches!(
            err,
            Err(EwaldError::InvalidParameter { name: "eta", .. })
        ));
        let err = EwaldParams::default().with_accuracy_factor(0.0).resolve(4, 10.0);
        assert!(matches!(
            err,
            Err(EwaldError::InvalidParameter {
                name: "accuracy_factor",
                ..
            })
        ));
    }
}
