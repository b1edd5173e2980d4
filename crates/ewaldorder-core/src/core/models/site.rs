use super::species::Species;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A crystallographic site: a fractional position shared by one or more
/// species with fractional occupancies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Species and their occupancies. Occupancies of an ordered site sum to 1.
    pub species: Vec<(Species, f64)>,
    /// Position in fractional coordinates of the parent lattice.
    pub frac_coords: Vector3<f64>,
}

impl Site {
    pub fn new(species: Vec<(Species, f64)>, frac_coords: Vector3<f64>) -> Self {
        Self {
            species,
            frac_coords,
        }
    }

    /// A fully occupied site holding a single species.
    pub fn ordered(species: Species, frac_coords: Vector3<f64>) -> Self {
        Self::new(vec![(species, 1.0)], frac_coords)
    }

    pub fn total_occupancy(&self) -> f64 {
        self.species.iter().map(|(_, occu)| occu).sum()
    }

    pub fn is_ordered(&self) -> bool {
        self.species.len() == 1 && (self.species[0].1 - 1.0).abs() < 1e-8
    }

    /// Occupancy-weighted charge. `None` if any species lacks an oxidation state.
    pub fn charge(&self) -> Option<f64> {
        self.species
            .iter()
            .map(|(sp, occu)| sp.oxidation_state().map(|oxi| oxi * occu))
            .sum()
    }

    /// Species sorted for comparison purposes.
    fn sorted_species(&self) -> Vec<(Species, f64)> {
        let mut species = self.species.clone();
        species.sort_by(|a, b| a.0.sort_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1)));
        species
    }

    /// True when both sites carry the same species with the same occupancies.
    pub fn same_species_as(&self, other: &Site, occupancy_tolerance: f64) -> bool {
        if self.species.len() != other.species.len() {
            return false;
        }
        self.sorted_species()
            .iter()
            .zip(other.sorted_species().iter())
            .all(|((sp_a, occ_a), (sp_b, occ_b))| {
                sp_a == sp_b && (occ_a - occ_b).abs() <= occupancy_tolerance
            })
    }

    /// Ordering used when producing sorted structures: the site's species in
    /// electronegativity order, compared element-wise.
    pub fn sort_cmp(&self, other: &Site) -> Ordering {
        let a = self.sorted_species();
        let b = other.sorted_species();
        for ((sp_a, occ_a), (sp_b, occ_b)) in a.iter().zip(b.iter()) {
            let ord = sp_a.sort_cmp(sp_b).then_with(|| occ_b.total_cmp(occ_a));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.len().cmp(&b.len())
    }

    pub fn species_string(&self) -> String {
        if self.is_ordered() {
            return self.species[0].0.to_string();
        }
        self.species
            .iter()
            .map(|(sp, occu)| format!("{}:{:.3}", sp, occu))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
