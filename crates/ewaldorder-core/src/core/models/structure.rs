use super::error::ModelError;
use super::lattice::Lattice;
use super::site::Site;
use super::species::Species;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A periodic crystal structure: a lattice plus an ordered list of sites.
///
/// Site indices are positional. Deleting sites shifts every later index down,
/// so callers that mix replacements and deletions must perform the
/// replacements first (see [`Structure::apply_manipulations`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    lattice: Lattice,
    sites: Vec<Site>,
}

impl Structure {
    pub fn new(lattice: Lattice, sites: Vec<Site>) -> Self {
        Self { lattice, sites }
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn site(&self, index: usize) -> Option<&Site> {
        self.sites.get(index)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn is_ordered(&self) -> bool {
        self.sites.iter().all(Site::is_ordered)
    }

    /// Total number of atoms, i.e. the sum of all site occupancies.
    pub fn num_atoms(&self) -> f64 {
        self.sites.iter().map(Site::total_occupancy).sum()
    }

    pub fn cart_coords(&self, index: usize) -> Option<Point3<f64>> {
        self.sites
            .get(index)
            .map(|site| self.lattice.to_cartesian(&site.frac_coords))
    }

    pub fn cartesian_positions(&self) -> Vec<Point3<f64>> {
        self.sites
            .iter()
            .map(|site| self.lattice.to_cartesian(&site.frac_coords))
            .collect()
    }

    /// Occupancy-weighted charge of every site.
    pub fn site_charges(&self) -> Result<Vec<f64>, ModelError> {
        self.sites
            .iter()
            .enumerate()
            .map(|(index, site)| {
                if site.species.is_empty() {
                    return Err(ModelError::EmptySite { index });
                }
                site.charge().ok_or_else(|| ModelError::MissingOxidationState {
                    index,
                    species: site.species_string(),
                })
            })
            .collect()
    }

    pub fn total_charge(&self) -> Result<f64, ModelError> {
        Ok(self.site_charges()?.iter().sum())
    }

    fn check_index(&self, index: usize) -> Result<(), ModelError> {
        if index >= self.sites.len() {
            return Err(ModelError::IndexOutOfBounds {
                index,
                len: self.sites.len(),
            });
        }
        Ok(())
    }

    /// Replaces whatever occupies site `index` with a single fully occupied species.
    pub fn replace_site(&mut self, index: usize, species: Species) -> Result<(), ModelError> {
        self.check_index(index)?;
        self.sites[index].species = vec![(species, 1.0)];
        Ok(())
    }

    /// Removes the given sites. Duplicates are ignored; all indices refer to
    /// the structure before any removal.
    pub fn remove_sites(&mut self, indices: &[usize]) -> Result<(), ModelError> {
        let unique: BTreeSet<usize> = indices.iter().copied().collect();
        for &index in &unique {
            self.check_index(index)?;
        }
        for &index in unique.iter().rev() {
            self.sites.remove(index);
        }
        Ok(())
    }

    pub fn translate_sites(
        &mut self,
        indices: &[usize],
        vector: Vector3<f64>,
        fractional: bool,
    ) -> Result<(), ModelError> {
        for &index in indices {
            self.check_index(index)?;
        }
        let frac_vector = if fractional {
            vector
        } else {
            self.lattice.to_fractional(&Point3::from(vector))
        };
        for &index in indices {
            self.sites[index].frac_coords += frac_vector;
        }
        Ok(())
    }

    /// Applies site decisions in an index-safe order: every replacement is
    /// performed before any deletion.
    pub fn apply_manipulations<'a, I>(&mut self, manipulations: I) -> Result<(), ModelError>
    where
        I: IntoIterator<Item = (usize, Option<&'a Species>)>,
    {
        let mut deletions = Vec::new();
        for (index, replacement) in manipulations {
            match replacement {
                Some(species) => self.replace_site(index, *species)?,
                None => {
                    self.check_index(index)?;
                    deletions.push(index);
                }
            }
        }
        self.remove_sites(&deletions)
    }

    /// A copy with sites sorted by species electronegativity (stable).
    pub fn sorted(&self) -> Structure {
        let mut sites = self.sites.clone();
        sites.sort_by(Site::sort_cmp);
        Structure::new(self.lattice.clone(), sites)
    }

    /// Composition string such as `"Li1.5 Co2 O4"`, elements in
    /// electronegativity order.
    pub fn formula(&self) -> String {
        let mut amounts: Vec<(&'static str, f64, f64)> = Vec::new();
        for site in &self.sites {
            for (species, occu) in &site.species {
                let element = species.element();
                match amounts.iter_mut().find(|(sym, _, _)| *sym == element.symbol) {
                    Some(entry) => entry.1 += occu,
                    None => amounts.push((element.symbol, *occu, element.sort_electronegativity())),
                }
            }
        }
        amounts.sort_by(|a, b| a.2.total_cmp(&b.2));
        amounts
            .iter()
            .map(|(sym, amount, _)| {
                if (amount - amount.round()).abs() < 1e-8 {
                    format!("{}{}", sym, amount.round() as i64)
                } else {
                    format!("{}{:.3}", sym, amount)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(s: &str) -> Species {
        s.parse().unwrap()
    }

    fn rocksalt_like() -> Structure {
        let lattice = Lattice::cubic(4.0).unwrap();
        let sites = vec![
            Site::ordered(sp("O2-"), Vector3::new(0.0, 0.0, 0.0)),
            Site::new(vec![(sp("Li+"), 0.5)], Vector3::new(0.5, 0.0, 0.0)),
            Site::new(vec![(sp("Li+"), 0.5)], Vector3::new(0.0, 0.5, 0.0)),
            Site::ordered(sp("Mg2+"), Vector3::new(0.5, 0.5, 0.5)),
        ];
        Structure::new(lattice, sites)
    }

    #[test]
    fn num_atoms_sums_occupancies() {
        assert!((rocksalt_like().num_atoms() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn site_charges_follow_occupancy() {
        let charges = rocksalt_like().site_charges().unwrap();
        assert_eq!(charges, vec![-2.0, 0.5, 0.5, 2.0]);
        assert!((rocksalt_like().total_charge().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn site_charges_require_oxidation_states() {
        let mut s = rocksalt_like();
        s.replace_site(3, sp("Mg")).unwrap();
        assert!(matches!(
            s.site_charges(),
            Err(ModelError::MissingOxidationState { index: 3, .. })
        ));
    }

    #[test]
    fn remove_sites_uses_original_indices() {
        let mut s = rocksalt_like();
        s.remove_sites(&[1, 3, 1]).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.sites()[0].species[0].0, sp("O2-"));
        assert_eq!(s.sites()[1].frac_coords, Vector3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn remove_sites_rejects_out_of_range_indices_without_editing() {
        let mut s = rocksalt_like();
        let result = s.remove_sites(&[0, 9]);
        assert_eq!(result, Err(ModelError::IndexOutOfBounds { index: 9, len: 4 }));
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn apply_manipulations_replaces_before_deleting() {
        let mut s = rocksalt_like();
        let na = sp("Na+");
        s.apply_manipulations(vec![(1, None), (2, Some(&na))]).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(s.sites()[1].species, vec![(na, 1.0)]);
        assert_eq!(s.sites()[1].frac_coords, Vector3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn translate_sites_supports_cartesian_vectors() {
        let mut s = rocksalt_like();
        s.translate_sites(&[0], Vector3::new(1.0, 0.0, 0.0), false)
            .unwrap();
        assert!((s.sites()[0].frac_coords - Vector3::new(0.25, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn sorted_orders_by_electronegativity() {
        let sorted = rocksalt_like().sorted();
        let symbols: Vec<_> = sorted
            .sites()
            .iter()
            .map(|site| site.species[0].0.symbol())
            .collect();
        assert_eq!(symbols, vec!["Li", "Li", "Mg", "O"]);
    }

    #[test]
    fn formula_reports_fractional_amounts() {
        assert_eq!(rocksalt_like().formula(), "Li1 Mg1 O1");
        let mut s = rocksalt_like();
        s.remove_sites(&[1]).unwrap();
        assert_eq!(s.formula(), "Li0.500 Mg1 O1");
    }
}
