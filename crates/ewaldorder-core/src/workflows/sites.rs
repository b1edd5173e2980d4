use crate::core::models::error::ModelError;
use crate::core::models::species::Species;
use crate::core::models::structure::Structure;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Deterministic single-structure edits addressed by site index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SiteTransformation {
    /// Replaces each listed site with a fully occupied species.
    ReplaceSpecies { species: BTreeMap<usize, Species> },
    /// Deletes sites; indices refer to the input structure.
    RemoveSites { indices: Vec<usize> },
    /// Moves sites by `vector`, given in fractional or Cartesian (Å) coordinates.
    TranslateSites {
        indices: Vec<usize>,
        vector: Vector3<f64>,
        fractional: bool,
    },
}

impl SiteTransformation {
    pub fn apply(&self, structure: &Structure) -> Result<Structure, ModelError> {
        let mut edited = structure.clone();
        match self {
            Self::ReplaceSpecies { species } => {
                for (&index, &sp) in species {
                    edited.replace_site(index, sp)?;
                }
            }
            Self::RemoveSites { indices } => edited.remove_sites(indices)?,
            Self::TranslateSites {
                indices,
                vector,
                fractional,
            } => edited.translate_sites(indices, *vector, *fractional)?,
        }
        debug!(transformation = %self, sites = edited.len(), "Applied site transformation.");
        Ok(edited)
    }

    /// Only translations can be undone without the original structure.
    pub fn inverse(&self) -> Option<Self> {
        match self {
            Self::TranslateSites {
                indices,
                vector,
                fractional,
            } => Some(Self::TranslateSites {
                indices: indices.clone(),
                vector: -vector,
                fractional: *fractional,
            }),
            _ => None,
        }
    }

    pub fn is_one_to_many(&self) -> bool {
        false
    }
}

impl fmt::Display for SiteTransformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReplaceSpecies { species } => {
                let pairs: Vec<String> = species.iter().map(|(i, sp)| format!("{}->{}", i, sp)).collect();
                write!(f, "replace-species [{}]", pairs.join(", "))
            }
            Self::RemoveSites { indices } => write!(f, "remove-sites {:?}", indices),
            Self::TranslateSites {
                indices,
                vector,
                fractional,
            } => write!(
                f,
                "translate-sites {:?} by ({}, {}, {}){}",
                indices,
                vector.x,
                vector.y,
                vector.z,
                if *fractional { " (fractional)" } else { "" }
            ),
        }
    }
}
