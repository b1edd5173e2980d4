use crate::core::ewald::params::EwaldParams;
use crate::core::models::species::Species;
use crate::core::models::structure::Structure;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Largest accepted distance between `fraction * group size` and the nearest integer.
pub const COUNT_ROUNDING_TOLERANCE: f64 = 1e-3;

const DEFAULT_ENERGY_TOLERANCE: f64 = 1e-5;
const DEFAULT_SYMMETRY_TOLERANCE: f64 = 0.1;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error(
        "Group {group}: removing a fraction of {fraction} from {size} sites does not give an integer count"
    )]
    NonIntegerRemoval {
        group: usize,
        fraction: f64,
        size: usize,
    },

    #[error("Group {group}: fraction {fraction} is outside [0, 1]")]
    FractionOutOfRange { group: usize, fraction: f64 },

    #[error("Group {group}: site index {index} is out of range for a structure of {len} sites")]
    IndexOutOfBounds {
        group: usize,
        index: usize,
        len: usize,
    },

    #[error("Site {index} appears in both group {first} and group {second}")]
    OverlappingGroups {
        index: usize,
        first: usize,
        second: usize,
    },

    #[error("Group {group}: invalid replacement: {reason}")]
    InvalidReplacement { group: usize, reason: String },

    #[error("Unknown ordering algorithm '{0}' (expected fast, complete or best-first)")]
    UnknownAlgorithm(String),

    #[error("Invalid value for '{name}': {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Search strategy used to pick the sites to remove or replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingAlgorithm {
    /// Branch-and-bound; exact for the single best ordering.
    #[default]
    Fast,
    /// Exhaustive enumeration with symmetry deduplication.
    Complete,
    /// Greedy, one result, no optimality guarantee.
    BestFirst,
}

impl FromStr for OrderingAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fast" => Ok(Self::Fast),
            "complete" => Ok(Self::Complete),
            "best-first" => Ok(Self::BestFirst),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for OrderingAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fast => "fast",
            Self::Complete => "complete",
            Self::BestFirst => "best-first",
        };
        f.write_str(name)
    }
}

/// A user-facing group request: remove (or replace) `fraction` of `indices`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteGroup {
    pub indices: Vec<usize>,
    pub fraction: f64,
    /// When set, the chosen sites are replaced by this species instead of removed.
    #[serde(default)]
    pub replacement: Option<Species>,
}

impl SiteGroup {
    pub fn removal(indices: Vec<usize>, fraction: f64) -> Self {
        Self {
            indices,
            fraction,
            replacement: None,
        }
    }

    pub fn replacement(indices: Vec<usize>, fraction: f64, species: Species) -> Self {
        Self {
            indices,
            fraction,
            replacement: Some(species),
        }
    }
}

/// A validated group: sorted candidate indices, the exact number of sites to
/// manipulate, and the charge scale applied to a manipulated site (`0.0` for
/// removal, `q_new / q_old` for replacement).
#[derive(Debug, Clone, PartialEq)]
pub struct RemovalGroup {
    pub indices: Vec<usize>,
    pub count: usize,
    pub replacement: Option<Species>,
    pub scale: f64,
}

impl RemovalGroup {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Node and wall-clock limits for a search. Unset limits are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchBudget {
    pub max_nodes: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl SearchBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_nodes.is_none() && self.time_limit.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderingConfig {
    pub groups: Vec<SiteGroup>,
    pub algorithm: OrderingAlgorithm,
    pub num_to_return: usize,
    /// Per-remaining-site energy difference (eV) below which two COMPLETE
    /// results are candidates for symmetry deduplication.
    pub energy_tolerance: f64,
    /// Fractional tolerance handed to the symmetry oracle.
    pub symmetry_tolerance: f64,
    pub ewald: EwaldParams,
    pub budget: SearchBudget,
}

impl OrderingConfig {
    /// Validates the groups against `structure` and derives the exact counts.
    /// Runs before any energy is computed.
    pub fn resolve_groups(&self, structure: &Structure) -> Result<Vec<RemovalGroup>, ConfigError> {
        let len = structure.len();
        let mut owner: HashMap<usize, usize> = HashMap::new();
        let mut resolved = Vec::with_capacity(self.groups.len());

        for (group, request) in self.groups.iter().enumerate() {
            if !(0.0..=1.0).contains(&request.fraction) {
                return Err(ConfigError::FractionOutOfRange {
                    group,
                    fraction: request.fraction,
                });
            }

            let mut indices = request.indices.clone();
            indices.sort_unstable();
            indices.dedup();
            for &index in &indices {
                if index >= len {
                    return Err(ConfigError::IndexOutOfBounds { group, index, len });
                }
                if let Some(&first) = owner.get(&index) {
                    return Err(ConfigError::OverlappingGroups {
                        index,
                        first,
                        second: group,
                    });
                }
                owner.insert(index, group);
            }

            let exact = request.fraction * indices.len() as f64;
            let count = exact.round();
            if (exact - count).abs() > COUNT_ROUNDING_TOLERANCE {
                return Err(ConfigError::NonIntegerRemoval {
                    group,
                    fraction: request.fraction,
                    size: indices.len(),
                });
            }

            let scale = match &request.replacement {
                None => 0.0,
                Some(species) => replacement_scale(structure, group, &indices, species)?,
            };

            resolved.push(RemovalGroup {
                indices,
                count: count as usize,
                replacement: request.replacement,
                scale,
            });
        }
        Ok(resolved)
    }
}

fn replacement_scale(
    structure: &Structure,
    group: usize,
    indices: &[usize],
    species: &Species,
) -> Result<f64, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidReplacement { group, reason };

    let new_charge = species
        .oxidation_state()
        .ok_or_else(|| invalid(format!("{} has no oxidation state", species)))?;

    let mut old_charge: Option<f64> = None;
    for &index in indices {
        let charge = structure
            .site(index)
            .and_then(|site| site.charge())
            .ok_or_else(|| invalid(format!("site {} has no oxidation state", index)))?;
        match old_charge {
            None => old_charge = Some(charge),
            Some(q) if (q - charge).abs() > 1e-8 => {
                return Err(invalid(format!(
                    "sites carry different charges ({} and {})",
                    q, charge
                )));
            }
            Some(_) => {}
        }
    }

    match old_charge {
        Some(q) if q.abs() > 1e-8 => Ok(new_charge / q),
        Some(_) => Err(invalid("replaced sites carry no charge".to_string())),
        None => Ok(1.0),
    }
}

#[derive(Default)]
pub struct OrderingConfigBuilder {
    groups: Option<Vec<SiteGroup>>,
    algorithm: Option<OrderingAlgorithm>,
    num_to_return: Option<usize>,
    energy_tolerance: Option<f64>,
    symmetry_tolerance: Option<f64>,
    ewald: Option<EwaldParams>,
    budget: Option<SearchBudget>,
}

impl OrderingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(mut self, groups: Vec<SiteGroup>) -> Self {
        self.groups = Some(groups);
        self
    }
    pub fn group(mut self, group: SiteGroup) -> Self {
        self.groups.get_or_insert_with(Vec::new).push(group);
        self
    }
    pub fn algorithm(mut self, algorithm: OrderingAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }
    pub fn num_to_return(mut self, n: usize) -> Self {
        self.num_to_return = Some(n);
        self
    }
    pub fn energy_tolerance(mut self, tolerance: f64) -> Self {
        self.energy_tolerance = Some(tolerance);
        self
    }
    pub fn symmetry_tolerance(mut self, tolerance: f64) -> Self {
        self.symmetry_tolerance = Some(tolerance);
        self
    }
    pub fn ewald(mut self, params: EwaldParams) -> Self {
        self.ewald = Some(params);
        self
    }
    pub fn budget(mut self, budget: SearchBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn build(self) -> Result<OrderingConfig, ConfigError> {
        let num_to_return = self.num_to_return.unwrap_or(1);
        if num_to_return == 0 {
            return Err(ConfigError::InvalidValue {
                name: "num_to_return",
                reason: "must be at least 1".to_string(),
            });
        }
        let energy_tolerance = self.energy_tolerance.unwrap_or(DEFAULT_ENERGY_TOLERANCE);
        let symmetry_tolerance = self.symmetry_tolerance.unwrap_or(DEFAULT_SYMMETRY_TOLERANCE);
        for (name, value) in [
            ("energy_tolerance", energy_tolerance),
            ("symmetry_tolerance", symmetry_tolerance),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    name,
                    reason: format!("{} is not a non-negative number", value),
                });
            }
        }
        let budget = self.budget.unwrap_or_default();
        if budget.max_nodes == Some(0) {
            return Err(ConfigError::InvalidValue {
                name: "max_nodes",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(OrderingConfig {
            groups: self.groups.ok_or(ConfigError::MissingParameter("groups"))?,
            algorithm: self.algorithm.unwrap_or_default(),
            num_to_return,
            energy_tolerance,
            symmetry_tolerance,
            ewald: self.ewald.unwrap_or_default(),
            budget,
        })
    }
}
