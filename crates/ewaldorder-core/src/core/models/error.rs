use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Unknown element symbol: '{0}'")]
    UnknownElement(String),

    #[error("Invalid species string: '{0}'. Expected e.g. 'Fe2+', 'O2-', 'Li+' or 'Na'")]
    InvalidSpecies(String),

    #[error("Site index {index} is out of range for a structure with {len} sites")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Lattice vectors are linearly dependent (volume {volume:.3e})")]
    DegenerateLattice { volume: f64 },

    #[error("Species '{species}' on site {index} has no oxidation state")]
    MissingOxidationState { index: usize, species: String },

    #[error("Site {index} has no species")]
    EmptySite { index: usize },
}
