use thiserror::Error;

use super::config::ConfigError;
use crate::core::ewald::EwaldError;
use crate::core::models::error::ModelError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid ordering configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Ewald summation failed: {source}")]
    Ewald {
        #[from]
        source: EwaldError,
    },

    #[error("Structure edit failed: {0}")]
    Model(#[from] ModelError),

    #[error("No ordering satisfies the requested counts")]
    NoSolution,

    #[error("Internal logic error: {0}")]
    Internal(String),
}
