//! # Core Models Module
//!
//! The minimal crystallographic data model consumed by the ordering engine.
//!
//! ## Key Components
//!
//! - [`element`] - Frozen element table (atomic number, electronegativity)
//! - [`species`] - Oxidation-state-decorated species and their string notation
//! - [`lattice`] - Lattice vectors and fractional/Cartesian transforms
//! - [`site`] - Sites carrying species with fractional occupancies
//! - [`structure`] - Periodic structures and the site edits the engine needs
//! - [`error`] - Errors raised while building or editing models
//!
//! ## Usage
//!
//! ```ignore
//! use ewaldorder::core::models::{lattice::Lattice, site::Site, structure::Structure};
//!
//! let lattice = Lattice::cubic(4.2)?;
//! let li = Site::new(vec![("Li+".parse()?, 0.5)], Vector3::new(0.5, 0.5, 0.5));
//! let structure = Structure::new(lattice, vec![li]);
//! ```

pub mod element;
pub mod error;
pub mod lattice;
pub mod site;
pub mod species;
pub mod structure;
