//! # Workflows Module
//!
//! Top-level entry points that tie the [`engine`](crate::engine) and
//! [`core`](crate::core) layers together.
//!
//! - **Ordering Workflow** ([`order`]) - Validates a group request, builds the Ewald
//!   matrix, runs the selected search and materializes ranked ordered structures.
//! - **Site Transformations** ([`sites`]) - Index-addressed replace, remove and
//!   translate edits.

pub mod order;
pub mod sites;
