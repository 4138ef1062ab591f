//! # Workflows Module
//!
//! The user facing operations of relax. Each workflow acts on the current
//! pipe of a [`DataStore`](crate::core::store::DataStore), validates its
//! preconditions and reports through `tracing`.
//!
//! - [`pipes`]: creating, switching, copying, bundling and listing pipes.
//! - [`sequence`]: reading sequences and relaxation data, spin isotopes.
//! - [`jw_mapping`]: reduced spectral density mapping with Monte Carlo errors.
//! - [`structure`]: loading, superimposing and writing structures.
//! - [`align_tensor`]: initialising and summarising alignment tensors.
//! - [`results`]: the columnar results file of the mapping.
//! - [`state`]: saving and restoring XML program states.

pub mod align_tensor;
pub mod jw_mapping;
pub mod pipes;
pub mod results;
pub mod sequence;
pub mod state;
pub mod structure;
