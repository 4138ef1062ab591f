//! # Core Module
//!
//! The stateless foundation of the library: data models, physical constants, the
//! error hierarchy, file formats and the internal structural object.
//!
//! ## Architecture
//!
//! - **Data Models** ([`models`]) - Data pipes, the molecule/residue/spin tree and alignment tensors
//! - **Data Store** ([`store`]) - Named data pipes, the current pipe and pipe bundles
//! - **Structures** ([`structure`]) - Multi-model molecular structures, bonds and superposition
//! - **File I/O** ([`io`]) - PDB, XYZ, Gaussian, XML state files and column data files
//! - **Constants** ([`constants`]) - Physical constants and periodic/residue lookup tables
//! - **Errors** ([`error`]) - The [`error::RelaxError`] hierarchy shared by every layer

pub mod constants;
pub mod error;
pub mod io;
pub mod models;
pub mod store;
pub mod structure;
pub mod utils;
