//! # Core Models Module
//!
//! The data models held by a data pipe.
//!
//! - [`pipe`] - The data pipe container, its type and the relaxation data bookkeeping
//! - [`mol_res_spin`] - The molecule, residue and spin tree with the per-spin parameters
//! - [`selection`] - Parsing and matching of `#mol:res@spin` identification strings
//! - [`align_tensor`] - Alignment tensors with dependency-tracked derived quantities
//!
//! Every model implements [`crate::core::io::xml::XmlObject`] so that a pipe can be
//! written to and restored from a relax state file.

pub mod align_tensor;
pub mod mol_res_spin;
pub mod pipe;
pub mod selection;
