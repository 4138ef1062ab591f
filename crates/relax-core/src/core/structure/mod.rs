//! The internal structural object: multi-model ensembles of molecules read
//! from PDB, XYZ and Gaussian files, with bond inference, superposition and
//! PDB output.

pub mod bonds;
pub mod containers;
pub mod internal;
pub mod superimpose;
pub mod write;

pub use containers::{AtomData, ModelContainer, MolContainer, MolType};
pub use internal::{AtomInfo, BondVectors, Internal, LoadOptions};
pub use superimpose::{CentreType, Displacement, SuperimposeMethod};
pub use write::{PdbWriteOptions, PdbWriter};
