//! Provides input/output functionality for the file formats relax reads and writes.
//!
//! Structure parsers (PDB, XYZ, Gaussian log files) implement the shared
//! [`traits::StructureFile`] interface, the PDB writer implements
//! [`traits::StructureWriter`], [`xml`] holds the generic marshaling used by
//! the state files, and [`columns`] and [`results`] cover the whitespace
//! separated data files of the spectral density mapping analysis.

pub mod columns;
pub mod gaussian;
pub mod pdb;
pub mod pdb_write;
pub mod results;
pub mod traits;
pub mod xml;
pub mod xyz;
