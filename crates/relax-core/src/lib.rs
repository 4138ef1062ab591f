//! # relax Core Library
//!
//! The scientific core of the relax NMR analysis program: the data store of
//! pipes and spins, structural models, alignment tensors and reduced spectral
//! density mapping.
//!
//! ## Architecture
//!
//! - **[`core`]: The Foundation.** Stateless data models (the spin tree, the
//!   alignment tensor with its dependency table, the structural object), the
//!   physical constants, the file formats (PDB, XYZ, Gaussian, column files,
//!   XML states) and [`RelaxError`](core::error::RelaxError).
//!
//! - **[`engine`]: The Numerics.** Relaxation rate components, the spectral
//!   density inversion, Monte Carlo noise generation and progress reporting.
//!
//! - **[`workflows`]: The Public API.** Operations on the current data pipe
//!   that tie `core` and `engine` together, such as the complete
//!   `jw_mapping::run` analysis.

pub mod core;
pub mod engine;
pub mod workflows;
