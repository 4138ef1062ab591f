//! # Engine Module
//!
//! The numerical procedures of the analyses, free of any data store state.
//!
//! ## Architecture
//!
//! - **Relaxation Components** ([`ri_comps`]) - Dipolar, CSA and exchange constants and the forward R1, R2 and NOE formulae
//! - **Spectral Density Mapping** ([`jw_mapping`]) - Inversion of the reduced formulae for J(0), J(ωX) and J(ωH)
//! - **Monte Carlo** ([`monte_carlo`]) - Gaussian randomisation of data and simulation statistics
//! - **Configuration** ([`config`]) - Typed analysis settings and their builders
//! - **Progress Monitoring** ([`progress`]) - Progress reporting to the user interface
//!
//! The [`crate::workflows`] layer feeds data pipe contents through these
//! procedures and writes the results back.

pub mod config;
pub mod jw_mapping;
pub mod monte_carlo;
pub mod progress;
pub mod ri_comps;
