use crate::core::constants::{N15_CSA, NH_BOND_LENGTH};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Settings of a complete reduced spectral density mapping analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct JwMappingConfig {
    /// Proton frequency in Hz of the relaxation data to map.
    pub frequency: f64,
    /// Isotope of the heteronucleus, e.g. `15N`.
    pub heteronucleus: String,
    /// Isotope of the attached proton.
    pub proton: String,
    /// Bond length in metres.
    pub bond_length: f64,
    /// Chemical shift anisotropy, unitless.
    pub csa: f64,
    /// Spin selection the analysis is restricted to.
    pub spin_id: Option<String>,
    /// Number of Monte Carlo simulations; zero disables error propagation.
    pub simulations: usize,
    pub seed: Option<u64>,
    /// Deselect spins with insufficient relaxation data before calculating.
    pub overfit_deselect: bool,
}

#[derive(Default)]
pub struct JwMappingConfigBuilder {
    frequency: Option<f64>,
    heteronucleus: Option<String>,
    proton: Option<String>,
    bond_length: Option<f64>,
    csa: Option<f64>,
    spin_id: Option<String>,
    simulations: Option<usize>,
    seed: Option<u64>,
    overfit_deselect: Option<bool>,
}

impl JwMappingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frequency(mut self, frq: f64) -> Self {
        self.frequency = Some(frq);
        self
    }
    pub fn heteronucleus(mut self, isotope: impl Into<String>) -> Self {
        self.heteronucleus = Some(isotope.into());
        self
    }
    pub fn proton(mut self, isotope: impl Into<String>) -> Self {
        self.proton = Some(isotope.into());
        self
    }
    pub fn bond_length(mut self, r: f64) -> Self {
        self.bond_length = Some(r);
        self
    }
    pub fn csa(mut self, csa: f64) -> Self {
        self.csa = Some(csa);
        self
    }
    pub fn spin_id(mut self, spin_id: impl Into<String>) -> Self {
        self.spin_id = Some(spin_id.into());
        self
    }
    pub fn simulations(mut self, n: usize) -> Self {
        self.simulations = Some(n);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn overfit_deselect(mut self, flag: bool) -> Self {
        self.overfit_deselect = Some(flag);
        self
    }

    pub fn build(self) -> Result<JwMappingConfig, ConfigError> {
        let frequency = self
            .frequency
            .ok_or(ConfigError::MissingParameter("frequency"))?;
        if !(frequency.is_finite() && frequency > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "frequency",
                reason: format!("{frequency} is not a positive frequency in Hz"),
            });
        }

        Ok(JwMappingConfig {
            frequency,
            heteronucleus: self
                .heteronucleus
                .ok_or(ConfigError::MissingParameter("heteronucleus"))?,
            proton: self.proton.unwrap_or_else(|| "1H".to_string()),
            bond_length: self.bond_length.unwrap_or(NH_BOND_LENGTH),
            csa: self.csa.unwrap_or(N15_CSA),
            spin_id: self.spin_id,
            simulations: self.simulations.unwrap_or(0),
            seed: self.seed,
            overfit_deselect: self.overfit_deselect.unwrap_or(true),
        })
    }
}
