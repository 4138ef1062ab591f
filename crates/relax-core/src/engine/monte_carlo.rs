use super::jw_mapping::Mapping;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;
use tracing::instrument;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Error)]
pub enum MonteCarloError {
    #[error("The error {error} of the value {value} cannot be used as a standard deviation")]
    InvalidError { value: f64, error: f64 },
    #[error("Failed to create the normal distribution: {source}")]
    Distribution {
        #[from]
        source: rand_distr::NormalError,
    },
}

/// Randomisation of measured values by Gaussian noise, one draw per
/// simulation.
pub struct NoiseGenerator {
    rng: StdRng,
}

impl NoiseGenerator {
    /// A seeded generator reproduces the same simulated data set. Without a
    /// seed the generator is initialised from system entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Draws `n` values from N(value, error²).
    pub fn simulate(&mut self, value: f64, error: f64, n: usize) -> Result<Vec<f64>, MonteCarloError> {
        if !error.is_finite() || error < 0.0 {
            return Err(MonteCarloError::InvalidError { value, error });
        }
        let normal = Normal::new(value, error)?;
        Ok((0..n).map(|_| normal.sample(&mut self.rng)).collect())
    }
}

/// The inputs of one simulated spectral density mapping evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimPoint {
    pub r: f64,
    pub csa: f64,
    pub r1: f64,
    pub r2: f64,
    pub noe: f64,
}

/// Evaluates the mapping for every simulation, preserving order.
#[instrument(level = "trace", skip_all, fields(num_sims = points.len()))]
pub fn map_simulations(mapping: &Mapping, points: &[SimPoint]) -> Vec<(f64, f64, f64)> {
    #[cfg(not(feature = "parallel"))]
    let iterator = points.iter();

    #[cfg(feature = "parallel")]
    let iterator = points.par_iter();

    iterator
        .map(|p| mapping.func(p.r, p.csa, p.r1, p.r2, p.noe))
        .collect()
}

/// Sample standard deviation (n − 1 denominator). `None` for fewer than two
/// values.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((sum_sq / (n - 1.0)).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{H_BAR, MU0, N15_CSA, NH_BOND_LENGTH, gyromagnetic_ratio};

    mod noise {
        use super::*;

        #[test]
        fn seeded_generators_are_reproducible() {
            let a = NoiseGenerator::new(Some(42)).simulate(1.5, 0.05, 20).unwrap();
            let b = NoiseGenerator::new(Some(42)).simulate(1.5, 0.05, 20).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.len(), 20);
        }

        #[test]
        fn draws_scatter_around_the_value() {
            let sims = NoiseGenerator::new(Some(7)).simulate(10.0, 0.5, 5000).unwrap();
            let mean = sims.iter().sum::<f64>() / sims.len() as f64;
            let sd = std_dev(&sims).unwrap();
            assert!((mean - 10.0).abs() < 0.05, "mean = {mean}");
            assert!((sd - 0.5).abs() < 0.05, "sd = {sd}");
        }

        #[test]
        fn zero_error_reproduces_the_value() {
            let sims = NoiseGenerator::new(Some(1)).simulate(0.8, 0.0, 3).unwrap();
            assert!(sims.iter().all(|&v| v == 0.8));
        }

        #[test]
        fn negative_or_nan_errors_are_rejected() {
            let mut generator = NoiseGenerator::new(Some(1));
            assert!(matches!(
                generator.simulate(1.0, -0.1, 3),
                Err(MonteCarloError::InvalidError { .. })
            ));
            assert!(generator.simulate(1.0, f64::NAN, 3).is_err());
        }
    }

    #[test]
    fn std_dev_uses_the_sample_denominator() {
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(std_dev(&[1.0]), None);
        assert_eq!(std_dev(&[]), None);
    }

    #[test]
    fn simulations_are_mapped_in_order() {
        let mapping = Mapping::new(
            600e6,
            gyromagnetic_ratio("15N").unwrap(),
            gyromagnetic_ratio("1H").unwrap(),
            MU0,
            H_BAR,
        );
        let points: Vec<SimPoint> = (0..50)
            .map(|i| SimPoint {
                r: NH_BOND_LENGTH,
                csa: N15_CSA,
                r1: 1.0 + i as f64 * 0.01,
                r2: 12.0,
                noe: 0.8,
            })
            .collect();
        let results = map_simulations(&mapping, &points);
        assert_eq!(results.len(), 50);
        for (p, result) in points.iter().zip(&results) {
            assert_eq!(*result, mapping.func(p.r, p.csa, p.r1, p.r2, p.noe));
        }
    }
}
