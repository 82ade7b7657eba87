//! Input perturbation: additive Gaussian noise and inverted dropout

use crate::error::{ForecastError, Result};
use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// How inputs are perturbed before each forward step
#[derive(Debug, Clone, Copy)]
pub struct InputPerturbation {
    noise: Option<Normal<f64>>,
    drop_percentage: f64,
}

impl InputPerturbation {
    /// Noise with standard deviation `io_noise` followed by dropout with probability `drop_percentage`
    pub fn new(io_noise: f64, drop_percentage: f64) -> Result<Self> {
        if !io_noise.is_finite() || io_noise < 0.0 {
            return Err(ForecastError::invalid_config(
                "io_noise",
                format!("must be a non-negative number, got {}", io_noise),
            ));
        }
        if !(0.0..1.0).contains(&drop_percentage) {
            return Err(ForecastError::invalid_config(
                "input_dropout",
                format!("must be in [0, 1), got {}", drop_percentage),
            ));
        }

        let noise = if io_noise > 0.0 {
            Some(
                Normal::new(0.0, io_noise)
                    .map_err(|e| ForecastError::invalid_config("io_noise", e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Self {
            noise,
            drop_percentage,
        })
    }

    /// Noise only, as used while forecasting
    pub fn noise_only(io_noise: f64) -> Result<Self> {
        Self::new(io_noise, 0.0)
    }

    /// No perturbation at all
    pub fn none() -> Self {
        Self {
            noise: None,
            drop_percentage: 0.0,
        }
    }

    pub fn apply<R: Rng + ?Sized>(&self, input: &Array1<f64>, rng: &mut R) -> Array1<f64> {
        let keep_scale = 1.0 / (1.0 - self.drop_percentage);
        input.mapv(|value| {
            let noisy = match &self.noise {
                Some(normal) => value + normal.sample(&mut *rng),
                None => value,
            };
            if self.drop_percentage > 0.0 {
                if rng.gen_bool(self.drop_percentage) {
                    0.0
                } else {
                    noisy * keep_scale
                }
            } else {
                noisy
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn none_is_identity() {
        let mut rng = StdRng::seed_from_u64(0);
        let input = array![0.1, -0.2, 0.3];
        assert_eq!(InputPerturbation::none().apply(&input, &mut rng), input);
    }

    #[test]
    fn dropout_zeroes_or_rescales() {
        let mut rng = StdRng::seed_from_u64(11);
        let perturbation = InputPerturbation::new(0.0, 0.5).unwrap();
        let input = Array1::from_elem(200, 1.0);
        let output = perturbation.apply(&input, &mut rng);

        assert!(output.iter().all(|&v| v == 0.0 || v == 2.0));
        assert!(output.iter().any(|&v| v == 0.0));
        assert!(output.iter().any(|&v| v == 2.0));
    }

    #[test]
    fn rejects_out_of_range_settings() {
        assert!(InputPerturbation::new(-0.1, 0.0).is_err());
        assert!(InputPerturbation::new(0.1, 1.0).is_err());
    }
}
