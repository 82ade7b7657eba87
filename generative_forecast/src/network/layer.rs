//! Fully connected layer with plain SGD updates

use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// `output = input · weights + bias`, weights stored as `(inputs, outputs)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub(crate) weights: Array2<f64>,
    pub(crate) bias: Array1<f64>,
}

/// Accumulated gradients for one [`DenseLayer`]
#[derive(Debug, Clone)]
pub struct LayerGradients {
    pub(crate) weights: Array2<f64>,
    pub(crate) bias: Array1<f64>,
}

impl DenseLayer {
    /// Gaussian-initialized layer; `gain` scales the Xavier standard deviation
    pub fn new<R: Rng + ?Sized>(
        inputs: usize,
        outputs: usize,
        gain: f64,
        rng: &mut R,
    ) -> Result<Self> {
        let std_dev = gain * (2.0 / (inputs + outputs).max(1) as f64).sqrt();
        let normal = Normal::new(0.0, std_dev)
            .map_err(|e| ForecastError::invalid_config("layer_width", e.to_string()))?;

        Ok(Self {
            weights: Array2::from_shape_fn((inputs, outputs), |_| normal.sample(&mut *rng)),
            bias: Array1::zeros(outputs),
        })
    }

    /// Number of inputs
    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    /// Number of outputs
    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }

    /// Whether weights and bias agree with the expected shape
    pub fn has_shape(&self, inputs: usize, outputs: usize) -> bool {
        self.weights.dim() == (inputs, outputs) && self.bias.len() == outputs
    }

    /// Whether every parameter is finite
    pub fn is_finite(&self) -> bool {
        self.weights.iter().chain(self.bias.iter()).all(|w| w.is_finite())
    }

    pub fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        input.dot(&self.weights) + &self.bias
    }

    /// Gradient of the layer input given the gradient of its output
    pub fn backward(&self, output_grad: &Array1<f64>) -> Array1<f64> {
        self.weights.dot(output_grad)
    }

    /// `parameters -= learning_rate * gradients`
    pub fn apply_gradients(&mut self, grads: &LayerGradients, learning_rate: f64) {
        self.weights.scaled_add(-learning_rate, &grads.weights);
        self.bias.scaled_add(-learning_rate, &grads.bias);
    }
}

impl LayerGradients {
    /// Zero gradients matching the layer's shape
    pub fn zeros_like(layer: &DenseLayer) -> Self {
        Self {
            weights: Array2::zeros(layer.weights.raw_dim()),
            bias: Array1::zeros(layer.bias.raw_dim()),
        }
    }

    /// Add the contribution of one forward step
    pub fn accumulate(&mut self, input: &Array1<f64>, output_grad: &Array1<f64>) {
        let outer = input
            .view()
            .insert_axis(Axis(1))
            .dot(&output_grad.view().insert_axis(Axis(0)));
        self.weights += &outer;
        self.bias += output_grad;
    }

    pub fn squared_norm(&self) -> f64 {
        self.weights.iter().chain(self.bias.iter()).map(|g| g * g).sum()
    }

    pub fn scale(&mut self, factor: f64) {
        self.weights *= factor;
        self.bias *= factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn forward_is_affine() {
        let layer = DenseLayer {
            weights: array![[1.0, 0.0], [0.0, 2.0], [1.0, 1.0]],
            bias: array![0.5, -0.5],
        };
        let out = layer.forward(&array![1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(out[0], 4.5);
        assert_abs_diff_eq!(out[1], 6.5);
    }

    #[test]
    fn accumulate_builds_outer_product() {
        let mut rng = StdRng::seed_from_u64(3);
        let layer = DenseLayer::new(2, 3, 1.0, &mut rng).unwrap();
        let mut grads = LayerGradients::zeros_like(&layer);
        grads.accumulate(&array![1.0, 2.0], &array![1.0, 0.0, -1.0]);

        assert_eq!(grads.weights, array![[1.0, 0.0, -1.0], [2.0, 0.0, -2.0]]);
        assert_eq!(grads.bias, array![1.0, 0.0, -1.0]);
        assert_abs_diff_eq!(grads.squared_norm(), 12.0);
    }
}
