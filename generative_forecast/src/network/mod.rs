//! The autogenerative forecasting network
//!
//! A residual feed-forward cell reads the flattened lookback window and
//! predicts the change from the window's last row to the next row. Longer
//! horizons are produced by appending each prediction to the window and
//! stepping again, so the network always conditions on its own output.

pub mod layer;
pub mod noise;

pub use layer::{DenseLayer, LayerGradients};
pub use noise::InputPerturbation;

use crate::error::{ForecastError, Result};
use crate::framing::BeamWidths;
use crate::normalization::NormalizationBoundary;
use crate::state::CheckpointState;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Output layer starts small so an untrained network stays near persistence
const OUTPUT_GAIN: f64 = 0.1;

/// Global gradient norm cap per example update
pub const MAX_GRADIENT_NORM: f64 = 1.0;

/// Everything needed to create a network and its checkpoint state
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkParams {
    /// Number of variables
    pub io_dim: usize,
    /// Hidden units
    pub layer_width: usize,
    /// Rows of history a checkpoint keeps
    pub max_history: usize,
    /// Cold-start learning rate
    pub initial_lr: f64,
    /// Warm-start learning rate multiplier
    pub lr_multiplier: f64,
    /// Default input noise
    pub io_noise: f64,
    /// Rows of context per step
    pub lookback_beam_width: usize,
    /// Rows generated per training example
    pub future_beam_width: usize,
}

impl NetworkParams {
    fn validate(&self) -> Result<BeamWidths> {
        if self.io_dim == 0 {
            return Err(ForecastError::invalid_config("io_dim", "must be at least 1"));
        }
        if self.layer_width == 0 {
            return Err(ForecastError::invalid_config("layer_width", "must be at least 1"));
        }
        if !self.initial_lr.is_finite() || self.initial_lr <= 0.0 {
            return Err(ForecastError::invalid_config(
                "initial_lr",
                format!("must be a positive number, got {}", self.initial_lr),
            ));
        }
        if !self.lr_multiplier.is_finite() || self.lr_multiplier <= 0.0 {
            return Err(ForecastError::invalid_config(
                "lr_multiplier",
                format!("must be a positive number, got {}", self.lr_multiplier),
            ));
        }
        if !self.io_noise.is_finite() || self.io_noise < 0.0 {
            return Err(ForecastError::invalid_config(
                "io_noise",
                format!("must be a non-negative number, got {}", self.io_noise),
            ));
        }
        let beams = BeamWidths::new(self.lookback_beam_width, self.future_beam_width)?;
        if self.max_history < beams.window() {
            return Err(ForecastError::invalid_config(
                "max_history",
                format!(
                    "{} rows cannot hold a window of {} rows",
                    self.max_history,
                    beams.window()
                ),
            ));
        }
        Ok(beams)
    }
}

/// Architecture fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub io_dim: usize,
    pub layer_width: usize,
    pub lookback_beam_width: usize,
    pub future_beam_width: usize,
    pub io_noise: f64,
}

impl NetworkConfig {
    /// Length of the flattened lookback window
    pub fn input_width(&self) -> usize {
        self.lookback_beam_width * self.io_dim
    }

    pub fn beam_widths(&self) -> BeamWidths {
        BeamWidths {
            lookback: self.lookback_beam_width,
            future: self.future_beam_width,
        }
    }
}

/// Data set binding recorded once by [`Network::initialize_meta`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMeta {
    /// Examples in the cold-start training set
    pub num_examples: usize,
    /// Boundaries the network was trained against
    pub normalization_boundaries: Vec<NormalizationBoundary>,
}

/// Cached activations of one forward step
#[derive(Debug, Clone)]
struct StepTrace {
    input: Array1<f64>,
    hidden: Array1<f64>,
    output: Array1<f64>,
}

/// Gradients for every layer of the network
#[derive(Debug, Clone)]
struct NetworkGradients {
    hidden: LayerGradients,
    output: LayerGradients,
}

impl NetworkGradients {
    fn norm(&self) -> f64 {
        (self.hidden.squared_norm() + self.output.squared_norm()).sqrt()
    }

    fn clip(&mut self, max_norm: f64) {
        let norm = self.norm();
        if norm > max_norm {
            let factor = max_norm / norm;
            self.hidden.scale(factor);
            self.output.scale(factor);
        }
    }
}

/// Autogenerative forecasting network
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    config: NetworkConfig,
    hidden: DenseLayer,
    output: DenseLayer,
    meta: Option<NetworkMeta>,
}

/// Create a network sized for the data set and its fresh checkpoint state.
///
/// The state's `prime_lr` is `params.initial_lr`; its boundaries stay unbound
/// until [`CheckpointState::bind_boundaries`] is called.
pub fn initialize_network<R: Rng + ?Sized>(
    params: &NetworkParams,
    headers: Vec<String>,
    rng: &mut R,
) -> Result<(Network, CheckpointState)> {
    let beams = params.validate()?;
    if headers.len() != params.io_dim {
        return Err(ForecastError::invalid_config(
            "io_dim",
            format!("{} headers given for {} variables", headers.len(), params.io_dim),
        ));
    }

    let config = NetworkConfig {
        io_dim: params.io_dim,
        layer_width: params.layer_width,
        lookback_beam_width: beams.lookback,
        future_beam_width: beams.future,
        io_noise: params.io_noise,
    };
    let network = Network::new(config, rng)?;
    let state = CheckpointState::new(
        headers,
        params.max_history,
        params.initial_lr,
        params.lr_multiplier,
        params.io_noise,
        beams,
    );
    Ok((network, state))
}

impl Network {
    /// Randomly initialized network
    pub fn new<R: Rng + ?Sized>(config: NetworkConfig, rng: &mut R) -> Result<Self> {
        if config.io_dim == 0 || config.layer_width == 0 || config.lookback_beam_width == 0 {
            return Err(ForecastError::invalid_config(
                "network",
                "dimensions must be at least 1",
            ));
        }
        let hidden = DenseLayer::new(config.input_width(), config.layer_width, 1.0, rng)?;
        let output = DenseLayer::new(config.layer_width, config.io_dim, OUTPUT_GAIN, rng)?;
        Ok(Self {
            config,
            hidden,
            output,
            meta: None,
        })
    }

    /// Reassemble a network from persisted parts, verifying the architecture
    pub fn from_parts(
        config: NetworkConfig,
        hidden: DenseLayer,
        output: DenseLayer,
        meta: Option<NetworkMeta>,
    ) -> Result<Self> {
        let network = Self {
            config,
            hidden,
            output,
            meta,
        };
        network.validate_architecture()?;
        Ok(network)
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn meta(&self) -> Option<&NetworkMeta> {
        self.meta.as_ref()
    }

    pub(crate) fn layers(&self) -> (&DenseLayer, &DenseLayer) {
        (&self.hidden, &self.output)
    }

    /// Whether [`Network::initialize_meta`] has run
    pub fn is_initialized(&self) -> bool {
        self.meta.is_some()
    }

    /// Bind the network to its cold-start data set. Only allowed once.
    pub fn initialize_meta(
        &mut self,
        num_examples: usize,
        normalization_boundaries: &[NormalizationBoundary],
    ) -> Result<()> {
        if self.meta.is_some() {
            return Err(ForecastError::AlreadyInitialized);
        }
        if normalization_boundaries.len() != self.config.io_dim {
            return Err(ForecastError::invalid_config(
                "normalization_boundaries",
                format!(
                    "expected {} boundaries, got {}",
                    self.config.io_dim,
                    normalization_boundaries.len()
                ),
            ));
        }
        self.meta = Some(NetworkMeta {
            num_examples,
            normalization_boundaries: normalization_boundaries.to_vec(),
        });
        Ok(())
    }

    /// Check every parameter shape against the recorded configuration
    pub fn validate_architecture(&self) -> Result<()> {
        let c = &self.config;
        if c.io_dim == 0 || c.layer_width == 0 || c.lookback_beam_width == 0 || c.future_beam_width == 0 {
            return Err(ForecastError::CorruptCheckpoint(
                "network dimensions must be at least 1".to_string(),
            ));
        }
        if !self.hidden.has_shape(c.input_width(), c.layer_width) {
            return Err(ForecastError::CorruptCheckpoint(format!(
                "hidden layer is {}x{}, expected {}x{}",
                self.hidden.inputs(),
                self.hidden.outputs(),
                c.input_width(),
                c.layer_width
            )));
        }
        if !self.output.has_shape(c.layer_width, c.io_dim) {
            return Err(ForecastError::CorruptCheckpoint(format!(
                "output layer is {}x{}, expected {}x{}",
                self.output.inputs(),
                self.output.outputs(),
                c.layer_width,
                c.io_dim
            )));
        }
        if let Some(meta) = &self.meta {
            if meta.normalization_boundaries.len() != c.io_dim {
                return Err(ForecastError::CorruptCheckpoint(format!(
                    "meta data holds {} boundaries for {} variables",
                    meta.normalization_boundaries.len(),
                    c.io_dim
                )));
            }
        }
        Ok(())
    }

    /// Whether every weight is finite
    pub fn is_finite(&self) -> bool {
        self.hidden.is_finite() && self.output.is_finite()
    }

    fn trace(&self, input: Array1<f64>, anchor: ArrayView1<f64>) -> StepTrace {
        let hidden = self.hidden.forward(&input).mapv(f64::tanh);
        let output = self.output.forward(&hidden) + &anchor;
        StepTrace {
            input,
            hidden,
            output,
        }
    }

    fn check_window(&self, window: ArrayView2<f64>) -> Result<()> {
        if window.ncols() != self.config.io_dim {
            return Err(ForecastError::invalid_config(
                "window",
                format!("expected {} variables, got {}", self.config.io_dim, window.ncols()),
            ));
        }
        if window.nrows() != self.config.lookback_beam_width {
            return Err(ForecastError::InsufficientData {
                required: self.config.lookback_beam_width,
                available: window.nrows(),
            });
        }
        Ok(())
    }

    /// Predict the row following `window` (`lookback × io_dim`)
    pub fn step<R: Rng + ?Sized>(
        &self,
        window: ArrayView2<f64>,
        perturbation: &InputPerturbation,
        rng: &mut R,
    ) -> Result<Array1<f64>> {
        self.check_window(window)?;
        let input = perturbation.apply(&flatten(window), rng);
        let last = window.nrows() - 1;
        Ok(self.trace(input, window.row(last)).output)
    }

    /// Autogeneratively unroll `steps` rows from a seed window.
    ///
    /// Every step's input is perturbed afresh; each generated row becomes
    /// context for the next.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        seed: ArrayView2<f64>,
        steps: usize,
        perturbation: &InputPerturbation,
        rng: &mut R,
    ) -> Result<Array2<f64>> {
        self.check_window(seed)?;
        let mut context = seed.to_owned();
        let mut generated = Array2::zeros((steps, self.config.io_dim));
        let last = context.nrows() - 1;

        for t in 0..steps {
            let input = perturbation.apply(&flatten(context.view()), rng);
            let trace = self.trace(input, context.row(last));
            generated.row_mut(t).assign(&trace.output);
            shift_window(&mut context, &trace.output);
        }
        Ok(generated)
    }

    /// One SGD update on a single example; returns the example's mean squared error.
    ///
    /// The target rows only score the generated rows. Generated rows are fed
    /// back as plain inputs, gradients do not flow through them. Nothing is
    /// updated when the loss is not finite.
    pub(crate) fn train_example<R: Rng + ?Sized>(
        &mut self,
        input: ArrayView2<f64>,
        target: ArrayView2<f64>,
        perturbation: &InputPerturbation,
        learning_rate: f64,
        rng: &mut R,
    ) -> f64 {
        let mut grads = NetworkGradients {
            hidden: LayerGradients::zeros_like(&self.hidden),
            output: LayerGradients::zeros_like(&self.output),
        };
        let mut context = input.to_owned();
        let last = context.nrows() - 1;
        let cells = (target.nrows() * target.ncols()) as f64;
        let mut loss = 0.0;

        for k in 0..target.nrows() {
            let noisy = perturbation.apply(&flatten(context.view()), rng);
            let trace = self.trace(noisy, context.row(last));
            let error = &trace.output - &target.row(k);
            loss += error.mapv(|e| e * e).sum();

            let output_grad = error * (2.0 / cells);
            grads.output.accumulate(&trace.hidden, &output_grad);
            let hidden_grad =
                self.output.backward(&output_grad) * trace.hidden.mapv(|h| 1.0 - h * h);
            grads.hidden.accumulate(&trace.input, &hidden_grad);

            shift_window(&mut context, &trace.output);
        }

        let loss = loss / cells;
        if loss.is_finite() {
            grads.clip(MAX_GRADIENT_NORM);
            self.hidden.apply_gradients(&grads.hidden, learning_rate);
            self.output.apply_gradients(&grads.output, learning_rate);
        }
        loss
    }
}

/// Row-major flattening of a window
fn flatten(window: ArrayView2<f64>) -> Array1<f64> {
    window.iter().copied().collect()
}

/// Drop the oldest row and append `next`
fn shift_window(context: &mut Array2<f64>, next: &Array1<f64>) {
    let rows = context.nrows();
    let tail = context.slice(s![1.., ..]).to_owned();
    context.slice_mut(s![..rows - 1, ..]).assign(&tail);
    context.row_mut(rows - 1).assign(next);
}
