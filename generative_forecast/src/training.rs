//! Training loop for the autogenerative network

use crate::error::{ForecastError, Result};
use crate::framing::FramedTensor;
use crate::network::{InputPerturbation, Network};
use crate::state::CheckpointState;
use ndarray::Axis;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Factor applied to the learning rate when an outer iteration's error rises
pub const LR_BACKOFF: f64 = 0.5;

/// Lower clamp of the new-data ratio used by [`determine_lr`]
pub const MIN_LR_FRACTION: f64 = 0.05;

/// Settings for one call to [`train_autogenerative_model`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingConfig {
    /// Outer iterations
    pub iterations: usize,
    /// Starting learning rate
    pub learning_rate: f64,
    /// Passes over all examples per outer iteration
    pub epochs: usize,
    /// Probability of zeroing each input cell
    pub drop_percentage: f64,
}

impl TrainingConfig {
    fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(ForecastError::invalid_config("iterations", "must be at least 1"));
        }
        if self.epochs == 0 {
            return Err(ForecastError::invalid_config("epochs", "must be at least 1"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ForecastError::invalid_config(
                "learning_rate",
                format!("must be a positive number, got {}", self.learning_rate),
            ));
        }
        Ok(())
    }
}

/// Cooperative cancellation shared between the caller and a running session
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running session to stop at its next check point
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ForecastError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Fit `network` on framed examples.
///
/// Examples are visited in order every epoch. `checkpoint_state` is only
/// touched once the whole call succeeded; on error the caller's state is the
/// last known-good one.
pub fn train_autogenerative_model<R: Rng + ?Sized>(
    data_frame: &FramedTensor,
    mut network: Network,
    checkpoint_state: &mut CheckpointState,
    config: &TrainingConfig,
    rng: &mut R,
    cancel: &CancelFlag,
) -> Result<(f64, Network)> {
    config.validate()?;
    check_compatibility(data_frame, &network, checkpoint_state)?;

    let examples = data_frame.num_examples();
    let perturbation = InputPerturbation::new(network.config().io_noise, config.drop_percentage)?;
    let mut learning_rate = config.learning_rate;
    let mut previous_error: Option<f64> = None;
    let mut final_error = f64::NAN;

    info!(
        examples,
        iterations = config.iterations,
        epochs = config.epochs,
        learning_rate,
        "training started"
    );

    for iteration in 0..config.iterations {
        cancel.check()?;

        for epoch in 0..config.epochs {
            let mut total = 0.0;
            for (x, y) in data_frame
                .x
                .axis_iter(Axis(0))
                .zip(data_frame.y.axis_iter(Axis(0)))
            {
                let loss = network.train_example(x, y, &perturbation, learning_rate, rng);
                if !loss.is_finite() {
                    return Err(ForecastError::TrainingDiverged {
                        iteration,
                        epoch,
                        loss,
                    });
                }
                total += loss;
            }
            final_error = total / examples as f64;
            debug!(iteration, epoch, error = final_error, "epoch finished");
        }

        if !network.is_finite() {
            return Err(ForecastError::TrainingDiverged {
                iteration,
                epoch: config.epochs - 1,
                loss: final_error,
            });
        }

        info!(iteration, error = final_error, learning_rate, "iteration finished");
        if let Some(previous) = previous_error {
            if final_error > previous {
                learning_rate *= LR_BACKOFF;
                info!(learning_rate, "error rose, backing off learning rate");
            }
        }
        previous_error = Some(final_error);
    }

    checkpoint_state.extend_history(data_frame.observations.view())?;
    checkpoint_state.record_training(examples, final_error);
    info!(error = final_error, "training finished");

    Ok((final_error, network))
}

/// Learning rate for warm-start training.
///
/// Scales `prime_lr` by the share of a full history that arrived and decays
/// it with the number of completed sessions.
pub fn determine_lr(data: &FramedTensor, state: &CheckpointState) -> f64 {
    let arrived = data.new_rows() as f64 / state.max_history.max(1) as f64;
    let fraction = arrived.clamp(MIN_LR_FRACTION, 1.0);
    let decay = ((1 + state.training_sessions) as f64).sqrt();
    state.prime_lr * state.lr_multiplier * fraction / decay
}

fn check_compatibility(
    data: &FramedTensor,
    network: &Network,
    state: &CheckpointState,
) -> Result<()> {
    if !network.is_initialized() || !state.has_boundaries() {
        return Err(ForecastError::NotInitialized);
    }
    let config = network.config();
    if data.io_width() != config.io_dim || state.io_width != config.io_dim {
        return Err(ForecastError::invalid_config(
            "io_width",
            format!(
                "network expects {} variables, data has {}, state has {}",
                config.io_dim,
                data.io_width(),
                state.io_width
            ),
        ));
    }
    if data.beams != config.beam_widths() {
        return Err(ForecastError::invalid_config(
            "beam_width",
            format!(
                "data framed with {:?}, network built for {:?}",
                data.beams,
                config.beam_widths()
            ),
        ));
    }
    if !data.has_examples() {
        return Err(ForecastError::InsufficientData {
            required: data.beams.window(),
            available: data.context_len,
        });
    }
    Ok(())
}
