//! Stochastic autogenerative rollouts

use crate::error::{ForecastError, Result};
use crate::framing::FramedTensor;
use crate::network::{InputPerturbation, Network};
use crate::state::CheckpointState;
use crate::training::CancelFlag;
use ndarray::{Array3, Axis};
use rand::Rng;
use tracing::info;

/// Largest rollout population, in cells, a single call may allocate
pub const MAX_FORECAST_CELLS: usize = 1 << 26;

/// Result of [`create_forecasts`]
#[derive(Debug, Clone)]
pub struct ForecastOutcome {
    /// Rollouts in normalized space, shape `(iterations, forecast_size, variables)`
    pub forecasts: Array3<f64>,
    /// Input state with any new data merged into its history
    pub state: CheckpointState,
}

impl ForecastOutcome {
    /// Number of rollouts
    pub fn iterations(&self) -> usize {
        self.forecasts.len_of(Axis(0))
    }

    /// Steps per rollout
    pub fn forecast_size(&self) -> usize {
        self.forecasts.len_of(Axis(1))
    }
}

/// Run `iterations` independent noisy rollouts of `forecast_size` steps.
///
/// New `data` is merged into a copy of the state's history first. Each
/// rollout seeds from the last lookback rows of that history. The caller's
/// `network` is left untouched and can be saved alongside the returned state.
#[allow(clippy::too_many_arguments)]
pub fn create_forecasts<R: Rng + ?Sized>(
    data: Option<&FramedTensor>,
    network: &Network,
    state: &CheckpointState,
    iterations: usize,
    forecast_size: usize,
    io_noise: f64,
    rng: &mut R,
    cancel: &CancelFlag,
) -> Result<ForecastOutcome> {
    if iterations == 0 {
        return Err(ForecastError::invalid_config(
            "iterations",
            "at least one rollout is required",
        ));
    }
    if forecast_size == 0 {
        return Err(ForecastError::invalid_config("forecast_size", "must be at least 1"));
    }
    let perturbation = InputPerturbation::noise_only(io_noise)?;
    let cells = iterations
        .checked_mul(forecast_size)
        .and_then(|n| n.checked_mul(network.config().io_dim))
        .filter(|&n| n <= MAX_FORECAST_CELLS);
    if cells.is_none() {
        return Err(ForecastError::invalid_config(
            "forecast_size",
            format!(
                "{} rollouts of {} steps exceed {} forecast cells",
                iterations, forecast_size, MAX_FORECAST_CELLS
            ),
        ));
    }

    let config = network.config();
    if state.io_width != config.io_dim {
        return Err(ForecastError::invalid_config(
            "io_width",
            format!(
                "network expects {} variables, state has {}",
                config.io_dim, state.io_width
            ),
        ));
    }

    let mut state = state.clone();
    if let Some(data) = data {
        state.extend_history(data.observations.view())?;
    }

    let lookback = config.lookback_beam_width;
    if state.history_len() < lookback {
        return Err(ForecastError::InsufficientData {
            required: lookback,
            available: state.history_len(),
        });
    }
    let seed = state.history_tail(lookback);

    let mut forecasts = Array3::zeros((iterations, forecast_size, config.io_dim));
    for mut rollout in forecasts.axis_iter_mut(Axis(0)) {
        cancel.check()?;
        let generated = network.generate(seed, forecast_size, &perturbation, rng)?;
        rollout.assign(&generated);
    }
    info!(iterations, forecast_size, io_noise, "forecast population generated");

    Ok(ForecastOutcome { forecasts, state })
}
