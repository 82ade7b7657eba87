//! Reduces a rollout population to per-step uncertainty bands

use crate::error::{ForecastError, Result};
use crate::normalization::NormalizationBoundary;
use crate::state::CheckpointState;
use crate::utils::{mean, population_std_dev};
use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;

/// Default two-sided coverage of the band
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Center estimate with lower and upper bounds, in original units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub center: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Band {
    /// Distance between the bounds
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Whether the bounds bracket the center
    pub fn brackets_center(&self) -> bool {
        self.lower <= self.center && self.center <= self.upper
    }
}

/// Bands per forecast step and variable
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    steps: Vec<Vec<Band>>,
    confidence: f64,
}

impl Envelope {
    /// Number of forecast steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Bands of every step, outer index is time
    pub fn steps(&self) -> &[Vec<Band>] {
        &self.steps
    }

    /// Band of one variable at one step
    pub fn band(&self, step: usize, variable: usize) -> Option<&Band> {
        self.steps.get(step).and_then(|bands| bands.get(variable))
    }

    /// Number of variables per step
    pub fn width(&self) -> usize {
        self.steps.first().map(Vec::len).unwrap_or(0)
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// Envelope formatted for external consumers: one map per step from variable name to band
pub type FormattedEnvelope = Vec<BTreeMap<String, Band>>;

/// Build the envelope at [`DEFAULT_CONFIDENCE`]
pub fn create_envelope(
    forecasts: &Array3<f64>,
    forecast_size: usize,
    state: &CheckpointState,
) -> Result<Envelope> {
    create_envelope_with_confidence(forecasts, forecast_size, state, DEFAULT_CONFIDENCE)
}

/// Reduce `(iterations, steps, variables)` rollouts to mean ± z·σ bands.
///
/// `z` is the two-sided standard normal quantile for `confidence`. All three
/// values are reverted through the state's boundaries afterwards.
pub fn create_envelope_with_confidence(
    forecasts: &Array3<f64>,
    forecast_size: usize,
    state: &CheckpointState,
    confidence: f64,
) -> Result<Envelope> {
    let (iterations, steps, width) = forecasts.dim();
    if iterations == 0 {
        return Err(ForecastError::invalid_config(
            "iterations",
            "at least one rollout is required",
        ));
    }
    if forecast_size == 0 || forecast_size > steps {
        return Err(ForecastError::invalid_config(
            "forecast_size",
            format!("must be between 1 and {}, got {}", steps, forecast_size),
        ));
    }
    if width != state.normalization_boundaries.len() {
        return Err(ForecastError::invalid_config(
            "forecasts",
            format!(
                "{} variables forecast, {} boundaries known",
                width,
                state.normalization_boundaries.len()
            ),
        ));
    }
    let z = z_score(confidence)?;

    let steps = (0..forecast_size)
        .map(|t| {
            state
                .normalization_boundaries
                .iter()
                .enumerate()
                .map(|(v, boundary)| {
                    let samples: Vec<f64> = forecasts.slice(s![.., t, v]).to_vec();
                    band_from_samples(&samples, z, boundary)
                })
                .collect()
        })
        .collect();

    Ok(Envelope { steps, confidence })
}

/// Label every band with its variable name
pub fn ready_envelope(envelope: &Envelope, state: &CheckpointState) -> FormattedEnvelope {
    let names: Vec<String> = if state.headers.len() == state.io_width {
        state.headers.clone()
    } else {
        (0..state.io_width).map(|i| format!("variable_{}", i)).collect()
    };

    envelope
        .steps
        .iter()
        .map(|bands| names.iter().cloned().zip(bands.iter().copied()).collect())
        .collect()
}

fn band_from_samples(samples: &[f64], z: f64, boundary: &NormalizationBoundary) -> Band {
    let center = mean(samples);
    let spread = z * population_std_dev(samples);
    Band {
        center: boundary.revert(center),
        lower: boundary.revert(center - spread),
        upper: boundary.revert(center + spread),
    }
}

fn z_score(confidence: f64) -> Result<f64> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(ForecastError::invalid_config(
            "confidence",
            format!("must be in (0, 1), got {}", confidence),
        ));
    }
    let standard = Normal::new(0.0, 1.0)
        .map_err(|e| ForecastError::invalid_config("confidence", e.to_string()))?;
    Ok(standard.inverse_cdf(0.5 + confidence / 2.0))
}
