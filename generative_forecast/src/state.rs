//! Mutable bookkeeping carried between training and forecasting sessions

use crate::error::{ForecastError, Result};
use crate::framing::BeamWidths;
use crate::normalization::{revert_with_boundaries, NormalizationBoundary};
use chrono::{DateTime, Utc};
use ndarray::{concatenate, s, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Everything besides the weights that a checkpoint must carry.
///
/// Created at cold start by [`crate::network::initialize_network`], mutated
/// by every session that consumes the checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Most recent normalized observations, shape `(time, variables)`
    pub history: Array2<f64>,
    /// Maximum number of rows kept in `history`
    pub max_history: usize,
    /// Number of variables
    pub io_width: usize,
    /// Variable names in training order
    pub headers: Vec<String>,
    /// Boundaries fixed at cold start
    pub normalization_boundaries: Vec<NormalizationBoundary>,
    /// Cold-start learning rate
    pub prime_lr: f64,
    /// Multiplier applied when deriving warm-start learning rates
    pub lr_multiplier: f64,
    /// Input noise the network was created with
    pub io_noise: f64,
    /// Window sizes the network was created with
    pub beam_widths: BeamWidths,
    /// Completed training calls
    pub training_sessions: usize,
    /// Examples consumed across all training calls
    pub examples_seen: usize,
    /// Final error of the most recent training call
    pub last_error: Option<f64>,
    /// When the most recent training call finished
    pub last_trained_at: Option<DateTime<Utc>>,
}

impl CheckpointState {
    /// Fresh state with an empty history and unbound boundaries
    pub fn new(
        headers: Vec<String>,
        max_history: usize,
        prime_lr: f64,
        lr_multiplier: f64,
        io_noise: f64,
        beam_widths: BeamWidths,
    ) -> Self {
        let io_width = headers.len();
        Self {
            history: Array2::zeros((0, io_width)),
            max_history,
            io_width,
            headers,
            normalization_boundaries: Vec::new(),
            prime_lr,
            lr_multiplier,
            io_noise,
            beam_widths,
            training_sessions: 0,
            examples_seen: 0,
            last_error: None,
            last_trained_at: None,
        }
    }

    /// Record the cold-start boundaries. Only allowed once.
    pub fn bind_boundaries(&mut self, boundaries: &[NormalizationBoundary]) -> Result<()> {
        if !self.normalization_boundaries.is_empty() {
            return Err(ForecastError::AlreadyInitialized);
        }
        if boundaries.len() != self.io_width {
            return Err(ForecastError::invalid_config(
                "normalization_boundaries",
                format!("expected {} boundaries, got {}", self.io_width, boundaries.len()),
            ));
        }
        self.normalization_boundaries = boundaries.to_vec();
        Ok(())
    }

    /// Whether boundaries have been recorded
    pub fn has_boundaries(&self) -> bool {
        !self.normalization_boundaries.is_empty()
    }

    /// Fail unless `headers` matches the training-time variables exactly
    pub fn check_schema(&self, headers: &[String]) -> Result<()> {
        if headers != self.headers.as_slice() || headers.len() != self.io_width {
            return Err(ForecastError::SchemaMismatch {
                expected: self.headers.clone(),
                found: headers.to_vec(),
            });
        }
        Ok(())
    }

    /// Append normalized rows and drop the oldest beyond `max_history`
    pub fn extend_history(&mut self, rows: ArrayView2<f64>) -> Result<()> {
        if rows.ncols() != self.io_width {
            return Err(ForecastError::invalid_config(
                "history",
                format!("expected {} columns, got {}", self.io_width, rows.ncols()),
            ));
        }

        let merged = concatenate(Axis(0), &[self.history.view(), rows.view()])
            .map_err(|e| ForecastError::invalid_config("history", e.to_string()))?;

        let excess = merged.nrows().saturating_sub(self.max_history);
        self.history = if excess > 0 {
            merged.slice(s![excess.., ..]).to_owned()
        } else {
            merged
        };
        Ok(())
    }

    /// The last `n` rows of history (fewer if the history is shorter)
    pub fn history_tail(&self, n: usize) -> ArrayView2<'_, f64> {
        let start = self.history.nrows().saturating_sub(n);
        self.history.slice(s![start.., ..])
    }

    /// Number of rows currently held in history
    pub fn history_len(&self) -> usize {
        self.history.len_of(Axis(0))
    }

    /// History in original units
    pub fn reverted_history(&self) -> Result<Array2<f64>> {
        revert_with_boundaries(self.history.view(), &self.normalization_boundaries)
    }

    /// Bookkeeping after a successful training call
    pub fn record_training(&mut self, examples: usize, error: f64) {
        self.training_sessions += 1;
        self.examples_seen += examples;
        self.last_error = Some(error);
        self.last_trained_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn state(max_history: usize) -> CheckpointState {
        let beams = BeamWidths::new(1, 1).unwrap();
        CheckpointState::new(vec!["a".to_string(), "b".to_string()], max_history, 0.25, 1.0, 0.0, beams)
    }

    #[test]
    fn extend_history_appends_and_trims_oldest() {
        let mut state = state(3);
        let first = array![[0.1, 0.2], [0.3, 0.4]];
        state.extend_history(first.view()).unwrap();
        assert_eq!(state.history, first);

        let second = array![[0.5, 0.6], [0.7, 0.8]];
        state.extend_history(second.view()).unwrap();
        assert_eq!(state.history, array![[0.3, 0.4], [0.5, 0.6], [0.7, 0.8]]);
        assert_eq!(state.history_tail(1), array![[0.7, 0.8]]);
    }

    #[test]
    fn extend_history_rejects_wrong_width() {
        let mut state = state(5);
        let rows = array![[0.1], [0.2]];
        assert!(matches!(
            state.extend_history(rows.view()),
            Err(ForecastError::InvalidConfig { .. })
        ));
        assert_eq!(state.history_len(), 0);
    }
}
