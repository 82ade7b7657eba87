//! Turns raw frames into windowed training tensors

use crate::data::TimeSeriesFrame;
use crate::error::{ForecastError, Result};
use crate::normalization::{
    clip_outlier_rows, compute_boundaries, normalize_rows, NormalizationBoundary,
};
use crate::state::CheckpointState;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Context window sizes consumed (lookback) and generated (future) per example
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamWidths {
    /// Rows of context fed to the network
    pub lookback: usize,
    /// Rows generated per example
    pub future: usize,
}

impl BeamWidths {
    /// Create beam widths; both must be at least one
    pub fn new(lookback: usize, future: usize) -> Result<Self> {
        if lookback == 0 {
            return Err(ForecastError::invalid_config(
                "lookback_beam_width",
                "must be at least 1",
            ));
        }
        if future == 0 {
            return Err(ForecastError::invalid_config(
                "future_beam_width",
                "must be at least 1",
            ));
        }
        Ok(Self { lookback, future })
    }

    /// Total rows covered by one example
    pub fn window(&self) -> usize {
        self.lookback + self.future
    }
}

/// Windowed examples in normalized space
#[derive(Debug, Clone)]
pub struct FramedTensor {
    /// Input windows, shape `(examples, lookback, variables)`
    pub x: Array3<f64>,
    /// Target windows, shape `(examples, future, variables)`
    pub y: Array3<f64>,
    /// Newly observed normalized rows, shape `(time, variables)`
    pub observations: Array2<f64>,
    /// Window sizes used for framing
    pub beams: BeamWidths,
    /// Rows of the sequence the windows were cut from
    pub context_len: usize,
}

impl FramedTensor {
    /// Number of windowed examples
    pub fn num_examples(&self) -> usize {
        self.x.len_of(Axis(0))
    }

    /// Number of variables per row
    pub fn io_width(&self) -> usize {
        self.observations.ncols()
    }

    /// Number of new rows this tensor contributes to history
    pub fn new_rows(&self) -> usize {
        self.observations.nrows()
    }

    /// Whether at least one example could be cut
    pub fn has_examples(&self) -> bool {
        self.num_examples() > 0
    }
}

/// Frame a cold-start data set, computing normalization boundaries.
pub fn process_frames_initial(
    frame: &TimeSeriesFrame,
    outlier_multiplier: f64,
    beam_width: BeamWidths,
) -> Result<(FramedTensor, Vec<NormalizationBoundary>)> {
    validate_multiplier(outlier_multiplier)?;

    let mut rows = frame.clean_rows();
    if rows.len() < beam_width.window() {
        return Err(ForecastError::InsufficientData {
            required: beam_width.window(),
            available: rows.len(),
        });
    }

    clip_outlier_rows(&mut rows, frame.headers(), outlier_multiplier);
    let boundaries = compute_boundaries(&rows, frame.width())?;
    let observations = normalize_rows(&rows, &boundaries);
    let (x, y) = slide_windows(observations.view(), beam_width);

    debug!(
        rows = rows.len(),
        examples = x.len_of(Axis(0)),
        "framed initial data"
    );

    let context_len = observations.nrows();
    Ok((
        FramedTensor {
            x,
            y,
            observations,
            beams: beam_width,
            context_len,
        },
        boundaries,
    ))
}

/// Frame newly arrived data against an existing checkpoint.
///
/// Boundaries come from `state` and are never recomputed. The tail of the
/// stored history is prepended so every example contains at least one new row.
/// Fewer new rows than a window is fine here; the tensor may then have no
/// examples and only extends the history.
pub fn process_frames_incremental(
    frame: &TimeSeriesFrame,
    state: &CheckpointState,
    outlier_multiplier: f64,
) -> Result<FramedTensor> {
    validate_multiplier(outlier_multiplier)?;
    state.check_schema(frame.headers())?;

    let mut rows = frame.clean_rows();
    if rows.is_empty() {
        return Err(ForecastError::InsufficientData {
            required: 1,
            available: 0,
        });
    }

    clip_outlier_rows(&mut rows, frame.headers(), outlier_multiplier);
    let observations = normalize_rows(&rows, &state.normalization_boundaries);

    let beams = state.beam_widths;
    let carried = state.history_tail(beams.window() - 1);
    let mut context = Array2::zeros((carried.nrows() + observations.nrows(), state.io_width));
    context.slice_mut(s![..carried.nrows(), ..]).assign(&carried);
    context
        .slice_mut(s![carried.nrows().., ..])
        .assign(&observations);

    let (x, y) = slide_windows(context.view(), beams);
    debug!(
        new_rows = observations.nrows(),
        carried = carried.nrows(),
        examples = x.len_of(Axis(0)),
        "framed incremental data"
    );

    Ok(FramedTensor {
        x,
        y,
        observations,
        beams,
        context_len: context.nrows(),
    })
}

/// Cut every full window out of a `(time, variables)` sequence with stride 1
pub fn slide_windows(series: ArrayView2<f64>, beams: BeamWidths) -> (Array3<f64>, Array3<f64>) {
    let width = series.ncols();
    let count = (series.nrows() + 1).saturating_sub(beams.window());

    let mut x = Array3::zeros((count, beams.lookback, width));
    let mut y = Array3::zeros((count, beams.future, width));
    for i in 0..count {
        let split = i + beams.lookback;
        x.slice_mut(s![i, .., ..])
            .assign(&series.slice(s![i..split, ..]));
        y.slice_mut(s![i, .., ..])
            .assign(&series.slice(s![split..split + beams.future, ..]));
    }
    (x, y)
}

fn validate_multiplier(outlier_multiplier: f64) -> Result<()> {
    if !outlier_multiplier.is_finite() || outlier_multiplier <= 0.0 {
        return Err(ForecastError::invalid_config(
            "outlier_multiplier",
            format!("must be a positive number, got {}", outlier_multiplier),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn windows_never_cross_the_sequence_end() {
        let series = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let beams = BeamWidths::new(2, 2).unwrap();
        let (x, y) = slide_windows(series.view(), beams);

        assert_eq!(x.shape(), &[2, 2, 1]);
        assert_eq!(y.shape(), &[2, 2, 1]);
        assert_eq!(x[[1, 0, 0]], 1.0);
        assert_eq!(y[[1, 1, 0]], 4.0);
    }

    #[test]
    fn short_sequence_yields_no_windows() {
        let series = array![[0.0], [1.0]];
        let beams = BeamWidths::new(2, 1).unwrap();
        let (x, _) = slide_windows(series.view(), beams);
        assert_eq!(x.len_of(Axis(0)), 0);
    }
}
