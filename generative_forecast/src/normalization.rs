//! Per-variable normalization, outlier clipping and its exact inverse
//!
//! Values are mapped linearly from the `[min, max]` boundary recorded at cold
//! start onto `[NORMALIZED_MIN, NORMALIZED_MAX]`. Both directions clamp to the
//! boundary range, so anything the network produces outside `[-1, 1]` is
//! reported at the nearest boundary value.

use crate::error::{ForecastError, Result};
use crate::state::CheckpointState;
use crate::utils::{min_max, robust_center_spread};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lower end of the normalized range
pub const NORMALIZED_MIN: f64 = -1.0;
/// Upper end of the normalized range
pub const NORMALIZED_MAX: f64 = 1.0;

/// Min/max pair for one variable, fixed once at cold start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationBoundary {
    /// Smallest cleaned value seen during the initial training set
    pub min: f64,
    /// Largest cleaned value seen during the initial training set
    pub max: f64,
}

impl NormalizationBoundary {
    /// Create a boundary, rejecting inverted or non-finite pairs
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ForecastError::DataFormat(format!(
                "Invalid normalization boundary [{}, {}]",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Boundary covering every value of the series
    pub fn from_values(values: &[f64]) -> Result<Self> {
        let (min, max) = min_max(values).ok_or(ForecastError::InsufficientData {
            required: 1,
            available: 0,
        })?;
        Self::new(min, max)
    }

    /// Width of the boundary range
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Whether `value` lies inside the boundary range
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Map a raw value into the normalized range
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.span();
        if span <= 0.0 {
            return 0.0;
        }
        let clamped = value.clamp(self.min, self.max);
        let normalized =
            (clamped - self.min) / span * (NORMALIZED_MAX - NORMALIZED_MIN) + NORMALIZED_MIN;
        normalized.clamp(NORMALIZED_MIN, NORMALIZED_MAX)
    }

    /// Map a normalized value back into raw units
    pub fn revert(&self, value: f64) -> f64 {
        let span = self.span();
        if span <= 0.0 {
            return self.min;
        }
        let clamped = value.clamp(NORMALIZED_MIN, NORMALIZED_MAX);
        let reverted =
            (clamped - NORMALIZED_MIN) / (NORMALIZED_MAX - NORMALIZED_MIN) * span + self.min;
        // Rounding must not push range ends outside the boundary
        reverted.clamp(self.min, self.max)
    }
}

/// Clip values lying more than `multiplier` robust spreads from the median.
///
/// Returns the number of clipped values.
pub fn clip_outliers(values: &mut [f64], multiplier: f64) -> usize {
    let (center, spread) = robust_center_spread(values);
    if spread <= 0.0 {
        return 0;
    }

    let lower = center - multiplier * spread;
    let upper = center + multiplier * spread;
    let mut clipped = 0;
    for value in values.iter_mut() {
        if *value < lower || *value > upper {
            *value = value.clamp(lower, upper);
            clipped += 1;
        }
    }
    clipped
}

/// Clip outliers column by column on row-major data.
pub fn clip_outlier_rows(rows: &mut [Vec<f64>], headers: &[String], multiplier: f64) {
    for (col, name) in headers.iter().enumerate() {
        let mut column: Vec<f64> = rows.iter().map(|row| row[col]).collect();
        let clipped = clip_outliers(&mut column, multiplier);
        if clipped > 0 {
            warn!(variable = %name, clipped, "clipped outliers");
            for (row, value) in rows.iter_mut().zip(column) {
                row[col] = value;
            }
        }
    }
}

/// Compute one boundary per column of row-major data
pub fn compute_boundaries(rows: &[Vec<f64>], width: usize) -> Result<Vec<NormalizationBoundary>> {
    (0..width)
        .map(|col| {
            let column: Vec<f64> = rows.iter().map(|row| row[col]).collect();
            NormalizationBoundary::from_values(&column)
        })
        .collect()
}

/// Normalize row-major data into a `(time, variables)` array
pub fn normalize_rows(rows: &[Vec<f64>], boundaries: &[NormalizationBoundary]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), boundaries.len()), |(t, v)| {
        boundaries[v].normalize(rows[t][v])
    })
}

/// Revert a `(time, variables)` array using explicit boundaries
pub fn revert_with_boundaries(
    values: ArrayView2<f64>,
    boundaries: &[NormalizationBoundary],
) -> Result<Array2<f64>> {
    if values.ncols() != boundaries.len() {
        return Err(ForecastError::DataFormat(format!(
            "Cannot revert {} variables with {} boundaries",
            values.ncols(),
            boundaries.len()
        )));
    }

    let mut reverted = values.to_owned();
    for (v, mut column) in reverted.columns_mut().into_iter().enumerate() {
        column.mapv_inplace(|x| boundaries[v].revert(x));
    }
    Ok(reverted)
}

/// Revert normalized values to original units using the checkpoint's boundaries
pub fn revert_normalization(values: ArrayView2<f64>, state: &CheckpointState) -> Result<Array2<f64>> {
    revert_with_boundaries(values, &state.normalization_boundaries)
}
