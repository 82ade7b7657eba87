//! Utility functions for the generative_forecast crate

use statrs::statistics::{Data, Median, Statistics};

/// Scale factor that makes the median absolute deviation a consistent
/// estimator of the standard deviation for normal data
pub const MAD_SCALE: f64 = 1.4826;

/// Arithmetic mean, `0.0` for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

/// Population standard deviation, `0.0` for an empty slice
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().population_std_dev()
}

/// Median of the values, `0.0` for an empty slice
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Data::new(values.to_vec()).median()
}

/// Robust center and spread of a series.
///
/// The center is the median; the spread is the scaled median absolute
/// deviation, falling back to the population standard deviation when more
/// than half of the values coincide.
pub fn robust_center_spread(values: &[f64]) -> (f64, f64) {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    let mad = median(&deviations) * MAD_SCALE;

    if mad > 0.0 {
        (center, mad)
    } else {
        (center, population_std_dev(values))
    }
}

/// Min and max of a slice, `None` when it is empty
pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some((min, max))
}
