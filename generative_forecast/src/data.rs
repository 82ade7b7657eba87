//! Time series data handling for forecasting

use crate::error::{ForecastError, Result};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

/// Leading column names (case-insensitive) treated as the time index
pub const TIME_COLUMN_NAMES: [&str; 5] = ["time", "date", "timestamp", "datetime", "ds"];

/// Ordered, time-indexed rows of named numeric variables.
///
/// Cells that were missing or non-numeric in the source are `None`. The
/// header order is the variable order used everywhere downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesFrame {
    /// Variable names in column order
    headers: Vec<String>,
    /// One entry per time step, one cell per variable
    rows: Vec<Vec<Option<f64>>>,
}

/// Data loader for time series data
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load a frame from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<TimeSeriesFrame> {
        let file = File::open(path)?;
        let df = CsvReader::new(file)
            .infer_schema(Some(100))
            .has_header(true)
            .finish()
            .map_err(|e| ForecastError::DataFormat(e.to_string()))?;

        Self::from_dataframe(df)
    }

    /// Create a frame from an existing polars DataFrame
    pub fn from_dataframe(df: DataFrame) -> Result<TimeSeriesFrame> {
        let time_column = Self::detect_time_column(&df);

        let mut headers = Vec::new();
        let mut columns: Vec<Vec<Option<f64>>> = Vec::new();
        for series in df.get_columns() {
            if Some(series.name()) == time_column.as_deref() {
                continue;
            }
            let values = Self::series_as_f64(series)?;
            if values.iter().all(Option::is_none) {
                return Err(ForecastError::DataFormat(format!(
                    "Column '{}' contains no numeric values",
                    series.name()
                )));
            }
            headers.push(series.name().to_string());
            columns.push(values);
        }

        if headers.is_empty() {
            return Err(ForecastError::DataFormat(
                "No variable columns found in data".to_string(),
            ));
        }

        let rows = (0..df.height())
            .map(|i| columns.iter().map(|col| col[i]).collect())
            .collect();

        TimeSeriesFrame::new(headers, rows)
    }

    /// Detect the time index column, if there is one.
    ///
    /// Only the leading column is considered. It is the index when it has a
    /// temporal dtype or its whole name is one of [`TIME_COLUMN_NAMES`].
    fn detect_time_column(df: &DataFrame) -> Option<String> {
        let series = df.get_columns().first()?;
        let lower_name = series.name().to_lowercase();
        if series.dtype().is_temporal() || TIME_COLUMN_NAMES.contains(&lower_name.as_str()) {
            Some(series.name().to_string())
        } else {
            None
        }
    }

    /// Cast a column to f64; cells that fail to parse become missing
    fn series_as_f64(series: &Series) -> Result<Vec<Option<f64>>> {
        let casted = series.cast(&DataType::Float64)?;
        let values = casted.f64()?.into_iter().collect();
        Ok(values)
    }
}

impl TimeSeriesFrame {
    /// Create a frame from headers and row-major cells
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<f64>>>) -> Result<Self> {
        if headers.is_empty() {
            return Err(ForecastError::DataFormat(
                "Frame must have at least one variable".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = headers.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(ForecastError::DataFormat(format!(
                "Duplicate variable name '{}'",
                dup
            )));
        }

        if let Some(pos) = rows.iter().position(|r| r.len() != headers.len()) {
            return Err(ForecastError::DataFormat(format!(
                "Row {} has {} cells, expected {}",
                pos,
                rows[pos].len(),
                headers.len()
            )));
        }

        // NaN and infinities are treated like missing cells
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| cell.filter(|v| v.is_finite()))
                    .collect()
            })
            .collect();

        Ok(Self { headers, rows })
    }

    /// Create a fully populated frame from named columns
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let len = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((name, _)) = columns.iter().find(|(_, v)| v.len() != len) {
            return Err(ForecastError::DataFormat(format!(
                "Column '{}' length differs from the first column",
                name
            )));
        }

        let headers = columns.iter().map(|(name, _)| name.clone()).collect();
        let rows = (0..len)
            .map(|i| columns.iter().map(|(_, v)| Some(v[i])).collect())
            .collect();

        Self::new(headers, rows)
    }

    /// Get the variable names
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Get the raw rows
    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    /// Number of variables
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Check if the frame is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Fully populated rows.
    ///
    /// Leading and trailing rows with any missing cell are dropped, interior
    /// gaps repeat the previous observation of that variable.
    pub fn clean_rows(&self) -> Vec<Vec<f64>> {
        let complete = |row: &Vec<Option<f64>>| row.iter().all(Option::is_some);
        let first = match self.rows.iter().position(complete) {
            Some(first) => first,
            None => return Vec::new(),
        };
        let last = self.rows.iter().rposition(complete).unwrap_or(first);

        let mut cleaned: Vec<Vec<f64>> = Vec::with_capacity(last - first + 1);
        for row in &self.rows[first..=last] {
            let filled = match cleaned.last() {
                Some(prev) => row
                    .iter()
                    .zip(prev.iter())
                    .map(|(cell, prev)| cell.unwrap_or(*prev))
                    .collect(),
                None => row.iter().map(|cell| cell.unwrap_or_default()).collect(),
            };
            cleaned.push(filled);
        }
        cleaned
    }
}
