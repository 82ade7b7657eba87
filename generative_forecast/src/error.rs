//! Error types for the generative_forecast crate

use polars::prelude::PolarsError;
use std::io::ErrorKind;
use thiserror::Error;

/// Custom error types for the generative_forecast crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A request field is present but carries the wrong primitive type
    #[error("'{field}' must be of type {expected}")]
    InvalidInputType {
        field: String,
        expected: &'static str,
    },

    /// A field required by the requested mode is absent
    #[error("'{field}' required for '{mode}' mode")]
    MissingField { field: String, mode: String },

    /// Unknown operating mode
    #[error("mode '{0}' is invalid, must be 'forecast' or 'train'")]
    InvalidMode(String),

    /// Configuration rejected before any computation began
    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Input data could not be interpreted as a numeric frame
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Incoming variables differ from the ones the checkpoint was trained on
    #[error("Schema mismatch: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Not enough rows to build a single window
    #[error("Insufficient data: need at least {required} rows, got {available}")]
    InsufficientData { required: usize, available: usize },

    /// Meta initialization was requested on an already bound network
    #[error("Network meta data has already been initialized")]
    AlreadyInitialized,

    /// The network was used before its meta data was bound
    #[error("Network meta data has not been initialized")]
    NotInitialized,

    /// Loss became non-finite during training
    #[error("Training diverged at iteration {iteration}, epoch {epoch} (loss = {loss})")]
    TrainingDiverged {
        iteration: usize,
        epoch: usize,
        loss: f64,
    },

    /// The checkpoint bundle cannot be reconstructed
    #[error("Corrupt checkpoint: {0}")]
    CorruptCheckpoint(String),

    /// The caller requested cancellation between iterations
    #[error("Operation cancelled")]
    Cancelled,

    /// Error from IO operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from Polars operations
    #[error("Polars error: {0}")]
    Polars(String),

    /// Error while writing CSV artifacts
    #[error("CSV error: {0}")]
    Csv(String),

    /// Error while (de)serializing JSON documents
    #[error("JSON error: {0}")]
    Json(String),
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl ForecastError {
    /// Shorthand for [`ForecastError::InvalidConfig`]
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ForecastError::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether a storage operation failing with this error may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            ForecastError::Io(err) => matches!(
                err.kind(),
                ErrorKind::Interrupted
                    | ErrorKind::TimedOut
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
            ),
            _ => false,
        }
    }
}

impl From<PolarsError> for ForecastError {
    fn from(err: PolarsError) -> Self {
        ForecastError::Polars(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::Csv(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Json(err.to_string())
    }
}
