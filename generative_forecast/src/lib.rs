//! # Generative Forecast
//!
//! A Rust library for autogenerative neural time series forecasting with
//! empirical uncertainty envelopes.
//!
//! ## Features
//!
//! - Multivariate data loading from CSV (time columns are detected and skipped)
//! - Robust outlier clipping and `[-1, 1]` normalization with boundaries that
//!   are fixed at cold start and replayed exactly afterwards
//! - A residual feed-forward network trained by rolling its own predictions
//!   forward over a lookback/future window
//! - Cold-start and incremental training with learning-rate adaptation
//! - Forecast envelopes built from many noisy rollouts
//! - Atomic JSON checkpoints behind a pluggable storage backend
//!
//! ## Operating Modes
//!
//! The [`engine::ForecastEngine`] runs validated [`request::Request`]s:
//!
//! - **train**: fit a new network, or continue an existing checkpoint on new data
//! - **forecast**: load a checkpoint, optionally merge new data, emit an envelope
//!
//! ## Quick Start
//!
//! ```no_run
//! use generative_forecast::checkpoint::LocalStorage;
//! use generative_forecast::engine::ForecastEngine;
//! use generative_forecast::request::Request;
//!
//! fn main() -> generative_forecast::Result<()> {
//!     let engine = ForecastEngine::new(LocalStorage::new());
//!
//!     // Train a checkpoint on a CSV file
//!     let train = Request::from_json_str(
//!         r#"{"mode": "train", "data": "sine.csv", "checkpoint_output_path": "model.json"}"#,
//!     )?;
//!     let trained = engine.apply_seeded(&train)?;
//!     println!("final error: {:?}", trained.final_error);
//!
//!     // Forecast 15 steps ahead
//!     let forecast = Request::from_json_str(
//!         r#"{"mode": "forecast", "checkpoint_input_path": "model.json", "forecast_size": 15}"#,
//!     )?;
//!     let output = engine.apply_seeded(&forecast)?;
//!     println!("{}", serde_json::to_string_pretty(&output)?);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod data;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod export;
pub mod forecast;
pub mod framing;
pub mod network;
pub mod normalization;
pub mod request;
pub mod state;
pub mod training;
pub mod utils;

// Re-export commonly used types
pub use crate::checkpoint::{load_checkpoint, save_checkpoint, LocalStorage, Storage};
pub use crate::data::{DataLoader, TimeSeriesFrame};
pub use crate::engine::{EngineOutput, ForecastEngine};
pub use crate::envelope::{create_envelope, ready_envelope, Band, Envelope};
pub use crate::error::{ForecastError, Result};
pub use crate::forecast::create_forecasts;
pub use crate::framing::{process_frames_incremental, process_frames_initial, BeamWidths};
pub use crate::network::{initialize_network, Network, NetworkParams};
pub use crate::normalization::{revert_normalization, NormalizationBoundary};
pub use crate::request::Request;
pub use crate::state::CheckpointState;
pub use crate::training::{determine_lr, train_autogenerative_model, CancelFlag, TrainingConfig};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
