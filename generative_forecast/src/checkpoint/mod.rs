//! Checkpoint bundles: network weights, meta data and state in one JSON document

pub mod storage;

pub use storage::{LocalStorage, RetryPolicy, Storage};

use crate::error::{ForecastError, Result};
use crate::network::{DenseLayer, Network, NetworkConfig, NetworkMeta};
use crate::normalization::NormalizationBoundary;
use crate::state::CheckpointState;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Bundle layout version written by this crate
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// File name used for bundles staged before upload
pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.json";

#[derive(Serialize)]
struct ModelRef<'a> {
    config: &'a NetworkConfig,
    hidden: &'a DenseLayer,
    output: &'a DenseLayer,
}

#[derive(Serialize)]
struct BundleRef<'a> {
    format_version: u32,
    model: ModelRef<'a>,
    meta_data: Option<&'a NetworkMeta>,
    state: &'a CheckpointState,
}

#[derive(Deserialize)]
struct Model {
    config: NetworkConfig,
    hidden: DenseLayer,
    output: DenseLayer,
}

#[derive(Deserialize)]
struct Bundle {
    format_version: u32,
    model: Model,
    meta_data: Option<NetworkMeta>,
    state: CheckpointState,
}

/// Serialize a bundle into `writer`
pub fn write_checkpoint<W: Write>(
    writer: W,
    network: &Network,
    state: &CheckpointState,
) -> Result<()> {
    let (hidden, output) = network.layers();
    let bundle = BundleRef {
        format_version: CHECKPOINT_FORMAT_VERSION,
        model: ModelRef {
            config: network.config(),
            hidden,
            output,
        },
        meta_data: network.meta(),
        state,
    };
    serde_json::to_writer(writer, &bundle)?;
    Ok(())
}

/// Deserialize a bundle and rebuild the network it describes
pub fn read_checkpoint<R: Read>(reader: R) -> Result<(Network, CheckpointState)> {
    let bundle: Bundle = serde_json::from_reader(reader)
        .map_err(|e| ForecastError::CorruptCheckpoint(format!("invalid bundle: {}", e)))?;

    if bundle.format_version != CHECKPOINT_FORMAT_VERSION {
        return Err(ForecastError::CorruptCheckpoint(format!(
            "unsupported format version {}",
            bundle.format_version
        )));
    }

    let network = Network::from_parts(
        bundle.model.config,
        bundle.model.hidden,
        bundle.model.output,
        bundle.meta_data,
    )?;
    check_state(&network, &bundle.state)?;

    Ok((network, bundle.state))
}

/// Atomically write a bundle to `path`.
///
/// The bundle is staged in a temporary file next to `path` and renamed over
/// it, so readers see either the previous bundle or the new one.
pub fn save_checkpoint(
    network: &Network,
    state: &CheckpointState,
    path: impl AsRef<Path>,
) -> Result<PathBuf> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut staged = NamedTempFile::new_in(&dir)?;
    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        write_checkpoint(&mut writer, network, state)?;
        writer.flush()?;
    }
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| ForecastError::Io(e.error))?;

    info!(path = %path.display(), "checkpoint saved");
    Ok(path.to_path_buf())
}

/// Load a bundle from a local file
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<(Network, CheckpointState)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let loaded = read_checkpoint(BufReader::new(file))?;
    info!(
        path = %path.display(),
        io_width = loaded.1.io_width,
        history = loaded.1.history_len(),
        "checkpoint loaded"
    );
    Ok(loaded)
}

fn check_state(network: &Network, state: &CheckpointState) -> Result<()> {
    let config = network.config();
    if state.io_width != config.io_dim {
        return Err(ForecastError::CorruptCheckpoint(format!(
            "state has {} variables, network has {}",
            state.io_width, config.io_dim
        )));
    }
    if state.beam_widths != config.beam_widths() {
        return Err(ForecastError::CorruptCheckpoint(format!(
            "state framed with {:?}, network built for {:?}",
            state.beam_widths,
            config.beam_widths()
        )));
    }
    if state.has_boundaries() && state.normalization_boundaries.len() != config.io_dim {
        return Err(ForecastError::CorruptCheckpoint(format!(
            "state holds {} boundaries for {} variables",
            state.normalization_boundaries.len(),
            config.io_dim
        )));
    }
    if let Some(bad) = state
        .normalization_boundaries
        .iter()
        .find(|b| NormalizationBoundary::new(b.min, b.max).is_err())
    {
        return Err(ForecastError::CorruptCheckpoint(format!(
            "invalid normalization boundary [{}, {}]",
            bad.min, bad.max
        )));
    }
    if let Some(meta) = network.meta() {
        if meta.normalization_boundaries != state.normalization_boundaries {
            return Err(ForecastError::CorruptCheckpoint(
                "network and state disagree on normalization boundaries".to_string(),
            ));
        }
    }
    if state.history.ncols() != config.io_dim {
        return Err(ForecastError::CorruptCheckpoint(format!(
            "history has {} columns, expected {}",
            state.history.ncols(),
            config.io_dim
        )));
    }
    Ok(())
}

/// Checkpoint access through a [`Storage`] backend with retries
#[derive(Debug, Clone)]
pub struct CheckpointStore<S: Storage> {
    storage: S,
    retry: RetryPolicy,
}

impl<S: Storage> CheckpointStore<S> {
    pub fn new(storage: S, retry: RetryPolicy) -> Self {
        Self { storage, retry }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Resolve `descriptor` to a local file
    pub fn fetch(&self, descriptor: &str) -> Result<PathBuf> {
        self.retry.run("fetch", || self.storage.fetch(descriptor))
    }

    /// Publish a local file under `descriptor`
    pub fn put(&self, local: &Path, descriptor: &str) -> Result<String> {
        self.retry.run("put", || self.storage.put(local, descriptor))
    }

    /// Fetch and read the bundle behind `descriptor`
    pub fn load(&self, descriptor: &str) -> Result<(Network, CheckpointState)> {
        let local = self.fetch(descriptor)?;
        load_checkpoint(local)
    }

    /// Stage the bundle locally, then publish it under `descriptor`
    pub fn save(
        &self,
        network: &Network,
        state: &CheckpointState,
        descriptor: &str,
    ) -> Result<String> {
        let staging = tempfile::tempdir()?;
        let local = save_checkpoint(network, state, staging.path().join(CHECKPOINT_FILE_NAME))?;
        self.put(&local, descriptor)
    }
}
