//! Train and forecast flows over an injected storage backend

use crate::checkpoint::{CheckpointStore, RetryPolicy, Storage};
use crate::data::{DataLoader, TimeSeriesFrame};
use crate::envelope::{create_envelope_with_confidence, ready_envelope, FormattedEnvelope};
use crate::error::Result;
use crate::export::write_envelope_csv;
use crate::forecast::create_forecasts;
use crate::framing::{process_frames_incremental, process_frames_initial, BeamWidths};
use crate::network::{initialize_network, NetworkParams};
use crate::request::{ForecastRequest, Request, TrainRequest};
use crate::training::{determine_lr, train_autogenerative_model, CancelFlag, TrainingConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

/// Values farther than this many robust deviations from the median are clipped
pub const OUTLIER_REMOVAL_MULTIPLIER: f64 = 5.0;
/// Rows of history a checkpoint keeps
pub const MAX_HISTORY: usize = 500;
/// Cold-start learning rate before dividing by the number of variables
pub const BASE_LEARNING_RATE: f64 = 0.5;
/// Multiplier recorded in the state for warm-start learning rates
pub const GRADIENT_MULTIPLIER: f64 = 1.0;

/// Result of one engine call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_save_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_error: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<FormattedEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_graph_path: Option<String>,
}

/// Noise source for a request: seeded when asked, otherwise from entropy
pub fn request_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Runs validated requests end to end
#[derive(Debug)]
pub struct ForecastEngine<S: Storage> {
    store: CheckpointStore<S>,
    cancel: CancelFlag,
}

impl<S: Storage> ForecastEngine<S> {
    pub fn new(storage: S) -> Self {
        Self {
            store: CheckpointStore::new(storage, RetryPolicy::default()),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_retry_policy(self, retry: RetryPolicy) -> Self {
        Self {
            store: CheckpointStore::new(self.store.into_storage(), retry),
            cancel: self.cancel,
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that cancels the running call from another thread
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn store(&self) -> &CheckpointStore<S> {
        &self.store
    }

    pub fn apply<R: Rng + ?Sized>(&self, request: &Request, rng: &mut R) -> Result<EngineOutput> {
        match request {
            Request::Train(train) => self.train(train, rng),
            Request::Forecast(forecast) => self.forecast(forecast, rng),
        }
    }

    /// Like [`ForecastEngine::apply`] with the request's own noise source
    pub fn apply_seeded(&self, request: &Request) -> Result<EngineOutput> {
        let mut rng = request_rng(request.seed());
        self.apply(request, &mut rng)
    }

    fn load_frame(&self, descriptor: &str) -> Result<TimeSeriesFrame> {
        let local = self.store.fetch(descriptor)?;
        DataLoader::from_csv(local)
    }

    fn train<R: Rng + ?Sized>(&self, request: &TrainRequest, rng: &mut R) -> Result<EngineOutput> {
        let frame = self.load_frame(&request.data)?;

        let (network, mut state, data, learning_rate) = match &request.checkpoint_input_path {
            Some(input) => {
                let (network, state) = self.store.load(input)?;
                let data = process_frames_incremental(&frame, &state, OUTLIER_REMOVAL_MULTIPLIER)?;
                let learning_rate = determine_lr(&data, &state);
                info!(learning_rate, new_rows = data.new_rows(), "continuing checkpoint");
                (network, state, data, learning_rate)
            }
            None => {
                let beams = BeamWidths::new(request.lookback_beam_width, request.future_beam_width)?;
                let (data, boundaries) =
                    process_frames_initial(&frame, OUTLIER_REMOVAL_MULTIPLIER, beams)?;
                let io_dim = boundaries.len();
                let params = NetworkParams {
                    io_dim,
                    layer_width: request.layer_width,
                    max_history: MAX_HISTORY,
                    initial_lr: BASE_LEARNING_RATE / io_dim as f64,
                    lr_multiplier: GRADIENT_MULTIPLIER,
                    io_noise: request.io_noise,
                    lookback_beam_width: request.lookback_beam_width,
                    future_beam_width: request.future_beam_width,
                };
                let (mut network, mut state) =
                    initialize_network(&params, frame.headers().to_vec(), rng)?;
                network.initialize_meta(data.num_examples(), &boundaries)?;
                state.bind_boundaries(&boundaries)?;
                info!(io_dim, examples = data.num_examples(), "cold start");
                let learning_rate = state.prime_lr;
                (network, state, data, learning_rate)
            }
        };

        let config = TrainingConfig {
            iterations: request.iterations,
            learning_rate,
            epochs: request.epochs,
            drop_percentage: request.input_dropout,
        };
        let (error, network) =
            train_autogenerative_model(&data, network, &mut state, &config, rng, &self.cancel)?;

        let saved = self
            .store
            .save(&network, &state, &request.checkpoint_output_path)?;
        Ok(EngineOutput {
            model_save_path: Some(saved),
            final_error: Some(error),
            ..EngineOutput::default()
        })
    }

    fn forecast<R: Rng + ?Sized>(
        &self,
        request: &ForecastRequest,
        rng: &mut R,
    ) -> Result<EngineOutput> {
        let (network, state) = self.store.load(&request.checkpoint_input_path)?;
        let data = match &request.data {
            Some(descriptor) => {
                let frame = self.load_frame(descriptor)?;
                Some(process_frames_incremental(
                    &frame,
                    &state,
                    OUTLIER_REMOVAL_MULTIPLIER,
                )?)
            }
            None => None,
        };

        let outcome = create_forecasts(
            data.as_ref(),
            &network,
            &state,
            request.iterations,
            request.forecast_size,
            request.io_noise,
            rng,
            &self.cancel,
        )?;
        let envelope = create_envelope_with_confidence(
            &outcome.forecasts,
            request.forecast_size,
            &outcome.state,
            request.confidence,
        )?;

        let mut output = EngineOutput::default();
        if let Some(target) = &request.image_save_path {
            let staging = tempfile::tempdir()?;
            let history = outcome.state.reverted_history()?;
            let local = write_envelope_csv(
                &envelope,
                history.view(),
                &outcome.state.headers,
                staging.path().join("envelope.csv"),
            )?;
            output.saved_graph_path = Some(self.store.put(&local, target)?);
        }
        if let Some(target) = &request.checkpoint_output_path {
            output.model_save_path = Some(self.store.save(&network, &outcome.state, target)?);
        }
        output.envelope = Some(ready_envelope(&envelope, &outcome.state));
        Ok(output)
    }
}
