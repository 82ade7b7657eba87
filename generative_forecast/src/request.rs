//! Validated invocation parameters for the two operating modes

use crate::envelope::DEFAULT_CONFIDENCE;
use crate::error::{ForecastError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_ITERATIONS: usize = 10;
pub const DEFAULT_EPOCHS: usize = 4;
pub const DEFAULT_FORECAST_SIZE: usize = 15;
pub const DEFAULT_LAYER_WIDTH: usize = 51;
pub const DEFAULT_IO_NOISE: f64 = 0.04;
pub const DEFAULT_LOOKBACK_BEAM_WIDTH: usize = 3;
pub const DEFAULT_FUTURE_BEAM_WIDTH: usize = 3;
pub const DEFAULT_INPUT_DROPOUT: f64 = 0.45;
/// Upper bound accepted for every count field (iterations, widths, sizes)
pub const MAX_COUNT: usize = 100_000;

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Forecast,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Forecast => "forecast",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Mode::Train),
            "forecast" => Ok(Mode::Forecast),
            other => Err(ForecastError::InvalidMode(other.to_string())),
        }
    }
}

/// Fit a new network or continue fitting an existing checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainRequest {
    pub data: String,
    pub checkpoint_output_path: String,
    pub checkpoint_input_path: Option<String>,
    pub layer_width: usize,
    pub lookback_beam_width: usize,
    pub future_beam_width: usize,
    pub input_dropout: f64,
    pub iterations: usize,
    pub io_noise: f64,
    pub epochs: usize,
    pub seed: Option<u64>,
}

impl TrainRequest {
    /// Request with every optional field at its default
    pub fn new(data: impl Into<String>, checkpoint_output_path: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            checkpoint_output_path: checkpoint_output_path.into(),
            checkpoint_input_path: None,
            layer_width: DEFAULT_LAYER_WIDTH,
            lookback_beam_width: DEFAULT_LOOKBACK_BEAM_WIDTH,
            future_beam_width: DEFAULT_FUTURE_BEAM_WIDTH,
            input_dropout: DEFAULT_INPUT_DROPOUT,
            iterations: DEFAULT_ITERATIONS,
            io_noise: DEFAULT_IO_NOISE,
            epochs: DEFAULT_EPOCHS,
            seed: None,
        }
    }

    /// Whether this continues an existing checkpoint
    pub fn is_incremental(&self) -> bool {
        self.checkpoint_input_path.is_some()
    }
}

/// Produce a forecast envelope from an existing checkpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRequest {
    pub checkpoint_input_path: String,
    pub data: Option<String>,
    pub checkpoint_output_path: Option<String>,
    pub image_save_path: Option<String>,
    pub forecast_size: usize,
    pub iterations: usize,
    pub io_noise: f64,
    pub confidence: f64,
    pub seed: Option<u64>,
}

impl ForecastRequest {
    pub fn new(checkpoint_input_path: impl Into<String>) -> Self {
        Self {
            checkpoint_input_path: checkpoint_input_path.into(),
            data: None,
            checkpoint_output_path: None,
            image_save_path: None,
            forecast_size: DEFAULT_FORECAST_SIZE,
            iterations: DEFAULT_ITERATIONS,
            io_noise: DEFAULT_IO_NOISE,
            confidence: DEFAULT_CONFIDENCE,
            seed: None,
        }
    }
}

/// A fully validated invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Request {
    Train(TrainRequest),
    Forecast(ForecastRequest),
}

impl Request {
    pub fn mode(&self) -> Mode {
        match self {
            Request::Train(_) => Mode::Train,
            Request::Forecast(_) => Mode::Forecast,
        }
    }

    pub fn seed(&self) -> Option<u64> {
        match self {
            Request::Train(r) => r.seed,
            Request::Forecast(r) => r.seed,
        }
    }

    /// Parse a JSON document
    pub fn from_json_str(input: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(input)?;
        Self::from_json(&value)
    }

    /// Validate a JSON object. Nothing is executed; every failure is reported
    /// before the engine is entered.
    pub fn from_json(input: &Value) -> Result<Self> {
        let object = input.as_object().ok_or(ForecastError::InvalidInputType {
            field: "input".to_string(),
            expected: "object",
        })?;

        let mode: Mode = match object.get("mode") {
            None => {
                return Err(ForecastError::MissingField {
                    field: "mode".to_string(),
                    mode: "train' or 'forecast".to_string(),
                })
            }
            Some(Value::String(s)) => s.parse()?,
            Some(_) => {
                return Err(ForecastError::InvalidInputType {
                    field: "mode".to_string(),
                    expected: "string",
                })
            }
        };

        let fields = Fields { object, mode };
        match mode {
            Mode::Train => fields.train().map(Request::Train),
            Mode::Forecast => fields.forecast().map(Request::Forecast),
        }
    }
}

struct Fields<'a> {
    object: &'a Map<String, Value>,
    mode: Mode,
}

impl Fields<'_> {
    fn train(&self) -> Result<TrainRequest> {
        let defaults = TrainRequest::new(String::new(), String::new());
        let request = TrainRequest {
            data: self.required_string("data")?,
            checkpoint_output_path: self.required_string("checkpoint_output_path")?,
            checkpoint_input_path: self.string("checkpoint_input_path")?,
            layer_width: self.count("layer_width")?.unwrap_or(defaults.layer_width),
            lookback_beam_width: self
                .count("lookback_beam_width")?
                .unwrap_or(defaults.lookback_beam_width),
            future_beam_width: self
                .count("future_beam_width")?
                .unwrap_or(defaults.future_beam_width),
            input_dropout: self.float("input_dropout")?.unwrap_or(defaults.input_dropout),
            iterations: self.count("iterations")?.unwrap_or(defaults.iterations),
            io_noise: self.float("io_noise")?.unwrap_or(defaults.io_noise),
            epochs: self.count("epochs")?.unwrap_or(defaults.epochs),
            seed: self.seed()?,
        };
        check_dropout(request.input_dropout)?;
        check_noise(request.io_noise)?;
        Ok(request)
    }

    fn forecast(&self) -> Result<ForecastRequest> {
        let defaults = ForecastRequest::new(String::new());
        let request = ForecastRequest {
            checkpoint_input_path: self.required_string("checkpoint_input_path")?,
            data: self.string("data")?,
            checkpoint_output_path: self.string("checkpoint_output_path")?,
            image_save_path: self.string("image_save_path")?,
            forecast_size: self.count("forecast_size")?.unwrap_or(defaults.forecast_size),
            iterations: self.count("iterations")?.unwrap_or(defaults.iterations),
            io_noise: self.float("io_noise")?.unwrap_or(defaults.io_noise),
            confidence: self.float("confidence")?.unwrap_or(defaults.confidence),
            seed: self.seed()?,
        };
        check_noise(request.io_noise)?;
        if !(request.confidence > 0.0 && request.confidence < 1.0) {
            return Err(ForecastError::invalid_config(
                "confidence",
                format!("must be in (0, 1), got {}", request.confidence),
            ));
        }
        Ok(request)
    }

    fn required_string(&self, field: &str) -> Result<String> {
        self.string(field)?.ok_or_else(|| ForecastError::MissingField {
            field: field.to_string(),
            mode: self.mode.as_str().to_string(),
        })
    }

    fn string(&self, field: &str) -> Result<Option<String>> {
        match self.object.get(field) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(field, "string")),
        }
    }

    /// Integer in `1..=MAX_COUNT`
    fn count(&self, field: &str) -> Result<Option<usize>> {
        let value = match self.object.get(field) {
            None => return Ok(None),
            Some(value) => value,
        };
        if let Some(n) = value.as_u64() {
            if n == 0 {
                return Err(ForecastError::invalid_config(field, "must be at least 1"));
            }
            return usize::try_from(n)
                .ok()
                .filter(|&n| n <= MAX_COUNT)
                .map(Some)
                .ok_or_else(|| {
                    ForecastError::invalid_config(
                        field,
                        format!("must be at most {}, got {}", MAX_COUNT, n),
                    )
                });
        }
        match value.as_i64() {
            Some(n) => Err(ForecastError::invalid_config(
                field,
                format!("must be at least 1, got {}", n),
            )),
            None => Err(wrong_type(field, "integer")),
        }
    }

    fn float(&self, field: &str) -> Result<Option<f64>> {
        match self.object.get(field) {
            None => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| wrong_type(field, "float")),
        }
    }

    fn seed(&self) -> Result<Option<u64>> {
        match self.object.get("seed") {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| wrong_type("seed", "non-negative integer")),
        }
    }
}

fn wrong_type(field: &str, expected: &'static str) -> ForecastError {
    ForecastError::InvalidInputType {
        field: field.to_string(),
        expected,
    }
}

fn check_dropout(value: f64) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ForecastError::invalid_config(
            "input_dropout",
            format!("must be in [0, 1), got {}", value),
        ))
    }
}

fn check_noise(value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ForecastError::invalid_config(
            "io_noise",
            format!("must be a non-negative number, got {}", value),
        ))
    }
}
