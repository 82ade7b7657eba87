//! # generative_forecast
//!
//! JSON-in / JSON-out runner for the train and forecast modes.

use clap::{Parser, Subcommand};
use generative_forecast::checkpoint::{LocalStorage, RetryPolicy};
use generative_forecast::engine::ForecastEngine;
use generative_forecast::request::Request;
use generative_forecast::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "generative_forecast")]
#[command(about = "Autogenerative time series forecasting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one request document and write the result document
    Run {
        /// Request file (JSON)
        input: PathBuf,

        /// Result file (JSON)
        output: PathBuf,

        /// Directory relative data and checkpoint paths are resolved against
        #[arg(long)]
        storage_root: Option<PathBuf>,

        /// Attempts per storage operation
        #[arg(long, default_value = "3")]
        max_attempts: u32,
    },

    /// Validate a request document without running it
    Check {
        /// Request file (JSON)
        input: PathBuf,
    },
}

fn read_request(path: &Path) -> Result<Request> {
    let text = std::fs::read_to_string(path)?;
    Request::from_json_str(&text)
}

fn run(
    input: PathBuf,
    output: PathBuf,
    storage_root: Option<PathBuf>,
    max_attempts: u32,
) -> Result<()> {
    let request = read_request(&input)?;
    info!(mode = request.mode().as_str(), "request accepted");

    let storage = match storage_root {
        Some(root) => LocalStorage::with_root(root),
        None => LocalStorage::new(),
    };
    let retry = RetryPolicy {
        max_attempts,
        ..RetryPolicy::default()
    };
    let engine = ForecastEngine::new(storage).with_retry_policy(retry);
    let result = engine.apply_seeded(&request)?;

    let mut writer = BufWriter::new(File::create(&output)?);
    serde_json::to_writer_pretty(&mut writer, &result)?;
    writer.flush()?;
    info!(path = %output.display(), "result written");
    Ok(())
}

fn check(input: PathBuf) -> Result<()> {
    let request = read_request(&input)?;
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "generative_forecast=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            output,
            storage_root,
            max_attempts,
        } => run(input, output, storage_root, max_attempts),

        Commands::Check { input } => check(input),
    };

    if let Err(e) = result {
        error!(error = %e, "request failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
