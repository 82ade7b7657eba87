//! CSV artifact combining recent history with the forecast envelope

use crate::envelope::Envelope;
use crate::error::{ForecastError, Result};
use ndarray::ArrayView2;
use std::path::{Path, PathBuf};
use tracing::info;

/// Write history rows followed by envelope rows to `path`.
///
/// Columns are `step`, `kind`, then `{name}`, `{name}_lower`, `{name}_upper`
/// per variable. History rows leave the bound columns empty. Forecast steps
/// continue the history's step numbering.
pub fn write_envelope_csv(
    envelope: &Envelope,
    history: ArrayView2<f64>,
    headers: &[String],
    path: impl AsRef<Path>,
) -> Result<PathBuf> {
    let path = path.as_ref();
    let width = envelope.width().max(history.ncols());
    if (!envelope.is_empty() && envelope.width() != history.ncols()) || headers.len() != width {
        return Err(ForecastError::invalid_config(
            "export",
            format!(
                "{} headers, {} history columns, {} envelope variables",
                headers.len(),
                history.ncols(),
                envelope.width()
            ),
        ));
    }

    let mut writer = csv::Writer::from_path(path)?;

    let mut header_row = vec!["step".to_string(), "kind".to_string()];
    for name in headers {
        header_row.push(name.clone());
        header_row.push(format!("{}_lower", name));
        header_row.push(format!("{}_upper", name));
    }
    writer.write_record(&header_row)?;

    for (step, row) in history.outer_iter().enumerate() {
        let mut record = vec![step.to_string(), "history".to_string()];
        for value in row.iter() {
            record.push(value.to_string());
            record.push(String::new());
            record.push(String::new());
        }
        writer.write_record(&record)?;
    }

    let offset = history.nrows();
    for (step, bands) in envelope.steps().iter().enumerate() {
        let mut record = vec![(offset + step).to_string(), "forecast".to_string()];
        for band in bands {
            record.push(band.center.to_string());
            record.push(band.lower.to_string());
            record.push(band.upper.to_string());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    info!(path = %path.display(), steps = envelope.len(), "envelope exported");
    Ok(path.to_path_buf())
}
