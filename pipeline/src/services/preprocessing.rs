//! Series preprocessing stage.
//!
//! Collapses multi-dimensional columns, drops samples with a non-finite
//! timestamp or brightness, and persists the processed series with a preview
//! plot.

use std::path::PathBuf;

use crate::api::{ObjectIdentifier, ProcessedSeries, RawSeries, Stage};
use crate::artifacts::ArtifactLayout;
use crate::error::PreprocessError;
use crate::fits::{self, FitsError};
use crate::render::{render_light_curve, save_png};
use crate::services::run_tracker::{LogLevel, RunTracker};

/// Turn a raw series into a processed one.
///
/// 1. Columns wider than one value per row keep only their first sub-column.
/// 2. The three collapsed columns must have equal length.
/// 3. A sample is kept when its timestamp and brightness are both finite.
///    The uncertainty is carried along without being checked.
///
/// # Errors
/// * `ShapeMismatch` - collapsed columns differ in length
/// * `EmptyAfterFiltering` - no sample survives the mask
pub fn preprocess(raw: RawSeries) -> Result<ProcessedSeries, PreprocessError> {
    let time = raw.time.first_subcolumn();
    let flux = raw.flux.first_subcolumn();
    let flux_err = raw.flux_err.first_subcolumn();

    if time.len() != flux.len() || flux.len() != flux_err.len() {
        return Err(PreprocessError::ShapeMismatch {
            identifier: raw.identifier,
            time: time.len(),
            flux: flux.len(),
            flux_err: flux_err.len(),
        });
    }

    let mask = validity_mask(&time, &flux);
    let keep = |values: Vec<f64>| -> Vec<f64> {
        values
            .into_iter()
            .zip(&mask)
            .filter_map(|(v, &ok)| ok.then_some(v))
            .collect()
    };

    let series = ProcessedSeries {
        identifier: raw.identifier,
        time: keep(time),
        flux: keep(flux),
        flux_err: keep(flux_err),
    };

    if series.is_empty() {
        return Err(PreprocessError::EmptyAfterFiltering {
            identifier: series.identifier,
        });
    }
    Ok(series)
}

/// `true` where both timestamp and brightness are finite.
pub fn validity_mask(time: &[f64], flux: &[f64]) -> Vec<bool> {
    time.iter()
        .zip(flux)
        .map(|(t, f)| t.is_finite() && f.is_finite())
        .collect()
}

/// Stage wrapper: raw artifact in, processed artifact and preview out.
#[derive(Debug, Clone)]
pub struct SeriesPreprocessor {
    layout: ArtifactLayout,
}

impl SeriesPreprocessor {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    /// Process the raw artifact of `identifier`. Blocking.
    ///
    /// # Returns
    /// Path of the processed FITS file.
    pub fn process(
        &self,
        identifier: &ObjectIdentifier,
        tracker: &RunTracker,
    ) -> Result<PathBuf, PreprocessError> {
        let raw_path = self.layout.raw_series(identifier);
        let raw = fits::read_raw_series(&raw_path, identifier).map_err(from_fits)?;

        let rows = raw.time.rows();
        if raw.time.is_multi_dimensional()
            || raw.flux.is_multi_dimensional()
            || raw.flux_err.is_multi_dimensional()
        {
            tracker.log(
                identifier,
                Stage::Preprocessing,
                LogLevel::Warning,
                "Multi-dimensional columns collapsed to their first sub-column",
            );
        }

        let series = preprocess(raw)?;
        let dropped = rows.saturating_sub(series.len());
        tracker.log(
            identifier,
            Stage::Preprocessing,
            LogLevel::Info,
            format!("Kept {} samples, dropped {}", series.len(), dropped),
        );

        let processed_path = self.layout.processed_series(identifier);
        fits::write_processed_series(&processed_path, &series).map_err(from_fits)?;

        let preview_path = self.layout.processed_preview(identifier);
        save_png(&render_light_curve(&series), &preview_path)
            .map_err(|e| PreprocessError::Render(e.to_string()))?;

        Ok(processed_path)
    }
}

fn from_fits(err: FitsError) -> PreprocessError {
    match err {
        FitsError::MissingColumn { path, column } => PreprocessError::MissingColumn { column, path },
        other => PreprocessError::Fits(other.to_string()),
    }
}
