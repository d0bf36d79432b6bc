//! Series acquisition stage.
//!
//! Fetches the raw light-curve product for one identifier from a
//! [`LightCurveProvider`] and persists it as `{raw_dir}/ID.fits`, stamped
//! with its provenance.

use async_trait::async_trait;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{ObjectIdentifier, Provenance, Stage};
use crate::artifacts::{temporary_path, ArtifactLayout};
use crate::checksum::calculate_checksum;
use crate::error::{AcquisitionError, ErrorContext};
use crate::fits::stamp_provenance;
use crate::services::run_tracker::{LogLevel, RunTracker};

/// A downloaded light-curve product.
#[derive(Debug, Clone)]
pub struct LightCurveDownload {
    /// FITS file content
    pub bytes: Vec<u8>,
    pub source_catalog: String,
    pub mission: String,
}

/// Source of raw light-curve products.
#[async_trait]
pub trait LightCurveProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Fetch the light curve for one identifier.
    ///
    /// # Errors
    /// `AcquisitionError::NotFound` when the provider has no product for the
    /// identifier; `Provider`/`Io` for transport and storage failures.
    async fn fetch(&self, identifier: &ObjectIdentifier)
        -> Result<LightCurveDownload, AcquisitionError>;
}

#[derive(Clone)]
pub struct SeriesAcquirer {
    provider: Arc<dyn LightCurveProvider>,
    layout: ArtifactLayout,
}

impl SeriesAcquirer {
    pub fn new(provider: Arc<dyn LightCurveProvider>, layout: ArtifactLayout) -> Self {
        Self { provider, layout }
    }

    /// Fetch and persist the raw series for `identifier`.
    ///
    /// # Returns
    /// Path of the raw artifact.
    pub async fn acquire(
        &self,
        identifier: &ObjectIdentifier,
        tracker: &RunTracker,
    ) -> Result<PathBuf, AcquisitionError> {
        tracker.log(
            identifier,
            Stage::Acquisition,
            LogLevel::Info,
            format!("Fetching light curve from {}", self.provider.name()),
        );
        let download = self.provider.fetch(identifier).await?;

        let provenance = Provenance {
            source_catalog: download.source_catalog,
            mission: download.mission,
            acquired_at: Utc::now(),
            checksum: Some(calculate_checksum(&download.bytes)),
        };
        let size = download.bytes.len();
        let path = self.layout.raw_series(identifier);

        let context = ErrorContext::new("persist_raw_series")
            .with_stage(Stage::Acquisition)
            .with_identifier(identifier);

        let target = path.clone();
        let bytes = download.bytes;
        tokio::task::spawn_blocking(move || persist(&target, &bytes, &provenance))
            .await
            .map_err(|e| AcquisitionError::io(format!("Persist task failed: {}", e), context.clone()))?
            .map_err(|message| AcquisitionError::io(message, context))?;

        tracker.log(
            identifier,
            Stage::Acquisition,
            LogLevel::Info,
            format!("Saved {} bytes to {}", size, path.display()),
        );
        Ok(path)
    }
}

/// Write under a temporary name, stamp provenance, then rename into place.
fn persist(path: &std::path::Path, bytes: &[u8], provenance: &Provenance) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let tmp = temporary_path(path);
    fs::write(&tmp, bytes).map_err(|e| e.to_string())?;
    if let Err(e) = stamp_provenance(&tmp, provenance) {
        let _ = fs::remove_file(&tmp);
        return Err(format!("Downloaded product is not a readable FITS file: {}", e));
    }
    fs::rename(&tmp, path).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::local::DirectoryProvider;

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let acquirer = SeriesAcquirer::new(
            Arc::new(DirectoryProvider::new(dir.path().join("source"))),
            ArtifactLayout::under(dir.path()),
        );
        let id = ObjectIdentifier::new("TIC 404").unwrap();
        let err = acquirer.acquire(&id, &RunTracker::new()).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::NotFound { .. }));
        assert!(!ArtifactLayout::under(dir.path()).raw_series(&id).exists());
    }

    #[tokio::test]
    async fn test_non_fits_payload_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("TIC_5.fits"), b"not a fits file").unwrap();

        let layout = ArtifactLayout::under(dir.path());
        let acquirer = SeriesAcquirer::new(Arc::new(DirectoryProvider::new(source)), layout.clone());
        let id = ObjectIdentifier::new("TIC 5").unwrap();
        let err = acquirer.acquire(&id, &RunTracker::new()).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Io { .. }));
        assert!(!layout.raw_series(&id).exists());
        assert!(!temporary_path(&layout.raw_series(&id)).exists());
    }
}
