//! Offline providers.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;

use crate::api::{ObjectIdentifier, Stage};
use crate::artifacts::RAW_SUFFIX;
use crate::error::{AcquisitionError, ErrorContext};
use crate::services::acquisition::{LightCurveDownload, LightCurveProvider};
use crate::services::catalog::{CatalogClient, CatalogQuery};

/// Catalog backed by a fixed identifier list.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    identifiers: Vec<ObjectIdentifier>,
}

impl StaticCatalog {
    pub fn new(identifiers: Vec<ObjectIdentifier>) -> Self {
        Self { identifiers }
    }
}

#[async_trait]
impl CatalogClient for StaticCatalog {
    async fn query(&self, query: &CatalogQuery) -> Result<Vec<ObjectIdentifier>, AcquisitionError> {
        Ok(self.identifiers.iter().take(query.limit).cloned().collect())
    }
}

/// Serves `{dir}/{stem}.fits` as the light curve for an identifier.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
    mission: String,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mission: "TESS".to_string(),
        }
    }

    pub fn with_mission(mut self, mission: impl Into<String>) -> Self {
        self.mission = mission.into();
        self
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl LightCurveProvider for DirectoryProvider {
    fn name(&self) -> &str {
        "directory"
    }

    async fn fetch(
        &self,
        identifier: &ObjectIdentifier,
    ) -> Result<LightCurveDownload, AcquisitionError> {
        let path = self
            .root
            .join(format!("{}{}", identifier.file_stem(), RAW_SUFFIX));
        let context = ErrorContext::new("read_local_product")
            .with_stage(Stage::Acquisition)
            .with_identifier(identifier)
            .with_details(path.display().to_string());

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(LightCurveDownload {
                bytes,
                source_catalog: self.root.display().to_string(),
                mission: self.mission.clone(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(AcquisitionError::not_found(
                format!("no product for {}", identifier),
                context,
            )),
            Err(e) => Err(AcquisitionError::io(e.to_string(), context)),
        }
    }
}
