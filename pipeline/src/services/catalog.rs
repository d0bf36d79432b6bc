//! Identifier catalog stage.
//!
//! Resolves candidate identifiers from an external catalog filtered by
//! brightness, and maintains the identifier list file that feeds acquisition.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{ObjectIdentifier, Stage};
use crate::config::PipelineConfig;
use crate::error::{AcquisitionError, ErrorContext};

/// A brightness-filtered catalog query.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    /// Catalog name, also used as the identifier prefix (`TIC 12345`)
    pub catalog: String,
    /// Magnitude window `[min, max]`
    pub brightness_range: [f64; 2],
    /// Maximum number of identifiers to return
    pub limit: usize,
}

impl CatalogQuery {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            catalog: config.catalog.clone(),
            brightness_range: config.query_parameters.brightness_range,
            limit: config.num_star_ids,
        }
    }
}

/// Source of catalog identifiers.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Return identifiers matching the query, in catalog order.
    async fn query(&self, query: &CatalogQuery) -> Result<Vec<ObjectIdentifier>, AcquisitionError>;
}

pub struct IdentifierCatalog {
    client: Arc<dyn CatalogClient>,
}

impl IdentifierCatalog {
    pub fn new(client: Arc<dyn CatalogClient>) -> Self {
        Self { client }
    }

    /// Query the catalog and cap the result at `query.limit`.
    ///
    /// Fewer matches than requested is not an error; it is logged.
    pub async fn resolve(
        &self,
        query: &CatalogQuery,
    ) -> Result<Vec<ObjectIdentifier>, AcquisitionError> {
        let mut ids = dedupe(self.client.query(query).await?);
        if ids.len() > query.limit {
            ids.truncate(query.limit);
        } else if ids.len() < query.limit {
            warn!(
                catalog = %query.catalog,
                requested = query.limit,
                found = ids.len(),
                "Catalog returned fewer identifiers than requested"
            );
        }
        info!(catalog = %query.catalog, count = ids.len(), "Resolved identifiers");
        Ok(ids)
    }

    /// Resolve identifiers and append them to the list file.
    ///
    /// # Returns
    /// The identifiers that were written.
    pub async fn resolve_into(
        &self,
        query: &CatalogQuery,
        path: &Path,
    ) -> Result<Vec<ObjectIdentifier>, AcquisitionError> {
        let ids = self.resolve(query).await?;
        append_identifiers(path, &ids).map_err(|e| {
            AcquisitionError::io(
                e.to_string(),
                ErrorContext::new("append_identifiers")
                    .with_stage(Stage::Catalog)
                    .with_details(path.display().to_string()),
            )
        })?;
        Ok(ids)
    }
}

fn dedupe(ids: Vec<ObjectIdentifier>) -> Vec<ObjectIdentifier> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Append identifiers to the list file, one per line.
pub fn append_identifiers(path: &Path, ids: &[ObjectIdentifier]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for id in ids {
        writeln!(file, "{}", id)?;
    }
    file.flush()
}

/// Read the identifier list file.
///
/// Blank lines are skipped. Repeated identifiers (the file is appended to
/// across catalog runs) are kept once, at their first position.
pub fn load_identifiers(path: &Path) -> io::Result<Vec<ObjectIdentifier>> {
    let content = fs::read_to_string(path)?;
    let ids = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match ObjectIdentifier::new(line) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(line, error = %e, "Skipping invalid identifier");
                None
            }
        })
        .collect();
    Ok(dedupe(ids))
}
