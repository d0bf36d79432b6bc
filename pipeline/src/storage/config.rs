//! Object store configuration from environment variables.

use std::env;
use std::path::PathBuf;

use super::SINK_NAME;
use crate::error::SinkError;

/// Where objects go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// S3-style HTTP endpoint, objects PUT to `{endpoint}/{bucket}/{key}`
    Http { endpoint: String },
    /// Local directory, objects written to `{root}/{bucket}/{key}`
    Filesystem { root: PathBuf },
}

/// Object store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreConfig {
    pub backend: StoreBackend,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Bucket for processed-series previews
    pub bucket_processed: String,
    /// Bucket for metrics charts
    pub bucket_visualize: String,
}

impl ObjectStoreConfig {
    /// Load object store configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `OBJECT_STORE_ENDPOINT` (required): `http(s)://` URL, or a directory path
    /// - `OBJECT_STORE_BUCKET_PROCESSED` (required)
    /// - `OBJECT_STORE_BUCKET_VISUALIZE` (required)
    /// - `OBJECT_STORE_ACCESS_KEY` / `OBJECT_STORE_SECRET_KEY` (optional): basic
    ///   credentials for the HTTP backend; both or neither
    ///
    /// # Errors
    /// Returns `SinkError::Configuration` if required variables are not set.
    pub fn from_env() -> Result<Self, SinkError> {
        let endpoint = required("OBJECT_STORE_ENDPOINT")?;
        let bucket_processed = required("OBJECT_STORE_BUCKET_PROCESSED")?;
        let bucket_visualize = required("OBJECT_STORE_BUCKET_VISUALIZE")?;
        let access_key = optional("OBJECT_STORE_ACCESS_KEY");
        let secret_key = optional("OBJECT_STORE_SECRET_KEY");

        if access_key.is_some() != secret_key.is_some() {
            return Err(SinkError::configuration(
                SINK_NAME,
                "OBJECT_STORE_ACCESS_KEY and OBJECT_STORE_SECRET_KEY must be set together",
            ));
        }

        let backend = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            StoreBackend::Http {
                endpoint: endpoint.trim_end_matches('/').to_string(),
            }
        } else {
            StoreBackend::Filesystem {
                root: PathBuf::from(endpoint),
            }
        };

        Ok(Self {
            backend,
            access_key,
            secret_key,
            bucket_processed,
            bucket_visualize,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &str) -> Result<String, SinkError> {
    optional(key).ok_or_else(|| {
        SinkError::configuration(SINK_NAME, format!("{} environment variable not set", key))
    })
}
