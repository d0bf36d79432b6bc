//! Object store sink.
//!
//! Publishing uploads rendered PNGs to two buckets: one for processed-series
//! previews and one for metrics charts. The [`ObjectStore`] trait is the seam;
//! the backend is chosen from the environment at publish time.

pub mod config;
pub mod fs;
pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::SinkError;

pub use config::{ObjectStoreConfig, StoreBackend};
pub use fs::FsObjectStore;
pub use http::HttpObjectStore;
pub use memory::MemoryObjectStore;

/// Sink name used in errors and logs.
pub const SINK_NAME: &str = "object store";

/// Confirmation of a stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectReceipt {
    pub bucket: String,
    pub key: String,
    /// Location the object can be fetched from
    pub uri: String,
    /// SHA-256 of the stored bytes
    pub checksum: String,
    pub size: usize,
}

/// A bucket/key blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `bucket/key`, replacing any existing object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<ObjectReceipt, SinkError>;

    /// Human-readable target description for logs.
    fn describe(&self) -> String;
}

/// Build the store selected by `config`.
pub fn create_object_store(config: &ObjectStoreConfig) -> Result<Arc<dyn ObjectStore>, SinkError> {
    match &config.backend {
        StoreBackend::Http { endpoint } => Ok(Arc::new(HttpObjectStore::new(
            endpoint.clone(),
            config.access_key.clone(),
            config.secret_key.clone(),
        )?)),
        StoreBackend::Filesystem { root } => Ok(Arc::new(FsObjectStore::new(root.clone()))),
    }
}

/// Validate a bucket or key segment.
pub(crate) fn check_segment(kind: &str, value: &str) -> Result<(), SinkError> {
    if value.is_empty() || value.contains("..") || value.starts_with('/') {
        return Err(SinkError::rejected(
            SINK_NAME,
            format!("invalid {} '{}'", kind, value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_segment() {
        assert!(check_segment("key", "TIC_1_processed.png").is_ok());
        assert!(check_segment("key", "").is_err());
        assert!(check_segment("key", "../etc/passwd").is_err());
        assert!(check_segment("bucket", "/abs").is_err());
    }

    #[test]
    fn test_create_filesystem_store() {
        let config = ObjectStoreConfig {
            backend: StoreBackend::Filesystem {
                root: "/tmp/objects".into(),
            },
            access_key: None,
            secret_key: None,
            bucket_processed: "processed".into(),
            bucket_visualize: "visualize".into(),
        };
        let store = create_object_store(&config).unwrap();
        assert!(store.describe().contains("/tmp/objects"));
    }
}
