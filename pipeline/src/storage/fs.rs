//! Filesystem-backed object store.

use async_trait::async_trait;
use std::path::PathBuf;

use super::{check_segment, ObjectReceipt, ObjectStore, SINK_NAME};
use crate::artifacts::write_atomic;
use crate::checksum::calculate_checksum;
use crate::error::SinkError;

/// Stores objects as files under `{root}/{bucket}/{key}`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<ObjectReceipt, SinkError> {
        check_segment("bucket", bucket)?;
        check_segment("key", key)?;

        let path = self.object_path(bucket, key);
        let checksum = calculate_checksum(&bytes);
        let size = bytes.len();

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| SinkError::io(SINK_NAME, format!("write task failed: {}", e)))?
            .map_err(|e| SinkError::io(SINK_NAME, format!("{}: {}", path.display(), e)))?;

        Ok(ObjectReceipt {
            bucket: bucket.to_string(),
            key: key.to_string(),
            uri: format!("file://{}", path.display()),
            checksum,
            size,
        })
    }

    fn describe(&self) -> String {
        format!("filesystem store at {}", self.root.display())
    }
}
