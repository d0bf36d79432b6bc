//! In-memory object store for tests and dry runs.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{check_segment, ObjectReceipt, ObjectStore};
use crate::checksum::calculate_checksum;
use crate::error::SinkError;

#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<ObjectReceipt, SinkError> {
        check_segment("bucket", bucket)?;
        check_segment("key", key)?;

        let receipt = ObjectReceipt {
            bucket: bucket.to_string(),
            key: key.to_string(),
            uri: format!("memory://{}/{}", bucket, key),
            checksum: calculate_checksum(&bytes),
            size: bytes.len(),
        };
        self.objects
            .write()
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(receipt)
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
    }
}
