//! HTTP object store: one `PUT {endpoint}/{bucket}/{key}` per object.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{check_segment, ObjectReceipt, ObjectStore, SINK_NAME};
use crate::checksum::calculate_checksum;
use crate::error::SinkError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    credentials: Option<(String, String)>,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
    ) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SinkError::configuration(SINK_NAME, format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            credentials: access_key.zip(secret_key),
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<ObjectReceipt, SinkError> {
        check_segment("bucket", bucket)?;
        check_segment("key", key)?;

        let url = self.object_url(bucket, key);
        let checksum = calculate_checksum(&bytes);
        let size = bytes.len();

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-amz-content-sha256", &checksum)
            .body(bytes);
        if let Some((access, secret)) = &self.credentials {
            request = request.basic_auth(access, Some(secret));
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::unreachable(SINK_NAME, format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::rejected(
                SINK_NAME,
                format!("PUT {} returned {}: {}", url, status, body.trim()),
            ));
        }

        tracing::debug!(%url, size, "Uploaded object");
        Ok(ObjectReceipt {
            bucket: bucket.to_string(),
            key: key.to_string(),
            uri: url,
            checksum,
            size,
        })
    }

    fn describe(&self) -> String {
        format!("HTTP store at {}", self.endpoint)
    }
}
