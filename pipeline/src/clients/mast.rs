//! MAST archive clients.
//!
//! Both clients POST a JSON `request` form field to the MAST `invoke`
//! endpoint. Light curves are located through CAOM observations, then the
//! first light-curve product (`LC`) is downloaded.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::api::{ObjectIdentifier, Stage};
use crate::error::{AcquisitionError, ErrorContext};
use crate::services::acquisition::{LightCurveDownload, LightCurveProvider};
use crate::services::catalog::{CatalogClient, CatalogQuery};

/// Default MAST `invoke` endpoint.
pub const DEFAULT_MAST_API_URL: &str = "https://mast.stsci.edu/api/v0/invoke";

const DOWNLOAD_URL: &str = "https://mast.stsci.edu/api/v0.1/Download/file";
const LIGHT_CURVE_SUBGROUP: &str = "LC";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct MastResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Vec<Value>,
}

fn api_url_from_env() -> String {
    std::env::var("MAST_API_URL").unwrap_or_else(|_| DEFAULT_MAST_API_URL.to_string())
}

fn build_client() -> Result<reqwest::Client, AcquisitionError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| AcquisitionError::provider(e.to_string(), ErrorContext::new("build_http_client")))
}

/// Shared `invoke` call.
#[derive(Debug, Clone)]
struct MastInvoker {
    client: reqwest::Client,
    api_url: String,
}

impl MastInvoker {
    async fn invoke(&self, request: Value, context: ErrorContext) -> Result<Vec<Value>, AcquisitionError> {
        let service = request["service"].as_str().unwrap_or_default().to_string();
        debug!(service = %service, url = %self.api_url, "MAST request");

        let response = self
            .client
            .post(&self.api_url)
            .form(&[("request", request.to_string())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let context = context.with_details(format!("service={} status={}", service, status));
            let context = if status.is_server_error() {
                context.retryable()
            } else {
                context
            };
            return Err(AcquisitionError::provider("MAST request failed", context));
        }

        let body: MastResponse = response.json().await?;
        if body.status.as_deref() == Some("ERROR") {
            return Err(AcquisitionError::provider(
                body.msg.unwrap_or_else(|| "MAST reported an error".to_string()),
                context.with_details(format!("service={}", service)),
            ));
        }
        Ok(body.data)
    }
}

/// Brightness-filtered catalog queries against `Mast.Catalogs.Filtered.*`.
#[derive(Debug, Clone)]
pub struct MastCatalogClient {
    invoker: MastInvoker,
}

impl MastCatalogClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self, AcquisitionError> {
        Ok(Self {
            invoker: MastInvoker {
                client: build_client()?,
                api_url: api_url.into(),
            },
        })
    }

    /// Client for `MAST_API_URL`, or the public endpoint.
    pub fn from_env() -> Result<Self, AcquisitionError> {
        Self::new(api_url_from_env())
    }
}

/// Request body for a magnitude-window catalog query.
fn catalog_request(query: &CatalogQuery) -> Value {
    json!({
        "service": format!("Mast.Catalogs.Filtered.{}", catalog_service_name(&query.catalog)),
        "format": "json",
        "pagesize": query.limit,
        "page": 1,
        "params": {
            "columns": "ID",
            "filters": [{
                "paramName": "Tmag",
                "values": [{
                    "min": query.brightness_range[0],
                    "max": query.brightness_range[1],
                }],
            }],
        },
    })
}

/// `TIC` → `Tic`, `CTL` → `Ctl`.
fn catalog_service_name(catalog: &str) -> String {
    let mut chars = catalog.trim().chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Row `ID` as text; MAST returns it as a number or a string.
fn row_id(row: &Value) -> Option<String> {
    match row.get("ID")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl CatalogClient for MastCatalogClient {
    async fn query(&self, query: &CatalogQuery) -> Result<Vec<ObjectIdentifier>, AcquisitionError> {
        let context = ErrorContext::new("catalog_query")
            .with_stage(Stage::Catalog)
            .with_details(format!("catalog={}", query.catalog));
        let rows = self.invoker.invoke(catalog_request(query), context).await?;

        Ok(rows
            .iter()
            .filter_map(row_id)
            .filter_map(|id| ObjectIdentifier::new(format!("{} {}", query.catalog, id)).ok())
            .collect())
    }
}

/// TESS light curves through CAOM observation and product lookups.
#[derive(Debug, Clone)]
pub struct MastLightCurveProvider {
    invoker: MastInvoker,
    mission: String,
    download_url: String,
}

impl MastLightCurveProvider {
    pub fn new(api_url: impl Into<String>) -> Result<Self, AcquisitionError> {
        Ok(Self {
            invoker: MastInvoker {
                client: build_client()?,
                api_url: api_url.into(),
            },
            mission: "TESS".to_string(),
            download_url: DOWNLOAD_URL.to_string(),
        })
    }

    pub fn from_env() -> Result<Self, AcquisitionError> {
        Self::new(api_url_from_env())
    }

    async fn observation_ids(
        &self,
        target: &str,
        context: &ErrorContext,
    ) -> Result<Vec<String>, AcquisitionError> {
        let request = json!({
            "service": "Mast.Caom.Filtered",
            "format": "json",
            "params": {
                "columns": "obsid",
                "filters": [
                    {"paramName": "obs_collection", "values": [self.mission]},
                    {"paramName": "dataproduct_type", "values": ["timeseries"]},
                    {"paramName": "target_name", "values": [target]},
                ],
            },
        });
        let rows = self.invoker.invoke(request, context.clone()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match row.get("obsid")? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect())
    }

    async fn light_curve_uri(
        &self,
        obsid: &str,
        context: &ErrorContext,
    ) -> Result<Option<String>, AcquisitionError> {
        let request = json!({
            "service": "Mast.Caom.Products",
            "format": "json",
            "params": { "obsid": obsid },
        });
        let rows = self.invoker.invoke(request, context.clone()).await?;
        Ok(rows
            .iter()
            .find(|row| row["productSubGroupDescription"].as_str() == Some(LIGHT_CURVE_SUBGROUP))
            .and_then(|row| row["dataURI"].as_str())
            .map(str::to_string))
    }
}

/// Numeric part of a catalog identifier (`TIC 12345` → `12345`).
fn target_name(identifier: &ObjectIdentifier) -> &str {
    identifier
        .as_str()
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or(identifier.as_str())
}

#[async_trait]
impl LightCurveProvider for MastLightCurveProvider {
    fn name(&self) -> &str {
        "MAST"
    }

    async fn fetch(
        &self,
        identifier: &ObjectIdentifier,
    ) -> Result<LightCurveDownload, AcquisitionError> {
        let context = ErrorContext::new("fetch_light_curve")
            .with_stage(Stage::Acquisition)
            .with_identifier(identifier);

        let mut uri = None;
        for obsid in self.observation_ids(target_name(identifier), &context).await? {
            if let Some(found) = self.light_curve_uri(&obsid, &context).await? {
                uri = Some(found);
                break;
            }
        }
        let uri = uri.ok_or_else(|| {
            AcquisitionError::not_found(
                format!("no {} light curve for {}", self.mission, identifier),
                context.clone(),
            )
        })?;

        debug!(identifier = %identifier, uri = %uri, "Downloading light curve");
        let response = self
            .invoker
            .client
            .get(&self.download_url)
            .query(&[("uri", uri.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AcquisitionError::provider(
                format!("download failed with status {}", response.status()),
                context.with_details(uri),
            ));
        }
        let bytes = response.bytes().await?.to_vec();

        Ok(LightCurveDownload {
            bytes,
            source_catalog: uri,
            mission: self.mission.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_request_shape() {
        let request = catalog_request(&CatalogQuery {
            catalog: "TIC".into(),
            brightness_range: [8.0, 10.0],
            limit: 5,
        });
        assert_eq!(request["service"], "Mast.Catalogs.Filtered.Tic");
        assert_eq!(request["pagesize"], 5);
        assert_eq!(request["params"]["filters"][0]["paramName"], "Tmag");
        assert_eq!(request["params"]["filters"][0]["values"][0]["min"], 8.0);
        assert_eq!(request["params"]["filters"][0]["values"][0]["max"], 10.0);
    }

    #[test]
    fn test_row_id_accepts_numbers_and_strings() {
        assert_eq!(row_id(&json!({"ID": 12345})), Some("12345".to_string()));
        assert_eq!(row_id(&json!({"ID": "987"})), Some("987".to_string()));
        assert_eq!(row_id(&json!({"ra": 1.0})), None);
    }

    #[test]
    fn test_target_name_strips_catalog_prefix() {
        let id = ObjectIdentifier::new("TIC 12345").unwrap();
        assert_eq!(target_name(&id), "12345");
        let bare = ObjectIdentifier::new("12345").unwrap();
        assert_eq!(target_name(&bare), "12345");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retryable_provider_error() {
        let client = MastCatalogClient::new("http://127.0.0.1:9/invoke").unwrap();
        let err = client
            .query(&CatalogQuery {
                catalog: "TIC".into(),
                brightness_range: [8.0, 10.0],
                limit: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Provider { .. }));
        assert!(err.is_retryable());
    }
}
