//! Client for the authoritative inventory API.
//!
//! Endpoints (relative to the configured API prefix):
//! - `GET inventory?search&limit&offset` → `{products, total}`
//! - `POST inventory/upload` (multipart field `file`) → `{message, filename, stats}`
//! - `PUT inventory/{id}` → updated entity
//! - `DELETE inventory/{id}` → `{message, id}`
//!
//! All calls carry `Authorization: Bearer <token>` from the runtime context.
//! Status mapping: 401 → `AuthRejected`, 503 → `NetworkUnavailable`, any
//! other non-success → `HttpError`.

use async_trait::async_trait;
use reqwest::{StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stocksync_core::{AppConfig, EntitySnapshot, Error};
use url::Url;

use crate::context::RuntimeContext;
use crate::fetch::{FetchConfig, canonicalize, resolve};

/// Parameters for listing inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

impl ListQuery {
    pub fn page(search: Option<&str>, page: u32, page_size: u32) -> Self {
        let search = search.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Self { search, limit: page_size, offset: page.saturating_sub(1).saturating_mul(page_size) }
    }
}

/// One page of products plus the server-side total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ProductPage {
    #[serde(default)]
    pub products: Vec<EntitySnapshot>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct UploadStats {
    #[serde(default)]
    pub inserted: u64,
    #[serde(default)]
    pub updated: u64,
    /// Per-row messages for rows the server skipped.
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub stats: UploadStats,
}

/// Operations the sync engine drives against the authoritative API.
///
/// Replayed uploads may be delivered more than once after a crash, so the
/// server must apply them idempotently (upsert by natural key).
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn list(&self, query: &ListQuery) -> Result<ProductPage, Error>;

    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, Error>;

    async fn update(&self, id: &str, fields: &Map<String, Value>) -> Result<EntitySnapshot, Error>;

    /// Delete an entity. A missing entity is reported as `HttpError { status: 404 }`.
    async fn delete(&self, id: &str) -> Result<(), Error>;
}

/// reqwest-backed [`InventoryApi`].
#[derive(Debug, Clone)]
pub struct HttpInventoryApi {
    http: reqwest::Client,
    base_url: Url,
    api_prefix: String,
    context: RuntimeContext,
}

impl HttpInventoryApi {
    pub fn new(config: &AppConfig, context: RuntimeContext) -> Result<Self, Error> {
        let fetch = FetchConfig::from(config);
        let http = reqwest::Client::builder()
            .user_agent(&fetch.user_agent)
            .timeout(fetch.timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {}", e)))?;
        let base_url = canonicalize(&config.api_base_url).map_err(|e| Error::InvalidInput(e.to_string()))?;

        Ok(Self { http, base_url, api_prefix: config.api_prefix.clone(), context })
    }

    fn endpoint(&self, suffix: &str) -> Result<Url, Error> {
        let path = format!("{}/inventory{}", self.api_prefix.trim_end_matches('/'), suffix);
        resolve(&self.base_url, &path).map_err(|e| Error::InvalidInput(e.to_string()))
    }

    fn item_endpoint(&self, id: &str) -> Result<Url, Error> {
        let mut url = self.endpoint("")?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidInput("API base URL cannot have a path".into()))?
            .push(id);
        Ok(url)
    }

    fn bearer(&self) -> Result<String, Error> {
        self.context
            .credential()
            .map(|token| format!("Bearer {token}"))
            .ok_or_else(|| Error::AuthRejected("no session token".into()))
    }

    /// Send a request and map transport and status failures.
    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<bytes::Bytes, Error> {
        let response = builder
            .header(header::AUTHORIZATION, self.bearer()?)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::NetworkUnavailable("request timed out".into())
                } else {
                    Error::NetworkUnavailable(format!("network error: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::NetworkUnavailable(format!("failed to read response: {}", e)))?;

        if status.is_success() {
            return Ok(body);
        }

        let message = error_message(&body);
        tracing::debug!(status = status.as_u16(), %message, "inventory API returned error status");
        match status {
            StatusCode::UNAUTHORIZED => Err(Error::AuthRejected(message)),
            StatusCode::SERVICE_UNAVAILABLE => Err(Error::NetworkUnavailable(message)),
            _ => Err(Error::HttpError { status: status.as_u16(), message }),
        }
    }
}

/// Pull `error` (or `message`) out of a JSON error body, else use the raw text.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

fn decode<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(body).map_err(|e| Error::InvalidResponse(e.to_string()))
}

#[async_trait]
impl InventoryApi for HttpInventoryApi {
    async fn list(&self, query: &ListQuery) -> Result<ProductPage, Error> {
        let url = self.endpoint("")?;
        let body = self.execute(self.http.get(url).query(query)).await?;
        decode(&body)
    }

    async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt, Error> {
        let url = self.endpoint("/upload")?;
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("text/csv")
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let body = self.execute(self.http.post(url).multipart(form)).await?;
        let receipt: UploadReceipt = decode(&body)?;
        tracing::info!(
            file_name,
            inserted = receipt.stats.inserted,
            updated = receipt.stats.updated,
            row_errors = receipt.stats.errors.len(),
            "upload accepted"
        );
        Ok(receipt)
    }

    async fn update(&self, id: &str, fields: &Map<String, Value>) -> Result<EntitySnapshot, Error> {
        let url = self.item_endpoint(id)?;
        let body = self.execute(self.http.put(url).json(fields)).await?;
        decode(&body)
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        let url = self.item_endpoint(id)?;
        self.execute(self.http.delete(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_page_offsets() {
        let q = ListQuery::page(Some("  tee "), 3, 20);
        assert_eq!(q.search.as_deref(), Some("tee"));
        assert_eq!(q.limit, 20);
        assert_eq!(q.offset, 40);

        let q = ListQuery::page(Some("   "), 0, 20);
        assert!(q.search.is_none());
        assert_eq!(q.offset, 0);
    }

    #[test]
    fn test_endpoints() {
        let api = HttpInventoryApi::new(&AppConfig::default(), RuntimeContext::default()).unwrap();
        assert_eq!(api.endpoint("/upload").unwrap().as_str(), "http://localhost:3000/api/inventory/upload");
        assert_eq!(api.item_endpoint("a b").unwrap().as_str(), "http://localhost:3000/api/inventory/a%20b");
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(br#"{"error":"Token expirado"}"#), "Token expirado");
        assert_eq!(error_message(br#"{"message":"nope"}"#), "nope");
        assert_eq!(error_message(b" plain text "), "plain text");
    }

    #[test]
    fn test_product_page_tolerates_missing_fields() {
        let page: ProductPage = serde_json::from_str(r#"{"products":[{"id":"1","title":"Tee","price":9.5}]}"#).unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(page.products[0].title.as_deref(), Some("Tee"));
        assert_eq!(page.products[0].fields["price"], 9.5);
    }

    #[tokio::test]
    async fn test_missing_credential_is_auth_rejected() {
        let api = HttpInventoryApi::new(&AppConfig::default(), RuntimeContext::new(true, None)).unwrap();
        let err = api.list(&ListQuery::page(None, 1, 20)).await.unwrap_err();
        assert!(err.is_auth());
    }
}
