//! Cache-strategy router.
//!
//! Every outgoing request is classified by path and served with one of two
//! strategies:
//!
//! - **Data** routes (path under the API prefix): network-first. Successful
//!   reads are written to the response cache; on a transport failure the
//!   cached copy for the exact request is returned, or a synthetic 503 with
//!   an offline marker. Transport failures are never returned as errors.
//! - **Static** routes (everything else): cache-first. Misses are fetched and
//!   stored. A failed fetch of a navigational request yields the offline
//!   fallback document; other failures propagate.
//!
//! Cache entries live under a versioned cache name. [`CacheRouter::install`]
//! precaches the static asset list and [`CacheRouter::activate`] drops
//! entries left behind by other versions.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use stocksync_core::store::hash::compute_cache_key;
use stocksync_core::{AppConfig, CachedResponse, Error, LocalStore};
use url::Url;

use crate::fetch::{FetchRequest, FetchResponse, ResponseSource, Transport, canonicalize, resolve};

/// Request headers that distinguish otherwise identical data requests.
pub const VARY_HEADERS: &[&str] = &["accept", "authorization"];

/// Header set on synthesized offline responses.
pub const OFFLINE_HEADER: &str = "x-stocksync-offline";

const OFFLINE_BODY: &str = r#"{"error":"offline","offline":true}"#;

/// Route class chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Data,
    Static,
    /// Non-HTTP schemes are forwarded untouched.
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub base_url: Url,
    pub api_prefix: String,
    pub cache_name: String,
    pub precache_paths: Vec<String>,
    pub offline_fallback_path: String,
}

impl RouterConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let base_url = canonicalize(&config.api_base_url).map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self {
            base_url,
            api_prefix: format!("{}/", config.api_prefix.trim_end_matches('/')),
            cache_name: config.cache_name.clone(),
            precache_paths: config.precache_paths.clone(),
            offline_fallback_path: config.offline_fallback_path.clone(),
        })
    }
}

/// Outcome of precaching the static asset list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cached: usize,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct CacheRouter {
    transport: Arc<dyn Transport>,
    store: LocalStore,
    config: Arc<RouterConfig>,
}

impl CacheRouter {
    pub fn new(transport: Arc<dyn Transport>, store: LocalStore, config: RouterConfig) -> Self {
        Self { transport, store, config: Arc::new(config) }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn classify(&self, url: &Url) -> RouteClass {
        if !matches!(url.scheme(), "http" | "https") {
            RouteClass::Passthrough
        } else if url.path().starts_with(&self.config.api_prefix) {
            RouteClass::Data
        } else {
            RouteClass::Static
        }
    }

    /// Cache key for a request.
    ///
    /// Data keys include the [`VARY_HEADERS`]; static keys depend only on
    /// method and URL so that precached assets match any requester.
    pub fn cache_key(class: RouteClass, request: &FetchRequest) -> String {
        let vary = match class {
            RouteClass::Data => VARY_HEADERS
                .iter()
                .filter_map(|name| request.header(name).map(|value| format!("{name}:{value}")))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        };
        compute_cache_key(request.method.as_str(), request.url.as_str(), &vary)
    }

    /// Route a request.
    ///
    /// # Errors
    ///
    /// Data routes never fail. Static routes return the transport error when
    /// a non-navigational request misses both cache and network.
    pub async fn handle(&self, mut request: FetchRequest) -> Result<FetchResponse, Error> {
        let class = self.classify(&request.url);
        if class != RouteClass::Passthrough {
            request.url = canonicalize(request.url.as_str()).map_err(|e| Error::InvalidInput(e.to_string()))?;
        }

        match class {
            RouteClass::Data => Ok(self.network_first(&request).await),
            RouteClass::Static => self.cache_first(&request).await,
            RouteClass::Passthrough => self.transport.send(&request).await,
        }
    }

    async fn network_first(&self, request: &FetchRequest) -> FetchResponse {
        let key = Self::cache_key(RouteClass::Data, request);

        match self.transport.send(request).await {
            Ok(response) => {
                if request.is_read() && response.is_success() {
                    self.store_response(&key, request, &response).await;
                }
                response
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "network failed on data route; falling back");
                match self.lookup(&key).await {
                    Some(cached) => {
                        tracing::debug!(url = %request.url, "serving cached data response");
                        cached
                    }
                    None => Self::offline_response(),
                }
            }
        }
    }

    async fn cache_first(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let key = Self::cache_key(RouteClass::Static, request);
        if let Some(cached) = self.lookup(&key).await {
            tracing::debug!(url = %request.url, "cache hit");
            return Ok(cached);
        }
        tracing::debug!(url = %request.url, "cache miss");

        match self.transport.send(request).await {
            Ok(response) => {
                if request.is_read() && response.is_success() {
                    self.store_response(&key, request, &response).await;
                }
                Ok(response)
            }
            Err(e) if request.navigational => {
                tracing::warn!(url = %request.url, error = %e, "navigation failed; serving offline fallback");
                Ok(self.fallback_document().await)
            }
            Err(e) => Err(e),
        }
    }

    async fn fallback_document(&self) -> FetchResponse {
        if let Ok(url) = resolve(&self.config.base_url, &self.config.offline_fallback_path) {
            let key = Self::cache_key(RouteClass::Static, &FetchRequest::get(url));
            if let Some(cached) = self.lookup(&key).await {
                return cached;
            }
        }
        FetchResponse {
            status: 503,
            headers: vec![("content-type".into(), "text/plain".into()), (OFFLINE_HEADER.into(), "1".into())],
            body: Bytes::from_static(b"Offline"),
            source: ResponseSource::Synthetic,
            fetch_ms: 0,
        }
    }

    /// Synthetic 503 returned when a data request has neither network nor cache.
    pub fn offline_response() -> FetchResponse {
        FetchResponse {
            status: 503,
            headers: vec![("content-type".into(), "application/json".into()), (OFFLINE_HEADER.into(), "1".into())],
            body: Bytes::from_static(OFFLINE_BODY.as_bytes()),
            source: ResponseSource::Synthetic,
            fetch_ms: 0,
        }
    }

    /// Cache lookup; storage errors degrade to a miss.
    async fn lookup(&self, key: &str) -> Option<FetchResponse> {
        match self.store.get_response(&self.config.cache_name, key).await {
            Ok(Some(cached)) => Some(FetchResponse {
                status: cached.status,
                headers: cached.headers,
                body: Bytes::from(cached.body),
                source: ResponseSource::Cache,
                fetch_ms: 0,
            }),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "response cache read failed");
                None
            }
        }
    }

    /// Store a response copy; a storage failure does not fail the request.
    async fn store_response(&self, key: &str, request: &FetchRequest, response: &FetchResponse) {
        let entry = CachedResponse {
            key_hash: key.to_string(),
            method: request.method.to_string(),
            url: request.url.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = self.store.put_response(&self.config.cache_name, &entry).await {
            tracing::warn!(url = %request.url, error = %e, "response cache write failed");
        }
    }

    /// Fetch and store every precache path.
    ///
    /// Individual fetch failures are tolerated and listed in the report.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let mut report = InstallReport::default();

        for path in &self.config.precache_paths {
            let url = match resolve(&self.config.base_url, path) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(path, error = %e, "skipping invalid precache path");
                    report.failed.push(path.clone());
                    continue;
                }
            };
            let request = FetchRequest::get(url);
            match self.transport.send(&request).await {
                Ok(response) if response.is_success() => {
                    let key = Self::cache_key(RouteClass::Static, &request);
                    let entry = CachedResponse {
                        key_hash: key,
                        method: request.method.to_string(),
                        url: request.url.to_string(),
                        status: response.status,
                        headers: response.headers,
                        body: response.body.to_vec(),
                        stored_at: chrono::Utc::now().to_rfc3339(),
                    };
                    self.store.put_response(&self.config.cache_name, &entry).await?;
                    report.cached += 1;
                }
                Ok(response) => {
                    tracing::warn!(path, status = response.status, "precache fetch returned error status");
                    report.failed.push(path.clone());
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "precache fetch failed");
                    report.failed.push(path.clone());
                }
            }
        }

        tracing::info!(cached = report.cached, failed = report.failed.len(), "precache complete");
        Ok(report)
    }

    /// Delete cache entries belonging to any other cache version.
    pub async fn activate(&self) -> Result<u64, Error> {
        let purged = self.store.purge_other_caches(&self.config.cache_name).await?;
        if purged > 0 {
            tracing::info!(purged, cache_name = %self.config.cache_name, "removed stale cache entries");
        }
        Ok(purged)
    }
}
