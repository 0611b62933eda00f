//! HTTP transport used by the cache-strategy router and connectivity probe.
//!
//! ### Requests
//! - Absolute, canonicalized URLs (see [`canonicalize`])
//! - Header names are stored lowercased so lookups are case-insensitive
//!
//! ### Failure model
//! - Connection errors and timeouts map to `Error::NetworkUnavailable`
//! - Any HTTP status, including 4xx/5xx, is a successful transport result
//! - Every request is bounded by the configured timeout

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method};
use serde::Serialize;
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, resolve};

use stocksync_core::{AppConfig, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "stocksync/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "stocksync/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// An outgoing request as seen by the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: ::url::Url,
    /// Lowercased header names.
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    /// Top-level page navigation, eligible for the offline fallback document.
    pub navigational: bool,
}

impl FetchRequest {
    pub fn new(method: Method, url: ::url::Url) -> Self {
        Self { method, url, headers: Vec::new(), body: None, navigational: false }
    }

    pub fn get(url: ::url::Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A page navigation.
    pub fn navigate(url: ::url::Url) -> Self {
        Self { navigational: true, ..Self::get(url) }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(n, _)| *n != name);
        self.headers.push((name, value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers.iter().find(|(n, _)| *n == name).map(|(_, v)| v.as_str())
    }

    /// Whether this request only reads (GET/HEAD) and may be cached.
    pub fn is_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Generated locally because neither network nor cache could answer.
    Synthetic,
}

/// Response from a fetch operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lowercased
    pub headers: Vec<(String, String)>,
    /// Response body bytes
    pub body: Bytes,
    pub source: ResponseSource,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers.iter().find(|(n, _)| *n == name).map(|(_, v)| v.as_str())
    }

    /// Whether this is the router's synthesized offline answer.
    pub fn is_offline(&self) -> bool {
        self.source == ResponseSource::Synthetic
    }

    /// Decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::InvalidResponse(e.to_string()))
    }
}

/// Sends requests over the network.
///
/// The router depends on this seam rather than on reqwest so that tests can
/// simulate an unreachable network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, Error>;
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn network_error(err: &reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::NetworkUnavailable(format!("timed out after {}ms", timeout.as_millis()))
    } else {
        Error::NetworkUnavailable(format!("network error: {}", err))
    }
}

impl FetchClient {
    async fn exchange(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let mut builder = self.http.request(request.method.clone(), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| network_error(&e, self.config.timeout))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let body = response.bytes().await.map_err(|e| network_error(&e, self.config.timeout))?;
        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("{} {} -> {} in {}ms ({} bytes)", request.method, request.url, status, fetch_ms, body.len());

        Ok(FetchResponse { status, headers, body, source: ResponseSource::Network, fetch_ms })
    }
}

/// The reqwest timeout covers each request, and the outer deadline bounds the
/// whole exchange including reading the body.
#[async_trait]
impl Transport for FetchClient {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        tokio::time::timeout(self.config.timeout, self.exchange(request))
            .await
            .map_err(|_| Error::NetworkUnavailable(format!("timed out after {}ms", self.config.timeout.as_millis())))?
    }
}
