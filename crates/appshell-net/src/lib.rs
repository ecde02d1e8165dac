//! # AppShell Net
//!
//! HTTP fetch layer for the AppShell cache worker.
//!
//! ## Design Goals
//!
//! 1. **Async HTTP**: Non-blocking network requests via `reqwest`
//! 2. **Injectable seam**: the [`Fetcher`] trait lets the worker logic run
//!    against a real HTTP client or a scripted double in tests
//! 3. **Reload semantics**: shell downloads can bypass intermediary HTTP
//!    caches the way a browser `cache: "reload"` request does

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

use appshell_common::retry::{retry_with_backoff, RetryConfig};

/// Errors that can occur while fetching.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// How a request interacts with intermediary HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Normal HTTP caching semantics.
    #[default]
    Default,
    /// Force a network reload, ignoring any HTTP cache.
    Reload,
}

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub cache_mode: CacheMode,
    pub timeout: Option<Duration>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            cache_mode: CacheMode::Default,
            timeout: None,
        }
    }

    /// Set the cache mode.
    pub fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a per-request timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// An HTTP response with its body fully read.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Check if the response was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Get the body as bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Seam between the cache worker and the network.
///
/// The worker only ever talks to the network through this trait, so tests
/// can script responses and failures per URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request, resolving once the body is fully read.
    ///
    /// A non-2xx status is a successful fetch with `ok() == false`; `Err`
    /// means the network itself failed.
    async fn fetch(&self, request: Request) -> Result<Response, NetError>;
}

/// Fetcher configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Default timeout applied when a request carries none.
    pub default_timeout: Duration,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
    /// Retry policy applied around each request.
    ///
    /// Defaults to a single attempt so all-or-nothing install semantics
    /// stay exact; embedders may opt in to retries.
    pub retry: RetryConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: "AppShell/1.0".to_string(),
            default_timeout: Duration::from_secs(30),
            max_redirects: 10,
            retry: RetryConfig::none(),
        }
    }
}

/// Production [`Fetcher`] backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
    config: LoaderConfig,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.default_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn fetch_once(&self, request: &Request) -> Result<Response, NetError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }

        if request.cache_mode == CacheMode::Reload {
            builder = builder
                .header(http::header::CACHE_CONTROL, "no-cache")
                .header(http::header::PRAGMA, "no-cache");
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "response received"
        );

        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, cache_mode = ?request.cache_mode, "fetching");
        retry_with_backoff(&self.config.retry, || self.fetch_once(&request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://example.com/main.js").unwrap();
        let request = Request::get(url.clone())
            .cache_mode(CacheMode::Reload)
            .timeout(Duration::from_secs(5));

        assert_eq!(request.url, url);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.cache_mode, CacheMode::Reload);
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_loader_config_default() {
        let config = LoaderConfig::default();
        assert_eq!(config.user_agent, "AppShell/1.0");
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(LoaderConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/index.html", server.uri())).unwrap();
        let response = fetcher.fetch(Request::get(url)).await.unwrap();

        assert!(response.ok());
        assert_eq!(response.body().as_ref(), b"<html></html>");
    }

    #[tokio::test]
    async fn test_reload_bypasses_http_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/main.js"))
            .and(header("cache-control", "no-cache"))
            .respond_with(ResponseTemplate::new(200).set_body_string("js"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(LoaderConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/main.js", server.uri())).unwrap();
        let response = fetcher
            .fetch(Request::get(url).cache_mode(CacheMode::Reload))
            .await
            .unwrap();

        assert!(response.ok());
    }

    #[tokio::test]
    async fn test_http_error_status_is_not_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(LoaderConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/missing.png", server.uri())).unwrap();
        let response = fetcher.fetch(Request::get(url)).await.unwrap();

        assert!(!response.ok());
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        // Nothing listens on this port.
        let fetcher = HttpFetcher::new(LoaderConfig {
            default_timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap();
        let url = Url::parse("http://127.0.0.1:9/unreachable").unwrap();

        let result = fetcher.fetch(Request::get(url)).await;
        assert!(result.is_err());
    }
}
