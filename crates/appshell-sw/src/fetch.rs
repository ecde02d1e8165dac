//! Fetch interception.
//!
//! Only GET requests for known build artifacts are handled; everything
//! else passes through to default network handling. The entry document is
//! online-first, every other artifact is cache-first with lazy populate.

use hashbrown::HashMap;
use http::Method;
use tracing::{debug, trace};
use url::Url;

use appshell_net::{Request, Response};

use crate::cache::CacheEntry;
use crate::lifecycle::ShellWorker;
use crate::manifest::{self, ROOT_KEY};
use crate::Result;

/// An intercepted outgoing request.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// Request URL.
    pub url: Url,

    /// Request method.
    pub method: Method,
}

impl FetchEvent {
    /// A GET navigation/resource request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
        }
    }

    /// A request with an explicit method.
    pub fn new(method: Method, url: Url) -> Self {
        Self { url, method }
    }
}

/// The response handed back to the requesting page.
#[derive(Debug, Clone)]
pub struct ServedResponse {
    /// Canonical URL the response is served under.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Whether the response came from the durable cache.
    pub from_cache: bool,
}

impl ServedResponse {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            url: entry.url.clone(),
            status: entry.status,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            from_cache: true,
        }
    }

    fn from_network(url: &Url, response: &Response) -> Self {
        Self {
            url: url.to_string(),
            status: response.status.as_u16(),
            headers: response
                .headers
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect(),
            body: response.body.to_vec(),
            from_cache: false,
        }
    }
}

impl ShellWorker {
    /// Handle an intercepted request.
    ///
    /// `Ok(None)` means the browser's default network handling should take
    /// over: non-GET methods, cross-origin URLs, and anything not in the
    /// resource manifest. An `Err` with no cached fallback is surfaced to
    /// the page as a failed request.
    pub async fn handle_fetch(&self, event: &FetchEvent) -> Result<Option<ServedResponse>> {
        if event.method != Method::GET {
            return Ok(None);
        }

        let cfg = &self.config;
        let Some(key) = manifest::request_key(&cfg.origin, &event.url) else {
            return Ok(None);
        };
        if !cfg.manifest.contains(&key) {
            trace!(url = %event.url, "not a build artifact; passing through");
            return Ok(None);
        }

        let canonical = manifest::resource_url(&cfg.origin, &key)?;
        if key == ROOT_KEY {
            // Freshness matters most for the entry document.
            self.online_first(&canonical).await.map(Some)
        } else {
            self.cache_first(&canonical).await.map(Some)
        }
    }

    async fn cache_first(&self, url: &Url) -> Result<ServedResponse> {
        {
            let caches = self.caches.read().await;
            if let Some(entry) = caches
                .get(&self.config.content_cache)
                .and_then(|cache| cache.match_url(url.as_str()))
            {
                trace!(url = %url, "cache hit");
                return Ok(ServedResponse::from_entry(entry));
            }
        }

        // Miss: fetch, then lazily populate on success. Two racing misses
        // may both fetch and both write; the overwrite is idempotent since
        // content is fingerprint-addressed.
        let response = self.fetcher.fetch(Request::get(url.clone())).await?;
        if response.ok() {
            let entry = CacheEntry::snapshot(url, &response);
            self.caches
                .write()
                .await
                .open(&self.config.content_cache)
                .put(entry);
        }
        Ok(ServedResponse::from_network(url, &response))
    }

    async fn online_first(&self, url: &Url) -> Result<ServedResponse> {
        match self.fetcher.fetch(Request::get(url.clone())).await {
            Ok(response) => {
                let entry = CacheEntry::snapshot(url, &response);
                self.caches
                    .write()
                    .await
                    .open(&self.config.content_cache)
                    .put(entry);
                Ok(ServedResponse::from_network(url, &response))
            }
            Err(err) => {
                let caches = self.caches.read().await;
                if let Some(entry) = caches
                    .get(&self.config.content_cache)
                    .and_then(|cache| cache.match_url(url.as_str()))
                {
                    debug!(url = %url, "network failed; serving entry document from cache");
                    return Ok(ServedResponse::from_entry(entry));
                }
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use crate::clients::ClientRegistry;
    use crate::lifecycle::{WorkerConfig, DEFAULT_CONTENT_CACHE};
    use crate::manifest::ResourceManifest;
    use crate::testutil::ScriptedFetcher;
    use std::sync::Arc;

    fn worker(fetcher: Arc<ScriptedFetcher>) -> ShellWorker {
        let origin = Url::parse("https://app.example.com").unwrap();
        let config = WorkerConfig::new(
            origin,
            ResourceManifest::from_entries([
                ("/", "aaa"),
                ("index.html", "aaa"),
                ("main.js", "bbb"),
            ]),
            ["main.js", "index.html"],
        );
        ShellWorker::new(
            config,
            fetcher,
            CacheStorage::new().shared(),
            ClientRegistry::new().shared(),
        )
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_non_get_passes_through() {
        let worker = worker(ScriptedFetcher::new());
        let event = FetchEvent::new(Method::POST, url("https://app.example.com/main.js"));
        assert!(worker.handle_fetch(&event).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_key_passes_through() {
        let worker = worker(ScriptedFetcher::new());
        let event = FetchEvent::get(url("https://app.example.com/api/posts"));
        assert!(worker.handle_fetch(&event).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cross_origin_passes_through() {
        let worker = worker(ScriptedFetcher::new());
        let event = FetchEvent::get(url("https://cdn.example.net/main.js"));
        assert!(worker.handle_fetch(&event).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_first_lazily_populates() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("https://app.example.com/main.js", b"js-v1");
        let worker = worker(fetcher.clone());
        let event = FetchEvent::get(url("https://app.example.com/main.js"));

        let first = worker.handle_fetch(&event).await.unwrap().unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.body, b"js-v1".to_vec());

        let second = worker.handle_fetch(&event).await.unwrap().unwrap();
        assert!(second.from_cache);
        assert_eq!(fetcher.fetches(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_http_errors() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve_status("https://app.example.com/main.js", 500, b"boom");
        let worker = worker(fetcher.clone());
        let event = FetchEvent::get(url("https://app.example.com/main.js"));

        let served = worker.handle_fetch(&event).await.unwrap().unwrap();
        assert_eq!(served.status, 500);

        let caches = worker.caches.read().await;
        assert!(caches.get(DEFAULT_CONTENT_CACHE).is_none());
    }

    #[tokio::test]
    async fn test_cache_first_miss_with_network_failure_propagates() {
        let fetcher = ScriptedFetcher::new();
        fetcher.fail("https://app.example.com/main.js");
        let worker = worker(fetcher);
        let event = FetchEvent::get(url("https://app.example.com/main.js"));

        assert!(worker.handle_fetch(&event).await.is_err());
    }

    #[tokio::test]
    async fn test_entry_document_is_online_first() {
        let fetcher = ScriptedFetcher::new();
        fetcher.serve("https://app.example.com/", b"fresh");
        let worker = worker(fetcher.clone());

        // Seed a stale cached copy.
        worker
            .caches
            .write()
            .await
            .open(DEFAULT_CONTENT_CACHE)
            .put(CacheEntry::new("https://app.example.com/", b"stale".to_vec()));

        let event = FetchEvent::get(url("https://app.example.com/"));
        let served = worker.handle_fetch(&event).await.unwrap().unwrap();

        assert!(!served.from_cache);
        assert_eq!(served.body, b"fresh".to_vec());
        assert_eq!(fetcher.fetches(), 1);
    }

    #[tokio::test]
    async fn test_entry_document_falls_back_to_cache() {
        let fetcher = ScriptedFetcher::new();
        fetcher.fail("https://app.example.com/");
        let worker = worker(fetcher);

        worker
            .caches
            .write()
            .await
            .open(DEFAULT_CONTENT_CACHE)
            .put(CacheEntry::new(
                "https://app.example.com/",
                b"cached".to_vec(),
            ));

        let event = FetchEvent::get(url("https://app.example.com/"));
        let served = worker.handle_fetch(&event).await.unwrap().unwrap();

        assert!(served.from_cache);
        assert_eq!(served.body, b"cached".to_vec());
    }

    #[tokio::test]
    async fn test_entry_document_failure_without_cache_propagates() {
        let fetcher = ScriptedFetcher::new();
        fetcher.fail("https://app.example.com/");
        let worker = worker(fetcher);

        let event = FetchEvent::get(url("https://app.example.com/"));
        assert!(worker.handle_fetch(&event).await.is_err());
    }
}
