//! Named cache namespaces.
//!
//! A [`CacheStorage`] holds the named key→response stores that survive
//! worker upgrades: the transient staging namespace, the durable content
//! namespace, and the metadata namespace with the committed manifest
//! record. Entries are addressed by canonical request URL; writes are
//! last-writer-wins with no per-key locking.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Cache namespaces shared across every worker version of a scope.
pub type SharedCaches = Arc<RwLock<CacheStorage>>;

/// A cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Canonical request URL.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached-at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Create an entry with a plain body, as used for the manifest record.
    pub fn new(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            headers: HashMap::new(),
            body,
            cached_at: unix_millis(),
        }
    }

    /// Snapshot a network response (the stored "clone").
    ///
    /// Keyed by the canonical request URL, not the response URL, so a
    /// redirected response still lands under the identity it was asked for.
    pub fn snapshot(url: &url::Url, response: &appshell_net::Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: url.to_string(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cached_at: unix_millis(),
        }
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A named key→response store.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    /// Namespace name.
    pub name: String,

    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    /// Create an empty cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Look up an entry by canonical URL.
    pub fn match_url(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    /// Store an entry under its URL, replacing any previous one.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.url.clone(), entry);
    }

    /// Delete an entry. Returns whether it existed.
    pub fn delete(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    /// All cached URLs.
    pub fn urls(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterate over the entries.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The process-wide set of named caches.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap storage in the shared handle handed to workers.
    pub fn shared(self) -> SharedCaches {
        Arc::new(RwLock::new(self))
    }

    /// Open a cache, creating it if absent.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Read a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Check whether a cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache. Returns whether it existed.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Names of all caches.
    pub fn names(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }
}
