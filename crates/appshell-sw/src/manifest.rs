//! Resource manifest and logical key normalization.
//!
//! The manifest is build output injected at worker construction: a mapping
//! from logical resource key to an opaque content fingerprint. The sentinel
//! key `/` stands for the application entry document.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Result, WorkerError};

/// Sentinel key for the application entry document.
pub const ROOT_KEY: &str = "/";

/// Build-time mapping of logical resource key to content fingerprint.
///
/// Immutable for a worker version. Fingerprints are opaque strings; only
/// equality matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceManifest {
    entries: HashMap<String, String>,
}

impl ResourceManifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from key/fingerprint pairs.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Fingerprint for a key, if the key is a known build artifact.
    pub fn fingerprint(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Check whether a key is a known build artifact.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over the logical keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize for the committed manifest record.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a committed manifest record.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Origin serialized without a trailing slash, e.g. `https://example.com`.
fn origin_prefix(origin: &Url) -> String {
    origin.origin().ascii_serialization()
}

/// Logical key for an incoming request URL.
///
/// Strips the origin prefix and a `?v=` cache-busting suffix. The bare
/// origin, an in-page fragment navigation, and an empty remainder all
/// normalize to [`ROOT_KEY`]. Cross-origin URLs have no key.
pub fn request_key(origin: &Url, url: &Url) -> Option<String> {
    if url.origin() != origin.origin() {
        return None;
    }
    let prefix = origin_prefix(origin);
    let raw = url.as_str();
    if raw == prefix || raw.starts_with(&format!("{prefix}/#")) {
        return Some(ROOT_KEY.to_string());
    }
    let mut key = raw.get(prefix.len() + 1..).unwrap_or("");
    if let Some((stripped, _)) = key.split_once("?v=") {
        key = stripped;
    }
    if key.is_empty() {
        Some(ROOT_KEY.to_string())
    } else {
        Some(key.to_string())
    }
}

/// Logical key for a URL already held in a cache namespace.
///
/// Cached URLs are stored canonical, so no query stripping happens here.
pub fn entry_key(origin: &Url, url: &str) -> Option<String> {
    let prefix = origin_prefix(origin);
    if !url.starts_with(&prefix) {
        return None;
    }
    let key = url.get(prefix.len() + 1..).unwrap_or("");
    if key.is_empty() {
        Some(ROOT_KEY.to_string())
    } else {
        Some(key.to_string())
    }
}

/// Canonical URL for a manifest key.
pub fn resource_url(origin: &Url, key: &str) -> Result<Url> {
    if key == ROOT_KEY {
        return Ok(origin.clone());
    }
    origin
        .join(key)
        .map_err(|_| WorkerError::InvalidKey(key.to_string()))
}
