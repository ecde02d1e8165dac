//! On-demand full-offline population.
//!
//! Incidental browsing only caches what pages actually request. The
//! download-offline command closes the gap: it fetches every manifest
//! entry still missing from the durable namespace.

use hashbrown::HashSet;
use tracing::{debug, info};

use appshell_net::Request;

use crate::cache::CacheEntry;
use crate::lifecycle::ShellWorker;
use crate::manifest;
use crate::{Result, WorkerError};

impl ShellWorker {
    /// Fetch and store every manifest entry absent from the durable cache.
    ///
    /// Idempotent: once everything is cached, further calls fetch nothing.
    /// Returns how many resources were downloaded.
    pub async fn download_offline(&self) -> Result<usize> {
        let cfg = &self.config;

        let cached: HashSet<String> = {
            let caches = self.caches.read().await;
            caches
                .get(&cfg.content_cache)
                .map(|cache| {
                    cache
                        .urls()
                        .iter()
                        .filter_map(|url| manifest::entry_key(&cfg.origin, url))
                        .collect()
                })
                .unwrap_or_default()
        };

        let missing: Vec<&str> = cfg
            .manifest
            .keys()
            .filter(|key| !cached.contains(*key))
            .collect();

        if missing.is_empty() {
            debug!(worker = %self.id, "durable cache already covers the manifest");
            return Ok(0);
        }

        let mut fetched = Vec::with_capacity(missing.len());
        for key in missing {
            let url = manifest::resource_url(&cfg.origin, key)?;
            let response = self.fetcher.fetch(Request::get(url.clone())).await?;
            if !response.ok() {
                return Err(WorkerError::HttpStatus {
                    key: key.to_string(),
                    status: response.status.as_u16(),
                });
            }
            fetched.push(CacheEntry::snapshot(&url, &response));
        }

        let count = fetched.len();
        let mut caches = self.caches.write().await;
        let content = caches.open(&cfg.content_cache);
        for entry in fetched {
            content.put(entry);
        }

        info!(worker = %self.id, downloaded = count, "offline population complete");
        Ok(count)
    }
}
