//! Worker lifecycle: install, activate, commands.
//!
//! Install downloads the core shell into the staging namespace with
//! cache-bypassing reload fetches, all-or-nothing. Activate reconciles the
//! durable namespace against the committed manifest record, copies the
//! staged shell in, and commits the new manifest. Any activation error
//! drops every namespace: a half-migrated cache is worse than no cache.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use appshell_net::{CacheMode, Fetcher, Request};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{CacheEntry, SharedCaches};
use crate::clients::SharedClients;
use crate::manifest::{self, ResourceManifest};
use crate::{Result, WorkerError};

/// Default name of the transient staging namespace.
pub const DEFAULT_STAGING_CACHE: &str = "appshell-temp-cache";

/// Default name of the durable content namespace.
pub const DEFAULT_CONTENT_CACHE: &str = "appshell-content-cache";

/// Default name of the metadata namespace.
pub const DEFAULT_METADATA_CACHE: &str = "appshell-manifest";

/// Fixed key of the committed manifest record in the metadata namespace.
pub const MANIFEST_RECORD_KEY: &str = "manifest";

/// Unique identifier for a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Allocate the next id.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sw-{}", self.0)
    }
}

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Loaded, nothing run yet.
    #[default]
    Parsed,
    /// Install event in flight.
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Activate event in flight.
    Activating,
    /// Active and serving fetches.
    Activated,
    /// Superseded by a newer version.
    Redundant,
}

/// Commands accepted on the external message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Promote a worker stuck in the waiting phase immediately.
    SkipWaiting,
    /// Fetch every manifest entry still missing from the durable cache.
    DownloadOffline,
}

/// Per-version worker configuration, injected at construction.
///
/// The manifest and core shell list are build output; the namespace names
/// default to the well-known AppShell names.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Origin the worker serves.
    pub origin: Url,
    /// This build's resource manifest.
    pub manifest: ResourceManifest,
    /// Ordered shell keys downloaded during install. Must be manifest keys.
    pub core_shell: Vec<String>,
    /// Staging namespace name.
    pub staging_cache: String,
    /// Durable content namespace name.
    pub content_cache: String,
    /// Metadata namespace name.
    pub metadata_cache: String,
}

impl WorkerConfig {
    /// Create a configuration with the default namespace names.
    pub fn new(
        origin: Url,
        manifest: ResourceManifest,
        core_shell: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            origin,
            manifest,
            core_shell: core_shell.into_iter().map(Into::into).collect(),
            staging_cache: DEFAULT_STAGING_CACHE.to_string(),
            content_cache: DEFAULT_CONTENT_CACHE.to_string(),
            metadata_cache: DEFAULT_METADATA_CACHE.to_string(),
        }
    }
}

/// One worker version: the injected context every handler runs against.
///
/// The cache namespaces, client registry, and fetcher are shared handles;
/// successive worker versions of the same scope receive the same handles,
/// which is what lets cached content survive upgrades.
pub struct ShellWorker {
    pub(crate) id: WorkerId,
    pub(crate) config: WorkerConfig,
    pub(crate) caches: SharedCaches,
    pub(crate) clients: SharedClients,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
}

impl ShellWorker {
    /// Create a worker for one build.
    pub fn new(
        config: WorkerConfig,
        fetcher: Arc<dyn Fetcher>,
        caches: SharedCaches,
        clients: SharedClients,
    ) -> Self {
        Self {
            id: WorkerId::next(),
            config,
            caches,
            clients,
            fetcher,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        }
    }

    /// This worker's id.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// This worker's configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Whether the worker asked to bypass the waiting phase.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Relaxed)
    }

    /// Mark this worker as superseded by a newer version.
    pub async fn retire(&self) {
        self.set_state(WorkerState::Redundant).await;
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
    }

    /// Install: download the whole core shell into staging, all-or-nothing.
    ///
    /// On failure the worker stays uninstalled and the platform is expected
    /// to retry the install event later.
    pub async fn handle_install(&self) -> Result<()> {
        self.set_state(WorkerState::Installing).await;
        // A new version never waits behind a still-activating one.
        self.skip_waiting.store(true, Ordering::Relaxed);
        info!(worker = %self.id, shell = self.config.core_shell.len(), "installing core shell");

        match self.install_inner().await {
            Ok(()) => {
                self.set_state(WorkerState::Installed).await;
                info!(worker = %self.id, "install complete");
                Ok(())
            }
            Err(err) => {
                warn!(worker = %self.id, error = %err, "install failed");
                self.set_state(WorkerState::Parsed).await;
                Err(err)
            }
        }
    }

    async fn install_inner(&self) -> Result<()> {
        let cfg = &self.config;
        let mut staged = Vec::with_capacity(cfg.core_shell.len());

        for key in &cfg.core_shell {
            if !cfg.manifest.contains(key) {
                return Err(WorkerError::UnknownShellKey(key.clone()));
            }
            let url = manifest::resource_url(&cfg.origin, key)?;
            let request = Request::get(url.clone()).cache_mode(CacheMode::Reload);
            let response = self.fetcher.fetch(request).await?;
            if !response.ok() {
                return Err(WorkerError::HttpStatus {
                    key: key.clone(),
                    status: response.status.as_u16(),
                });
            }
            staged.push(CacheEntry::snapshot(&url, &response));
        }

        // Commit the shell set in one step; a partial shell is never staged.
        let mut caches = self.caches.write().await;
        let staging = caches.open(&cfg.staging_cache);
        for entry in staged {
            staging.put(entry);
        }
        Ok(())
    }

    /// Activate: migrate the durable namespace to this build's manifest.
    ///
    /// Errors never escape; they reset every namespace instead, leaving the
    /// worker cacheless but the pages servable via plain network.
    pub async fn handle_activate(&self) {
        self.set_state(WorkerState::Activating).await;

        match self.activate_inner().await {
            Ok(claimed) => {
                info!(worker = %self.id, clients = claimed, "activated");
            }
            Err(err) => {
                error!(worker = %self.id, error = %err, "activation failed; dropping all cache namespaces");
                self.teardown().await;
            }
        }

        self.set_state(WorkerState::Activated).await;
    }

    async fn activate_inner(&self) -> Result<usize> {
        let cfg = &self.config;
        {
            let mut caches = self.caches.write().await;

            let committed = caches
                .open(&cfg.metadata_cache)
                .match_url(MANIFEST_RECORD_KEY)
                .map(|record| ResourceManifest::from_json(&record.body))
                .transpose()?;

            match committed {
                None => {
                    // First activation ever (or a crash wiped the record):
                    // only the staged shell survives.
                    caches.delete(&cfg.content_cache);
                    let staged: Vec<CacheEntry> =
                        caches.open(&cfg.staging_cache).entries().cloned().collect();
                    let content = caches.open(&cfg.content_cache);
                    for entry in staged {
                        content.put(entry);
                    }
                    debug!(worker = %self.id, "no committed manifest; bootstrapped durable cache");
                }
                Some(old_manifest) => {
                    // Sweep stale entries first so nothing left behind can
                    // shadow the fresh shell files copied in afterwards.
                    let new_manifest = &cfg.manifest;
                    let content = caches.open(&cfg.content_cache);
                    let mut stale = Vec::new();
                    for url in content.urls() {
                        let unchanged = manifest::entry_key(&cfg.origin, &url)
                            .map(|key| {
                                new_manifest.fingerprint(&key).is_some()
                                    && new_manifest.fingerprint(&key)
                                        == old_manifest.fingerprint(&key)
                            })
                            .unwrap_or(false);
                        if !unchanged {
                            stale.push(url);
                        }
                    }
                    for url in &stale {
                        content.delete(url);
                    }

                    // Staged shell copies are guaranteed fresh and overwrite
                    // whatever the sweep preserved for those keys.
                    let staged: Vec<CacheEntry> =
                        caches.open(&cfg.staging_cache).entries().cloned().collect();
                    let content = caches.open(&cfg.content_cache);
                    for entry in staged {
                        content.put(entry);
                    }
                    debug!(worker = %self.id, dropped = stale.len(), "migrated durable cache");
                }
            }

            caches.delete(&cfg.staging_cache);

            // Commit this build's manifest to make the next upgrade cheap.
            let record = CacheEntry::new(MANIFEST_RECORD_KEY, cfg.manifest.to_json()?);
            caches.open(&cfg.metadata_cache).put(record);
        }

        // Claim open pages so caching applies from first launch.
        Ok(self.claim().await)
    }

    async fn teardown(&self) {
        let cfg = &self.config;
        let mut caches = self.caches.write().await;
        caches.delete(&cfg.content_cache);
        caches.delete(&cfg.staging_cache);
        caches.delete(&cfg.metadata_cache);
    }

    async fn claim(&self) -> usize {
        self.clients.write().await.claim(self.id)
    }

    /// Handle a command from the external message channel.
    pub async fn handle_message(&self, command: Command) {
        match command {
            Command::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::Relaxed);
                if self.state().await == WorkerState::Installed {
                    self.handle_activate().await;
                }
            }
            Command::DownloadOffline => {
                if let Err(err) = self.download_offline().await {
                    warn!(worker = %self.id, error = %err, "offline download failed");
                }
            }
        }
    }
}
