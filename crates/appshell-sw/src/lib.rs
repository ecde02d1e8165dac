//! # AppShell Service Worker
//!
//! Versioned application-shell cache worker with manifest-diff migration.
//!
//! A [`ShellWorker`] owns one build's resource manifest and drives the cache
//! lifecycle for it: install downloads the core shell into a staging
//! namespace, activate migrates the durable namespace against the previously
//! committed manifest, and the fetch handler serves known resources
//! cache-first (online-first for the entry document). An explicit command
//! can populate every manifest entry for full offline coverage.
//!
//! ## Architecture
//!
//! ```text
//! ShellWorker (per worker version)
//!     │ install   → staging namespace        (core shell, reload fetches)
//!     │ activate  → durable namespace        (diff sweep, staged copy-in)
//!     │            metadata namespace        (single committed manifest record)
//!     │ fetch     → cache-first / online-first
//!     └ message   → skip-waiting / download-offline
//!
//! CacheStorage (shared across worker versions)
//!     └── Cache
//!             └── URL → CacheEntry
//! ```
//!
//! The cache namespaces, the client registry, and the network fetcher are
//! injected handles, shared by every worker version of the same scope.

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod fetch;
pub mod lifecycle;
pub mod manifest;
pub mod offline;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{Cache, CacheEntry, CacheStorage, SharedCaches};
pub use clients::{Client, ClientRegistry, SharedClients};
pub use fetch::{FetchEvent, ServedResponse};
pub use lifecycle::{Command, ShellWorker, WorkerConfig, WorkerId, WorkerState};
pub use manifest::ResourceManifest;

pub use appshell_net::{Fetcher, NetError};

/// Errors that can occur in worker operations.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The network itself failed.
    #[error("network error: {0}")]
    Network(#[from] NetError),

    /// A required resource came back with a non-success status.
    #[error("fetch for {key:?} returned HTTP {status}")]
    HttpStatus { key: String, status: u16 },

    /// A core shell key is not present in the resource manifest.
    #[error("core shell key {0:?} is not in the resource manifest")]
    UnknownShellKey(String),

    /// A manifest key could not be resolved against the origin.
    #[error("invalid resource key {0:?}")]
    InvalidKey(String),

    /// The committed manifest record could not be decoded.
    #[error("committed manifest record is corrupt: {0}")]
    CorruptManifest(#[from] serde_json::Error),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
