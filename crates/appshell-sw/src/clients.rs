//! Controlled pages.
//!
//! A minimal client registry: enough to express "claim control of every
//! open page immediately" at the end of activation, without waiting for a
//! refresh.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::RwLock;
use url::Url;

use crate::lifecycle::WorkerId;

/// Client registry shared across worker versions.
pub type SharedClients = Arc<RwLock<ClientRegistry>>;

/// An open page that a worker may control.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Page URL.
    pub url: Url,

    /// Worker currently controlling this page, if any.
    pub controller: Option<WorkerId>,
}

impl Client {
    /// Create an uncontrolled client.
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            controller: None,
        }
    }
}

/// Registry of open pages.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the registry in the shared handle handed to workers.
    pub fn shared(self) -> SharedClients {
        Arc::new(RwLock::new(self))
    }

    /// Register a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Take control of every client. Returns how many were claimed.
    pub fn claim(&mut self, worker: WorkerId) -> usize {
        for client in self.clients.values_mut() {
            client.controller = Some(worker);
        }
        self.clients.len()
    }

    /// Number of clients controlled by the given worker.
    pub fn controlled_by(&self, worker: WorkerId) -> usize {
        self.clients
            .values()
            .filter(|c| c.controller == Some(worker))
            .count()
    }
}
