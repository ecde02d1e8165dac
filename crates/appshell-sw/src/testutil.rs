//! Scripted fetcher for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hashbrown::HashMap;

use appshell_net::{Fetcher, NetError, Request, Response};

#[derive(Debug, Clone)]
enum Script {
    Ok { status: u16, body: Vec<u8> },
    Fail,
}

/// A [`Fetcher`] that serves scripted responses per URL and counts fetches.
#[derive(Debug, Default)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    fetches: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve a 200 response with the given body.
    pub(crate) fn serve(&self, url: &str, body: &[u8]) {
        self.serve_status(url, 200, body);
    }

    /// Serve a response with an explicit status.
    pub(crate) fn serve_status(&self, url: &str, status: u16, body: &[u8]) {
        self.scripts.lock().unwrap().insert(
            url.to_string(),
            Script::Ok {
                status,
                body: body.to_vec(),
            },
        );
    }

    /// Make fetches for this URL fail at the network level.
    pub(crate) fn fail(&self, url: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), Script::Fail);
    }

    /// Total number of fetch calls seen.
    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, NetError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned();
        match script {
            Some(Script::Ok { status, body }) => Ok(Response {
                url: request.url,
                status: http::StatusCode::from_u16(status).unwrap(),
                headers: http::HeaderMap::new(),
                body: bytes::Bytes::from(body),
            }),
            Some(Script::Fail) => Err(NetError::RequestFailed(format!(
                "scripted network failure for {}",
                request.url
            ))),
            None => Err(NetError::RequestFailed(format!(
                "no script for {}",
                request.url
            ))),
        }
    }
}
