//! Mock transport for testing: returns preconfigured responses per URL.

use super::transport::{RawRequest, RawResponse, RawTransport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

#[derive(Clone)]
enum Route {
    Respond(RawResponse),
    Fail(TransportError),
    /// Wait for the gate before responding.
    Gated(RawResponse, Arc<Notify>),
    /// Never completes; only an abort ends the call.
    Never,
}

/// A `RawTransport` that answers from a fixed routing table.
///
/// Unrouted URLs answer `404 Not Found`. Every issued request is recorded.
#[derive(Default)]
pub struct MockTransport {
    routes: HashMap<String, Route>,
    requests: Mutex<Vec<RawRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, url: impl Into<String>, response: RawResponse) -> Self {
        self.routes.insert(url.into(), Route::Respond(response));
        self
    }

    /// Respond with a `200 OK` JSON body.
    pub fn with_json(self, url: impl Into<String>, body: &serde_json::Value) -> Self {
        self.with_response(url, RawResponse::ok(body.to_string()).with_header("Content-Type", "application/json"))
    }

    pub fn with_failure(mut self, url: impl Into<String>, error: TransportError) -> Self {
        self.routes.insert(url.into(), Route::Fail(error));
        self
    }

    /// Hold the call until `gate` is notified, then respond.
    pub fn with_gated(mut self, url: impl Into<String>, response: RawResponse, gate: Arc<Notify>) -> Self {
        self.routes.insert(url.into(), Route::Gated(response, gate));
        self
    }

    pub fn with_never(mut self, url: impl Into<String>) -> Self {
        self.routes.insert(url.into(), Route::Never);
        self
    }

    /// Requests issued so far, in order.
    pub fn requests(&self) -> Vec<RawRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.url == url)
            .count()
    }
}

#[async_trait]
impl RawTransport for MockTransport {
    async fn issue(&self, request: &RawRequest) -> Result<RawResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        match self.routes.get(&request.url).cloned() {
            Some(Route::Respond(response)) => Ok(response),
            Some(Route::Fail(error)) => Err(error),
            Some(Route::Gated(response, gate)) => {
                gate.notified().await;
                Ok(response)
            }
            Some(Route::Never) => std::future::pending().await,
            None => Ok(RawResponse::new(404, "Not Found", "")),
        }
    }
}
