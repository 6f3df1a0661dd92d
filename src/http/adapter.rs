//! Transport adapter: the `http` adapter kind
//!
//! Turns a `SendRequest` into one raw transport call and resolves to a
//! `ResponseEnvelope`, or a `NormalizedError` on failure. Failures never
//! surface synchronously; everything flows through the returned future.

use super::abort::AbortHandle;
use super::envelope::{build_envelope, RequestInfo, ResponseBody, ResponseEnvelope, TransportHandle};
use super::request::{resolve_call_settings, SendRequest, TransportSettings};
use super::transport::{RawRequest, RawTransport};
use crate::error::{ErrorKind, NormalizedError};
use crate::registry::{AdapterRegistry, RecompositionEvent, RegistryError};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};
use tracing::debug;
use uuid::Uuid;

type SendFuture = Pin<Box<dyn Future<Output = Result<ResponseEnvelope, NormalizedError>> + Send>>;

/// A send in progress.
///
/// Await it for the outcome; call `abort()` to request cancellation while it
/// runs. After completion `abort()` is a no-op.
pub struct InFlight {
    abort: AbortHandle,
    future: SendFuture,
}

impl InFlight {
    pub fn new(abort: AbortHandle, future: SendFuture) -> Self {
        Self { abort, future }
    }

    /// Request cancellation. Returns `false` if the call already completed.
    pub fn abort(&self) -> bool {
        self.abort.abort()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

impl Future for InFlight {
    type Output = Result<ResponseEnvelope, NormalizedError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight").field("abort", &self.abort).finish()
    }
}

/// The contract transport adapters implement.
pub trait HttpAdapter: Send + Sync {
    /// Registered name of this implementation.
    fn name(&self) -> &str;

    /// Bind collaborators from the registry. Called once after construction.
    fn initialize(&self, _registry: &AdapterRegistry) -> Result<(), RegistryError> {
        Ok(())
    }

    /// React to a different adapter becoming default for some kind.
    fn check_for_recomposition(&self, _event: &RecompositionEvent, _registry: &AdapterRegistry) {}

    /// Snapshot of the adapter-level default settings.
    fn default_settings(&self) -> TransportSettings;

    /// Replace the adapter-level default settings. Calls already issued keep
    /// the snapshot they started with.
    fn configure(&self, settings: TransportSettings);

    /// Issue one call. Never retries.
    fn send(&self, request: SendRequest) -> InFlight;
}

/// `HttpAdapter` over any `RawTransport`.
pub struct TransportAdapter {
    name: String,
    transport: Arc<dyn RawTransport>,
    defaults: RwLock<TransportSettings>,
}

impl TransportAdapter {
    pub fn new(name: impl Into<String>, transport: Arc<dyn RawTransport>) -> Self {
        Self {
            name: name.into(),
            transport,
            defaults: RwLock::new(TransportSettings::default()),
        }
    }

    pub fn with_settings(self, settings: TransportSettings) -> Self {
        self.configure(settings);
        self
    }
}

impl HttpAdapter for TransportAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_settings(&self) -> TransportSettings {
        self.defaults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn configure(&self, settings: TransportSettings) {
        *self.defaults.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    fn send(&self, request: SendRequest) -> InFlight {
        // Snapshot now: configuration changes must not reach an issued call.
        let call = resolve_call_settings(&self.default_settings(), &request);
        let abort = AbortHandle::new();
        let transport = self.transport.clone();
        let future = dispatch(transport, request, call, abort.clone());
        InFlight::new(abort, Box::pin(future))
    }
}

async fn dispatch(
    transport: Arc<dyn RawTransport>,
    request: SendRequest,
    call: Result<super::request::CallSettings, serde_json::Error>,
    abort: AbortHandle,
) -> Result<ResponseEnvelope, NormalizedError> {
    let call = match call {
        Ok(call) => call,
        Err(e) => {
            abort.disarm();
            return Err(NormalizedError::new(
                ErrorKind::InterpretationError,
                format!("unable to encode {} payload: {}", request.operation(), e),
            ));
        }
    };

    let info = RequestInfo {
        id: Uuid::new_v4(),
        method: call.method,
        url: call.url.clone(),
    };
    let data_type = call.data_type;
    let raw = RawRequest::from(call);

    debug!(
        request_id = %info.id,
        operation = %request.operation(),
        method = %info.method,
        url = %info.url,
        "sending request"
    );

    let outcome = tokio::select! {
        biased;
        _ = abort.requested() => Err(super::transport::TransportError::Aborted),
        result = transport.issue(&raw) => result,
    };

    match outcome {
        Ok(response) if response.is_success() => {
            debug!(request_id = %info.id, status = response.status_code, "request succeeded");
            let handle = TransportHandle {
                request: info,
                status_code: response.status_code,
                status_text: response.status_text,
                raw_headers: Some(response.raw_headers),
                abort,
            };
            let data = ResponseBody::decode(response.body, data_type);
            Ok(build_envelope(data, "success", Some(handle)))
        }
        Ok(response) => {
            debug!(request_id = %info.id, status = response.status_code, "request failed");
            let handle = TransportHandle {
                request: info,
                status_code: response.status_code,
                status_text: response.status_text,
                raw_headers: Some(response.raw_headers),
                abort,
            };
            let envelope = build_envelope(ResponseBody::from_text(response.body), "error", Some(handle));
            Err(NormalizedError::from_envelope(&envelope))
        }
        Err(e) => {
            debug!(request_id = %info.id, error = %e, "transport failure");
            let handle = TransportHandle {
                request: info,
                status_code: 0,
                status_text: String::new(),
                raw_headers: None,
                abort,
            };
            let envelope = build_envelope(ResponseBody::Empty, e.status_label(), Some(handle));
            Err(NormalizedError::from_envelope(&envelope))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::MockTransport;
    use crate::http::request::{DataType, Method};
    use crate::http::transport::{RawResponse, TransportError};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn adapter(mock: MockTransport) -> (TransportAdapter, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        (TransportAdapter::new("mock", mock.clone()), mock)
    }

    #[tokio::test]
    async fn success_resolves_to_envelope() {
        let (http, _) = adapter(
            MockTransport::new().with_response(
                "http://x/api/Customers",
                RawResponse::ok(r#"[{"id":1}]"#).with_header("X-InlineCount", "1"),
            ),
        );

        let envelope = http.send(SendRequest::query("http://x/api/Customers")).await.unwrap();
        assert_eq!(envelope.status(), "success");
        assert_eq!(envelope.status_code(), 200);
        assert_eq!(envelope.data().as_json().unwrap().into_owned(), json!([{"id": 1}]));
        assert_eq!(envelope.header("x-inlinecount"), Some("1"));
        assert!(envelope.adapter_exports().abort.is_disarmed());
    }

    #[tokio::test]
    async fn non_success_status_rejects_with_normalized_error() {
        let (http, _) = adapter(MockTransport::new().with_response(
            "http://x/api/Orders",
            RawResponse::new(500, "Internal Server Error", r#"{"Message":"boom"}"#),
        ));

        let err = http.send(SendRequest::query("http://x/api/Orders")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportFailure);
        assert_eq!(err.status, 500);
        assert_eq!(err.message, "boom");
    }

    #[tokio::test]
    async fn transport_failure_uses_label() {
        let (http, _) = adapter(
            MockTransport::new().with_failure("http://x/slow", TransportError::Timeout("1s".into())),
        );
        let err = http.send(SendRequest::query("http://x/slow")).await.unwrap_err();
        assert_eq!(err.message, "timeout");
        assert_eq!(err.status, 0);
    }

    #[tokio::test]
    async fn save_posts_json_payload() {
        let (http, mock) = adapter(MockTransport::new().with_response("http://x/api/SaveChanges", RawResponse::ok("{}")));

        http.send(SendRequest::save_changes("http://x/api/SaveChanges", json!({"entities": [1]})))
            .await
            .unwrap();

        let sent = mock.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, Method::Post);
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"entities":[1]}"#));
        assert_eq!(sent[0].headers["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn text_data_type_keeps_raw_body() {
        let (http, _) = adapter(MockTransport::new().with_response("http://x/raw", RawResponse::ok("plain")));
        let request = SendRequest::query("http://x/raw")
            .with_settings(TransportSettings::new().with_data_type(DataType::Text));
        let envelope = http.send(request).await.unwrap();
        assert_eq!(envelope.data(), &ResponseBody::Text("plain".to_string()));
    }

    #[tokio::test]
    async fn abort_in_flight_rejects() {
        let (http, _) = adapter(MockTransport::new().with_never("http://x/hang"));

        let call = http.send(SendRequest::query("http://x/hang"));
        let handle = call.abort_handle();
        let task = tokio::spawn(call);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.abort());

        let err = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("abort should complete the call")
            .unwrap()
            .unwrap_err();
        assert_eq!(err.message, "abort");
        assert!(handle.is_disarmed());
    }

    #[tokio::test]
    async fn late_abort_is_noop_and_isolated() {
        let gate = Arc::new(Notify::new());
        let (http, _) = adapter(
            MockTransport::new()
                .with_response("http://x/fast", RawResponse::ok("1"))
                .with_gated("http://x/gated", RawResponse::ok("2"), gate.clone()),
        );

        let first = http.send(SendRequest::query("http://x/fast"));
        let first_handle = first.abort_handle();
        first.await.unwrap();

        let second = tokio::spawn(http.send(SendRequest::query("http://x/gated")));
        assert!(!first_handle.abort());
        gate.notify_one();

        let envelope = second.await.unwrap().unwrap();
        assert_eq!(envelope.data().as_json().unwrap().into_owned(), json!(2));
    }

    #[tokio::test]
    async fn configuration_changes_do_not_reach_issued_calls() {
        let gate = Arc::new(Notify::new());
        let (http, mock) = adapter(MockTransport::new().with_gated("http://x/q", RawResponse::ok("[]"), gate.clone()));
        http.configure(TransportSettings::new().with_header("X-Version", "1"));

        let call = tokio::spawn(http.send(SendRequest::query("http://x/q")));
        http.configure(TransportSettings::new().with_header("X-Version", "2"));
        gate.notify_one();
        call.await.unwrap().unwrap();

        assert_eq!(mock.requests()[0].headers["X-Version"], "1");
        assert_eq!(http.default_settings().headers["X-Version"], "2");
    }
}
