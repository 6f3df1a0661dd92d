//! WebApiDataService: the `webApi` data-service adapter
//!
//! Sends through whichever http adapter is bound (the registry default,
//! rebound on recomposition) and interprets envelopes into metadata
//! imports, query results, and save results.

use super::metadata::{metadata_url, MetadataPayload, MetadataStore};
use super::results::{parse_inline_count, MetadataFetchResult, QueryResult, SaveResponse, SaveResult};
use super::traits::{DataService, DataServiceAdapter};
use crate::error::{ErrorKind, NormalizedError};
use crate::http::{HttpAdapter, ResponseBody, ResponseEnvelope, SendRequest};
use crate::registry::{AdapterKind, AdapterRegistry, RecompositionEvent, RegistryError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Resource name used when a save names none.
pub const DEFAULT_SAVE_RESOURCE: &str = "SaveChanges";

/// Response header carrying the total row count of a paged query.
pub const INLINE_COUNT_HEADER: &str = "X-InlineCount";

const QUERY_FAILED: &str = "Query failed";
const SAVE_FAILED: &str = "Save failed";

pub struct WebApiDataService {
    http: RwLock<Option<Arc<dyn HttpAdapter>>>,
    /// Per-service lock held across the already-fetched check and import.
    import_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WebApiDataService {
    pub const NAME: &'static str = "webApi";

    /// Bound to `http` directly.
    pub fn new(http: Arc<dyn HttpAdapter>) -> Self {
        Self {
            http: RwLock::new(Some(http)),
            import_locks: DashMap::new(),
        }
    }

    /// Not yet bound; `initialize` binds the registry's default http adapter.
    pub fn unbound() -> Self {
        Self {
            http: RwLock::new(None),
            import_locks: DashMap::new(),
        }
    }

    /// Name of the currently bound http adapter.
    pub fn http_adapter_name(&self) -> Option<String> {
        self.http
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|h| h.name().to_string())
    }

    fn bind(&self, http: Arc<dyn HttpAdapter>) {
        *self.http.write().unwrap_or_else(PoisonError::into_inner) = Some(http);
    }

    fn import_lock(&self, service_name: &str) -> Arc<Mutex<()>> {
        self.import_locks
            .entry(service_name.to_string())
            .or_default()
            .clone()
    }

    fn http(&self) -> Result<Arc<dyn HttpAdapter>, NormalizedError> {
        self.http
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| NormalizedError::new(ErrorKind::Configuration, "http adapter not initialized"))
    }
}

#[async_trait]
impl DataServiceAdapter for WebApiDataService {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn initialize(&self, registry: &AdapterRegistry) -> Result<(), RegistryError> {
        let http = registry
            .http_adapter(None)
            .map_err(|e| RegistryError::InitializationFailed {
                kind: AdapterKind::DataService,
                name: Self::NAME.to_string(),
                reason: e.to_string(),
            })?;
        self.bind(http);
        Ok(())
    }

    fn check_for_recomposition(&self, event: &RecompositionEvent, registry: &AdapterRegistry) {
        if event.kind != AdapterKind::Http || !event.is_default {
            return;
        }
        match registry.http_adapter(Some(&event.name)) {
            Ok(http) => {
                info!(http = %event.name, "rebound data service to new default http adapter");
                self.bind(http);
            }
            Err(e) => warn!(http = %event.name, error = %e, "failed to rebind http adapter"),
        }
    }

    async fn fetch_metadata(
        &self,
        store: &dyn MetadataStore,
        service: &DataService,
    ) -> Result<MetadataFetchResult, NormalizedError> {
        let service_name = service.service_name.as_str();
        let url = metadata_url(service_name);
        let prefix = format!("Metadata query failed for: {}", url);

        let http = self.http().map_err(|e| e.with_prefix(&prefix))?;
        let envelope = http
            .send(SendRequest::metadata(url.clone()))
            .await
            .map_err(|e| e.with_prefix(&prefix))?;

        // Checked on arrival, not on issue: a racing fetch may have won.
        // A fetch that loses the lock waits for the winner's import to
        // finish or fail before checking.
        let lock = self.import_lock(service_name);
        let _guard = lock.lock().await;
        if store.has_metadata_for(service_name) {
            debug!(service = service_name, "metadata already fetched");
            return Ok(MetadataFetchResult::AlreadyFetched);
        }

        let metadata = match envelope.data().as_json() {
            Some(metadata) if !metadata.is_null() => metadata.into_owned(),
            _ => {
                return Err(envelope_error(&envelope, ErrorKind::UnparseableBody, "received no (parsable) data")
                    .with_prefix(&prefix))
            }
        };

        let imported = match MetadataPayload::decode(&metadata) {
            MetadataPayload::Native(payload) => store.import_metadata(payload),
            MetadataPayload::LegacySchema(schema) => store.import_legacy_schema(service_name, schema),
            MetadataPayload::Unrecognized => {
                return Err(envelope_error(
                    &envelope,
                    ErrorKind::UnrecognizedMetadataShape,
                    "unable to process returned metadata",
                )
                .with_prefix(&prefix))
            }
        };
        imported.map_err(|e| envelope_error(&envelope, ErrorKind::InterpretationError, e.to_string()).with_prefix(&prefix))?;

        // The import may have registered the service itself.
        if !store.has_metadata_for(service_name) {
            store.add_data_service(service);
        }
        info!(service = service_name, "metadata imported");

        Ok(MetadataFetchResult::Fetched(metadata))
    }

    async fn execute_query(&self, service: &DataService, query: &str) -> Result<QueryResult, NormalizedError> {
        let url = format!("{}{}", service.service_name, query);

        let http = self.http().map_err(|e| e.with_prefix(QUERY_FAILED))?;
        let envelope = http
            .send(SendRequest::query(url))
            .await
            .map_err(|e| e.with_prefix(QUERY_FAILED))?;

        interpret_query(envelope).map_err(|e| e.with_prefix(QUERY_FAILED))
    }

    async fn save_changes(
        &self,
        service: &DataService,
        resource_name: Option<&str>,
        payload: Value,
    ) -> Result<SaveResult, NormalizedError> {
        let url = format!(
            "{}{}",
            service.service_name,
            resource_name.unwrap_or(DEFAULT_SAVE_RESOURCE)
        );

        let http = self.http().map_err(|e| e.with_prefix(SAVE_FAILED))?;
        let envelope = http
            .send(SendRequest::save_changes(url, payload))
            .await
            .map_err(|e| e.with_prefix(SAVE_FAILED))?;

        let body = match envelope.data() {
            ResponseBody::Empty => Value::Null,
            data => match data.as_json() {
                Some(body) => body.into_owned(),
                None => {
                    return Err(envelope_error(&envelope, ErrorKind::UnparseableBody, "response body is not JSON")
                        .with_prefix(SAVE_FAILED))
                }
            },
        };

        match SaveResponse::decode(&body) {
            SaveResponse::ServerError(message) => {
                Err(envelope_error(&envelope, ErrorKind::ServerReportedError, message))
            }
            SaveResponse::Saved(_) => {
                let (_, adapter_exports) = envelope.into_parts();
                Ok(SaveResult { body, adapter_exports })
            }
        }
    }
}

fn interpret_query(envelope: ResponseEnvelope) -> Result<QueryResult, NormalizedError> {
    let inline_count = envelope.header(INLINE_COUNT_HEADER).and_then(|raw| {
        let count = parse_inline_count(raw);
        if count.is_none() {
            warn!(value = raw, "ignoring non-numeric inline count");
        }
        count
    });

    let results = match envelope.data() {
        ResponseBody::Json { value, .. } => value.clone(),
        ResponseBody::Text(text) => Value::String(text.clone()),
        ResponseBody::Empty => Value::Null,
        ResponseBody::Malformed { reason, .. } => {
            return Err(envelope_error(
                &envelope,
                ErrorKind::InterpretationError,
                format!("error during response processing: {}", reason),
            ))
        }
    };

    let (_, adapter_exports) = envelope.into_parts();
    Ok(QueryResult {
        results,
        inline_count,
        adapter_exports,
    })
}

/// A normalized error for an envelope that arrived but could not be used.
fn envelope_error(envelope: &ResponseEnvelope, kind: ErrorKind, message: impl Into<String>) -> NormalizedError {
    NormalizedError::from_envelope(envelope)
        .with_kind(kind)
        .with_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_service::{InMemoryMetadataStore, MetadataError};
    use crate::http::{MockTransport, RawResponse, TransportAdapter, TransportError};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SERVICE: &str = "http://x/api/";

    fn data_service(mock: MockTransport) -> (WebApiDataService, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let http = Arc::new(TransportAdapter::new("mock", mock.clone()));
        (WebApiDataService::new(http), mock)
    }

    /// Fails its first import after a delay, then imports normally.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryMetadataStore,
        attempts: AtomicUsize,
    }

    impl MetadataStore for FlakyStore {
        fn has_metadata_for(&self, service_name: &str) -> bool {
            self.inner.has_metadata_for(service_name)
        }

        fn import_metadata(&self, metadata: &Value) -> Result<(), MetadataError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(Duration::from_millis(200));
                return Err(MetadataError::Import("disk full".to_string()));
            }
            self.inner.import_metadata(metadata)
        }

        fn import_legacy_schema(&self, service_name: &str, schema: &Value) -> Result<(), MetadataError> {
            self.inner.import_legacy_schema(service_name, schema)
        }

        fn add_data_service(&self, service: &DataService) {
            self.inner.add_data_service(service)
        }
    }

    // === fetch_metadata ===

    #[tokio::test]
    async fn native_metadata_imported_and_service_registered() {
        let metadata = json!({"structuralTypeMap": {"Customer": {}}});
        let (ds, mock) = data_service(MockTransport::new().with_json("http://x/api/Metadata", &metadata));
        let store = InMemoryMetadataStore::new();

        let result = ds.fetch_metadata(&store, &DataService::new(SERVICE)).await.unwrap();

        assert_eq!(result, MetadataFetchResult::Fetched(metadata));
        assert_eq!(store.import_count(), 1);
        assert!(store.has_metadata_for(SERVICE));
        assert_eq!(mock.request_count("http://x/api/Metadata"), 1);
    }

    #[tokio::test]
    async fn legacy_schema_imported() {
        let (ds, _) = data_service(
            MockTransport::new().with_json("http://x/api/Metadata", &json!({"schema": {"namespace": "Model"}})),
        );
        let store = InMemoryMetadataStore::new();

        ds.fetch_metadata(&store, &DataService::new(SERVICE)).await.unwrap();

        assert_eq!(store.schema_for(SERVICE), Some(json!({"namespace": "Model"})));
        assert!(store.has_metadata_for(SERVICE));
    }

    #[tokio::test]
    async fn already_fetched_short_circuits_every_time() {
        let (ds, _) = data_service(
            MockTransport::new().with_json("http://x/api/Metadata", &json!({"structuralTypeMap": {}})),
        );
        let store = InMemoryMetadataStore::new();
        store.add_data_service(&DataService::new(SERVICE));

        for _ in 0..2 {
            let result = ds.fetch_metadata(&store, &DataService::new(SERVICE)).await.unwrap();
            assert!(result.is_already_fetched());
        }
        assert_eq!(store.import_count(), 0);
    }

    #[tokio::test]
    async fn unparseable_metadata_rejected() {
        let (ds, _) = data_service(
            MockTransport::new().with_response("http://x/api/Metadata", RawResponse::ok("<edmx/>")),
        );
        let err = ds
            .fetch_metadata(&InMemoryMetadataStore::new(), &DataService::new(SERVICE))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnparseableBody);
        assert_eq!(
            err.message,
            "Metadata query failed for: http://x/api/Metadata; received no (parsable) data"
        );
    }

    #[tokio::test]
    async fn unrecognized_metadata_rejected() {
        let (ds, _) = data_service(MockTransport::new().with_json("http://x/api/Metadata", &json!({"types": []})));
        let store = InMemoryMetadataStore::new();
        let err = ds.fetch_metadata(&store, &DataService::new(SERVICE)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnrecognizedMetadataShape);
        assert!(err.message.ends_with("unable to process returned metadata"));
        assert!(!store.has_metadata_for(SERVICE));
    }

    #[tokio::test]
    async fn null_metadata_is_unparseable() {
        let (ds, _) = data_service(
            MockTransport::new().with_response("http://x/api/Metadata", RawResponse::ok("null")),
        );
        let err = ds
            .fetch_metadata(&InMemoryMetadataStore::new(), &DataService::new(SERVICE))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnparseableBody);
        assert!(err.message.ends_with("received no (parsable) data"));
    }

    #[tokio::test]
    async fn failed_import_surfaces_store_error() {
        let (ds, _) = data_service(
            MockTransport::new().with_json("http://x/api/Metadata", &json!({"structuralTypeMap": {}})),
        );
        let store = FlakyStore::default();
        let err = ds.fetch_metadata(&store, &DataService::new(SERVICE)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InterpretationError);
        assert_eq!(
            err.message,
            "Metadata query failed for: http://x/api/Metadata; metadata import failed: disk full"
        );
        assert!(!store.has_metadata_for(SERVICE));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fetch_racing_a_failed_import_imports_itself() {
        let (ds, _) = data_service(
            MockTransport::new().with_json("http://x/api/Metadata", &json!({"structuralTypeMap": {}})),
        );
        let ds = Arc::new(ds);
        let store = Arc::new(FlakyStore::default());

        let spawn_fetch = || {
            let (ds, store) = (ds.clone(), store.clone());
            tokio::spawn(async move { ds.fetch_metadata(store.as_ref(), &DataService::new(SERVICE)).await })
        };
        let first = spawn_fetch();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = spawn_fetch();

        let first = first.await.unwrap();
        let second = second.await.unwrap();

        assert_eq!(first.unwrap_err().kind, ErrorKind::InterpretationError);
        assert!(matches!(second, Ok(MetadataFetchResult::Fetched(_))));
        assert!(store.has_metadata_for(SERVICE));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn metadata_transport_failure_prefixed() {
        let (ds, _) = data_service(MockTransport::new());
        let err = ds
            .fetch_metadata(&InMemoryMetadataStore::new(), &DataService::new("http://x/api"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportFailure);
        assert_eq!(err.status, 404);
        assert_eq!(err.message, "Metadata query failed for: http://x/api/Metadata; Not Found");
    }

    // === execute_query ===

    #[tokio::test]
    async fn query_reads_inline_count() {
        let (ds, mock) = data_service(MockTransport::new().with_response(
            "http://x/api/Customers?$top=2",
            RawResponse::ok(r#"[{"id":1},{"id":2}]"#).with_header("X-InlineCount", "42"),
        ));

        let result = ds
            .execute_query(&DataService::new(SERVICE), "Customers?$top=2")
            .await
            .unwrap();

        assert_eq!(result.inline_count, Some(42));
        assert_eq!(result.results, json!([{"id": 1}, {"id": 2}]));
        assert!(result.adapter_exports.request_id().is_some());
        assert_eq!(mock.requests()[0].url, "http://x/api/Customers?$top=2");
    }

    #[tokio::test]
    async fn query_without_inline_count_header() {
        let (ds, _) = data_service(MockTransport::new().with_json("http://x/api/Orders", &json!([])));
        let result = ds.execute_query(&DataService::new(SERVICE), "Orders").await.unwrap();
        assert_eq!(result.inline_count, None);
    }

    #[tokio::test]
    async fn non_numeric_inline_count_omitted() {
        let (ds, _) = data_service(MockTransport::new().with_response(
            "http://x/api/Orders",
            RawResponse::ok("[]").with_header("X-InlineCount", "lots"),
        ));
        let result = ds.execute_query(&DataService::new(SERVICE), "Orders").await.unwrap();
        assert_eq!(result.inline_count, None);
    }

    #[tokio::test]
    async fn malformed_query_body_is_interpretation_error() {
        let (ds, _) = data_service(
            MockTransport::new().with_response("http://x/api/Orders", RawResponse::ok("{not json")),
        );
        let err = ds.execute_query(&DataService::new(SERVICE), "Orders").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InterpretationError);
        assert!(err.message.starts_with("Query failed; error during response processing"));
    }

    #[tokio::test]
    async fn query_transport_failure_prefixed() {
        let (ds, _) = data_service(
            MockTransport::new().with_failure("http://x/api/Orders", TransportError::Network("refused".into())),
        );
        let err = ds.execute_query(&DataService::new(SERVICE), "Orders").await.unwrap_err();
        assert_eq!(err.message, "Query failed; error");
    }

    // === save_changes ===

    #[tokio::test]
    async fn save_server_error_rejects_with_field_value() {
        let (ds, _) = data_service(
            MockTransport::new().with_json("http://x/api/SaveChanges", &json!({"Error": "conflict"})),
        );
        let err = ds
            .save_changes(&DataService::new(SERVICE), None, json!({"entities": []}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ServerReportedError);
        assert_eq!(err.message, "conflict");
        assert_eq!(err.status, 200);
    }

    #[tokio::test]
    async fn save_server_error_keeps_raw_response_text() {
        let raw = r#"{"Error":"conflict","Entities":[]}"#;
        let (ds, _) = data_service(MockTransport::new().with_response("http://x/api/SaveChanges", RawResponse::ok(raw)));
        let err = ds
            .save_changes(&DataService::new(SERVICE), None, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.message, "conflict");
        assert_eq!(err.response_text.as_deref(), Some(raw));
    }

    #[tokio::test]
    async fn save_success_returns_body_and_exports() {
        let body = json!({"Entities": [{"id": 7}], "KeyMappings": []});
        let (ds, mock) = data_service(MockTransport::new().with_json("http://x/api/SaveChanges", &body));

        let result = ds
            .save_changes(&DataService::new(SERVICE), None, json!({"entities": [{"id": -1}]}))
            .await
            .unwrap();

        assert_eq!(result.body, body);
        assert!(result.adapter_exports.abort.is_disarmed());
        let sent = mock.requests();
        assert_eq!(sent[0].body.as_deref(), Some(r#"{"entities":[{"id":-1}]}"#));
    }

    #[tokio::test]
    async fn save_uses_named_resource() {
        let (ds, mock) = data_service(MockTransport::new().with_json("http://x/api/SaveOrders", &json!({})));
        ds.save_changes(&DataService::new(SERVICE), Some("SaveOrders"), json!({}))
            .await
            .unwrap();
        assert_eq!(mock.request_count("http://x/api/SaveOrders"), 1);
    }

    #[tokio::test]
    async fn save_transport_failure_prefixed() {
        let (ds, _) = data_service(MockTransport::new().with_response(
            "http://x/api/SaveChanges",
            RawResponse::new(500, "Internal Server Error", r#"{"InnerException":{"ExceptionMessage":"FK violation"}}"#),
        ));
        let err = ds
            .save_changes(&DataService::new(SERVICE), None, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.message, "Save failed; FK violation");
        assert!(err.detail.is_some());
    }

    // === binding ===

    #[tokio::test]
    async fn unbound_adapter_reports_configuration_error() {
        let ds = WebApiDataService::unbound();
        let err = ds.execute_query(&DataService::new(SERVICE), "Orders").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert_eq!(err.message, "Query failed; http adapter not initialized");
    }
}
