//! Common test utilities for adapter integration tests
//!
//! Builds registries whose http adapters run over `MockTransport`, so the
//! whole registry → data service → transport path is exercised offline.

#![allow(dead_code)]

use dataport::http::MockTransport;
use dataport::{AdapterRegistry, HttpAdapter, TransportAdapter, WebApiDataService};
use std::sync::Arc;

pub const SERVICE: &str = "http://x/api/";

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Register an http adapter named `name` that answers from `mock`.
pub fn register_mock(registry: &AdapterRegistry, name: &'static str, mock: Arc<MockTransport>) {
    registry.register_http(name, move || -> Arc<dyn HttpAdapter> {
        Arc::new(TransportAdapter::new(name, mock.clone()))
    });
}

/// A registry with one mock http adapter (`mock`) and `webApi`.
pub fn mock_registry(mock: MockTransport) -> (AdapterRegistry, Arc<MockTransport>) {
    init_tracing();
    let mock = Arc::new(mock);
    let registry = AdapterRegistry::new();
    register_mock(&registry, "mock", mock.clone());
    registry.register_data_service(WebApiDataService::NAME, || Arc::new(WebApiDataService::unbound()));
    (registry, mock)
}
