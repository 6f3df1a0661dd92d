//! Default rebinding across adapter kinds
//!
//! Run with: `cargo test --test registry_recomposition`

mod common;

use common::{mock_registry, register_mock, SERVICE};
use dataport::http::MockTransport;
use dataport::{AdapterConfig, AdapterKind, DataService, RecompositionEvent, WebApiDataService};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn two_backends() -> (dataport::AdapterRegistry, Arc<MockTransport>, Arc<MockTransport>) {
    let (registry, primary) =
        mock_registry(MockTransport::new().with_json("http://x/api/Orders", &json!(["primary"])));
    let secondary = Arc::new(MockTransport::new().with_json("http://x/api/Orders", &json!(["secondary"])));
    register_mock(&registry, "secondary", secondary.clone());
    (registry, primary, secondary)
}

#[tokio::test]
async fn data_service_follows_new_http_default() {
    let (registry, primary, secondary) = two_backends();
    let ds = registry.data_service_adapter(None).unwrap();
    let service = DataService::new(SERVICE);

    let before = ds.execute_query(&service, "Orders").await.unwrap();
    assert_eq!(before.results, json!(["primary"]));

    registry.set_default(AdapterKind::Http, "secondary").unwrap();

    let after = ds.execute_query(&service, "Orders").await.unwrap();
    assert_eq!(after.results, json!(["secondary"]));
    assert_eq!(primary.request_count("http://x/api/Orders"), 1);
    assert_eq!(secondary.request_count("http://x/api/Orders"), 1);
}

#[test]
fn data_service_constructed_after_rebind_uses_new_default() {
    let (registry, _, _) = two_backends();
    registry.set_default(AdapterKind::Http, "secondary").unwrap();

    let ds = WebApiDataService::unbound();
    dataport::DataServiceAdapter::initialize(&ds, &registry).unwrap();
    assert_eq!(ds.http_adapter_name().as_deref(), Some("secondary"));
}

#[test]
fn listeners_hear_only_their_kind() {
    let (registry, _, _) = two_backends();
    let http_events = Arc::new(AtomicUsize::new(0));
    let ds_events = Arc::new(AtomicUsize::new(0));
    {
        let http_events = http_events.clone();
        registry.add_listener(
            AdapterKind::Http,
            Arc::new(move |e: &RecompositionEvent| {
                assert_eq!(e.name, "secondary");
                http_events.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let ds_events = ds_events.clone();
        registry.add_listener(
            AdapterKind::DataService,
            Arc::new(move |_: &RecompositionEvent| {
                ds_events.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    registry.set_default(AdapterKind::Http, "secondary").unwrap();

    assert_eq!(http_events.load(Ordering::SeqCst), 1);
    assert_eq!(ds_events.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn config_rebinds_and_configures() {
    let (registry, _, secondary) = two_backends();
    let ds = registry.data_service_adapter(None).unwrap();

    AdapterConfig::from_yaml_str(
        "http:\n  default: secondary\n  settings:\n    headers:\n      X-Client: app\n",
    )
    .unwrap()
    .apply(&registry)
    .unwrap();

    ds.execute_query(&DataService::new(SERVICE), "Orders").await.unwrap();

    let sent = secondary.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].headers.get("X-Client").map(String::as_str), Some("app"));
}

#[test]
fn missing_http_default_fails_data_service_initialization() {
    let registry = dataport::AdapterRegistry::new();
    registry.register_data_service(WebApiDataService::NAME, || Arc::new(WebApiDataService::unbound()));
    assert!(matches!(
        registry.data_service_adapter(None),
        Err(dataport::RegistryError::InitializationFailed { .. })
    ));
}
