//! Adapter registry
//!
//! Named adapter factories per kind, one cached instance per name, and a
//! default name per kind. Rebinding a default fires a recomposition event
//! to every cached adapter and to listeners registered for that kind.

use crate::data_service::{DataServiceAdapter, WebApiDataService};
use crate::http::HttpAdapter;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::info;

/// Category of pluggable behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdapterKind {
    Http,
    DataService,
}

impl AdapterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::DataService => "dataService",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Self::Http),
            "dataService" => Ok(Self::DataService),
            other => Err(RegistryError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("unknown adapter kind: {0}")]
    UnknownKind(String),
    #[error("no {kind} adapter registered as '{name}'")]
    UnknownAdapter { kind: AdapterKind, name: String },
    #[error("no default {0} adapter")]
    NoDefault(AdapterKind),
    #[error("factory for {kind} adapter '{name}' produced a {actual} adapter")]
    KindMismatch {
        kind: AdapterKind,
        name: String,
        actual: AdapterKind,
    },
    #[error("failed to initialize {kind} adapter '{name}': {reason}")]
    InitializationFailed {
        kind: AdapterKind,
        name: String,
        reason: String,
    },
}

/// A constructed adapter of either kind.
#[derive(Clone)]
pub enum AdapterInstance {
    Http(Arc<dyn HttpAdapter>),
    DataService(Arc<dyn DataServiceAdapter>),
}

impl AdapterInstance {
    pub fn kind(&self) -> AdapterKind {
        match self {
            Self::Http(_) => AdapterKind::Http,
            Self::DataService(_) => AdapterKind::DataService,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Http(a) => a.name(),
            Self::DataService(a) => a.name(),
        }
    }

    fn initialize(&self, registry: &AdapterRegistry) -> Result<(), RegistryError> {
        match self {
            Self::Http(a) => a.initialize(registry),
            Self::DataService(a) => a.initialize(registry),
        }
    }

    fn check_for_recomposition(&self, event: &RecompositionEvent, registry: &AdapterRegistry) {
        match self {
            Self::Http(a) => a.check_for_recomposition(event, registry),
            Self::DataService(a) => a.check_for_recomposition(event, registry),
        }
    }
}

impl fmt::Debug for AdapterInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AdapterInstance")
            .field(&self.kind())
            .field(&self.name())
            .finish()
    }
}

pub type AdapterFactory = Arc<dyn Fn() -> AdapterInstance + Send + Sync>;

/// Fired when a kind's default adapter is rebound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecompositionEvent {
    pub kind: AdapterKind,
    pub name: String,
    pub is_default: bool,
}

/// Observer of recomposition events for one adapter kind.
pub trait RecompositionListener: Send + Sync {
    fn on_recomposition(&self, event: &RecompositionEvent);
}

impl<F> RecompositionListener for F
where
    F: Fn(&RecompositionEvent) + Send + Sync,
{
    fn on_recomposition(&self, event: &RecompositionEvent) {
        self(event)
    }
}

#[derive(Default)]
struct KindEntry {
    factories: BTreeMap<String, AdapterFactory>,
    default: Option<String>,
}

type InstanceSlot = Arc<Mutex<Option<AdapterInstance>>>;

/// Registration and lookup of named adapters.
///
/// Each (kind, name) pair is constructed at most once; the slot mutex is
/// held across construction so racing lookups wait for the first.
#[derive(Default)]
pub struct AdapterRegistry {
    kinds: RwLock<HashMap<AdapterKind, KindEntry>>,
    instances: DashMap<(AdapterKind, String), InstanceSlot>,
    listeners: RwLock<Vec<(AdapterKind, Arc<dyn RecompositionListener>)>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in adapters: `reqwest` (http, when the
    /// `reqwest-transport` feature is on) and `webApi` (dataService).
    pub fn standard() -> Self {
        let registry = Self::new();
        #[cfg(feature = "reqwest-transport")]
        registry.register_http("reqwest", || {
            Arc::new(crate::http::TransportAdapter::new(
                "reqwest",
                Arc::new(crate::http::ReqwestTransport::new()),
            ))
        });
        registry.register_data_service("webApi", || Arc::new(WebApiDataService::unbound()));
        registry
    }

    /// Register a factory. The first name registered for a kind becomes its
    /// default; re-registering a name replaces its factory.
    pub fn register<F>(&self, kind: AdapterKind, name: impl Into<String>, factory: F)
    where
        F: Fn() -> AdapterInstance + Send + Sync + 'static,
    {
        let name = name.into();
        let mut kinds = self.kinds.write().unwrap_or_else(PoisonError::into_inner);
        let entry = kinds.entry(kind).or_default();
        entry.factories.insert(name.clone(), Arc::new(factory));
        if entry.default.is_none() {
            entry.default = Some(name);
        }
    }

    pub fn register_http<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn HttpAdapter> + Send + Sync + 'static,
    {
        self.register(AdapterKind::Http, name, move || AdapterInstance::Http(factory()));
    }

    pub fn register_data_service<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn DataServiceAdapter> + Send + Sync + 'static,
    {
        self.register(AdapterKind::DataService, name, move || {
            AdapterInstance::DataService(factory())
        });
    }

    /// Registered names for a kind, sorted.
    pub fn names(&self, kind: AdapterKind) -> Vec<String> {
        let kinds = self.kinds.read().unwrap_or_else(PoisonError::into_inner);
        kinds
            .get(&kind)
            .map(|e| e.factories.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn default_name(&self, kind: AdapterKind) -> Option<String> {
        let kinds = self.kinds.read().unwrap_or_else(PoisonError::into_inner);
        kinds.get(&kind).and_then(|e| e.default.clone())
    }

    /// The instance registered as `name`, or the kind's default when `name`
    /// is `None`. Constructs and initializes it on first lookup.
    pub fn get_instance(&self, kind: AdapterKind, name: Option<&str>) -> Result<AdapterInstance, RegistryError> {
        let (name, factory) = {
            let kinds = self.kinds.read().unwrap_or_else(PoisonError::into_inner);
            let entry = kinds.get(&kind);
            let name = match name {
                Some(name) => name.to_string(),
                None => entry
                    .and_then(|e| e.default.clone())
                    .ok_or(RegistryError::NoDefault(kind))?,
            };
            let factory = entry
                .and_then(|e| e.factories.get(&name).cloned())
                .ok_or_else(|| RegistryError::UnknownAdapter {
                    kind,
                    name: name.clone(),
                })?;
            (name, factory)
        };

        let slot = self
            .instances
            .entry((kind, name.clone()))
            .or_default()
            .clone();
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(instance) = slot.as_ref() {
            return Ok(instance.clone());
        }

        let instance = factory();
        if instance.kind() != kind {
            return Err(RegistryError::KindMismatch {
                kind,
                name,
                actual: instance.kind(),
            });
        }
        instance.initialize(self)?;
        *slot = Some(instance.clone());
        Ok(instance)
    }

    pub fn http_adapter(&self, name: Option<&str>) -> Result<Arc<dyn HttpAdapter>, RegistryError> {
        match self.get_instance(AdapterKind::Http, name)? {
            AdapterInstance::Http(adapter) => Ok(adapter),
            other => Err(mismatch(AdapterKind::Http, &other)),
        }
    }

    pub fn data_service_adapter(&self, name: Option<&str>) -> Result<Arc<dyn DataServiceAdapter>, RegistryError> {
        match self.get_instance(AdapterKind::DataService, name)? {
            AdapterInstance::DataService(adapter) => Ok(adapter),
            other => Err(mismatch(AdapterKind::DataService, &other)),
        }
    }

    /// Listen for default rebinding of `kind`.
    pub fn add_listener(&self, kind: AdapterKind, listener: Arc<dyn RecompositionListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind, listener));
    }

    /// Make `name` the default for `kind` and fire one recomposition event.
    ///
    /// Every constructed adapter gets `check_for_recomposition`, then every
    /// listener for `kind` gets the event once.
    pub fn set_default(&self, kind: AdapterKind, name: &str) -> Result<(), RegistryError> {
        {
            let mut kinds = self.kinds.write().unwrap_or_else(PoisonError::into_inner);
            let entry = kinds
                .get_mut(&kind)
                .filter(|e| e.factories.contains_key(name))
                .ok_or_else(|| RegistryError::UnknownAdapter {
                    kind,
                    name: name.to_string(),
                })?;
            entry.default = Some(name.to_string());
        }
        info!(kind = %kind, name, "default adapter rebound");

        let event = RecompositionEvent {
            kind,
            name: name.to_string(),
            is_default: true,
        };

        let constructed: Vec<AdapterInstance> = self
            .instances
            .iter()
            .map(|entry| entry.value().clone())
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).clone())
            .collect();
        for instance in &constructed {
            instance.check_for_recomposition(&event, self);
        }

        let listeners: Vec<Arc<dyn RecompositionListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener.on_recomposition(&event);
        }

        Ok(())
    }
}

fn mismatch(expected: AdapterKind, instance: &AdapterInstance) -> RegistryError {
    RegistryError::KindMismatch {
        kind: expected,
        name: instance.name().to_string(),
        actual: instance.kind(),
    }
}
