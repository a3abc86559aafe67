//! Plugin system for decorating a server with plugin-provided values
//!
//! This module provides a trait-based plugin system that enables:
//! - Named decorations on the server and request scopes
//! - Per-plugin exposed state, retrievable by plugin name and key
//! - Tagged log events and stop hooks through a single host capability
//! - Fail-fast registration errors that keep the plugin's own error inspectable

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

use crate::lifecycle::{Lifecycle, StopHook};
use crate::logging::{LogBus, LogEvent};

/// Type-erased value stored in the decoration and exposed-state registries
pub type PluginValue = Arc<dyn Any + Send + Sync>;

/// Object a decoration is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecorationScope {
    /// Application-level object, shared by every handler
    Server,
    /// Per-request object
    Request,
}

impl fmt::Display for DecorationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecorationScope::Server => write!(f, "server"),
            DecorationScope::Request => write!(f, "request"),
        }
    }
}

/// Errors that can occur during plugin operations
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin registration failed for '{plugin_name}': {source}")]
    PluginRegistrationFailed {
        plugin_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Plugin '{plugin_name}' is already registered")]
    AlreadyRegistered { plugin_name: String },

    #[error("Cannot decorate {scope} with '{name}': decoration already defined")]
    DecorationConflict {
        scope: DecorationScope,
        name: String,
    },
}

impl PluginError {
    /// The plugin's own error, if this is a registration failure carrying one of type `E`
    pub fn registration_source<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match self {
            PluginError::PluginRegistrationFailed { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Core plugin trait that defines the plugin interface
pub trait TempsPlugin: Send + Sync {
    /// Unique identifier for this plugin, also the namespace of its exposed state
    fn name(&self) -> &'static str;

    fn version(&self) -> &'static str {
        "0.0.0"
    }

    /// Register the plugin against its realm
    ///
    /// `options` is passed through verbatim from the application's config.
    /// Returning an error aborts application startup.
    fn register<'a>(
        &'a self,
        realm: &'a PluginRealm,
        options: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;
}

/// Capabilities a plugin consumes from its host
///
/// Keeping these behind a trait lets plugin logic run against a test host.
pub trait PluginHost: Send + Sync {
    /// Name of the plugin this host handle is bound to
    fn plugin_name(&self) -> &str;

    /// Attach `value` under `name` on the given scope
    fn attach_global(
        &self,
        scope: DecorationScope,
        name: &str,
        value: PluginValue,
    ) -> Result<(), PluginError>;

    /// Register `value` under `key` in this plugin's exposed state
    fn expose_local(&self, key: &str, value: PluginValue);

    /// Emit a tagged log event
    fn log(&self, tags: &[&str], data: &str);

    /// Run `hook` when the host stops
    fn on_stop(&self, hook: StopHook);
}

/// Registry of named decorations per scope
pub struct DecorationRegistry {
    entries: Mutex<HashMap<(DecorationScope, String), PluginValue>>,
}

impl Default for DecorationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DecorationRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a decoration, refusing to overwrite an existing one
    pub fn decorate(
        &self,
        scope: DecorationScope,
        name: &str,
        value: PluginValue,
    ) -> Result<(), PluginError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (scope, name.to_string());
        if entries.contains_key(&key) {
            return Err(PluginError::DecorationConflict {
                scope,
                name: name.to_string(),
            });
        }
        debug!("Decorating {} with '{}'", scope, name);
        entries.insert(key, value);
        Ok(())
    }

    pub fn contains(&self, scope: DecorationScope, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&(scope, name.to_string()))
    }

    /// Get a decoration if it exists and has type `T`
    pub fn get<T: Send + Sync + 'static>(
        &self,
        scope: DecorationScope,
        name: &str,
    ) -> Option<Arc<T>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(scope, name.to_string()))
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }
}

/// Registry for plugin-specific exposed state
pub struct PluginStateRegistry {
    states: Mutex<HashMap<String, HashMap<String, PluginValue>>>,
}

impl Default for PluginStateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginStateRegistry {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Register a value in a plugin's namespace; later writes replace earlier ones
    pub fn register_state(&self, plugin_name: &str, key: &str, value: PluginValue) {
        debug!("Exposing '{}' for plugin: {}", key, plugin_name);
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(plugin_name.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn get_state<T: Send + Sync + 'static>(
        &self,
        plugin_name: &str,
        key: &str,
    ) -> Option<Arc<T>> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(plugin_name)
            .and_then(|state| state.get(key))
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Keys exposed by a plugin, sorted
    pub fn keys(&self, plugin_name: &str) -> Vec<String> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = states
            .get(plugin_name)
            .map(|state| state.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

struct ServerInner {
    decorations: DecorationRegistry,
    states: PluginStateRegistry,
    logs: LogBus,
    lifecycle: Lifecycle,
    registered: Mutex<Vec<String>>,
}

/// In-process plugin server
///
/// Cheap to clone; every clone shares the same registries, log bus and
/// lifecycle.
#[derive(Clone)]
pub struct PluginServer {
    inner: Arc<ServerInner>,
}

impl Default for PluginServer {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginServer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ServerInner {
                decorations: DecorationRegistry::new(),
                states: PluginStateRegistry::new(),
                logs: LogBus::new(),
                lifecycle: Lifecycle::new(),
                registered: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a plugin with its options
    ///
    /// Fails if a plugin with the same name is already registered, or if the
    /// plugin's own registration fails.
    pub async fn register(
        &self,
        plugin: &dyn TempsPlugin,
        options: Value,
    ) -> Result<(), PluginError> {
        let plugin_name = plugin.name();
        if self.is_registered(plugin_name) {
            return Err(PluginError::AlreadyRegistered {
                plugin_name: plugin_name.to_string(),
            });
        }

        debug!("Registering plugin: {} v{}", plugin_name, plugin.version());
        let realm = self.realm(plugin_name);
        plugin.register(&realm, options).await.map_err(|source| {
            PluginError::PluginRegistrationFailed {
                plugin_name: plugin_name.to_string(),
                source,
            }
        })?;

        self.inner
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(plugin_name.to_string());
        debug!("Successfully registered plugin: {}", plugin_name);
        Ok(())
    }

    pub fn is_registered(&self, plugin_name: &str) -> bool {
        self.inner
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|name| name == plugin_name)
    }

    /// Host handle bound to one plugin's namespace
    pub fn realm(&self, plugin_name: &str) -> PluginRealm {
        PluginRealm {
            server: self.clone(),
            plugin_name: plugin_name.to_string(),
        }
    }

    pub fn decoration<T: Send + Sync + 'static>(
        &self,
        scope: DecorationScope,
        name: &str,
    ) -> Option<Arc<T>> {
        self.inner.decorations.get::<T>(scope, name)
    }

    pub fn has_decoration(&self, scope: DecorationScope, name: &str) -> bool {
        self.inner.decorations.contains(scope, name)
    }

    /// Value a plugin exposed under `key`
    pub fn plugin_state<T: Send + Sync + 'static>(
        &self,
        plugin_name: &str,
        key: &str,
    ) -> Option<Arc<T>> {
        self.inner.states.get_state::<T>(plugin_name, key)
    }

    pub fn plugin_state_keys(&self, plugin_name: &str) -> Vec<String> {
        self.inner.states.keys(plugin_name)
    }

    /// Subscribe to log events emitted after this call
    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEvent> {
        self.inner.logs.subscribe()
    }

    pub fn log(&self, tags: &[&str], data: &str) {
        self.inner.logs.emit(tags, data);
    }

    /// Run every stop hook in registration order
    pub async fn stop(&self) {
        debug!("Stopping plugin server");
        self.inner.lifecycle.run_stop().await;
    }
}

/// A plugin's view of the server
#[derive(Clone)]
pub struct PluginRealm {
    server: PluginServer,
    plugin_name: String,
}

impl PluginRealm {
    pub fn server(&self) -> &PluginServer {
        &self.server
    }
}

impl PluginHost for PluginRealm {
    fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    fn attach_global(
        &self,
        scope: DecorationScope,
        name: &str,
        value: PluginValue,
    ) -> Result<(), PluginError> {
        self.server.inner.decorations.decorate(scope, name, value)
    }

    fn expose_local(&self, key: &str, value: PluginValue) {
        self.server
            .inner
            .states
            .register_state(&self.plugin_name, key, value);
    }

    fn log(&self, tags: &[&str], data: &str) {
        self.server.log(tags, data);
    }

    fn on_stop(&self, hook: StopHook) {
        self.server.inner.lifecycle.on_stop(hook);
    }
}
