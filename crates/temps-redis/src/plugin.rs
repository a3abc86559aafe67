//! Redis Plugin implementation for the Temps plugin system
//!
//! Registering the plugin opens one Redis connection per configuration and
//! closes them all when the server stops. Depending on `decorate`, the
//! `{client, lib}` bundle ends up under `redis` on the server and request
//! scopes, under custom names per connection, or in the plugin's exposed
//! state only.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use temps_core::{PluginRealm, TempsPlugin};

use crate::connector::{Connector, RedisConnector};
use crate::manager::ConnectionManager;

/// Plugin name, also the tag on every log event and the exposed-state namespace
pub const PLUGIN_NAME: &str = "temps-redis";

pub struct RedisPlugin<C: Connector = RedisConnector> {
    connector: Arc<C>,
}

impl RedisPlugin {
    pub fn new() -> Self {
        Self::with_connector(RedisConnector::new())
    }
}

impl Default for RedisPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> RedisPlugin<C> {
    /// Use a different client library, e.g. a fake in tests
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }

    /// Shared with every bundle as `lib`
    pub fn connector(&self) -> &Arc<C> {
        &self.connector
    }
}

impl<C: Connector> TempsPlugin for RedisPlugin<C> {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn register<'a>(
        &'a self,
        realm: &'a PluginRealm,
        options: Value,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let manager = Arc::new(ConnectionManager::new(
                Arc::clone(&self.connector),
                Arc::new(realm.clone()),
            ));

            manager.register(&options).await?;

            tracing::debug!("Redis plugin services registered successfully");
            Ok(())
        })
    }
}
