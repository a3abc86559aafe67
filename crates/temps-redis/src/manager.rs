//! Connection manager: validate, connect, decorate, close
//!
//! One manager drives a single registration:
//!
//! `Unvalidated → Validated → ConsistencyChecked → Connecting → AllConnected
//! → Finalized → ShuttingDown → Closed`
//!
//! Validation and consistency failures go straight to `Failed` before any
//! connection is attempted; a connection failure goes from `Connecting` to
//! `Failed`.

use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::Value;
use temps_core::{DecorationScope, PluginHost, PluginValue};
use tracing::debug;

use crate::bundle::{Bundle, Clients};
use crate::connector::{Connector, StoreClient};
use crate::error::RedisPluginError;
use crate::options::{self, ConnectionOptions, Decoration, DecorationKind};

/// Decoration name used for `decorate: true`
pub const GLOBAL_DECORATION: &str = "redis";

/// Exposed-state keys
pub const LIB_KEY: &str = "lib";
pub const CLIENT_KEY: &str = "client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unvalidated,
    Validated,
    ConsistencyChecked,
    Connecting,
    AllConnected,
    /// Registered and running
    Finalized,
    ShuttingDown,
    Closed,
    Failed,
}

pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    host: Arc<dyn PluginHost>,
    state: Mutex<RegistrationState>,
    clients: Mutex<Option<Clients<C::Client>>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: Arc<C>, host: Arc<dyn PluginHost>) -> Self {
        Self {
            connector,
            host,
            state: Mutex::new(RegistrationState::Unvalidated),
            clients: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RegistrationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RegistrationState) {
        debug!("Redis registration state: {:?}", state);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn fail(&self, err: RedisPluginError) -> RedisPluginError {
        self.set_state(RegistrationState::Failed);
        err
    }

    /// Run a full registration from raw options
    ///
    /// On success the connections stay open until the host stops.
    pub async fn register(self: &Arc<Self>, raw: &Value) -> Result<Bundle<C>, RedisPluginError> {
        let configs = options::validate(raw).map_err(|e| self.fail(e))?;
        self.set_state(RegistrationState::Validated);

        let kind = options::check_decoration_consistency(&configs).map_err(|e| self.fail(e))?;
        self.set_state(RegistrationState::ConsistencyChecked);

        self.set_state(RegistrationState::Connecting);
        let clients = self.connect_all(&configs).await.map_err(|e| self.fail(e))?;
        self.set_state(RegistrationState::AllConnected);

        self.finalize(kind, clients).await.map_err(|e| self.fail(e))
    }

    /// Open one connection; named decorations are attached as soon as it resolves
    pub async fn connect(
        &self,
        config: &ConnectionOptions,
    ) -> Result<Arc<C::Client>, RedisPluginError> {
        let description = config.target.redacted();

        let client = self
            .connector
            .connect(&config.target)
            .await
            .map_err(|source| RedisPluginError::Connection {
                target: description.clone(),
                source,
            })?;
        let client = Arc::new(client);

        self.log_info(&format!("redis connection created for {}", description));

        if let Decoration::Named(name) = &config.decorate {
            let decoration: PluginValue = Arc::new(Bundle {
                client: Clients::Single(Arc::clone(&client)),
                lib: Arc::clone(&self.connector),
            });

            if let Err(e) = self.attach_everywhere(name, decoration) {
                self.close(&client).await;
                return Err(e);
            }
        }

        Ok(client)
    }

    /// Connect every configuration concurrently, keeping input order
    ///
    /// All attempts run to completion; the first failure to resolve is returned
    /// after the connections that did open are closed.
    async fn connect_all(
        &self,
        configs: &[ConnectionOptions],
    ) -> Result<Vec<Arc<C::Client>>, RedisPluginError> {
        debug!("Opening {} redis connection(s)", configs.len());

        let mut pending: FuturesUnordered<_> = configs
            .iter()
            .enumerate()
            .map(|(index, config)| async move { (index, self.connect(config).await) })
            .collect();

        let mut resolved: Vec<Option<Arc<C::Client>>> = (0..configs.len()).map(|_| None).collect();
        let mut first_error = None;

        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(client) => resolved[index] = Some(client),
                Err(e) => {
                    debug!("Redis connection {} failed", index);
                    self.log_error(&e.to_string());
                    first_error.get_or_insert(e);
                }
            }
        }
        drop(pending);

        if let Some(err) = first_error {
            for client in resolved.iter().flatten() {
                self.close(client).await;
            }
            return Err(err);
        }

        Ok(resolved.into_iter().flatten().collect())
    }

    async fn finalize(
        self: &Arc<Self>,
        kind: DecorationKind,
        clients: Vec<Arc<C::Client>>,
    ) -> Result<Bundle<C>, RedisPluginError> {
        let bundle = Bundle {
            client: Clients::new(clients),
            lib: Arc::clone(&self.connector),
        };

        let applied = match kind {
            DecorationKind::Global => {
                self.attach_everywhere(GLOBAL_DECORATION, Arc::new(bundle.clone()))
            }
            DecorationKind::ExposeOnly | DecorationKind::Named => {
                self.host.expose_local(LIB_KEY, Arc::clone(&bundle.lib) as PluginValue);
                self.host
                    .expose_local(CLIENT_KEY, Arc::new(bundle.client.clone()));
                Ok(())
            }
        };

        if let Err(e) = applied {
            for client in bundle.client.iter() {
                self.close(client).await;
            }
            return Err(e);
        }

        *self.clients.lock().unwrap_or_else(PoisonError::into_inner) = Some(bundle.client.clone());

        let manager = Arc::clone(self);
        self.host
            .on_stop(Box::new(move || async move { manager.shutdown().await }.boxed()));

        self.set_state(RegistrationState::Finalized);
        debug!(
            "Redis plugin registered with {} connection(s)",
            bundle.client.len()
        );
        Ok(bundle)
    }

    /// Close every open connection, best-effort
    ///
    /// Only the first call does anything; later calls, or calls before a
    /// successful registration, are no-ops.
    pub async fn shutdown(&self) {
        let clients = self
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(clients) = clients else {
            debug!("No redis connections to close");
            return;
        };

        self.set_state(RegistrationState::ShuttingDown);
        for client in clients.iter() {
            self.close(client).await;
        }
        self.set_state(RegistrationState::Closed);
    }

    async fn close(&self, client: &Arc<C::Client>) {
        let description = client.target().redacted();

        self.log_info(&format!("closing redis connection for {}", description));

        if let Err(e) = client.quit().await {
            self.log_error(&format!(
                "failed to close redis connection for {}: {:#}",
                description, e
            ));
        }
    }

    fn attach_everywhere(&self, name: &str, value: PluginValue) -> Result<(), RedisPluginError> {
        self.host
            .attach_global(DecorationScope::Server, name, Arc::clone(&value))?;
        self.host.attach_global(DecorationScope::Request, name, value)?;
        Ok(())
    }

    fn log_info(&self, data: &str) {
        self.host.log(&[self.host.plugin_name(), "info"], data);
    }

    fn log_error(&self, data: &str) {
        self.host.log(&[self.host.plugin_name(), "error"], data);
    }
}
