//! Fake client library for integration tests
//!
//! Connections are keyed by database index: each db can be given a connect
//! delay, a connect failure, or a quit failure.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use temps_core::{
    DecorationScope, LogEvent, PluginError, PluginHost, PluginRealm, PluginValue, StopHook,
};
use temps_redis::{ConnectionTarget, Connector, StoreClient};
use tokio::sync::broadcast;

#[derive(Default)]
pub struct FakeConnector {
    delays: HashMap<u32, Duration>,
    failing_connects: HashSet<u32>,
    failing_quits: HashSet<u32>,
    pub attempts: AtomicUsize,
    pub open: Arc<AtomicUsize>,
    pub quits: Arc<Mutex<Vec<u32>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, db: u32, millis: u64) -> Self {
        self.delays.insert(db, Duration::from_millis(millis));
        self
    }

    pub fn fail_connect(mut self, db: u32) -> Self {
        self.failing_connects.insert(db);
        self
    }

    pub fn fail_quit(mut self, db: u32) -> Self {
        self.failing_quits.insert(db);
        self
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn quit_order(&self) -> Vec<u32> {
        self.quits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Client = FakeClient;

    async fn connect(&self, target: &ConnectionTarget) -> anyhow::Result<FakeClient> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&target.db) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing_connects.contains(&target.db) {
            anyhow::bail!("connection refused");
        }

        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(FakeClient {
            target: target.clone(),
            fail_quit: self.failing_quits.contains(&target.db),
            open: Arc::clone(&self.open),
            quits: Arc::clone(&self.quits),
        })
    }
}

#[derive(Debug)]
pub struct FakeClient {
    target: ConnectionTarget,
    fail_quit: bool,
    open: Arc<AtomicUsize>,
    quits: Arc<Mutex<Vec<u32>>>,
}

impl FakeClient {
    pub fn db(&self) -> u32 {
        self.target.db
    }
}

#[async_trait]
impl StoreClient for FakeClient {
    fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    async fn quit(&self) -> anyhow::Result<()> {
        self.quits.lock().unwrap().push(self.target.db);
        if self.fail_quit {
            anyhow::bail!("socket already closed");
        }
        self.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Host that records each decoration before forwarding it to a real realm
pub struct RecordingHost {
    realm: PluginRealm,
    attached: Mutex<Vec<(DecorationScope, String)>>,
}

impl RecordingHost {
    pub fn new(realm: PluginRealm) -> Self {
        Self {
            realm,
            attached: Mutex::new(Vec::new()),
        }
    }

    pub fn attached(&self) -> Vec<(DecorationScope, String)> {
        self.attached.lock().unwrap().clone()
    }
}

impl PluginHost for RecordingHost {
    fn plugin_name(&self) -> &str {
        self.realm.plugin_name()
    }

    fn attach_global(
        &self,
        scope: DecorationScope,
        name: &str,
        value: PluginValue,
    ) -> Result<(), PluginError> {
        self.attached.lock().unwrap().push((scope, name.to_string()));
        self.realm.attach_global(scope, name, value)
    }

    fn expose_local(&self, key: &str, value: PluginValue) {
        self.realm.expose_local(key, value);
    }

    fn log(&self, tags: &[&str], data: &str) {
        self.realm.log(tags, data);
    }

    fn on_stop(&self, hook: StopHook) {
        self.realm.on_stop(hook);
    }
}

/// Every log event received so far
pub fn drain_logs(rx: &mut broadcast::Receiver<LogEvent>) -> Vec<LogEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("temps_redis=debug")),
        )
        .with_test_writer()
        .try_init();
}
