//! Core plugin runtime shared across all Temps crates

pub mod lifecycle;
pub mod logging;
pub mod plugin;

// Re-export commonly used types
pub use lifecycle::{Lifecycle, StopHook};
pub use logging::{LogBus, LogEvent};
pub use plugin::{
    DecorationScope, PluginError, PluginHost, PluginRealm, PluginServer, PluginValue,
    TempsPlugin,
};

// Re-export external dependencies
pub use anyhow;
pub use async_trait;
pub use serde_json;
pub use thiserror;
pub use tokio;
pub use tracing;
