//! Tagged log events emitted by plugins
//!
//! Every event is broadcast to subscribers and mirrored to `tracing`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const LOG_CHANNEL_CAPACITY: usize = 256;

/// A single log event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<String>,
    pub data: String,
}

impl LogEvent {
    pub fn new(tags: &[&str], data: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
            data: data.to_string(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Broadcast channel for log events
pub struct LogBus {
    sender: broadcast::Sender<LogEvent>,
}

impl Default for LogBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, tags: &[&str], data: &str) {
        let event = LogEvent::new(tags, data);

        if event.has_tag("error") {
            error!(tags = ?event.tags, "{}", event.data);
        } else if event.has_tag("warn") {
            warn!(tags = ?event.tags, "{}", event.data);
        } else if event.has_tag("debug") {
            debug!(tags = ?event.tags, "{}", event.data);
        } else {
            info!(tags = ?event.tags, "{}", event.data);
        }

        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}
