//! Server stop lifecycle

use std::sync::{Mutex, PoisonError};

use futures::future::BoxFuture;
use tracing::debug;

/// Handler run once when the server stops
pub type StopHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Ordered list of stop hooks
pub struct Lifecycle {
    stop_hooks: Mutex<Vec<StopHook>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            stop_hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn on_stop(&self, hook: StopHook) {
        self.stop_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Drain and run the stop hooks in registration order, each to completion
    pub async fn run_stop(&self) {
        let hooks: Vec<StopHook> = std::mem::take(
            &mut *self.stop_hooks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        debug!("Running {} stop hook(s)", hooks.len());

        for hook in hooks {
            hook().await;
        }
    }
}
