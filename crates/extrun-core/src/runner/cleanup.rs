//! Cleanup callbacks run when the browser process closes

use std::sync::Arc;

use tracing::error;

/// Zero-argument cleanup action. Identity is the `Arc` allocation.
pub type CleanupCallback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Registration-ordered set of cleanup callbacks
#[derive(Default)]
pub struct CleanupRegistry {
    callbacks: Vec<CleanupCallback>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback. Returns false if this exact callback is already registered.
    pub fn register(&mut self, callback: CleanupCallback) -> bool {
        if self.callbacks.iter().any(|cb| Arc::ptr_eq(cb, &callback)) {
            return false;
        }
        self.callbacks.push(callback);
        true
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Take every callback out, leaving the registry empty
    pub fn drain(&mut self) -> Vec<CleanupCallback> {
        std::mem::take(&mut self.callbacks)
    }
}

/// Run each callback once. Failures are logged and never stop the rest.
pub fn run_cleanup_callbacks(callbacks: Vec<CleanupCallback>) {
    for callback in callbacks {
        if let Err(err) = callback() {
            error!("Exception on executing cleanup callback: {:#}", err);
        }
    }
}
