//! Cooperative shutdown controller.
//!
//! The poll loop and the metrics server both hold a clone; `server.rs`
//! combines it with OS signals.

use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative shutdown signal shared by the poller and the HTTP server.
#[derive(Clone, Debug)]
pub struct ShutdownController {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }
}

impl ShutdownController {
    /// Returns true if shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Request shutdown and wake all waiters.
    pub fn request_shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Wait until shutdown is requested.
    ///
    /// Returns immediately when the request happened before the call.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // Sender lives in `self`, so this only ends once the flag is set.
        let _ = rx.wait_for(|requested| *requested).await;
    }
}
