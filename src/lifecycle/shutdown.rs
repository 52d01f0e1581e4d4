//! Shutdown coordination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// The process-wide continuation flag.
///
/// Cheap to clone; every clone observes the same flag. A broadcast channel
/// wakes tasks that are blocked waiting for work.
#[derive(Debug, Clone)]
pub struct Shutdown {
    running: Arc<AtomicBool>,
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            running: Arc::new(AtomicBool::new(true)),
            tx,
        }
    }

    /// True until shutdown is triggered.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the flag and wake every waiter.
    pub fn trigger(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Shutdown requested");
        }
        let _ = self.tx.send(());
    }

    /// Resolve once shutdown has been triggered.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        if !self.is_running() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
