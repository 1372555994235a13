//! Best-effort side effects
//!
//! Audit snapshots, notifications and history entries run as detached
//! tasks. Their failures are logged and never reach the trigger that spawned
//! them.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::warn;

/// Spawner for fire-and-forget tasks
///
/// Handles are kept so callers that need to observe the effects (shutdown,
/// tests) can wait for them with [`SideEffects::flush`].
#[derive(Clone, Default)]
pub struct SideEffects {
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SideEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` in the background, logging its error under `label`
    pub fn spawn<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if let Err(e) = task.await {
                warn!(side_effect = label, "best-effort task failed: {:#}", e);
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    /// Waits for every task spawned so far
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("best-effort task panicked: {}", e);
            }
        }
    }
}
