use ahash::AHashMap;
use parking_lot::Mutex;
use std::{future::Future, sync::Arc};
use tokio::{
    sync::watch,
    time::{self, Duration},
};
use tracing::{info, warn};

/// Runs delayed work in the background while keeping its progress visible,
/// keyed by the resource it acts on.
#[derive(Clone, Debug, Default)]
pub struct Deferred {
    tasks: Arc<Mutex<AHashMap<String, watch::Receiver<DeferredState>>>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeferredState {
    Pending,
    Succeeded,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct DeferredHandle {
    rx: watch::Receiver<DeferredState>,
}

// === impl Deferred ===

impl Deferred {
    /// Runs `task` after `delay`. A task already registered under `key` is
    /// replaced, but not cancelled.
    pub fn spawn<F>(&self, key: impl Into<String>, delay: Duration, task: F) -> DeferredHandle
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let key = key.into();
        let (tx, rx) = watch::channel(DeferredState::Pending);
        self.tasks.lock().insert(key.clone(), rx.clone());

        tokio::spawn(async move {
            time::sleep(delay).await;
            let state = match task.await {
                Ok(()) => {
                    info!(%key, "Deferred task completed");
                    DeferredState::Succeeded
                }
                Err(error) => {
                    let reason = format!("{error:#}");
                    warn!(%key, error = %reason, "Deferred task failed");
                    DeferredState::Failed(reason)
                }
            };
            tx.send_replace(state);
        });

        DeferredHandle { rx }
    }

    pub fn state(&self, key: &str) -> Option<DeferredState> {
        self.tasks.lock().get(key).map(|rx| rx.borrow().clone())
    }

    /// Stops tracking `key`. Returns false if it was not tracked.
    pub fn forget(&self, key: &str) -> bool {
        self.tasks.lock().remove(key).is_some()
    }
}

// === impl DeferredHandle ===

impl DeferredHandle {
    pub fn state(&self) -> DeferredState {
        self.rx.borrow().clone()
    }

    /// Waits for the task to finish.
    pub async fn completed(mut self) -> DeferredState {
        self.rx
            .wait_for(|s| *s != DeferredState::Pending)
            .await
            .map(|state| state.clone())
            .unwrap_or_else(|_| DeferredState::Failed("task ended without completing".to_string()))
    }
}
