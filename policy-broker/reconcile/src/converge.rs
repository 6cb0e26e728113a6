use crate::metrics::ReconcileMetrics;
use ahash::AHashSet;
use policy_broker_core::{store::PolicyStore, Action, PolicyTriple};
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{debug, info, warn};

/// The most policies sent to the store in a single write.
pub const MAX_CHUNK_SIZE: usize = 500;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Writes policies to the store in bounded, time-limited chunks.
#[derive(Clone)]
pub struct Converger {
    store: Arc<dyn PolicyStore>,
    chunk_size: usize,
    write_timeout: Duration,
    metrics: ReconcileMetrics,
}

/// The outcome of a convergence pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Convergence {
    /// The number of distinct desired policies.
    pub desired: usize,

    /// The number of policies found in the store.
    pub actual: usize,

    /// Missing policies that were created.
    pub created: Vec<PolicyTriple>,

    /// Missing policies that could not be created.
    pub failed: Vec<PolicyTriple>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("{action} chunk {chunk} ({size} policies) timed out after {timeout:?}")]
    Timeout {
        action: Action,
        chunk: usize,
        size: usize,
        timeout: Duration,
    },

    #[error("{action} chunk {chunk} ({size} policies) failed: {source}")]
    Store {
        action: Action,
        chunk: usize,
        size: usize,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("listing policies timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to list policies: {0}")]
    Store(#[source] anyhow::Error),
}

// === impl Converger ===

impl Converger {
    pub fn new(store: Arc<dyn PolicyStore>, metrics: ReconcileMetrics) -> Self {
        Self {
            store,
            chunk_size: MAX_CHUNK_SIZE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            metrics,
        }
    }

    /// Sets the chunk size, clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &ReconcileMetrics {
        &self.metrics
    }

    /// Reads every policy from the store.
    ///
    /// A failed read is always an error; it is never reported as an empty
    /// store.
    pub async fn fetch_all(&self) -> Result<Vec<PolicyTriple>, FetchError> {
        match time::timeout(self.write_timeout, self.store.list_all_policies()).await {
            Ok(Ok(policies)) => {
                debug!(policies = policies.len(), "Fetched policies");
                Ok(policies)
            }
            Ok(Err(error)) => Err(FetchError::Store(error)),
            Err(_) => Err(FetchError::Timeout(self.write_timeout)),
        }
    }

    /// Applies `action` to `policies`, one chunk at a time.
    ///
    /// The first chunk that fails stops the remaining chunks from being
    /// written. Chunks already written are not rolled back.
    pub async fn apply(&self, action: Action, policies: &[PolicyTriple]) -> Result<(), ApplyError> {
        for (chunk, batch) in policies.chunks(self.chunk_size).enumerate() {
            let size = batch.len();
            match time::timeout(self.write_timeout, self.store.apply_policies(action, batch)).await
            {
                Ok(Ok(())) => {
                    self.metrics.chunk(action.as_str(), "ok");
                    debug!(%action, chunk, size, "Applied policies");
                }
                Ok(Err(source)) => {
                    self.metrics.chunk(action.as_str(), "error");
                    return Err(ApplyError::Store {
                        action,
                        chunk,
                        size,
                        source,
                    });
                }
                Err(_) => {
                    self.metrics.chunk(action.as_str(), "timeout");
                    return Err(ApplyError::Timeout {
                        action,
                        chunk,
                        size,
                        timeout: self.write_timeout,
                    });
                }
            }
        }
        Ok(())
    }

    /// Creates every desired policy the store does not already hold.
    ///
    /// Policies in the store that are not desired are left in place. Each
    /// missing policy is created individually so that one failure does not
    /// prevent the others.
    pub async fn converge(&self, desired: &[PolicyTriple]) -> Result<Convergence, FetchError> {
        let actual = self.fetch_all().await?;
        let existing = actual.iter().collect::<AHashSet<_>>();

        let mut distinct = AHashSet::with_capacity(desired.len());
        let mut missing = Vec::new();
        for policy in desired {
            if distinct.insert(policy) && !existing.contains(policy) {
                missing.push(policy);
            }
        }

        let mut convergence = Convergence {
            desired: distinct.len(),
            actual: actual.len(),
            ..Default::default()
        };
        for policy in missing {
            match self
                .apply(Action::Create, std::slice::from_ref(policy))
                .await
            {
                Ok(()) => {
                    info!(%policy, "Created missing policy");
                    convergence.created.push(policy.clone());
                }
                Err(error) => {
                    warn!(%policy, %error, "Failed to create missing policy");
                    convergence.failed.push(policy.clone());
                }
            }
        }

        self.metrics
            .fixed(convergence.created.len(), convergence.failed.len());
        Ok(convergence)
    }
}

// === impl Convergence ===

impl Convergence {
    pub fn fixed(&self) -> usize {
        self.created.len()
    }
}
