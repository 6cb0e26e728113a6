//! The external network-policy store.

use crate::{Action, PolicyTriple};
use anyhow::Result;
use std::sync::Arc;

/// The authoritative record of which policies actually exist.
///
/// Writes must be idempotent: creating a policy that exists, or deleting one
/// that does not, is a no-op.
#[async_trait::async_trait]
pub trait PolicyStore: Send + Sync {
    /// Lists every policy. Implementations page internally.
    async fn list_all_policies(&self) -> Result<Vec<PolicyTriple>>;

    /// Applies `action` to a single batch of policies.
    async fn apply_policies(&self, action: Action, policies: &[PolicyTriple]) -> Result<()>;
}

#[async_trait::async_trait]
impl<T: PolicyStore + ?Sized> PolicyStore for Arc<T> {
    async fn list_all_policies(&self) -> Result<Vec<PolicyTriple>> {
        (**self).list_all_policies().await
    }

    async fn apply_policies(&self, action: Action, policies: &[PolicyTriple]) -> Result<()> {
        (**self).apply_policies(action, policies).await
    }
}
