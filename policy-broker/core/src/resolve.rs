//! Resolution of opaque identifiers to display names.

use anyhow::Result;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Space {
    pub id: String,
    pub name: String,
    pub org_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Org {
    pub id: String,
    pub name: String,
}

/// Looks up display names. Results are only ever used for diagnostics.
#[async_trait::async_trait]
pub trait IdentifierResolver: Send + Sync {
    async fn get_application_name(&self, id: &str) -> Result<String>;

    async fn get_space(&self, id: &str) -> Result<Space>;

    async fn get_org(&self, id: &str) -> Result<Org>;
}

#[async_trait::async_trait]
impl<T: IdentifierResolver + ?Sized> IdentifierResolver for Arc<T> {
    async fn get_application_name(&self, id: &str) -> Result<String> {
        (**self).get_application_name(id).await
    }

    async fn get_space(&self, id: &str) -> Result<Space> {
        (**self).get_space(id).await
    }

    async fn get_org(&self, id: &str) -> Result<Org> {
        (**self).get_org(id).await
    }
}
