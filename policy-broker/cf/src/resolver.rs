use crate::client::Client;
use anyhow::{Context, Result};
use policy_broker_core::resolve::{IdentifierResolver, Org, Space};
use serde::Deserialize;

/// Resolves application, space and organization GUIDs to names.
#[derive(Clone)]
pub struct CfResolver {
    client: Client,
}

#[derive(Deserialize)]
struct Named {
    guid: String,
    name: String,
}

#[derive(Deserialize)]
struct SpaceResource {
    guid: String,
    name: String,
    relationships: SpaceRelationships,
}

#[derive(Deserialize)]
struct SpaceRelationships {
    organization: ToOrg,
}

#[derive(Deserialize)]
struct ToOrg {
    data: Option<OrgRef>,
}

#[derive(Deserialize)]
struct OrgRef {
    guid: String,
}

impl CfResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl IdentifierResolver for CfResolver {
    async fn get_application_name(&self, id: &str) -> Result<String> {
        let url = self.client.url(&format!("/v3/apps/{id}"), &[])?;
        let app = self.client.get::<Named>(url).await?;
        Ok(app.name)
    }

    async fn get_space(&self, id: &str) -> Result<Space> {
        let url = self.client.url(&format!("/v3/spaces/{id}"), &[])?;
        let space = self.client.get::<SpaceResource>(url).await?;
        let org_id = space
            .relationships
            .organization
            .data
            .with_context(|| format!("space {id} has no organization"))?
            .guid;
        Ok(Space {
            id: space.guid,
            name: space.name,
            org_id,
        })
    }

    async fn get_org(&self, id: &str) -> Result<Org> {
        let url = self.client.url(&format!("/v3/organizations/{id}"), &[])?;
        let org = self.client.get::<Named>(url).await?;
        Ok(Org {
            id: org.guid,
            name: org.name,
        })
    }
}
