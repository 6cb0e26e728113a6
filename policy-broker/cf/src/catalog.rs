use crate::client::{Client, PER_PAGE};
use anyhow::Result;
use policy_broker_core::catalog::{
    Binding, BindingFilter, InstanceFilter, Labels, RelationshipCatalog, ServiceInstance,
};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The number of instance ids sent in one binding query, keeping URLs short.
pub const BINDING_QUERY_CHUNK: usize = 50;

const INSTANCES: &str = "/v3/service_instances";
const BINDINGS: &str = "/v3/service_credential_bindings";

/// Service instances and credential bindings, as stored by the cloud
/// controller.
#[derive(Clone)]
pub struct CfCatalog {
    client: Client,
}

#[derive(Debug, Deserialize)]
struct InstanceResource {
    guid: String,
    name: String,
    #[serde(default)]
    metadata: Metadata,
    relationships: InstanceRelationships,
}

#[derive(Debug, Deserialize)]
struct InstanceRelationships {
    space: ToOne,
}

#[derive(Debug, Deserialize)]
struct BindingResource {
    guid: String,
    #[serde(default)]
    metadata: Metadata,
    relationships: BindingRelationships,
}

#[derive(Debug, Deserialize)]
struct BindingRelationships {
    service_instance: ToOne,
    #[serde(default)]
    app: Option<ToOne>,
}

#[derive(Debug, Default, Deserialize)]
struct ToOne {
    data: Option<Guid>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    guid: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Metadata {
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    labels: Labels,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    annotations: Labels,
}

#[derive(Debug, Serialize)]
struct MetadataUpdate<'m> {
    metadata: &'m Metadata,
}

// === impl CfCatalog ===

impl CfCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn patch(&self, path: &str, metadata: Metadata) -> Result<()> {
        let url = self.client.url(path, &[])?;
        self.client
            .send_json(Method::PATCH, url, &MetadataUpdate { metadata: &metadata })
            .await
    }
}

#[async_trait::async_trait]
impl RelationshipCatalog for CfCatalog {
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<ServiceInstance>> {
        let selector = filter.label_selector();
        let spaces = filter.space_ids.join(",");
        let mut params = vec![("per_page", PER_PAGE)];
        if let Some(selector) = selector.as_deref() {
            params.push(("label_selector", selector));
        }
        if !spaces.is_empty() {
            params.push(("space_guids", spaces.as_str()));
        }

        let url = self.client.url(INSTANCES, &params)?;
        let instances = self
            .client
            .get_all::<InstanceResource>(url)
            .await?
            .into_iter()
            .map(ServiceInstance::from)
            .collect::<Vec<_>>();
        debug!(?selector, instances = instances.len(), "Listed service instances");
        Ok(instances)
    }

    async fn get_instance(&self, id: &str) -> Result<Option<ServiceInstance>> {
        let url = self.client.url(&format!("{INSTANCES}/{id}"), &[])?;
        let instance = self.client.get_opt::<InstanceResource>(url).await?;
        Ok(instance.map(Into::into))
    }

    async fn list_bindings(&self, filter: &BindingFilter) -> Result<Vec<Binding>> {
        let mut bindings = Vec::new();
        for ids in filter.instance_ids.chunks(BINDING_QUERY_CHUNK) {
            let ids = ids.join(",");
            let url = self.client.url(
                BINDINGS,
                &[("per_page", PER_PAGE), ("service_instance_guids", ids.as_str())],
            )?;
            let page = self.client.get_all::<BindingResource>(url).await?;
            bindings.extend(page.into_iter().filter_map(BindingResource::into_binding));
        }
        Ok(bindings)
    }

    async fn update_instance_metadata(
        &self,
        id: &str,
        labels: &Labels,
        annotations: &Labels,
    ) -> Result<()> {
        let metadata = Metadata {
            labels: labels.clone(),
            annotations: annotations.clone(),
        };
        self.patch(&format!("{INSTANCES}/{id}"), metadata).await
    }

    async fn update_binding_labels(&self, id: &str, labels: &Labels) -> Result<()> {
        let metadata = Metadata {
            labels: labels.clone(),
            annotations: Labels::new(),
        };
        self.patch(&format!("{BINDINGS}/{id}"), metadata).await
    }
}

// === impl InstanceResource ===

impl From<InstanceResource> for ServiceInstance {
    fn from(r: InstanceResource) -> Self {
        Self {
            id: r.guid,
            name: r.name,
            space_id: r.relationships.space.data.map(|d| d.guid).unwrap_or_default(),
            labels: r.metadata.labels,
            annotations: r.metadata.annotations,
        }
    }
}

// === impl BindingResource ===

impl BindingResource {
    /// Bindings without a service instance can't be attributed and are
    /// dropped.
    fn into_binding(self) -> Option<Binding> {
        let instance_id = self.relationships.service_instance.data?.guid;
        Some(Binding {
            id: self.guid,
            instance_id,
            app_id: self
                .relationships
                .app
                .and_then(|app| app.data)
                .map(|d| d.guid),
            labels: self.metadata.labels,
        })
    }
}
