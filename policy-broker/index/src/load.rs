use crate::reader;
use ahash::AHashMap;
use anyhow::Result;
use policy_broker_core::{
    catalog::{Binding, BindingFilter, InstanceFilter, RelationshipCatalog, ServiceInstance},
    labels, Endpoint, Role, Scope,
};

/// Loads every labelled endpoint in the catalog, in catalog order.
pub async fn load_endpoints(catalog: &dyn RelationshipCatalog) -> Result<Vec<Endpoint>> {
    let filter = InstanceFilter::default()
        .and_label_in(labels::TYPE, [labels::TYPE_SOURCE, labels::TYPE_DESTINATION]);
    load(catalog, &filter).await
}

/// Loads the endpoints `endpoint` could be joined with: the destinations
/// targeting a source, or the sources sharing a destination's name.
///
/// The result may include endpoints that are not visible to `endpoint`;
/// scope is enforced when deriving.
pub async fn load_counterparts(
    catalog: &dyn RelationshipCatalog,
    endpoint: &Endpoint,
) -> Result<Vec<Endpoint>> {
    let filter = match endpoint.role {
        Role::Source(scope) => {
            let filter = InstanceFilter::labeled(labels::TYPE, labels::TYPE_DESTINATION)
                .and_label(labels::SOURCE, &endpoint.logical_name);
            match scope {
                Scope::Local => filter.in_space(&endpoint.space_id),
                Scope::Global => filter,
            }
        }
        Role::Destination => InstanceFilter::labeled(labels::TYPE, labels::TYPE_SOURCE)
            .and_label(labels::NAME, &endpoint.logical_name),
    };
    load(catalog, &filter).await
}

async fn load(catalog: &dyn RelationshipCatalog, filter: &InstanceFilter) -> Result<Vec<Endpoint>> {
    let instances = catalog.list_instances(filter).await?;
    if instances.is_empty() {
        return Ok(vec![]);
    }

    let bindings = catalog
        .list_bindings(&BindingFilter::instances(instances.iter().map(|i| &i.id)))
        .await?;
    let mut by_instance = AHashMap::<&str, Vec<&Binding>>::with_capacity(instances.len());
    for binding in &bindings {
        by_instance
            .entry(binding.instance_id.as_str())
            .or_default()
            .push(binding);
    }

    Ok(instances
        .iter()
        .filter_map(|instance: &ServiceInstance| {
            let bound = by_instance.get(instance.id.as_str()).into_iter().flatten();
            reader::endpoint(instance, bound.copied())
        })
        .collect())
}
