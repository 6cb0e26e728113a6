//! The relationship catalog: service instances, their bindings and metadata.

use anyhow::Result;
use std::{collections::BTreeMap, fmt, sync::Arc};

pub type Labels = BTreeMap<String, String>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceInstance {
    pub id: String,
    pub name: String,
    pub space_id: String,
    pub labels: Labels,
    pub annotations: Labels,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Binding {
    pub id: String,
    pub instance_id: String,

    /// Service keys are bindings without an application.
    pub app_id: Option<String>,
    pub labels: Labels,
}

/// A single label-selector requirement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelRequirement {
    Equals(String, String),
    In(String, Vec<String>),
}

/// Selects service instances. All requirements must hold.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    pub labels: Vec<LabelRequirement>,
    pub space_ids: Vec<String>,
}

/// Selects the bindings of a set of service instances.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingFilter {
    pub instance_ids: Vec<String>,
}

#[async_trait::async_trait]
pub trait RelationshipCatalog: Send + Sync {
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<ServiceInstance>>;

    /// Returns `None` if the instance does not exist (anymore).
    async fn get_instance(&self, id: &str) -> Result<Option<ServiceInstance>>;

    async fn list_bindings(&self, filter: &BindingFilter) -> Result<Vec<Binding>>;

    async fn update_instance_metadata(
        &self,
        id: &str,
        labels: &Labels,
        annotations: &Labels,
    ) -> Result<()>;

    async fn update_binding_labels(&self, id: &str, labels: &Labels) -> Result<()>;
}

#[async_trait::async_trait]
impl<T: RelationshipCatalog + ?Sized> RelationshipCatalog for Arc<T> {
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<ServiceInstance>> {
        (**self).list_instances(filter).await
    }

    async fn get_instance(&self, id: &str) -> Result<Option<ServiceInstance>> {
        (**self).get_instance(id).await
    }

    async fn list_bindings(&self, filter: &BindingFilter) -> Result<Vec<Binding>> {
        (**self).list_bindings(filter).await
    }

    async fn update_instance_metadata(
        &self,
        id: &str,
        labels: &Labels,
        annotations: &Labels,
    ) -> Result<()> {
        (**self)
            .update_instance_metadata(id, labels, annotations)
            .await
    }

    async fn update_binding_labels(&self, id: &str, labels: &Labels) -> Result<()> {
        (**self).update_binding_labels(id, labels).await
    }
}

// === impl LabelRequirement ===

impl LabelRequirement {
    pub fn matches(&self, labels: &Labels) -> bool {
        match self {
            Self::Equals(key, value) => labels.get(key) == Some(value),
            Self::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
        }
    }
}

/// Formats the requirement in label-selector syntax, e.g. `key==value` or
/// `key in (a,b)`.
impl fmt::Display for LabelRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(key, value) => write!(f, "{key}=={value}"),
            Self::In(key, values) => write!(f, "{key} in ({})", values.join(",")),
        }
    }
}

// === impl InstanceFilter ===

impl InstanceFilter {
    /// Selects instances carrying `key=value`.
    pub fn labeled(key: impl ToString, value: impl ToString) -> Self {
        Self::default().and_label(key, value)
    }

    pub fn and_label(mut self, key: impl ToString, value: impl ToString) -> Self {
        self.labels
            .push(LabelRequirement::Equals(key.to_string(), value.to_string()));
        self
    }

    pub fn and_label_in(
        mut self,
        key: impl ToString,
        values: impl IntoIterator<Item = impl ToString>,
    ) -> Self {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.labels
            .push(LabelRequirement::In(key.to_string(), values));
        self
    }

    pub fn in_space(mut self, space_id: impl ToString) -> Self {
        self.space_ids.push(space_id.to_string());
        self
    }

    /// The comma-joined label selector, or `None` if no labels are required.
    pub fn label_selector(&self) -> Option<String> {
        if self.labels.is_empty() {
            return None;
        }
        let reqs = self.labels.iter().map(|r| r.to_string()).collect::<Vec<_>>();
        Some(reqs.join(","))
    }

    pub fn matches(&self, instance: &ServiceInstance) -> bool {
        (self.space_ids.is_empty() || self.space_ids.contains(&instance.space_id))
            && self.labels.iter().all(|r| r.matches(&instance.labels))
    }
}

// === impl BindingFilter ===

impl BindingFilter {
    pub fn instances(ids: impl IntoIterator<Item = impl ToString>) -> Self {
        Self {
            instance_ids: ids.into_iter().map(|id| id.to_string()).collect(),
        }
    }

    pub fn matches(&self, binding: &Binding) -> bool {
        self.instance_ids.contains(&binding.instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn instance(space: &str, labels: Labels) -> ServiceInstance {
        ServiceInstance {
            id: "si-1".to_string(),
            name: "si".to_string(),
            space_id: space.to_string(),
            labels,
            annotations: Labels::new(),
        }
    }

    #[test]
    fn label_selector_syntax() {
        let filter = InstanceFilter::labeled("a/type", "source").and_label_in("a/name", ["x", "y"]);
        assert_eq!(
            filter.label_selector().as_deref(),
            Some("a/type==source,a/name in (x,y)")
        );
        assert_eq!(InstanceFilter::default().label_selector(), None);
    }

    #[test]
    fn filter_matches_labels_and_space() {
        let inst = instance(
            "s1",
            btreemap! {
                "a/type".to_string() => "source".to_string(),
                "a/name".to_string() => "web".to_string(),
            },
        );
        assert!(InstanceFilter::default().matches(&inst));
        assert!(InstanceFilter::labeled("a/type", "source").matches(&inst));
        assert!(InstanceFilter::labeled("a/type", "source")
            .in_space("s1")
            .matches(&inst));
        assert!(!InstanceFilter::labeled("a/type", "source")
            .in_space("s2")
            .matches(&inst));
        assert!(!InstanceFilter::labeled("a/type", "destination").matches(&inst));
        assert!(InstanceFilter::default()
            .and_label_in("a/type", ["source", "destination"])
            .matches(&inst));
        assert!(!InstanceFilter::labeled("a/scope", "local").matches(&inst));
    }

    #[test]
    fn binding_filter_matches_instances() {
        let binding = Binding {
            id: "b-1".to_string(),
            instance_id: "si-1".to_string(),
            app_id: Some("app".to_string()),
            labels: Labels::new(),
        };
        assert!(BindingFilter::instances(["si-1", "si-2"]).matches(&binding));
        assert!(!BindingFilter::instances(["si-2"]).matches(&binding));
    }
}
