use crate::{
    converge::{ApplyError, Convergence, Converger, FetchError},
    deferred::{Deferred, DeferredHandle, DeferredState},
    params::{BindingParameters, InstanceParameters, ParameterError},
    scheduler::Reconcile,
};
use policy_broker_core::{
    catalog::{Binding, InstanceFilter, RelationshipCatalog, ServiceInstance},
    labels, Action, Endpoint, PolicyTriple, Role, Scope,
};
use policy_broker_index::{self as index, reader, Names, ReadError};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, info_span, Instrument};

/// How long a new instance's labels are held back before being written. The
/// platform rejects metadata updates while the instance is still being
/// created.
pub const DEFAULT_LABEL_DELAY: Duration = Duration::from_secs(3);

/// Handles broker events and runs reconciliation cycles.
pub struct Broker {
    catalog: Arc<dyn RelationshipCatalog>,
    converger: Converger,
    names: Arc<Names>,
    deferred: Deferred,
    label_delay: Duration,
}

/// A declared source, as listed to operators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    #[serde(skip)]
    pub instance_id: String,
    pub source: String,
    pub scope: Scope,
    pub description: String,
    pub org: String,
    pub space: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Parameters(#[from] ParameterError),

    #[error("service instance {0} not found")]
    InstanceNotFound(String),

    #[error("service instance {0} is not a network-policy endpoint: {1}")]
    NotAnEndpoint(String, #[source] ReadError),

    #[error("binding {0} is unusable: {1}")]
    InvalidBinding(String, #[source] ReadError),

    #[error("a source named {name:?} already exists in space {space_id}")]
    NameTaken { name: String, space_id: String },

    #[error("relationship catalog request failed: {0:#}")]
    Catalog(#[source] anyhow::Error),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

// === impl Broker ===

impl Broker {
    pub fn new(
        catalog: Arc<dyn RelationshipCatalog>,
        converger: Converger,
        names: Arc<Names>,
    ) -> Self {
        Self {
            catalog,
            converger,
            names,
            deferred: Deferred::default(),
            label_delay: DEFAULT_LABEL_DELAY,
        }
    }

    pub fn with_label_delay(mut self, delay: Duration) -> Self {
        self.label_delay = delay;
        self
    }

    /// Creates the policies a new binding implies, returning how many were
    /// written.
    pub async fn on_bind(
        &self,
        instance: &ServiceInstance,
        binding: &Binding,
    ) -> Result<usize, BrokerError> {
        let policies = self.policies_for(instance, binding).await?;
        self.apply(Action::Create, &policies)
            .instrument(info_span!("bind", instance = %instance.id, binding = %binding.id))
            .await
    }

    /// Deletes the policies a removed binding implied, returning how many
    /// were deleted.
    ///
    /// Policies are deleted even if another binding also implies them; the
    /// next reconciliation cycle recreates them.
    pub async fn on_unbind(
        &self,
        instance: &ServiceInstance,
        binding: &Binding,
    ) -> Result<usize, BrokerError> {
        let policies = self.policies_for(instance, binding).await?;
        self.apply(Action::Delete, &policies)
            .instrument(info_span!("unbind", instance = %instance.id, binding = %binding.id))
            .await
    }

    /// Validates and records a new binding's parameters, then creates the
    /// policies it implies.
    pub async fn bind(
        &self,
        instance_id: &str,
        binding_id: &str,
        app_id: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<usize, BrokerError> {
        let params = BindingParameters::parse(params)?;
        let target = params.target();
        debug!(binding = %binding_id, port = target.port, protocol = %target.protocol, "Binding");
        let labels = params.labels();
        if !labels.is_empty() {
            self.catalog
                .update_binding_labels(binding_id, &labels)
                .await
                .map_err(BrokerError::Catalog)?;
        }

        let instance = self.instance(instance_id).await?;
        let binding = Binding {
            id: binding_id.to_string(),
            instance_id: instance_id.to_string(),
            app_id: Some(app_id.to_string()),
            labels,
        };
        self.on_bind(&instance, &binding).await
    }

    /// Runs a full reconciliation pass: derives every desired policy from the
    /// catalog and creates those missing from the store.
    pub async fn reconcile(&self) -> Result<Convergence, BrokerError> {
        let endpoints = index::load_endpoints(&*self.catalog)
            .await
            .map_err(BrokerError::Catalog)?;
        let desired = index::derive_all(&endpoints);
        debug!(endpoints = endpoints.len(), desired = desired.len(), "Derived policies");

        let convergence = self.converger.converge(&desired).await?;
        self.describe(None, convergence.created.clone());
        Ok(convergence)
    }

    /// Runs a full reconciliation pass, returning how many missing policies
    /// were created.
    pub async fn run_reconciliation_cycle(&self) -> Result<usize, BrokerError> {
        Ok(self.reconcile().await?.fixed())
    }

    /// Validates a new instance and schedules its labels to be written.
    ///
    /// A source may not reuse a name already declared by another instance in
    /// the same space.
    pub async fn provision(
        &self,
        instance_id: &str,
        space_id: &str,
        params: InstanceParameters,
    ) -> Result<DeferredHandle, BrokerError> {
        if let InstanceParameters::Source { name, .. } = &params {
            let filter = InstanceFilter::labeled(labels::TYPE, labels::TYPE_SOURCE)
                .and_label(labels::NAME, name)
                .in_space(space_id);
            let taken = self
                .catalog
                .list_instances(&filter)
                .await
                .map_err(BrokerError::Catalog)?
                .into_iter()
                .any(|i| i.id != instance_id);
            if taken {
                return Err(BrokerError::NameTaken {
                    name: name.clone(),
                    space_id: space_id.to_string(),
                });
            }
        }

        let catalog = self.catalog.clone();
        let id = instance_id.to_string();
        let labels = params.labels();
        let annotations = params.annotations();
        info!(instance = %instance_id, name = %params.logical_name(), "Provisioning");
        Ok(self.deferred.spawn(instance_id, self.label_delay, async move {
            catalog
                .update_instance_metadata(&id, &labels, &annotations)
                .await
        }))
    }

    /// The progress of an instance's deferred label write, if one is tracked.
    pub fn provision_state(&self, instance_id: &str) -> Option<DeferredState> {
        self.deferred.state(instance_id)
    }

    /// Stops tracking an instance. Policies are left to their bindings.
    pub fn deprovision(&self, instance_id: &str) -> bool {
        self.deferred.forget(instance_id)
    }

    /// Lists every declared source with display names resolved.
    pub async fn list_sources(&self) -> Result<Vec<SourceInfo>, BrokerError> {
        let instances = self
            .catalog
            .list_instances(&InstanceFilter::labeled(labels::TYPE, labels::TYPE_SOURCE))
            .await
            .map_err(BrokerError::Catalog)?;

        let mut sources = Vec::with_capacity(instances.len());
        for instance in instances {
            let (scope, name) = match reader::read_role(&instance) {
                Ok((Role::Source(scope), name)) => (scope, name),
                Ok((Role::Destination, _)) => continue,
                Err(error) => {
                    debug!(instance = %instance.id, %error, "Skipping source");
                    continue;
                }
            };
            let space = self.names.space(&instance.space_id).await;
            let org = match space.as_ref() {
                Some(space) => self.names.org(&space.org_id).await,
                None => None,
            };
            sources.push(SourceInfo {
                source: name,
                scope,
                description: instance
                    .annotations
                    .get(labels::DESCRIPTION)
                    .cloned()
                    .unwrap_or_default(),
                org: org.map(|o| o.name).unwrap_or_default(),
                space: space.map(|s| s.name).unwrap_or_default(),
                instance_id: instance.id,
            });
        }
        Ok(sources)
    }

    async fn instance(&self, id: &str) -> Result<ServiceInstance, BrokerError> {
        self.catalog
            .get_instance(id)
            .await
            .map_err(BrokerError::Catalog)?
            .ok_or_else(|| BrokerError::InstanceNotFound(id.to_string()))
    }

    /// Derives the policies that involve only `binding`'s application.
    async fn policies_for(
        &self,
        instance: &ServiceInstance,
        binding: &Binding,
    ) -> Result<Vec<PolicyTriple>, BrokerError> {
        let (role, logical_name) = reader::read_role(instance)
            .map_err(|e| BrokerError::NotAnEndpoint(instance.id.clone(), e))?;
        let app = reader::read_binding(&role, binding)
            .map_err(|e| BrokerError::InvalidBinding(binding.id.clone(), e))?;
        let endpoint = Endpoint {
            instance_id: instance.id.clone(),
            space_id: instance.space_id.clone(),
            logical_name,
            role,
            bound: vec![app],
        };

        let counterparts = index::load_counterparts(&*self.catalog, &endpoint)
            .await
            .map_err(BrokerError::Catalog)?;
        Ok(index::derive(&endpoint, &counterparts))
    }

    async fn apply(&self, action: Action, policies: &[PolicyTriple]) -> Result<usize, BrokerError> {
        if policies.is_empty() {
            debug!(%action, "No counterpart; nothing to apply");
            return Ok(0);
        }
        self.converger.apply(action, policies).await?;
        for policy in policies {
            info!(%action, %policy, "Applied policy");
        }
        self.describe(Some(action), policies.to_vec());
        Ok(policies.len())
    }

    /// Logs `policies` with application names from a background task.
    fn describe(&self, action: Option<Action>, policies: Vec<PolicyTriple>) {
        if policies.is_empty() {
            return;
        }
        let names = self.names.clone();
        tokio::spawn(
            async move {
                for policy in &policies {
                    let named = names.describe(policy).await;
                    match action {
                        Some(action) => debug!(%action, policy = %named, "Named applied policy"),
                        None => debug!(policy = %named, "Named fixed policy"),
                    }
                }
            }
            .in_current_span(),
        );
    }
}

#[async_trait::async_trait]
impl Reconcile for Broker {
    async fn reconcile(&self) -> anyhow::Result<Convergence> {
        Ok(Broker::reconcile(self).await?)
    }
}

// === impl BrokerError ===

impl BrokerError {
    /// Returns true if the request itself was at fault, rather than a
    /// collaborator.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::Parameters(_)
                | Self::InstanceNotFound(_)
                | Self::NotAnEndpoint(..)
                | Self::InvalidBinding(..)
                | Self::NameTaken { .. }
        )
    }
}
