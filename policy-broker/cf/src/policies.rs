use crate::client::Client;
use anyhow::Result;
use policy_broker_core::{store::PolicyStore, Action, PolicyTriple, Protocol};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

const POLICIES: &str = "/networking/v1/external/policies";
const DELETE: &str = "/networking/v1/external/policies/delete";

/// External network policies, as stored by the policy server.
#[derive(Clone)]
pub struct CfPolicyStore {
    client: Client,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Policies {
    #[serde(default)]
    policies: Vec<Policy>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Policy {
    source: Source,
    destination: Destination,
}

#[derive(Debug, Deserialize, Serialize)]
struct Source {
    id: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Destination {
    id: String,
    protocol: String,
    ports: Ports,
}

#[derive(Debug, Deserialize, Serialize)]
struct Ports {
    start: u16,
    end: u16,
}

// === impl CfPolicyStore ===

impl CfPolicyStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl PolicyStore for CfPolicyStore {
    async fn list_all_policies(&self) -> Result<Vec<PolicyTriple>> {
        let url = self.client.url(POLICIES, &[])?;
        let Policies { policies } = self.client.get(url).await?;
        let total = policies.len();
        let triples = policies
            .into_iter()
            .filter_map(Policy::into_triple)
            .collect::<Vec<_>>();
        debug!(total, triples = triples.len(), "Listed policies");
        Ok(triples)
    }

    async fn apply_policies(&self, action: Action, policies: &[PolicyTriple]) -> Result<()> {
        let path = match action {
            Action::Create => POLICIES,
            Action::Delete => DELETE,
        };
        let url = self.client.url(path, &[])?;
        let body = Policies {
            policies: policies.iter().map(Policy::from).collect(),
        };
        self.client.send_json(Method::POST, url, &body).await
    }
}

// === impl Policy ===

impl Policy {
    /// Policies over a port range, or for a protocol other than TCP or UDP,
    /// were not written by the broker and are not represented.
    fn into_triple(self) -> Option<PolicyTriple> {
        let Ports { start, end } = self.destination.ports;
        if start != end {
            debug!(
                source = %self.source.id,
                destination = %self.destination.id,
                start,
                end,
                "Skipping port range policy",
            );
            return None;
        }
        let protocol = match self.destination.protocol.parse::<Protocol>() {
            Ok(protocol) => protocol,
            Err(error) => {
                debug!(%error, "Skipping policy");
                return None;
            }
        };
        Some(PolicyTriple {
            source: self.source.id,
            destination: self.destination.id,
            protocol,
            port: start,
        })
    }
}

impl From<&PolicyTriple> for Policy {
    fn from(p: &PolicyTriple) -> Self {
        Self {
            source: Source {
                id: p.source.clone(),
            },
            destination: Destination {
                id: p.destination.clone(),
                protocol: p.protocol.to_string(),
                ports: Ports {
                    start: p.port,
                    end: p.port,
                },
            },
        }
    }
}
