//! Typed, validated provisioning and binding parameters.

use policy_broker_core::{catalog::Labels, labels, Protocol, Scope, Target, DEFAULT_PORT};
use serde::Deserialize;
use serde_json::Value;

const MAX_DESCRIPTION_LEN: usize = 128;

/// Ports at or below this value are reserved.
const MIN_PORT_EXCLUSIVE: i64 = 1024;
const MAX_PORT_EXCLUSIVE: i64 = 65535;

/// The parameters of a new service instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstanceParameters {
    Source {
        name: String,
        scope: Scope,
        description: Option<String>,
    },
    Destination {
        source: String,
    },
}

/// The parameters of a new binding. Both fields are optional; a destination
/// binding without them is reached on the default port over TCP.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingParameters {
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
}

#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
    #[error("parameters are missing")]
    Missing,

    #[error("failed to parse parameters: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("parameter {0:?} is missing")]
    MissingParameter(&'static str),

    #[error("parameter {name:?} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("parameter {name:?} is not valid for a {kind}")]
    NotApplicable {
        name: &'static str,
        kind: &'static str,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInstance {
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    scope: Option<String>,
    description: Option<String>,
    source: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBinding {
    port: Option<i64>,
    protocol: Option<String>,
}

// === impl InstanceParameters ===

impl InstanceParameters {
    pub fn parse(params: Option<&Value>) -> Result<Self, ParameterError> {
        let raw = RawInstance::deserialize(params.ok_or(ParameterError::Missing)?)?;
        let kind = raw.kind.ok_or(ParameterError::MissingParameter("type"))?;

        match kind.as_str() {
            labels::TYPE_SOURCE => {
                if raw.source.is_some() {
                    return Err(ParameterError::NotApplicable {
                        name: "source",
                        kind: labels::TYPE_SOURCE,
                    });
                }
                let name = logical_name("name", raw.name)?;
                let scope = match raw.scope.as_deref() {
                    None | Some("") => Scope::default(),
                    Some(s) => s.parse().map_err(|e| ParameterError::Invalid {
                        name: "scope",
                        reason: format!("{e}"),
                    })?,
                };
                let description = raw.description.filter(|d| !d.is_empty());
                if let Some(d) = description.as_ref() {
                    if d.len() > MAX_DESCRIPTION_LEN {
                        return Err(ParameterError::Invalid {
                            name: "description",
                            reason: format!(
                                "maximum length is {MAX_DESCRIPTION_LEN}, got {}",
                                d.len()
                            ),
                        });
                    }
                }
                Ok(Self::Source {
                    name,
                    scope,
                    description,
                })
            }

            labels::TYPE_DESTINATION => {
                for (param, set) in [
                    ("name", raw.name.is_some()),
                    ("scope", raw.scope.is_some()),
                    ("description", raw.description.is_some()),
                ] {
                    if set {
                        return Err(ParameterError::NotApplicable {
                            name: param,
                            kind: labels::TYPE_DESTINATION,
                        });
                    }
                }
                let source = logical_name("source", raw.source)?;
                Ok(Self::Destination { source })
            }

            kind => Err(ParameterError::Invalid {
                name: "type",
                reason: format!(
                    "expected {} or {}, got {kind:?}",
                    labels::TYPE_SOURCE,
                    labels::TYPE_DESTINATION
                ),
            }),
        }
    }

    /// The source name this instance declares or targets.
    pub fn logical_name(&self) -> &str {
        match self {
            Self::Source { name, .. } => name,
            Self::Destination { source } => source,
        }
    }

    pub fn labels(&self) -> Labels {
        let mut meta = Labels::new();
        match self {
            Self::Source { name, scope, .. } => {
                meta.insert(labels::TYPE.to_string(), labels::TYPE_SOURCE.to_string());
                meta.insert(labels::NAME.to_string(), name.clone());
                meta.insert(labels::SCOPE.to_string(), scope.to_string());
            }
            Self::Destination { source } => {
                meta.insert(
                    labels::TYPE.to_string(),
                    labels::TYPE_DESTINATION.to_string(),
                );
                meta.insert(labels::SOURCE.to_string(), source.clone());
            }
        }
        meta
    }

    pub fn annotations(&self) -> Labels {
        let mut meta = Labels::new();
        if let Self::Source {
            description: Some(description),
            ..
        } = self
        {
            meta.insert(labels::DESCRIPTION.to_string(), description.clone());
        }
        meta
    }
}

fn logical_name(param: &'static str, value: Option<String>) -> Result<String, ParameterError> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or(ParameterError::MissingParameter(param))?;
    if !labels::is_valid_value(&value) {
        return Err(ParameterError::Invalid {
            name: param,
            reason: format!("must match {}", labels::VALUE_PATTERN),
        });
    }
    Ok(value)
}

// === impl BindingParameters ===

impl BindingParameters {
    /// Parses binding parameters. Absent parameters are valid.
    pub fn parse(params: Option<&Value>) -> Result<Self, ParameterError> {
        let Some(params) = params else {
            return Ok(Self::default());
        };
        let raw = RawBinding::deserialize(params)?;

        let port = raw
            .port
            .map(|port| {
                if port <= MIN_PORT_EXCLUSIVE || port >= MAX_PORT_EXCLUSIVE {
                    return Err(ParameterError::Invalid {
                        name: "port",
                        reason: format!(
                            "must be an integer between {MIN_PORT_EXCLUSIVE} and {MAX_PORT_EXCLUSIVE}, got {port}"
                        ),
                    });
                }
                u16::try_from(port).map_err(|e| ParameterError::Invalid {
                    name: "port",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let protocol = raw
            .protocol
            .map(|p| {
                p.parse::<Protocol>().map_err(|e| ParameterError::Invalid {
                    name: "protocol",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self { port, protocol })
    }

    /// The labels recorded on the binding.
    pub fn labels(&self) -> Labels {
        let mut meta = Labels::new();
        if let Some(port) = self.port {
            meta.insert(labels::PORT.to_string(), port.to_string());
        }
        if let Some(protocol) = self.protocol {
            meta.insert(labels::PROTOCOL.to_string(), protocol.to_string());
        }
        meta
    }

    pub fn target(&self) -> Target {
        Target {
            port: self.port.unwrap_or(DEFAULT_PORT),
            protocol: self.protocol.unwrap_or_default(),
        }
    }
}
