//! Reads typed endpoints out of labelled catalog entries.

use policy_broker_core::{
    catalog::{Binding, Labels, ServiceInstance},
    labels, BoundApp, Endpoint, Protocol, Role, Scope, Target, DEFAULT_PORT,
};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("missing label {0}")]
    MissingLabel(&'static str),

    #[error("unknown endpoint type {0:?}")]
    UnknownType(String),

    #[error("label {label} has an invalid value {value:?}")]
    InvalidValue { label: &'static str, value: String },

    #[error("a source must not carry a {} label", labels::SOURCE)]
    SourceWithTarget,

    #[error("a destination must not carry a {} label", labels::NAME)]
    DestinationWithName,

    #[error("binding {0} is not bound to an application")]
    NoApplication(String),
}

/// Reads an instance's role and logical name from its labels.
///
/// A source must carry a valid `name`; its `scope` defaults to local. A
/// destination must carry a valid `source`. Carrying both conventions is
/// rejected.
pub fn read_role(instance: &ServiceInstance) -> Result<(Role, String), ReadError> {
    let meta = &instance.labels;
    let kind = meta
        .get(labels::TYPE)
        .ok_or(ReadError::MissingLabel(labels::TYPE))?;

    match kind.as_str() {
        labels::TYPE_SOURCE => {
            if meta.contains_key(labels::SOURCE) {
                return Err(ReadError::SourceWithTarget);
            }
            let name = read_value(meta, labels::NAME)?;
            let scope = match meta.get(labels::SCOPE) {
                None => Scope::default(),
                Some(v) => v.parse().map_err(|_| ReadError::InvalidValue {
                    label: labels::SCOPE,
                    value: v.clone(),
                })?,
            };
            Ok((Role::Source(scope), name))
        }

        labels::TYPE_DESTINATION => {
            if meta.contains_key(labels::NAME) {
                return Err(ReadError::DestinationWithName);
            }
            let source = read_value(meta, labels::SOURCE)?;
            Ok((Role::Destination, source))
        }

        kind => Err(ReadError::UnknownType(kind.to_string())),
    }
}

fn read_value(meta: &Labels, label: &'static str) -> Result<String, ReadError> {
    let value = meta.get(label).ok_or(ReadError::MissingLabel(label))?;
    if !labels::is_valid_value(value) {
        return Err(ReadError::InvalidValue {
            label,
            value: value.clone(),
        });
    }
    Ok(value.clone())
}

/// Reads a destination binding's port and protocol.
///
/// A missing, empty or zero port means the default port; a missing protocol
/// means TCP.
pub fn read_target(meta: &Labels) -> Result<Target, ReadError> {
    let port = match meta.get(labels::PORT).map(|p| p.trim()) {
        None | Some("") => DEFAULT_PORT,
        Some(p) => match p.parse::<u16>() {
            Ok(0) => DEFAULT_PORT,
            Ok(port) => port,
            Err(_) => {
                return Err(ReadError::InvalidValue {
                    label: labels::PORT,
                    value: p.to_string(),
                })
            }
        },
    };

    let protocol = match meta.get(labels::PROTOCOL).map(|p| p.trim()) {
        None | Some("") => Protocol::default(),
        Some(p) => p.parse().map_err(|_| ReadError::InvalidValue {
            label: labels::PROTOCOL,
            value: p.to_string(),
        })?,
    };

    Ok(Target { port, protocol })
}

/// Reads a single binding for an endpoint with the given role.
pub fn read_binding(role: &Role, binding: &Binding) -> Result<BoundApp, ReadError> {
    let app_id = binding
        .app_id
        .clone()
        .ok_or_else(|| ReadError::NoApplication(binding.id.clone()))?;
    let target = match role {
        Role::Source(_) => None,
        Role::Destination => Some(read_target(&binding.labels)?),
    };
    Ok(BoundApp {
        binding_id: binding.id.clone(),
        app_id,
        target,
    })
}

/// Builds an endpoint from an instance and its bindings.
///
/// Returns `None` if the instance's labels are unusable. Bindings of other
/// instances are ignored; unusable bindings are dropped individually.
pub fn endpoint<'b>(
    instance: &ServiceInstance,
    bindings: impl IntoIterator<Item = &'b Binding>,
) -> Option<Endpoint> {
    let (role, logical_name) = match read_role(instance) {
        Ok(r) => r,
        Err(error) => {
            warn!(instance = %instance.id, name = %instance.name, %error, "Ignoring service instance");
            return None;
        }
    };

    let bound = bindings
        .into_iter()
        .filter(|b| b.instance_id == instance.id)
        .filter_map(|binding| match read_binding(&role, binding) {
            Ok(app) => Some(app),
            Err(error @ ReadError::NoApplication(_)) => {
                debug!(instance = %instance.id, %error, "Skipping binding");
                None
            }
            Err(error) => {
                warn!(instance = %instance.id, binding = %binding.id, %error, "Ignoring binding");
                None
            }
        })
        .collect();

    Some(Endpoint {
        instance_id: instance.id.clone(),
        space_id: instance.space_id.clone(),
        logical_name,
        role,
        bound,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn instance(labels: Labels) -> ServiceInstance {
        ServiceInstance {
            id: "si-1".to_string(),
            name: "my-instance".to_string(),
            space_id: "space-1".to_string(),
            labels,
            annotations: Labels::new(),
        }
    }

    fn binding(id: &str, app: Option<&str>, labels: Labels) -> Binding {
        Binding {
            id: id.to_string(),
            instance_id: "si-1".to_string(),
            app_id: app.map(Into::into),
            labels,
        }
    }

    fn source_labels(name: &str) -> Labels {
        btreemap! {
            labels::TYPE.to_string() => labels::TYPE_SOURCE.to_string(),
            labels::NAME.to_string() => name.to_string(),
        }
    }

    fn destination_labels(source: &str) -> Labels {
        btreemap! {
            labels::TYPE.to_string() => labels::TYPE_DESTINATION.to_string(),
            labels::SOURCE.to_string() => source.to_string(),
        }
    }

    #[test]
    fn source_defaults_to_local_scope() {
        let (role, name) = read_role(&instance(source_labels("web"))).unwrap();
        assert_eq!(role, Role::Source(Scope::Local));
        assert_eq!(name, "web");
    }

    #[test]
    fn source_with_global_scope() {
        let mut labels = source_labels("web");
        labels.insert(labels::SCOPE.to_string(), "global".to_string());
        let (role, _) = read_role(&instance(labels)).unwrap();
        assert_eq!(role, Role::Source(Scope::Global));
    }

    #[test]
    fn rejects_malformed_roles() {
        assert_eq!(
            read_role(&instance(Labels::new())),
            Err(ReadError::MissingLabel(labels::TYPE))
        );

        let mut labels = source_labels("web");
        labels.insert(labels::SCOPE.to_string(), "galactic".to_string());
        assert!(matches!(
            read_role(&instance(labels)),
            Err(ReadError::InvalidValue { label: labels::SCOPE, .. })
        ));

        let mut both = source_labels("web");
        both.insert(labels::SOURCE.to_string(), "api".to_string());
        assert_eq!(read_role(&instance(both)), Err(ReadError::SourceWithTarget));

        let mut both = destination_labels("web");
        both.insert(labels::NAME.to_string(), "api".to_string());
        assert_eq!(
            read_role(&instance(both)),
            Err(ReadError::DestinationWithName)
        );

        let labels = btreemap! {
            labels::TYPE.to_string() => "sideways".to_string(),
        };
        assert_eq!(
            read_role(&instance(labels)),
            Err(ReadError::UnknownType("sideways".to_string()))
        );

        assert_eq!(
            read_role(&instance(btreemap! {
                labels::TYPE.to_string() => labels::TYPE_SOURCE.to_string(),
            })),
            Err(ReadError::MissingLabel(labels::NAME))
        );

        assert!(matches!(
            read_role(&instance(source_labels("no spaces allowed"))),
            Err(ReadError::InvalidValue { label: labels::NAME, .. })
        ));
    }

    #[test]
    fn target_defaults() {
        assert_eq!(read_target(&Labels::new()).unwrap(), Target::default());
        let labels = btreemap! { labels::PORT.to_string() => "0".to_string() };
        assert_eq!(read_target(&labels).unwrap().port, DEFAULT_PORT);

        let labels = btreemap! {
            labels::PORT.to_string() => "9090".to_string(),
            labels::PROTOCOL.to_string() => "udp".to_string(),
        };
        assert_eq!(
            read_target(&labels).unwrap(),
            Target {
                port: 9090,
                protocol: Protocol::Udp
            }
        );

        let labels = btreemap! { labels::PORT.to_string() => "http".to_string() };
        assert!(read_target(&labels).is_err());
        let labels = btreemap! { labels::PORT.to_string() => "70000".to_string() };
        assert!(read_target(&labels).is_err());
        let labels = btreemap! { labels::PROTOCOL.to_string() => "icmp".to_string() };
        assert!(read_target(&labels).is_err());
    }

    #[test]
    fn source_bindings_carry_no_target() {
        let inst = instance(source_labels("web"));
        let port = btreemap! { labels::PORT.to_string() => "9090".to_string() };
        let bindings = [binding("b-1", Some("app-1"), port)];
        let ep = endpoint(&inst, &bindings).expect("endpoint must be read");
        assert_eq!(
            ep.bound,
            vec![BoundApp {
                binding_id: "b-1".to_string(),
                app_id: "app-1".to_string(),
                target: None,
            }]
        );
    }

    #[test]
    fn destination_bindings_carry_targets() {
        let inst = instance(destination_labels("web"));
        let bindings = [
            binding("b-1", Some("app-1"), Labels::new()),
            binding(
                "b-2",
                Some("app-2"),
                btreemap! { labels::PORT.to_string() => "9090".to_string() },
            ),
        ];
        let ep = endpoint(&inst, &bindings).expect("endpoint must be read");
        assert_eq!(ep.role, Role::Destination);
        assert_eq!(ep.logical_name, "web");
        let targets = ep.bound.iter().map(|b| b.target).collect::<Vec<_>>();
        assert_eq!(
            targets,
            vec![
                Some(Target::default()),
                Some(Target {
                    port: 9090,
                    protocol: Protocol::Tcp
                })
            ]
        );
    }

    #[test]
    fn unusable_bindings_are_dropped_individually() {
        let inst = instance(destination_labels("web"));
        let mut foreign = binding("b-3", Some("app-3"), Labels::new());
        foreign.instance_id = "si-2".to_string();
        let bindings = [
            binding("b-1", None, Labels::new()),
            binding(
                "b-2",
                Some("app-2"),
                btreemap! { labels::PORT.to_string() => "nope".to_string() },
            ),
            foreign,
            binding("b-4", Some("app-4"), Labels::new()),
        ];
        let ep = endpoint(&inst, &bindings).expect("endpoint must be read");
        let apps = ep.bound.iter().map(|b| b.app_id.as_str()).collect::<Vec<_>>();
        assert_eq!(apps, vec!["app-4"]);
    }

    #[test]
    fn malformed_instance_yields_no_endpoint() {
        let inst = instance(Labels::new());
        assert_eq!(endpoint(&inst, std::iter::empty()), None);
    }
}
