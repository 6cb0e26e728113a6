use crate::{Protocol, DEFAULT_PORT};
use serde::Serialize;
use std::{fmt, str::FromStr};

/// Indicates which destinations may join a source.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Only destinations in the source's own space may join.
    #[default]
    Local,

    /// Destinations in any space may join.
    Global,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid scope {0:?}, expected local or global")]
pub struct InvalidScope(pub String);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Source(Scope),
    Destination,
}

/// The port & protocol a destination application is reached on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub port: u16,
    pub protocol: Protocol,
}

/// An application bound to an endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BoundApp {
    pub binding_id: String,
    pub app_id: String,

    /// Always `None` for sources: only the identity of a source application
    /// matters.
    pub target: Option<Target>,
}

/// A typed view of one labelled service instance and its live bindings.
///
/// Endpoints are never persisted; they are rebuilt from the relationship
/// catalog whenever policies are derived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub instance_id: String,
    pub space_id: String,

    /// A source's own name, or the name of the source a destination targets.
    pub logical_name: String,
    pub role: Role,
    pub bound: Vec<BoundApp>,
}

// === impl Scope ===

impl FromStr for Scope {
    type Err = InvalidScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "global" => Ok(Self::Global),
            s => Err(InvalidScope(s.to_string())),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => "local".fmt(f),
            Self::Global => "global".fmt(f),
        }
    }
}

// === impl Target ===

impl Default for Target {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            protocol: Protocol::default(),
        }
    }
}

// === impl Endpoint ===

impl Endpoint {
    pub fn is_source(&self) -> bool {
        matches!(self.role, Role::Source(_))
    }

    pub fn scope(&self) -> Option<Scope> {
        match self.role {
            Role::Source(scope) => Some(scope),
            Role::Destination => None,
        }
    }

    /// Returns true if this endpoint is a source that `destination` may join.
    ///
    /// The destination must target this source's name and, unless the source
    /// is global, live in the same space.
    pub fn admits(&self, destination: &Endpoint) -> bool {
        let Role::Source(scope) = self.role else {
            return false;
        };
        destination.role == Role::Destination
            && destination.logical_name == self.logical_name
            && (scope == Scope::Global || destination.space_id == self.space_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(space: &str, name: &str, role: Role) -> Endpoint {
        Endpoint {
            instance_id: format!("{space}-{name}"),
            space_id: space.to_string(),
            logical_name: name.to_string(),
            role,
            bound: vec![],
        }
    }

    #[test]
    fn test_parse_displayed() {
        for scope in [Scope::Local, Scope::Global] {
            assert_eq!(
                scope.to_string().parse::<Scope>().unwrap(),
                scope,
                "failed to parse displayed {:?}",
                scope
            );
        }
        assert!("Local".parse::<Scope>().is_err());
        assert!("".parse::<Scope>().is_err());
    }

    #[test]
    fn local_source_admits_same_space_only() {
        let src = endpoint("s1", "web", Role::Source(Scope::Local));
        assert!(src.admits(&endpoint("s1", "web", Role::Destination)));
        assert!(!src.admits(&endpoint("s2", "web", Role::Destination)));
        assert!(!src.admits(&endpoint("s1", "api", Role::Destination)));
    }

    #[test]
    fn global_source_admits_any_space() {
        let src = endpoint("s1", "web", Role::Source(Scope::Global));
        assert!(src.admits(&endpoint("s1", "web", Role::Destination)));
        assert!(src.admits(&endpoint("s2", "web", Role::Destination)));
    }

    #[test]
    fn only_sources_admit_destinations() {
        let dst = endpoint("s1", "web", Role::Destination);
        assert!(!dst.admits(&dst.clone()));
        let src = endpoint("s1", "web", Role::Source(Scope::Global));
        assert!(!src.admits(&src.clone()));
    }
}
