use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The transport protocol a policy admits.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid protocol {0:?}, expected tcp or udp")]
pub struct InvalidProtocol(pub String);

/// The write a policy store performs for a batch of policies.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Delete,
}

/// The unit of authorization: `source` may reach `destination` on
/// `protocol`/`port`.
///
/// Identity is the full 4-tuple; policies differing only in port or protocol
/// are distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyTriple {
    pub source: String,
    pub destination: String,
    pub protocol: Protocol,
    pub port: u16,
}

// === impl Protocol ===

impl FromStr for Protocol {
    type Err = InvalidProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tcp") {
            Ok(Self::Tcp)
        } else if s.eq_ignore_ascii_case("udp") {
            Ok(Self::Udp)
        } else {
            Err(InvalidProtocol(s.to_string()))
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => "tcp".fmt(f),
            Self::Udp => "udp".fmt(f),
        }
    }
}

// === impl Action ===

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl PolicyTriple ===

impl PolicyTriple {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        protocol: Protocol,
        port: u16,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            protocol,
            port,
        }
    }
}

impl fmt::Display for PolicyTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} => {}:{}/{}",
            self.source, self.destination, self.port, self.protocol
        )
    }
}
