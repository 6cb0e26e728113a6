//! Label and annotation keys carried by service instances and bindings.

use regex::Regex;
use std::sync::OnceLock;

pub const PREFIX: &str = "network-policies.broker";

/// `source` or `destination`.
pub const TYPE: &str = "network-policies.broker/type";

/// A source's logical name.
pub const NAME: &str = "network-policies.broker/name";

/// `local` or `global`; sources only.
pub const SCOPE: &str = "network-policies.broker/scope";

/// The logical name of the source a destination targets.
pub const SOURCE: &str = "network-policies.broker/source";

/// A destination binding's port.
pub const PORT: &str = "network-policies.broker/port";

/// A destination binding's protocol, `tcp` or `udp`.
pub const PROTOCOL: &str = "network-policies.broker/protocol";

/// Annotation holding a source's free-form description.
pub const DESCRIPTION: &str = "network-policies.broker/description";

pub const TYPE_SOURCE: &str = "source";
pub const TYPE_DESTINATION: &str = "destination";

pub const VALUE_PATTERN: &str = r"^[a-zA-Z0-9._-]{1,64}$";

/// Returns true if `value` may be used as a logical endpoint name.
pub fn is_valid_value(value: &str) -> bool {
    static VALUE: OnceLock<Regex> = OnceLock::new();
    VALUE
        .get_or_init(|| Regex::new(VALUE_PATTERN).expect("value pattern must compile"))
        .is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values() {
        assert!(is_valid_value("web"));
        assert!(is_valid_value("my-app_v1.2"));
        assert!(is_valid_value(&"a".repeat(64)));
        assert!(!is_valid_value(&"a".repeat(65)));
        assert!(!is_valid_value(""));
        assert!(!is_valid_value("web app"));
        assert!(!is_valid_value("web/app"));
    }

    #[test]
    fn keys_share_prefix() {
        for key in [TYPE, NAME, SCOPE, SOURCE, PORT, PROTOCOL, DESCRIPTION] {
            assert!(key.starts_with(PREFIX), "{key}");
        }
    }
}
