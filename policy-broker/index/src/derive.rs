//! Derives the policies implied by endpoints.

use policy_broker_core::{Endpoint, PolicyTriple, Role};
use std::collections::BTreeSet;
use tracing::warn;

/// The sources a destination may join.
#[derive(Debug, PartialEq, Eq)]
pub enum SourceMatch<'e> {
    None,
    Unique(&'e Endpoint),

    /// More than one visible source shares the destination's logical name.
    /// The first, in catalog order, is used.
    Ambiguous { first: &'e Endpoint, count: usize },
}

// === impl SourceMatch ===

impl<'e> SourceMatch<'e> {
    pub fn source(&self) -> Option<&'e Endpoint> {
        match *self {
            Self::None => None,
            Self::Unique(src) | Self::Ambiguous { first: src, .. } => Some(src),
        }
    }
}

/// Finds the sources visible to `destination` among `endpoints`.
pub fn find_source<'e>(destination: &Endpoint, endpoints: &'e [Endpoint]) -> SourceMatch<'e> {
    let mut visible = endpoints.iter().filter(|e| e.admits(destination));
    let Some(first) = visible.next() else {
        return SourceMatch::None;
    };
    match visible.count() {
        0 => SourceMatch::Unique(first),
        n => SourceMatch::Ambiguous {
            first,
            count: n + 1,
        },
    }
}

/// Derives the policies that involve `endpoint`, given its potential
/// counterparts.
///
/// A source joins every destination it admits. A destination joins only the
/// first source that admits it. Having no counterpart yields no policies.
pub fn derive(endpoint: &Endpoint, counterparts: &[Endpoint]) -> Vec<PolicyTriple> {
    let mut policies = BTreeSet::new();
    match endpoint.role {
        Role::Source(_) => {
            for dst in counterparts.iter().filter(|d| endpoint.admits(d)) {
                join(endpoint, dst, &mut policies);
            }
        }
        Role::Destination => match find_source(endpoint, counterparts) {
            SourceMatch::None => {}
            SourceMatch::Unique(src) => join(src, endpoint, &mut policies),
            SourceMatch::Ambiguous { first, count } => {
                warn!(
                    destination = %endpoint.instance_id,
                    name = %endpoint.logical_name,
                    sources = count,
                    chosen = %first.instance_id,
                    "Multiple sources share a name; using the first",
                );
                join(first, endpoint, &mut policies);
            }
        },
    }
    policies.into_iter().collect()
}

/// Derives every policy implied by `endpoints`: each source joined with each
/// destination it admits. The result is sorted and free of duplicates.
///
/// Unlike [`derive`] for a destination, a destination admitted by several
/// sources of the same name is joined with all of them. Each such
/// destination is logged.
pub fn derive_all(endpoints: &[Endpoint]) -> Vec<PolicyTriple> {
    for dst in endpoints.iter().filter(|e| !e.is_source()) {
        if let SourceMatch::Ambiguous { count, .. } = find_source(dst, endpoints) {
            warn!(
                destination = %dst.instance_id,
                name = %dst.logical_name,
                sources = count,
                "Multiple sources share a name; joining all of them",
            );
        }
    }

    let mut policies = BTreeSet::new();
    for src in endpoints.iter().filter(|e| e.is_source()) {
        for dst in endpoints.iter().filter(|d| src.admits(d)) {
            join(src, dst, &mut policies);
        }
    }
    policies.into_iter().collect()
}

fn join(src: &Endpoint, dst: &Endpoint, policies: &mut BTreeSet<PolicyTriple>) {
    for from in &src.bound {
        for to in &dst.bound {
            let target = to.target.unwrap_or_default();
            policies.insert(PolicyTriple::new(
                from.app_id.clone(),
                to.app_id.clone(),
                target.protocol,
                target.port,
            ));
        }
    }
}
