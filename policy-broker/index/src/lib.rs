//! Policy Broker Index
//!
//! Turns the relationship catalog into the set of policies that *should*
//! exist:
//!
//! - Each labelled service instance, together with its bindings, is read into
//!   a typed [`Endpoint`](policy_broker_core::Endpoint). Instances with
//!   missing or malformed labels are skipped rather than failing the whole
//!   catalog.
//! - Sources are joined to destinations by logical name. A local source only
//!   joins destinations in its own space; a global source joins any space.
//! - Each (source app, destination app) pair yields one policy on the
//!   destination binding's port and protocol.
//!
//! ```text
//! [ Source ] <- name -- [ Destination ]
//!     |                       |
//!  src apps      x       dst apps (port/protocol)  ==> [ PolicyTriple ]
//! ```
//!
//! Deriving for a single endpoint (the bind/unbind path) and deriving for the
//! whole catalog (the reconciliation loop) apply the same matching rule, so
//! the union of the former over every endpoint equals the latter. The one
//! difference is a destination admitted by several same-named sources: a
//! newly bound destination joins only the first, while the reconciliation
//! loop joins every match. Both log a warning each time.
//!
//! [`Names`] caches display names for diagnostics.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod derive;
mod load;
pub mod names;
pub mod reader;


pub use self::{
    derive::{derive, derive_all, find_source, SourceMatch},
    load::{load_counterparts, load_endpoints},
    names::{Names, NamesMetrics},
    reader::ReadError,
};
