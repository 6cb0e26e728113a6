//! Types shared by every part of the policy broker.
//!
//! An operator declares intent by labelling service instances as either a
//! *source* (something that may be reached) or a *destination* (something
//! that names a source it wants to reach). Applications are bound to these
//! instances, and each (source app, destination app, protocol, port) pairing
//! becomes a [`PolicyTriple`] that must exist in the platform's
//! network-policy store.
//!
//! ```text
//! [ ServiceInstance ] <- [ Binding ] -> app
//!         |
//!     [ Endpoint ] -- joined by logical name --> [ PolicyTriple ]
//! ```
//!
//! The collaborator traits in [`catalog`], [`store`] and [`resolve`] are the
//! seams behind which the platform APIs live.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod catalog;
mod endpoint;
pub mod labels;
mod policy;
pub mod resolve;
pub mod store;

pub use self::{
    endpoint::{BoundApp, Endpoint, InvalidScope, Role, Scope, Target},
    policy::{Action, InvalidProtocol, PolicyTriple, Protocol},
};

/// The destination port used when a binding does not carry one.
pub const DEFAULT_PORT: u16 = 8080;
