//! Cloud Foundry implementations of the broker's collaborator traits.
//!
//! - [`CfCatalog`] reads service instances and credential bindings from the
//!   v3 cloud controller API and writes their metadata.
//! - [`CfPolicyStore`] lists and writes external network policies through the
//!   policy server.
//! - [`CfResolver`] looks up application, space and organization names.
//!
//! All of them share a [`Client`], which authenticates with a
//! client-credentials token obtained from UAA.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod catalog;
mod client;
mod policies;
mod resolver;
mod token;


pub use self::{
    catalog::{CfCatalog, BINDING_QUERY_CHUNK},
    client::{ApiError, Client, ClientConfig, DEFAULT_TIMEOUT},
    policies::CfPolicyStore,
    resolver::CfResolver,
    token::{discover_uaa_url, TokenSource, MAX_LIFETIME, REFRESH_MARGIN},
};
