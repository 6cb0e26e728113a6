//! Policy Broker Reconciler
//!
//! Keeps the platform's network-policy store in line with the policies the
//! relationship catalog implies. There are two write paths:
//!
//! - The [`Broker`] reacts to individual bind and unbind events, creating or
//!   deleting only the policies that involve the affected endpoint.
//! - The [`Scheduler`] periodically runs a full cycle that derives every
//!   desired policy and creates whatever the store is missing. It never
//!   deletes, so a failed bind is healed on the next cycle while a failed
//!   unbind may leave a stale policy behind.
//!
//! Both paths write through a [`Converger`], which batches writes into bounded
//! chunks and bounds every write with a timeout. Store writes are idempotent,
//! so the paths need no coordination.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod broker;
mod converge;
mod deferred;
mod metrics;
pub mod params;
mod scheduler;


pub use self::{
    broker::{Broker, BrokerError, SourceInfo, DEFAULT_LABEL_DELAY},
    converge::{
        ApplyError, Convergence, Converger, FetchError, DEFAULT_WRITE_TIMEOUT, MAX_CHUNK_SIZE,
    },
    deferred::{Deferred, DeferredHandle, DeferredState},
    metrics::ReconcileMetrics,
    params::{BindingParameters, InstanceParameters, ParameterError},
    scheduler::{Reconcile, Scheduler, State, DEFAULT_INTERVAL, MIN_INTERVAL},
};
