#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use policy_broker_cf as cf;
pub use policy_broker_index as index;
pub use policy_broker_reconcile as reconcile;

mod admin;
mod args;
mod log;

pub use self::{admin::Admin, args::Args, log::LogFormat};
