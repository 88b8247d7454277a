//! Cloud-backed sandbox environment.
//!
//! Provisions one isolated compute instance per sample and runs commands on
//! it through a command relay, with a shared object store as the side
//! channel for bulk output and file transfer. The instance has no direct
//! network path back to the caller; everything flows through the relay and
//! the store, reconciled across three independently-failing services.
//!
//! The three services are consumed through the trait contracts in
//! [`services`]; each environment holds its own clients so test doubles and
//! concurrent samples need no process-global state.

mod config;
mod environment;
mod invocation;
mod janitor;
mod provision;
mod retrieve;
mod retry;
pub mod services;
mod tags;
mod transfer;

pub use config::{CloudConfig, CloudConfigBuilder};
pub use environment::{
    CloudSandboxEnvironment, Confirmation, ServiceClients, bulk_cleanup, cleanup_by_id,
};
pub use provision::InstanceHandle;
pub use retrieve::{MAX_EXEC_OUTPUT_BYTES, MAX_READ_FILE_BYTES};
pub use retry::{RetryExhausted, RetryPolicy, retry_fixed};
pub use tags::{Filter, MARKER_TAG_KEY, MARKER_TAG_VALUE, TagSet};
