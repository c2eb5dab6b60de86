//! HTTP transport against replica servers: history pagination, entity and
//! audit fetches, content availability and raw content downloads, all
//! wrapped in a bounded, jittered retry policy.

pub mod client;
pub mod error;
pub mod retry;

pub use client::{AvailabilityEntry, ReplicaClient};
pub use error::ReplicaError;
pub use retry::RetryPolicy;
