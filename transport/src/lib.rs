//! HTTP+JSON transport for the shard control plane
//!
//! One client serves both callers: workers forwarding cross-shard reify
//! dispatches and the orchestrator driving shards through a run.

#![forbid(unsafe_code)]

pub mod client;
pub mod error;
pub mod message;

pub use client::ShardClient;
pub use error::{Result, TransportError};
