//! Per-shard worker service
//!
//! Hosts one shard of the population behind an HTTP control plane: a task
//! queue drained by a single consumer, a phase gate for the two-phase
//! barrier, and the shard-local candidate lifecycle.

pub mod metrics;
pub mod phase;
pub mod queue;
pub mod routes;
pub mod service;
pub mod shard;

pub use service::{serve, WorkerConfig, WorkerService};
