//! Wire messages for the HTTP control plane
//!
//! Every credentialed payload flattens a [`Credentials`] envelope into the
//! JSON object, so the shapes here match what the original control plane
//! put on the wire.

use engine_core::Histogram;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Endpoint paths, shared by worker routes and client calls so the two
/// sides cannot drift apart.
pub mod paths {
    /// Configure a worker to run a shard
    pub const SHARD_CONFIG: &str = "shard/config";
    /// Barrier phase A: wait for the long-running phase to finish
    pub const SHARD_WAIT: &str = "shard/wait";
    /// Barrier phase B: wait for the task queue to drain
    pub const SHARD_JOIN: &str = "shard/join";
    /// Shut the worker down (delayed)
    pub const SHARD_STOP: &str = "shard/stop";
    /// Checkpoint to durable storage (reserved)
    pub const SHARD_PERSIST: &str = "shard/persist";
    /// Recover from a checkpoint (reserved)
    pub const SHARD_RECOVER: &str = "shard/recover";
    /// Mirror the hash ring to a worker
    pub const RING_INIT: &str = "ring/init";
    /// Add a ring member (reserved)
    pub const RING_ADD: &str = "ring/add";
    /// Remove a ring member (reserved)
    pub const RING_DEL: &str = "ring/del";
    /// Seed generation 0
    pub const UOW_POPULATE: &str = "uow/populate";
    /// Fetch the partial fitness histogram
    pub const UOW_HIST: &str = "uow/hist";
    /// Run selection, breeding and backfill for one generation
    pub const UOW_NEXT: &str = "uow/next";
    /// Enumerate candidates at or above a cutoff
    pub const UOW_ENUM: &str = "uow/enum";
    /// Enqueue a routed candidate for insertion
    pub const UOW_REIFY: &str = "uow/reify";
}

/// Ack body returned by endpoints that have nothing to report.
pub const ACK_OK: &str = "Bokay";
/// Ack body returned by `shard/stop`.
pub const ACK_STOP: &str = "Goodbye";

/// Run credentials carried in every control-plane payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Opaque per-run storage prefix, generated by the orchestrator
    pub prefix: String,
    /// Shard the payload is addressed to
    pub shard_id: String,
}

/// `shard/config`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRequest {
    /// Credentials being established
    #[serde(flatten)]
    pub creds: Credentials,
    /// Registry name of the UnitOfWork to instantiate
    pub uow_name: String,
}

/// Body for endpoints that carry only credentials
/// (wait, join, stop, persist, recover, hist, populate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BareRequest {
    /// Caller credentials
    #[serde(flatten)]
    pub creds: Credentials,
}

/// `ring/init`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingInitRequest {
    /// Caller credentials
    #[serde(flatten)]
    pub creds: Credentials,
    /// shard_id to endpoint (host:port) for every member
    pub ring: BTreeMap<String, String>,
}

/// `uow/next`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextRequest {
    /// Caller credentials
    #[serde(flatten)]
    pub creds: Credentials,
    /// Generation being bred
    pub current_gen: u32,
    /// Selection threshold from the merged histogram
    pub fitness_cutoff: f64,
}

/// `uow/enum`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumRequest {
    /// Caller credentials
    #[serde(flatten)]
    pub creds: Credentials,
    /// Only candidates at or above this fitness are returned
    pub fitness_cutoff: f64,
}

/// `uow/reify`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReifyRequest {
    /// Caller credentials (stamped for the target shard)
    #[serde(flatten)]
    pub creds: Credentials,
    /// Key of the candidate, as computed by the sender
    pub key: String,
    /// Generation the candidate was born in
    pub gen: u32,
    /// Opaque feature payload
    pub features: Value,
}

/// `uow/hist` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistResponse {
    /// Candidates ever materialized on the shard
    pub total_indiv: u64,
    /// Partial histogram over the shard's current candidates
    pub hist: Histogram,
}

/// `uow/enum` entry: `["indiv", fitness, generation, features_json]`
pub type EnumEntry = [String; 4];
