//! Prometheus metrics for the worker service

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

/// Process-wide metrics registry.
pub static METRICS: Lazy<Metrics> = Lazy::new(|| Metrics::new().expect("metrics registry"));

/// Worker metrics: reify outcomes, queue activity, phase starts.
pub struct Metrics {
    registry: Registry,

    /// Candidates inserted into the local candidates map
    pub reify_local_total: IntCounter,
    /// Candidates forwarded to their owning shard
    pub reify_routed_total: IntCounter,
    /// Candidates dropped as duplicates
    pub reify_duplicate_total: IntCounter,
    /// Routed tasks drained from the queue
    pub tasks_processed_total: IntCounter,
    /// Long-running phases started (populate + next)
    pub phases_started_total: IntCounter,
    /// Tasks currently enqueued or in flight
    pub task_queue_depth: IntGauge,
}

impl Metrics {
    fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let reify_local_total = register_int_counter_with_registry!(
            Opts::new("worker_reify_local_total", "Candidates inserted locally"),
            registry
        )?;
        let reify_routed_total = register_int_counter_with_registry!(
            Opts::new("worker_reify_routed_total", "Candidates routed to a peer shard"),
            registry
        )?;
        let reify_duplicate_total = register_int_counter_with_registry!(
            Opts::new("worker_reify_duplicate_total", "Candidates dropped as duplicates"),
            registry
        )?;
        let tasks_processed_total = register_int_counter_with_registry!(
            Opts::new("worker_tasks_processed_total", "Routed tasks drained from the queue"),
            registry
        )?;
        let phases_started_total = register_int_counter_with_registry!(
            Opts::new("worker_phases_started_total", "Long-running phases started"),
            registry
        )?;
        let task_queue_depth = register_int_gauge_with_registry!(
            Opts::new("worker_task_queue_depth", "Tasks enqueued or in flight"),
            registry
        )?;

        Ok(Self {
            registry,
            reify_local_total,
            reify_routed_total,
            reify_duplicate_total,
            tasks_processed_total,
            phases_started_total,
            task_queue_depth,
        })
    }

    /// Render the text exposition format.
    pub fn export(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
