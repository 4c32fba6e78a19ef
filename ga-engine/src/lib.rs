//! Genetic-algorithm units of work
//!
//! Reference problem domains for the coordinator. Features are
//! fixed-length integer vectors carried as JSON arrays; selection,
//! mutation, midpoint crossover and the MSE terminating predicate all
//! work on that shape.

pub mod features;
pub mod target_sum;
pub mod tsp;

pub use target_sum::TargetSumUow;
pub use tsp::TspUow;

use engine_core::{Histogram, UowParams, UowRegistry};
use std::sync::Arc;
use tracing::info;

/// Registry preloaded with the built-in GA units of work.
pub fn default_registry() -> UowRegistry {
    let mut registry = UowRegistry::new();
    registry.register("target-sum", || Arc::new(TargetSumUow::default()));
    registry.register("tsp", || Arc::new(TspUow::default()));
    registry
}

/// MSE terminating predicate shared by the built-in UoWs: stop when the
/// fitness MSE against the optimum reaches the term limit, or when the
/// total-candidates cap is hit. Also logs the per-generation summary.
pub(crate) fn mse_termination(
    params: &UowParams,
    current_gen: u32,
    hist: &Histogram,
    total_seen: u64,
) -> bool {
    let mse = hist.mse();

    if let Some(summary) = hist.summary() {
        info!(
            gen = current_gen,
            size = summary.size,
            total = total_seen,
            mse,
            max = summary.max,
            med = summary.median,
            avg = summary.mean,
            "generation summary"
        );
    }

    if mse <= params.term_limit {
        return true;
    }

    params
        .max_total_indiv
        .is_some_and(|cap| total_seen >= cap)
}
