//! UnitOfWork: the problem-domain plugin interface
//!
//! Decouples the engine from the problem being refined. Workers drive the
//! candidate-lifecycle operations; the orchestrator drives the termination
//! test. The original's dynamic class lookup becomes a registry of
//! constructors keyed by name.

use crate::error::{EngineError, Result};
use crate::histogram::Histogram;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Engine-level parameters shared by every UnitOfWork.
#[derive(Debug, Clone)]
pub struct UowParams {
    /// Target candidate count per shard
    pub n_pop: usize,
    /// Generation cap
    pub n_gen: u32,
    /// Fraction of the population admitted as parents, in (0, 1)
    pub selection_rate: f64,
    /// Probability a culled candidate is mutated instead, in [0, 1]
    pub mutation_rate: f64,
    /// Decimal places used to bin fitness
    pub hist_granularity: u32,
    /// Termination threshold for the fitness MSE
    pub term_limit: f64,
    /// Hard cap on candidates ever materialized, across all shards
    pub max_total_indiv: Option<u64>,
    /// Seed for the UoW's random source; None draws from entropy
    pub seed: Option<u64>,
}

impl Default for UowParams {
    fn default() -> Self {
        Self {
            n_pop: 23,
            n_gen: 10,
            selection_rate: 0.2,
            mutation_rate: 0.02,
            hist_granularity: 3,
            term_limit: 5.0e-3,
            max_total_indiv: Some(2_000),
            seed: None,
        }
    }
}

impl UowParams {
    /// Reject parameter combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.n_pop < 3 {
            return Err(EngineError::InvalidParam {
                name: "n_pop",
                reason: format!("{} is below the floor of three", self.n_pop),
            });
        }
        if !(self.selection_rate > 0.0 && self.selection_rate < 1.0) {
            return Err(EngineError::InvalidParam {
                name: "selection_rate",
                reason: format!("{} is outside (0, 1)", self.selection_rate),
            });
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(EngineError::InvalidParam {
                name: "mutation_rate",
                reason: format!("{} is outside [0, 1]", self.mutation_rate),
            });
        }
        if self.term_limit <= 0.0 {
            return Err(EngineError::InvalidParam {
                name: "term_limit",
                reason: format!("{} must be positive", self.term_limit),
            });
        }
        Ok(())
    }
}

/// Problem-specific callbacks driven by the engine.
///
/// Feature payloads are opaque `serde_json::Value`s so the trait stays
/// object-safe and payloads travel the wire unchanged.
pub trait UnitOfWork: Send + Sync {
    /// Generate a fresh feature payload (generation 0 and backfill).
    fn generate(&self) -> Value;

    /// Stable key for a payload; must be a pure function of it.
    fn key_of(&self, features: &Value) -> String;

    /// Fitness in [0.0, 1.0]; higher is better.
    fn evaluate(&self, features: &Value) -> f64;

    /// Minor perturbation of a payload.
    fn mutate(&self, features: &Value) -> Value;

    /// Combine two parent payloads into a child.
    fn crossover(&self, a: &Value, b: &Value) -> Value;

    /// Terminating predicate, evaluated on the merged histogram.
    fn should_terminate(&self, current_gen: u32, hist: &Histogram, total_seen: u64) -> bool;

    /// Engine parameters for this run.
    fn params(&self) -> &UowParams;
}

type UowCtor = Box<dyn Fn() -> Arc<dyn UnitOfWork> + Send + Sync>;

/// Registry mapping UnitOfWork names to constructors.
#[derive(Default)]
pub struct UowRegistry {
    ctors: HashMap<String, UowCtor>,
}

impl UowRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under a name, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Arc<dyn UnitOfWork> + Send + Sync + 'static,
    {
        self.ctors.insert(name.into(), Box::new(ctor));
    }

    /// Instantiate a UnitOfWork by name.
    ///
    /// An unknown name is a configuration error, fatal at startup.
    pub fn instantiate(&self, name: &str) -> Result<Arc<dyn UnitOfWork>> {
        self.ctors
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| EngineError::UnknownUow(name.to_string()))
    }

    /// Registered names, unordered.
    pub fn names(&self) -> Vec<&str> {
        self.ctors.keys().map(String::as_str).collect()
    }
}
