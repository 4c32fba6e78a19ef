//! Candidate: a keyed member of the population

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A materialized candidate.
///
/// The feature payload is opaque to the engine; only the owning
/// UnitOfWork interprets it. Fitness is set when the candidate is
/// evaluated during insertion, so every candidate visible to selection
/// carries one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable key, a pure function of the features
    pub key: String,
    /// Generation the candidate was born in
    pub gen: u32,
    /// Problem-specific feature payload
    pub features: Value,
    /// Fitness in [0.0, 1.0]; None until evaluated
    pub fitness: Option<f64>,
}

impl Candidate {
    /// Unevaluated candidate.
    pub fn new(key: String, gen: u32, features: Value) -> Self {
        Self {
            key,
            gen,
            features,
            fitness: None,
        }
    }
}
