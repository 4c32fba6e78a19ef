//! Target-sum reference UnitOfWork
//!
//! Features are sorted integer vectors; fitness rewards vectors whose sum
//! lands on a target value. Trivial to reason about, which makes it the
//! reference workload for exercising the engine.

use crate::{features, mse_termination};
use engine_core::{Histogram, UnitOfWork, UowParams};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::sync::Mutex;

/// Reference GA workload: hit a target sum with a fixed-length vector.
pub struct TargetSumUow {
    params: UowParams,
    length: usize,
    min: i64,
    max: i64,
    target: i64,
    rng: Mutex<StdRng>,
}

impl TargetSumUow {
    /// Workload over vectors of `length` values in [min, max] scored
    /// against `target`.
    pub fn new(params: UowParams, length: usize, min: i64, max: i64, target: i64) -> Self {
        assert!(target > 0, "target must be positive");
        assert!(min <= max, "min must not exceed max");

        let rng = params
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        Self {
            params,
            length,
            min,
            max,
            target,
            rng: Mutex::new(rng),
        }
    }
}

impl Default for TargetSumUow {
    fn default() -> Self {
        Self::new(UowParams::default(), 5, 0, 100, 231)
    }
}

impl UnitOfWork for TargetSumUow {
    fn generate(&self) -> Value {
        let mut rng = self.rng.lock().expect("rng lock");
        features::encode(&features::random_sorted(
            &mut rng,
            self.length,
            self.min,
            self.max,
        ))
    }

    fn key_of(&self, features: &Value) -> String {
        features::digest_key(features)
    }

    fn evaluate(&self, payload: &Value) -> f64 {
        let vector = features::decode(payload);
        if vector.is_empty() {
            return 0.0;
        }

        let sum: i64 = vector.iter().sum();
        let miss = (sum - self.target).abs() as f64 / self.target as f64;
        (1.0 - miss).clamp(0.0, 1.0)
    }

    fn mutate(&self, payload: &Value) -> Value {
        let vector = features::decode(payload);
        let mut rng = self.rng.lock().expect("rng lock");
        features::encode(&features::mutate_one(&mut rng, &vector, self.min, self.max))
    }

    fn crossover(&self, a: &Value, b: &Value) -> Value {
        features::encode(&features::crossover_midpoint(
            &features::decode(a),
            &features::decode(b),
        ))
    }

    fn should_terminate(&self, current_gen: u32, hist: &Histogram, total_seen: u64) -> bool {
        mse_termination(&self.params, current_gen, hist, total_seen)
    }

    fn params(&self) -> &UowParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> TargetSumUow {
        let params = UowParams {
            seed: Some(42),
            ..UowParams::default()
        };
        TargetSumUow::new(params, 5, 0, 100, 231)
    }

    #[test]
    fn test_exact_target_scores_one() {
        let uow = seeded();
        let payload = features::encode(&[31, 40, 50, 50, 60]);
        assert!((uow.evaluate(&payload) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fitness_is_clamped() {
        let uow = seeded();
        // sum far above 2x target would go negative unclamped
        let payload = features::encode(&[100, 100, 100, 100, 100]);
        assert_eq!(uow.evaluate(&payload), 0.0);
    }

    #[test]
    fn test_generate_is_sorted_and_bounded() {
        let uow = seeded();

        for _ in 0..20 {
            let vector = features::decode(&uow.generate());
            assert_eq!(vector.len(), 5);
            assert!(vector.windows(2).all(|w| w[0] <= w[1]));
            assert!(vector.iter().all(|v| (0..=100).contains(v)));
        }
    }

    #[test]
    fn test_key_is_pure() {
        let uow = seeded();
        let payload = features::encode(&[1, 2, 3, 4, 5]);
        assert_eq!(uow.key_of(&payload), uow.key_of(&payload.clone()));
    }

    #[test]
    fn test_termination_on_converged_histogram() {
        let uow = seeded();
        let mut hist = Histogram::new();
        for _ in 0..50 {
            hist.record(1.0, 3);
        }

        assert!(uow.should_terminate(3, &hist, 100));
    }

    #[test]
    fn test_termination_on_total_cap() {
        let uow = seeded();
        let mut hist = Histogram::new();
        hist.record(0.1, 3);

        assert!(!uow.should_terminate(1, &hist, 100));
        assert!(uow.should_terminate(1, &hist, 5_000));
    }
}
