//! Traveling-salesperson sample UnitOfWork
//!
//! Six stops, stop 0 is home. A feature vector is a route over stops
//! 1..=5; fitness averages a coverage score (every stop visited) and a
//! travel-cost score, and is halved when coverage is incomplete.

use crate::{features, mse_termination};
use engine_core::{Histogram, UnitOfWork, UowParams};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;

/// Pairwise route costs between the six stops.
const ROUTE_COST: [[i64; 6]; 6] = [
    [0, 7, 11, 12, 14, 8],
    [7, 0, 18, 18, 19, 5],
    [14, 19, 0, 2, 3, 19],
    [12, 20, 3, 0, 1, 19],
    [12, 18, 3, 1, 0, 18],
    [8, 5, 18, 18, 19, 0],
];

const FIRST_STOP: i64 = 1;
const LAST_STOP: i64 = 5;

/// TSP sample workload over the fixed six-stop cost table.
pub struct TspUow {
    params: UowParams,
    rng: Mutex<StdRng>,
}

impl TspUow {
    /// TSP workload with the given engine parameters.
    pub fn new(params: UowParams) -> Self {
        let rng = params
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        Self {
            params,
            rng: Mutex::new(rng),
        }
    }

    /// Total cost of a route that starts and ends at home.
    pub fn route_cost(route: &[i64]) -> i64 {
        let mut total = 0;
        let mut from = 0usize;

        for stop in route {
            let to = (*stop).clamp(0, LAST_STOP) as usize;
            total += ROUTE_COST[from][to];
            from = to;
        }

        total + ROUTE_COST[from][0]
    }
}

impl Default for TspUow {
    fn default() -> Self {
        Self::new(UowParams {
            n_pop: 10,
            n_gen: 23,
            max_total_indiv: Some(20_000),
            ..UowParams::default()
        })
    }
}

impl UnitOfWork for TspUow {
    fn generate(&self) -> Value {
        let mut rng = self.rng.lock().expect("rng lock");
        features::encode(&features::random_permutation(&mut rng, FIRST_STOP, LAST_STOP))
    }

    fn key_of(&self, features: &Value) -> String {
        features::digest_key(features)
    }

    fn evaluate(&self, payload: &Value) -> f64 {
        let route = features::decode(payload);
        if route.is_empty() {
            return 0.0;
        }

        // coverage: fraction of stops never visited
        let expected: HashSet<i64> = (FIRST_STOP..=LAST_STOP).collect();
        let observed: HashSet<i64> = route.iter().copied().collect();
        let missed = expected.difference(&observed).count() as f64;
        let coverage_cost = missed / expected.len() as f64;

        // travel: route cost against a worst-case bound
        let worst_case = 2.0 * ROUTE_COST[0].iter().sum::<i64>() as f64;
        let travel_cost = (Self::route_cost(&route) as f64 / worst_case).min(1.0);

        let mut estimate = 1.0 - (coverage_cost + travel_cost) / 2.0;
        if missed > 0.0 {
            estimate /= 2.0;
        }

        estimate.clamp(0.0, 1.0)
    }

    fn mutate(&self, payload: &Value) -> Value {
        let route = features::decode(payload);
        let mut rng = self.rng.lock().expect("rng lock");
        features::encode(&features::mutate_one(&mut rng, &route, FIRST_STOP, LAST_STOP))
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
