//! Shard-local population state and candidate lifecycle
//!
//! One shard owns the keys the ring assigns to it: a candidates map, the
//! key set of everything ever reified here, and the selection, breeding
//! and backfill steps of a generation. All mutation happens from the
//! request handlers and the queue consumer of this worker, which never
//! run concurrently with each other, so no locking lives at this level.

use crate::metrics::METRICS;
use engine_core::{Candidate, HashRing, Histogram, KeySet, UnitOfWork};
use rand::seq::index;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use transport::message::EnumEntry;
use transport::{Result, ShardClient};

/// Minimum candidates kept through selection, to preserve breeding pairs.
const SELECTION_FLOOR: usize = 3;

/// Cap on fruitless backfill attempts per generation, so a UoW with a
/// small feature space cannot spin the backfill loop forever.
const BACKFILL_ATTEMPTS_PER_SLOT: usize = 20;

/// Where a reify attempt ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReifyOutcome {
    /// Evaluated and inserted into the local candidates map
    Inserted,
    /// Forwarded to the owning shard; the local shard retains nothing
    Routed,
    /// Key already seen here; dropped
    Duplicate,
}

/// A single worker's slice of the global population.
pub struct Shard {
    shard_id: String,
    uow: Arc<dyn UnitOfWork>,
    client: ShardClient,
    ring: Option<HashRing>,
    endpoints: HashMap<String, String>,
    candidates: HashMap<String, Candidate>,
    seen: KeySet,
    total_indiv: u64,
    current_gen: u32,
}

impl Shard {
    /// Empty shard bound to a UnitOfWork and the run's transport client.
    pub fn new(
        shard_id: impl Into<String>,
        uow: Arc<dyn UnitOfWork>,
        client: ShardClient,
        fp_rate: f64,
    ) -> Self {
        let params = uow.params();
        let expected_keys = params
            .max_total_indiv
            .unwrap_or((params.n_pop as u64) * (u64::from(params.n_gen) + 1) * 4)
            .max(1_024);

        Self {
            shard_id: shard_id.into(),
            uow,
            client,
            ring: None,
            endpoints: HashMap::new(),
            candidates: HashMap::new(),
            seen: KeySet::with_capacity(expected_keys as usize, fp_rate),
            total_indiv: 0,
            current_gen: 0,
        }
    }

    /// Install the mirrored ring and endpoint map.
    ///
    /// Without a ring every key is treated as local (single-shard
    /// standalone mode).
    pub fn set_ring(&mut self, ring: HashRing, endpoints: HashMap<String, String>) {
        self.ring = Some(ring);
        self.endpoints = endpoints;
    }

    /// Current candidate count.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// True when the candidates map is empty.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates ever materialized on this shard.
    pub fn total_indiv(&self) -> u64 {
        self.total_indiv
    }

    /// Generation of the most recent populate/next call.
    pub fn generation(&self) -> u32 {
        self.current_gen
    }

    /// Insert-or-route a candidate.
    ///
    /// A key owned by a peer shard is POSTed to that peer's task queue and
    /// not retained here; a local key is deduplicated, evaluated and
    /// inserted. Transport failures propagate: dispatch is at-most-once
    /// and an unreachable peer is fatal to the run.
    pub async fn reify(&mut self, gen: u32, features: Value) -> Result<ReifyOutcome> {
        let key = self.uow.key_of(&features);

        let owner = self
            .ring
            .as_ref()
            .map(|ring| ring.get_node(&key).to_string());

        match owner {
            Some(owner) if owner != self.shard_id => {
                let endpoint = self
                    .endpoints
                    .get(&owner)
                    .ok_or_else(|| transport::TransportError::UnknownShard(owner.clone()))?
                    .clone();

                self.client
                    .reify(&endpoint, &owner, key, gen, features)
                    .await?;

                METRICS.reify_routed_total.inc();
                Ok(ReifyOutcome::Routed)
            }
            _ => Ok(self.reify_local(key, gen, features)),
        }
    }

    fn reify_local(&mut self, key: String, gen: u32, features: Value) -> ReifyOutcome {
        if self.seen.contains(&key) {
            METRICS.reify_duplicate_total.inc();
            return ReifyOutcome::Duplicate;
        }

        self.seen.add(&key);
        self.total_indiv += 1;

        // the expensive call, deferred until the candidate provably lands here
        let fitness = self.uow.evaluate(&features);

        let mut candidate = Candidate::new(key.clone(), gen, features);
        candidate.fitness = Some(fitness);
        self.candidates.insert(key, candidate);

        METRICS.reify_local_total.inc();
        ReifyOutcome::Inserted
    }

    /// Remove a candidate from the map. The key set keeps its key, so the
    /// same candidate can never be reborn here.
    pub fn evict(&mut self, key: &str) {
        self.candidates.remove(key);
    }

    /// Seed this shard's slice of generation `gen` with fresh candidates.
    pub async fn populate(&mut self, gen: u32) -> Result<()> {
        self.current_gen = gen;

        for _ in 0..self.uow.params().n_pop {
            let features = self.uow.generate();
            self.reify(gen, features).await?;
        }

        info!(
            shard = %self.shard_id,
            gen,
            size = self.candidates.len(),
            total = self.total_indiv,
            "populated"
        );
        Ok(())
    }

    /// Partial histogram over the current candidates. Read-only.
    pub fn partial_hist(&self) -> Histogram {
        let granularity = self.uow.params().hist_granularity;
        let mut hist = Histogram::new();

        for candidate in self.candidates.values() {
            if let Some(fitness) = candidate.fitness {
                hist.record(fitness, granularity);
            }
        }

        hist
    }

    /// Candidates at or above the cutoff, in wire form.
    pub fn enumerate(&self, fitness_cutoff: f64) -> Vec<EnumEntry> {
        self.candidates
            .values()
            .filter_map(|candidate| {
                let fitness = candidate.fitness?;
                (fitness >= fitness_cutoff).then(|| {
                    [
                        "indiv".to_string(),
                        format!("{fitness:.4}"),
                        candidate.gen.to_string(),
                        candidate.features.to_string(),
                    ]
                })
            })
            .collect()
    }

    fn round_to_granularity(fitness: f64, granularity: u32) -> f64 {
        let scale = 10f64.powi(granularity as i32);
        (fitness * scale).round() / scale
    }

    /// One generation of selection, mutation, breeding and backfill.
    pub async fn next_generation(&mut self, current_gen: u32, fitness_cutoff: f64) -> Result<()> {
        self.current_gen = current_gen;

        let params = self.uow.params().clone();
        let granularity = params.hist_granularity;

        // partition on rounded fitness; the poor side is processed below
        let poor_fit: Vec<String> = self
            .candidates
            .values()
            .filter(|c| {
                c.fitness
                    .map(|f| Self::round_to_granularity(f, granularity) < fitness_cutoff)
                    .unwrap_or(true)
            })
            .map(|c| c.key.clone())
            .collect();

        // mutate a random few for diversity, cull the rest
        for key in poor_fit {
            let mutate_this = rand::thread_rng().gen::<f64>() < params.mutation_rate;

            if mutate_this {
                let Some(features) = self.candidates.get(&key).map(|c| c.features.clone()) else {
                    continue;
                };
                let mutant = self.uow.mutate(&features);

                // the original dies only if its mutant landed somewhere
                match self.reify(current_gen, mutant).await? {
                    ReifyOutcome::Inserted | ReifyOutcome::Routed => self.evict(&key),
                    ReifyOutcome::Duplicate => {}
                }
            } else if self.candidates.len() > SELECTION_FLOOR {
                self.evict(&key);
            }
        }

        // breed children from the survivors
        let parents: Vec<Value> = self
            .candidates
            .values()
            .map(|c| c.features.clone())
            .collect();

        if parents.len() >= 2 {
            let n_children = params.n_pop.saturating_sub(parents.len());

            for _ in 0..n_children {
                let pair = index::sample(&mut rand::thread_rng(), parents.len(), 2);
                let child = self
                    .uow
                    .crossover(&parents[pair.index(0)], &parents[pair.index(1)]);
                self.reify(current_gen, child).await?;
            }
        }

        // backfill with fresh candidates to head off population collapse
        let mut attempts = params.n_pop * BACKFILL_ATTEMPTS_PER_SLOT;
        while self.candidates.len() < params.n_pop {
            if attempts == 0 {
                warn!(
                    shard = %self.shard_id,
                    size = self.candidates.len(),
                    n_pop = params.n_pop,
                    "backfill gave up before reaching the target population"
                );
                break;
            }
            attempts -= 1;

            let features = self.uow.generate();
            self.reify(current_gen, features).await?;
        }

        info!(
            shard = %self.shard_id,
            gen = current_gen,
            size = self.candidates.len(),
            total = self.total_indiv,
            "generation complete"
        );
        Ok(())
    }

    /// Diagnostic snapshot for the status dump.
    pub fn status(&self) -> Value {
        serde_json::json!({
            "shard_id": self.shard_id,
            "generation": self.current_gen,
            "candidates": self.candidates.len(),
            "total_indiv": self.total_indiv,
            "ring_members": self.endpoints.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::UowParams;

    /// UoW whose fitness is always zero and whose feature space is a
    /// counter, so every generated candidate is novel.
    struct ZeroFitness {
        params: UowParams,
        counter: std::sync::Mutex<i64>,
    }

    impl ZeroFitness {
        fn new(n_pop: usize) -> Self {
            Self {
                params: UowParams {
                    n_pop,
                    ..UowParams::default()
                },
                counter: std::sync::Mutex::new(0),
            }
        }
    }

    impl UnitOfWork for ZeroFitness {
        fn generate(&self) -> Value {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            serde_json::json!([*counter])
        }
        fn key_of(&self, features: &Value) -> String {
            features.to_string()
        }
        fn evaluate(&self, _features: &Value) -> f64 {
            0.0
        }
        fn mutate(&self, features: &Value) -> Value {
            features.clone()
        }
        fn crossover(&self, a: &Value, _b: &Value) -> Value {
            a.clone()
        }
        fn should_terminate(&self, _gen: u32, _hist: &Histogram, _total: u64) -> bool {
            false
        }
        fn params(&self) -> &UowParams {
            &self.params
        }
    }

    fn shard_with(uow: Arc<dyn UnitOfWork>) -> Shard {
        Shard::new("shard/0", uow, ShardClient::new("/tmp/test"), 1e-3)
    }

    #[tokio::test]
    async fn test_duplicate_reify_is_dropped() {
        let mut shard = shard_with(Arc::new(ZeroFitness::new(10)));
        let features = serde_json::json!([7]);

        let first = shard.reify(0, features.clone()).await.unwrap();
        let second = shard.reify(0, features).await.unwrap();

        assert_eq!(first, ReifyOutcome::Inserted);
        assert_eq!(second, ReifyOutcome::Duplicate);
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.total_indiv(), 1);
    }

    #[tokio::test]
    async fn test_populate_dedups_generated_candidates() {
        let uow = Arc::new(ZeroFitness::new(100));
        let mut shard = shard_with(uow);

        shard.populate(0).await.unwrap();

        // the counter UoW never repeats, so every candidate lands
        assert_eq!(shard.len(), 100);
        assert_eq!(shard.total_indiv(), 100);
    }

    #[tokio::test]
    async fn test_backfill_restores_population() {
        let n_pop = 20;
        let mut shard = shard_with(Arc::new(ZeroFitness::new(n_pop)));

        // a shard entering selection with two worthless candidates
        shard.reify(0, serde_json::json!([-1])).await.unwrap();
        shard.reify(0, serde_json::json!([-2])).await.unwrap();
        assert_eq!(shard.len(), 2);

        // everything scores 0.0, so the cutoff culls the whole shard
        shard.next_generation(1, 1.0).await.unwrap();

        assert_eq!(shard.len(), n_pop, "backfill must refill to n_pop");
    }

    #[tokio::test]
    async fn test_selection_floor_of_three() {
        let uow = Arc::new(ZeroFitness::new(4));
        let mut shard = shard_with(uow);

        for i in 0..4 {
            shard.reify(0, serde_json::json!([i])).await.unwrap();
        }

        // mutation_rate defaults low; with cutoff above every fitness all
        // four are poor, but the floor keeps three through selection and
        // backfill then restores the target size
        shard.next_generation(1, 1.0).await.unwrap();

        assert!(shard.len() >= 3);
        assert_eq!(shard.len(), 4);
    }

    #[tokio::test]
    async fn test_partial_hist_counts_current_candidates() {
        let mut shard = shard_with(Arc::new(ZeroFitness::new(10)));
        shard.reify(0, serde_json::json!([1])).await.unwrap();
        shard.reify(0, serde_json::json!([2])).await.unwrap();

        let hist = shard.partial_hist();
        assert_eq!(hist.total(), 2);
        assert_eq!(hist.bins_desc(), vec![(0.0, 2)]);
    }

    #[tokio::test]
    async fn test_enumerate_applies_cutoff_and_format() {
        let mut shard = shard_with(Arc::new(ZeroFitness::new(10)));
        shard.reify(3, serde_json::json!([5])).await.unwrap();

        assert!(shard.enumerate(0.5).is_empty());

        let all = shard.enumerate(0.0);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0][0], "indiv");
        assert_eq!(all[0][1], "0.0000");
        assert_eq!(all[0][2], "3");
        assert_eq!(all[0][3], "[5]");
    }
}
