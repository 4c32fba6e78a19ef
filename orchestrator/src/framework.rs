//! The run driver
//!
//! Owns the shard list for one run: configures every worker, mirrors the
//! ring, then loops barrier / histogram / termination / cutoff / next
//! until the terminating predicate or the generation cap fires, and
//! finally collects and reports the surviving candidates.

use crate::error::Result;
use engine_core::{EngineError, Histogram, UnitOfWork, UowRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use transport::message::EnumEntry;
use transport::ShardClient;
use uuid::Uuid;

/// Single driver for one distributed run.
pub struct Framework {
    uow: Arc<dyn UnitOfWork>,
    uow_name: String,
    client: ShardClient,
    // shard_id -> endpoint, iterated in stable order for every fan-out
    shards: BTreeMap<String, String>,
    current_gen: u32,
}

impl Framework {
    /// Prepare a run over the given worker endpoints.
    ///
    /// Instantiates the UnitOfWork locally (the orchestrator drives the
    /// termination test itself), validates its parameters, and mints the
    /// per-run credential prefix.
    pub fn new(
        registry: &UowRegistry,
        uow_name: &str,
        workers: &[String],
        storage_prefix: &str,
    ) -> Result<Self> {
        if workers.is_empty() {
            return Err(EngineError::InvalidParam {
                name: "workers",
                reason: "at least one worker endpoint is required".to_string(),
            }
            .into());
        }

        let uow = registry.instantiate(uow_name)?;
        uow.params().validate()?;

        let run_id = Uuid::new_v4().simple().to_string();
        let prefix = format!("{}/{}", storage_prefix.trim_end_matches('/'), run_id);
        info!(prefix, uow = uow_name, workers = workers.len(), "run prepared");

        let shards = workers
            .iter()
            .enumerate()
            .map(|(index, endpoint)| (Self::shard_id(index, workers.len()), endpoint.clone()))
            .collect();

        Ok(Self {
            uow,
            uow_name: uow_name.to_string(),
            client: ShardClient::new(prefix),
            shards,
            current_gen: 0,
        })
    }

    /// Stable shard identity: `shard/NNN`, zero-padded to the width of
    /// the worker count.
    fn shard_id(index: usize, count: usize) -> String {
        let width = count.to_string().len();
        format!("shard/{index:0width$}")
    }

    /// The per-run credential prefix.
    pub fn prefix(&self) -> &str {
        self.client.prefix()
    }

    /// shard_id -> endpoint for this run.
    pub fn shards(&self) -> &BTreeMap<String, String> {
        &self.shards
    }

    /// Generation the run has reached.
    pub fn current_gen(&self) -> u32 {
        self.current_gen
    }

    /// Two-phase barrier: first every shard finishes emitting
    /// (`shard/wait`), then every task queue drains (`shard/join`).
    /// Joining before waiting could observe a queue that is about to
    /// refill, so the order is load-bearing.
    pub async fn barrier(&self) -> Result<()> {
        for (shard_id, endpoint) in &self.shards {
            self.client.wait(endpoint, shard_id).await?;
        }
        for (shard_id, endpoint) in &self.shards {
            self.client.join(endpoint, shard_id).await?;
        }
        Ok(())
    }

    async fn collect_hist(&self) -> Result<(u64, Histogram)> {
        let mut total_indiv = 0u64;
        let mut hist = Histogram::new();

        for (shard_id, endpoint) in &self.shards {
            match self.client.hist(endpoint, shard_id).await? {
                Some(partial) => {
                    total_indiv += partial.total_indiv;
                    hist.merge(&partial.hist);
                }
                // malformed response: the shard contributes nothing this
                // generation but the run goes on
                None => warn!(shard = %shard_id, "histogram unavailable, counting shard as empty"),
            }
        }

        Ok((total_indiv, hist))
    }

    /// Drive the whole run and return the final candidates, sorted
    /// descending by fitness.
    pub async fn run(&mut self) -> Result<Vec<EnumEntry>> {
        let params = self.uow.params().clone();

        for (shard_id, endpoint) in &self.shards {
            self.client
                .configure(endpoint, shard_id, &self.uow_name)
                .await?;
        }
        for (shard_id, endpoint) in &self.shards {
            self.client.ring_init(endpoint, shard_id, &self.shards).await?;
        }
        for (shard_id, endpoint) in &self.shards {
            self.client.populate(endpoint, shard_id).await?;
        }

        let mut fitness_cutoff = 0.0f64;

        loop {
            self.barrier().await?;

            if self.current_gen == params.n_gen {
                info!(gen = self.current_gen, "generation cap reached");
                break;
            }

            let (total_indiv, hist) = self.collect_hist().await?;

            if self.uow.should_terminate(self.current_gen, &hist, total_indiv) {
                info!(gen = self.current_gen, total_indiv, "terminating predicate fired");
                break;
            }

            fitness_cutoff = hist
                .fitness_cutoff(params.selection_rate)
                .unwrap_or(fitness_cutoff);

            for (shard_id, endpoint) in &self.shards {
                self.client
                    .next(endpoint, shard_id, self.current_gen, fitness_cutoff)
                    .await?;
            }
            self.current_gen += 1;
        }

        let mut results = Vec::new();
        for (shard_id, endpoint) in &self.shards {
            match self
                .client
                .enumerate(endpoint, shard_id, fitness_cutoff)
                .await?
            {
                Some(mut entries) => results.append(&mut entries),
                None => warn!(shard = %shard_id, "enumeration unavailable"),
            }
        }

        results.sort_by(|a, b| {
            let fa: f64 = a[1].parse().unwrap_or(0.0);
            let fb: f64 = b[1].parse().unwrap_or(0.0);
            fb.total_cmp(&fa)
        });

        Ok(results)
    }

    /// Broadcast `shard/stop` to end the run.
    pub async fn shutdown(&self) -> Result<()> {
        for (shard_id, endpoint) in &self.shards {
            self.client.stop(endpoint, shard_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_ids_are_zero_padded() {
        assert_eq!(Framework::shard_id(0, 3), "shard/0");
        assert_eq!(Framework::shard_id(7, 10), "shard/07");
        assert_eq!(Framework::shard_id(42, 150), "shard/042");
    }

    #[test]
    fn test_unknown_uow_is_fatal_at_startup() {
        let registry = UowRegistry::new();
        let workers = vec!["127.0.0.1:9311".to_string()];

        let result = Framework::new(&registry, "missing", &workers, "/tmp/run");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_worker_list_is_rejected() {
        let registry = ga_engine::default_registry();
        let result = Framework::new(&registry, "target-sum", &[], "/tmp/run");
        assert!(result.is_err());
    }

    #[test]
    fn test_prefix_is_unique_per_run() {
        let registry = ga_engine::default_registry();
        let workers = vec!["127.0.0.1:9311".to_string()];

        let a = Framework::new(&registry, "target-sum", &workers, "/tmp/run").unwrap();
        let b = Framework::new(&registry, "target-sum", &workers, "/tmp/run").unwrap();

        assert_ne!(a.prefix(), b.prefix());
        assert!(a.prefix().starts_with("/tmp/run/"));
    }
}
