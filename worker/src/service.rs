//! Worker state machine and task wiring
//!
//! The service starts unconfigured, learns its credentials and UnitOfWork
//! from `shard/config`, the ring from `ring/init`, and comes alive at
//! `uow/populate`, which creates the shard, spawns the single queue
//! consumer and kicks off the first long-running phase.
//!
//! Lock discipline matters here: the inbound reify path (credential check
//! plus enqueue) never touches the shard mutex, so peers can hand tasks to
//! a worker whose own phase task is mid-flight without a distributed lock
//! cycle. Everything that mutates the shard serializes on one mutex.

use crate::metrics::METRICS;
use crate::phase::PhaseGate;
use crate::queue::{task_queue, TaskQueue, TaskReceiver};
use crate::routes;
use crate::shard::Shard;
use engine_core::{HashRing, UnitOfWork, UowRegistry};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};
use transport::message::{Credentials, EnumEntry, HistResponse};
use transport::ShardClient;

/// Worker-level failure, mapped onto HTTP statuses by the routes.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A second `shard/config` arrived
    #[error("worker already configured")]
    AlreadyConfigured,

    /// The registry has no UnitOfWork under this name
    #[error("unknown unit of work: {0}")]
    UnknownUow(String),

    /// Payload credentials do not match this shard
    #[error("bad credentials")]
    Forbidden,

    /// A lifecycle endpoint arrived before `shard/config`
    #[error("worker not configured")]
    NotConfigured,

    /// A population endpoint arrived before `uow/populate`
    #[error("shard not populated")]
    NotPopulated,
}

/// Tunables for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Task queue capacity; generously sized so a full cluster of
    /// in-flight phases cannot wedge on back-pressure
    pub queue_capacity: usize,
    /// Target false-positive rate for the shard's key set
    pub keyset_fp_rate: f64,
    /// Delay between acking `shard/stop` and closing the listener
    pub stop_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 65_536,
            keyset_fp_rate: engine_core::keyset::DEFAULT_FP_RATE,
            stop_delay: Duration::from_millis(500),
        }
    }
}

/// A routed reify dispatch waiting on the task queue.
#[derive(Debug)]
pub struct ReifyTask {
    /// Generation the candidate was born in
    pub gen: u32,
    /// Opaque feature payload; the key is recomputed on insertion
    pub features: Value,
}

#[derive(Default)]
struct Inner {
    uow: Option<Arc<dyn UnitOfWork>>,
    ring_map: Option<BTreeMap<String, String>>,
    shard: Option<Shard>,
}

/// The two long-running phases a shard runs between barriers.
enum Phase {
    Populate,
    Next { current_gen: u32, fitness_cutoff: f64 },
}

/// Shared handle to one worker's state, cloned into every handler.
#[derive(Clone)]
pub struct WorkerService {
    registry: Arc<UowRegistry>,
    config: WorkerConfig,
    creds: Arc<StdMutex<Option<Credentials>>>,
    queue: Arc<StdMutex<Option<TaskQueue<ReifyTask>>>>,
    phase: PhaseGate,
    inner: Arc<Mutex<Inner>>,
    shutdown: Arc<Notify>,
}

impl WorkerService {
    /// Unconfigured worker over the given UnitOfWork registry.
    pub fn new(registry: Arc<UowRegistry>, config: WorkerConfig) -> Self {
        Self {
            registry,
            config,
            creds: Arc::new(StdMutex::new(None)),
            queue: Arc::new(StdMutex::new(None)),
            phase: PhaseGate::new(),
            inner: Arc::new(Mutex::new(Inner::default())),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Compare payload credentials against the configured ones.
    pub fn check_creds(&self, offered: &Credentials) -> Result<(), WorkerError> {
        let creds = self.creds.lock().expect("creds lock");
        match creds.as_ref() {
            Some(expected) if expected == offered => Ok(()),
            Some(expected) => {
                warn!(
                    offered_shard = %offered.shard_id,
                    expected_shard = %expected.shard_id,
                    "credential mismatch"
                );
                Err(WorkerError::Forbidden)
            }
            None => Err(WorkerError::Forbidden),
        }
    }

    /// `shard/config`: record credentials and instantiate the UnitOfWork.
    pub async fn configure(
        &self,
        offered: Credentials,
        uow_name: &str,
    ) -> Result<(), WorkerError> {
        let mut inner = self.inner.lock().await;

        {
            let creds = self.creds.lock().expect("creds lock");
            if creds.is_some() {
                warn!(shard = %offered.shard_id, "denied reconfiguration attempt");
                return Err(WorkerError::AlreadyConfigured);
            }
        }

        let uow = self
            .registry
            .instantiate(uow_name)
            .map_err(|_| WorkerError::UnknownUow(uow_name.to_string()))?;

        info!(shard = %offered.shard_id, uow = uow_name, "configuring shard");
        inner.uow = Some(uow);
        *self.creds.lock().expect("creds lock") = Some(offered);
        Ok(())
    }

    /// `ring/init`: store the mirrored shard_id to endpoint map.
    pub async fn ring_init(&self, ring_map: BTreeMap<String, String>) -> Result<(), WorkerError> {
        let mut inner = self.inner.lock().await;
        if inner.uow.is_none() {
            return Err(WorkerError::NotConfigured);
        }

        info!(members = ring_map.len(), "hash ring installed");
        inner.ring_map = Some(ring_map);
        Ok(())
    }

    /// `uow/populate`: build the shard, spawn the consumer, start the
    /// generation-0 phase. Acks to the caller before the phase finishes.
    pub async fn populate(&self) -> Result<(), WorkerError> {
        let mut inner = self.inner.lock().await;

        let uow = inner.uow.clone().ok_or(WorkerError::NotConfigured)?;
        let creds = self
            .creds
            .lock()
            .expect("creds lock")
            .clone()
            .ok_or(WorkerError::NotConfigured)?;

        let client = ShardClient::new(creds.prefix.clone());
        let mut shard = Shard::new(
            creds.shard_id.clone(),
            uow,
            client,
            self.config.keyset_fp_rate,
        );

        if let Some(ring_map) = &inner.ring_map {
            let members: Vec<String> = ring_map.keys().cloned().collect();
            let endpoints: HashMap<String, String> =
                ring_map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            shard.set_ring(HashRing::new(&members), endpoints);
        }

        inner.shard = Some(shard);

        let (queue, receiver) = task_queue(self.config.queue_capacity);
        *self.queue.lock().expect("queue lock") = Some(queue);
        tokio::spawn(consume(receiver, Arc::clone(&self.inner)));

        drop(inner);
        self.spawn_phase(Phase::Populate);
        Ok(())
    }

    /// `uow/next`: run one generation as a long-running phase.
    pub async fn next(&self, current_gen: u32, fitness_cutoff: f64) -> Result<(), WorkerError> {
        {
            let inner = self.inner.lock().await;
            if inner.shard.is_none() {
                return Err(WorkerError::NotPopulated);
            }
        }

        self.spawn_phase(Phase::Next {
            current_gen,
            fitness_cutoff,
        });
        Ok(())
    }

    /// Start a long-running phase over the shard. The phase gate closes
    /// before the ack goes out and reopens when the task finishes, however
    /// it finishes.
    fn spawn_phase(&self, phase: Phase) {
        let guard = self.phase.begin();
        METRICS.phases_started_total.inc();

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _guard = guard;
            let mut inner = inner.lock().await;
            let Some(shard) = inner.shard.as_mut() else {
                return;
            };

            let result = match phase {
                Phase::Populate => shard.populate(0).await,
                Phase::Next {
                    current_gen,
                    fitness_cutoff,
                } => shard.next_generation(current_gen, fitness_cutoff).await,
            };

            if let Err(err) = result {
                // transport failures cost this phase its remaining
                // dispatches; the shard itself stays serviceable
                error!(%err, "long-running phase failed");
            }
        });
    }

    /// `shard/wait` (barrier phase A).
    pub async fn wait_phase(&self) {
        self.phase.wait_idle().await;
    }

    /// `shard/join` (barrier phase B). A worker that never populated has a
    /// trivially empty queue.
    pub async fn join_queue(&self) {
        let queue = self.queue.lock().expect("queue lock").clone();
        if let Some(queue) = queue {
            queue.join().await;
        }
    }

    /// `uow/reify`: enqueue a routed candidate. Never touches the shard
    /// mutex, so it stays responsive during phases.
    pub async fn enqueue_reify(&self, task: ReifyTask) -> Result<(), WorkerError> {
        let queue = self.queue.lock().expect("queue lock").clone();
        let queue = queue.ok_or(WorkerError::NotPopulated)?;

        if !queue.put(task).await {
            warn!("task queue closed; dropping routed reify");
        }
        METRICS.task_queue_depth.set(queue.depth() as i64);
        Ok(())
    }

    /// `uow/hist`: read-only partial histogram.
    pub async fn hist(&self) -> HistResponse {
        let inner = self.inner.lock().await;
        match inner.shard.as_ref() {
            Some(shard) => HistResponse {
                total_indiv: shard.total_indiv(),
                hist: shard.partial_hist(),
            },
            None => HistResponse::default(),
        }
    }

    /// `uow/enum`: read-only enumeration at a cutoff.
    pub async fn enumerate(&self, fitness_cutoff: f64) -> Vec<EnumEntry> {
        let inner = self.inner.lock().await;
        inner
            .shard
            .as_ref()
            .map(|shard| shard.enumerate(fitness_cutoff))
            .unwrap_or_default()
    }

    /// `shard/stop` with matching credentials: close the listener after a
    /// short delay so the ack wins the race against the socket teardown.
    pub fn request_stop(&self) {
        info!("worker stopping");
        let shutdown = Arc::clone(&self.shutdown);
        let delay = self.config.stop_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shutdown.notify_one();
        });
    }

    /// Handle used by `serve` for graceful shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Diagnostic dump for `GET /`. Uses try-locks so a mid-phase worker
    /// still answers.
    pub fn status(&self) -> Value {
        let configured = self.creds.lock().expect("creds lock").is_some();
        let queue_depth = self
            .queue
            .lock()
            .expect("queue lock")
            .as_ref()
            .map(|queue| queue.depth());

        let shard = match self.inner.try_lock() {
            Ok(inner) => inner.shard.as_ref().map(Shard::status),
            Err(_) => Some(Value::String("busy".to_string())),
        };

        serde_json::json!({
            "service": "worker",
            "configured": configured,
            "phase_idle": self.phase.is_idle(),
            "queue_depth": queue_depth,
            "shard": shard,
        })
    }
}

/// The single queue consumer: applies routed reify dispatches in FIFO
/// order, re-running the full insert-or-route step so a mis-addressed
/// candidate is forwarded to its true owner.
async fn consume(mut receiver: TaskReceiver<ReifyTask>, inner: Arc<Mutex<Inner>>) {
    while let Some(task) = receiver.get().await {
        {
            let mut inner = inner.lock().await;
            if let Some(shard) = inner.shard.as_mut() {
                if let Err(err) = shard.reify(task.gen, task.features).await {
                    warn!(%err, "routed reify failed; task abandoned");
                }
            }
        }

        METRICS.tasks_processed_total.inc();
        receiver.task_done();
    }
}

/// Serve the control plane until `shard/stop` fires.
pub async fn serve(
    service: WorkerService,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let shutdown = service.shutdown_handle();
    let app = routes::router(service);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await?;

    Ok(())
}
