//! HTTP client for driving shard control-plane endpoints
//!
//! Error mapping follows the run contract: connection-level failures are
//! fatal and propagate, a 403 is fatal (credential or version skew), and a
//! 200 whose JSON body does not decode is logged and reported as an absent
//! result so aggregation can count the shard as empty.

use crate::error::{Result, TransportError};
use crate::message::{
    paths, BareRequest, ConfigRequest, Credentials, EnumEntry, EnumRequest, HistResponse,
    NextRequest, ReifyRequest, RingInitRequest,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Client for the shard control plane, bound to one run's prefix.
#[derive(Debug, Clone)]
pub struct ShardClient {
    http: reqwest::Client,
    prefix: String,
}

impl ShardClient {
    /// Client stamping the given run prefix into every payload.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            prefix: prefix.into(),
        }
    }

    /// The run prefix this client authenticates with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Credentials addressed to a target shard.
    pub fn creds_for(&self, shard_id: &str) -> Credentials {
        Credentials {
            prefix: self.prefix.clone(),
            shard_id: shard_id.to_string(),
        }
    }

    async fn post<B: Serialize>(
        &self,
        endpoint: &str,
        shard_id: &str,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let url = format!("http://{endpoint}/{path}");
        debug!(endpoint, path, "control-plane POST");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| TransportError::Unreachable {
                endpoint: endpoint.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            reqwest::StatusCode::FORBIDDEN => Err(TransportError::Forbidden {
                shard_id: shard_id.to_string(),
                endpoint: endpoint.to_string(),
            }),
            status => Err(TransportError::UnexpectedStatus {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
                path: path.to_string(),
            }),
        }
    }

    /// POST expecting a plain-text ack.
    async fn post_ack<B: Serialize>(
        &self,
        endpoint: &str,
        shard_id: &str,
        path: &str,
        body: &B,
    ) -> Result<()> {
        self.post(endpoint, shard_id, path, body).await.map(|_| ())
    }

    /// POST expecting a JSON body; a malformed body degrades to `None`.
    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        shard_id: &str,
        path: &str,
        body: &B,
    ) -> Result<Option<T>> {
        let response = self.post(endpoint, shard_id, path, body).await?;

        match response.json::<T>().await {
            Ok(parsed) => Ok(Some(parsed)),
            Err(err) => {
                warn!(endpoint, path, %err, "malformed response body, counting shard as empty");
                Ok(None)
            }
        }
    }

    fn bare(&self, shard_id: &str) -> BareRequest {
        BareRequest {
            creds: self.creds_for(shard_id),
        }
    }

    /// `shard/config`: establish credentials and select the UnitOfWork.
    pub async fn configure(&self, endpoint: &str, shard_id: &str, uow_name: &str) -> Result<()> {
        let body = ConfigRequest {
            creds: self.creds_for(shard_id),
            uow_name: uow_name.to_string(),
        };
        self.post_ack(endpoint, shard_id, paths::SHARD_CONFIG, &body)
            .await
    }

    /// `ring/init`: mirror the shard_id to endpoint map.
    pub async fn ring_init(
        &self,
        endpoint: &str,
        shard_id: &str,
        ring: &BTreeMap<String, String>,
    ) -> Result<()> {
        let body = RingInitRequest {
            creds: self.creds_for(shard_id),
            ring: ring.clone(),
        };
        self.post_ack(endpoint, shard_id, paths::RING_INIT, &body)
            .await
    }

    /// `shard/wait`: returns once the shard's long-running phase ends.
    pub async fn wait(&self, endpoint: &str, shard_id: &str) -> Result<()> {
        self.post_ack(endpoint, shard_id, paths::SHARD_WAIT, &self.bare(shard_id))
            .await
    }

    /// `shard/join`: returns once the shard's task queue has drained.
    pub async fn join(&self, endpoint: &str, shard_id: &str) -> Result<()> {
        self.post_ack(endpoint, shard_id, paths::SHARD_JOIN, &self.bare(shard_id))
            .await
    }

    /// `shard/stop`: ask the worker to shut down.
    pub async fn stop(&self, endpoint: &str, shard_id: &str) -> Result<()> {
        self.post_ack(endpoint, shard_id, paths::SHARD_STOP, &self.bare(shard_id))
            .await
    }

    /// `uow/populate`: seed generation 0; acks immediately.
    pub async fn populate(&self, endpoint: &str, shard_id: &str) -> Result<()> {
        self.post_ack(endpoint, shard_id, paths::UOW_POPULATE, &self.bare(shard_id))
            .await
    }

    /// `uow/hist`: fetch the shard's partial histogram.
    pub async fn hist(&self, endpoint: &str, shard_id: &str) -> Result<Option<HistResponse>> {
        self.post_json(endpoint, shard_id, paths::UOW_HIST, &self.bare(shard_id))
            .await
    }

    /// `uow/next`: run one generation of selection, breeding and backfill.
    pub async fn next(
        &self,
        endpoint: &str,
        shard_id: &str,
        current_gen: u32,
        fitness_cutoff: f64,
    ) -> Result<()> {
        let body = NextRequest {
            creds: self.creds_for(shard_id),
            current_gen,
            fitness_cutoff,
        };
        self.post_ack(endpoint, shard_id, paths::UOW_NEXT, &body).await
    }

    /// `uow/enum`: list candidates at or above the cutoff.
    pub async fn enumerate(
        &self,
        endpoint: &str,
        shard_id: &str,
        fitness_cutoff: f64,
    ) -> Result<Option<Vec<EnumEntry>>> {
        let body = EnumRequest {
            creds: self.creds_for(shard_id),
            fitness_cutoff,
        };
        self.post_json(endpoint, shard_id, paths::UOW_ENUM, &body).await
    }

    /// `uow/reify`: hand a candidate to its owning shard's task queue.
    ///
    /// At-most-once: no retry is attempted, and the caller does not learn
    /// whether the candidate survived deduplication on the far side.
    pub async fn reify(
        &self,
        endpoint: &str,
        shard_id: &str,
        key: String,
        gen: u32,
        features: Value,
    ) -> Result<()> {
        let body = ReifyRequest {
            creds: self.creds_for(shard_id),
            key,
            gen,
            features,
        };
        self.post_ack(endpoint, shard_id, paths::UOW_REIFY, &body).await
    }
}
