// Shard worker entry point
//
// One process hosts one shard. Handlers, the queue consumer and phase
// tasks all cooperate on a single-threaded runtime, which is what keeps
// the shard state single-writer without explicit locking in the hot path.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use worker::{serve, WorkerConfig, WorkerService};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let port = std::env::var("WORKER_PORT").unwrap_or_else(|_| "9311".to_string());
    let bind_addr = format!("0.0.0.0:{port}");

    let registry = Arc::new(ga_engine::default_registry());
    let service = WorkerService::new(registry, WorkerConfig::default());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("worker listening on {bind_addr}");

    serve(service, listener).await
}
