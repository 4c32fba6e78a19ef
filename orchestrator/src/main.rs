// Orchestrator entry point
//
// Drives one run over a static worker list:
//   WORKERS=host:port,host:port [UOW=target-sum] [RUN_PREFIX=/tmp/evoring] orchestrator
//
// The final population is written to stdout as tab-separated lines,
// best fitness first.

use orchestrator::Framework;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let workers: Vec<String> = std::env::var("WORKERS")
        .map_err(|_| anyhow::anyhow!("WORKERS must list worker endpoints (host:port,...)"))?
        .split(',')
        .map(|endpoint| endpoint.trim().to_string())
        .filter(|endpoint| !endpoint.is_empty())
        .collect();

    let uow_name = std::env::var("UOW").unwrap_or_else(|_| "target-sum".to_string());
    let storage_prefix = std::env::var("RUN_PREFIX").unwrap_or_else(|_| "/tmp/evoring".to_string());

    let registry = ga_engine::default_registry();
    let mut framework = Framework::new(&registry, &uow_name, &workers, &storage_prefix)?;

    let results = framework.run().await?;
    info!(survivors = results.len(), "run complete");

    for entry in &results {
        println!("{}", entry.join("\t"));
    }

    framework.shutdown().await?;
    Ok(())
}
