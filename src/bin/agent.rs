use std::sync::Arc;

use anyhow::Context;
use calc_orchestrator::agent::{HttpTaskSource, WorkerPool};
use calc_orchestrator::config::{AgentConfig, load_dotenv};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AgentConfig::from_env().context("invalid agent configuration")?;
    info!(
        agent_id = %config.agent_id,
        orchestrator = %config.orchestrator_url,
        computing_power = config.pool.concurrency,
        "Agent starting"
    );

    let source = Arc::new(HttpTaskSource::new(
        config.orchestrator_url.clone(),
        config.agent_id.clone(),
    ));
    let pool = WorkerPool::new(config.pool, source);
    let metrics = pool.metrics();

    pool.run_until(async {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl+C received, shutting down...");
    })
    .await;

    info!(
        completed = metrics.completed(),
        rejected = metrics.rejected(),
        failed = metrics.failed(),
        "Agent stopped"
    );
    Ok(())
}
