use std::sync::Arc;

use anyhow::Context;
use calc_orchestrator::api::api_routes;
use calc_orchestrator::config::{OrchestratorConfig, load_dotenv};
use calc_orchestrator::scheduler::{Scheduler, spawn_lease_watcher};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = OrchestratorConfig::from_env().context("invalid orchestrator configuration")?;

    eprintln!("🧮 Calc orchestrator v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}/api/v1", config.bind_addr());
    eprintln!(
        "   Timings (ms): + {} / - {} / * {} / / {}",
        config.scheduler.timings.addition.as_millis(),
        config.scheduler.timings.subtraction.as_millis(),
        config.scheduler.timings.multiplication.as_millis(),
        config.scheduler.timings.division.as_millis(),
    );

    let scheduler = Scheduler::new(config.scheduler);
    let watcher = spawn_lease_watcher(Arc::clone(&scheduler));

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "Orchestrator listening");

    axum::serve(listener, api_routes(scheduler))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl+C received, shutting down...");
        })
        .await
        .context("HTTP server failed")?;

    watcher.abort();
    Ok(())
}
