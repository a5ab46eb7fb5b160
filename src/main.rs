mod config;
mod engine;
mod error;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{EngineConfig, LogFormat},
    engine::{
        Engine, api::routes, metrics::MetricsRegistry, queue::Scheduler,
        worker::spawn_worker_pool,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::from_env().context("failed to build engine config")?;
    init_tracing(&config);

    tokio::fs::create_dir_all(&config.workspace_root)
        .await
        .with_context(|| {
            format!(
                "failed to create workspace root {}",
                config.workspace_root.display()
            )
        })?;

    let metrics = Arc::new(MetricsRegistry::new());
    let scheduler = Scheduler::new(config.queue_capacity, metrics.clone());
    spawn_worker_pool(
        config.worker_count,
        scheduler.receiver(),
        Arc::new(Engine::new(&config)),
        metrics.clone(),
    );

    let app = routes(&config, scheduler, metrics);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .context("failed to bind listener")?;

    tracing::info!(
        addr = %config.bind_addr,
        workers = config.worker_count,
        queue_capacity = config.queue_capacity,
        workspace_root = %config.workspace_root.display(),
        "judge engine listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("judge engine server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn init_tracing(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init(),
    }
}
