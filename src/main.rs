use std::sync::Arc;

use tracing::info;

use parkd::clock::SystemClock;
use parkd::config::Config;
use parkd::engine::Engine;
use parkd::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    parkd::logging::init(&config.log_level);
    parkd::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let wal_path = config.wal_path();
    let engine = Arc::new(Engine::open(&wal_path, Arc::new(SystemClock)).await?);

    info!("parkd started");
    info!("  wal: {}", wal_path.display());
    info!("  idempotency ttl: {}h", config.idempotency_ttl.as_secs() / 3600);
    info!("  sweep interval: {}s", config.sweep_interval.as_secs());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let reaper_task = tokio::spawn(reaper::run_reaper(
        engine.clone(),
        config.idempotency_ttl,
        config.sweep_interval,
    ));
    let compactor_task = tokio::spawn(reaper::run_compactor(
        engine.clone(),
        config.compact_threshold,
    ));

    shutdown_signal().await?;
    info!("shutdown signal received");

    reaper_task.abort();
    compactor_task.abort();
    if let Err(e) = engine.compact_journal().await {
        tracing::warn!("final compaction failed: {e}");
    }

    info!("parkd stopped");
    Ok(())
}

/// Resolve on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
