use std::sync::Arc;

use tracing::info;

use rota::config::Config;
use rota::engine::Engine;
use rota::planner;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    rota::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::new(config.wal_path())?);
    info!("rota started");
    info!("  wal: {}", config.wal_path().display());
    info!("  horizon: {} weeks, every {:?}", config.horizon_weeks, config.plan_interval);
    info!("  planner mode: {}", config.planner_mode.label());
    info!("  records: {}", serde_json::to_string(&engine.counts().await)?);

    let planner_task = tokio::spawn(planner::run_planner(
        engine.clone(),
        config.plan_interval,
        config.horizon_weeks,
        config.planner_mode,
    ));
    let compactor_task = tokio::spawn(planner::run_compactor(engine.clone(), config.compact_threshold));

    // Stop on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    info!("shutdown signal received");
    planner_task.abort();
    compactor_task.abort();
    // Leave a compact log behind for the next start
    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("rota stopped");
    Ok(())
}
