use std::net::SocketAddr;

// ── Engine metrics ──────────────────────────────────────────────

/// Counter: assignments created (allocator and manual).
pub const ASSIGNMENTS_CREATED_TOTAL: &str = "rota_assignments_created_total";

/// Counter: assignments deleted (regeneration and manual).
pub const ASSIGNMENTS_DELETED_TOTAL: &str = "rota_assignments_deleted_total";

/// Counter: regeneration runs. Labels: mode.
pub const REGENERATIONS_TOTAL: &str = "rota_regenerations_total";

/// Histogram: regeneration latency in seconds.
pub const REGENERATION_DURATION_SECONDS: &str = "rota_regeneration_duration_seconds";

// ── Planner ─────────────────────────────────────────────────────

/// Gauge: enabled schedules seen by the last planner pass.
pub const SCHEDULES_ENABLED: &str = "rota_schedules_enabled";

/// Counter: planner passes that failed for a schedule.
pub const PLANNER_FAILURES_TOTAL: &str = "rota_planner_failures_total";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rota_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (operations per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rota_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "rota_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
