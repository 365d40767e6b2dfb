use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::model::RegenerationMode;
use crate::observability;

/// Regenerate every enabled schedule from `today` to `horizon_weeks` ahead.
/// Returns how many schedules were regenerated without error.
pub async fn plan_once(engine: &Engine, today: NaiveDate, horizon_weeks: u32, mode: RegenerationMode) -> usize {
    let Some(until) = today.checked_add_days(Days::new(7 * u64::from(horizon_weeks))) else {
        warn!("planning horizon of {horizon_weeks} weeks from {today} runs off the calendar");
        return 0;
    };
    let schedules = engine.enabled_schedules().await;
    metrics::gauge!(observability::SCHEDULES_ENABLED).set(schedules.len() as f64);

    let mut planned = 0;
    for schedule in schedules {
        match engine.new_cleaning_duties(schedule.id, today, until, mode).await {
            Ok(_) => planned += 1,
            Err(e) => {
                metrics::counter!(observability::PLANNER_FAILURES_TOTAL).increment(1);
                warn!("planning {} failed: {e}", schedule.name);
            }
        }
    }
    planned
}

/// Background task that keeps the duties of every enabled schedule generated up to the horizon.
pub async fn run_planner(engine: Arc<Engine>, every: Duration, horizon_weeks: u32, mode: RegenerationMode) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let today = chrono::Local::now().date_naive();
        let planned = plan_once(&engine, today, horizon_weeks, mode).await;
        info!("planner pass for {today}: {planned} schedules up to date");
    }
}

/// Background task that compacts the WAL once enough appends piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => {
                metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
                info!("compacted WAL after {appends} appends");
            }
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rota_test_planner");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn planner_fills_enabled_schedules_only() {
        let engine = Engine::new(test_wal_path("fills_enabled.wal")).unwrap();

        let enabled = Ulid::new();
        let mut disabled = Schedule::new(Ulid::new(), "disabled", 1, Frequency::Weekly);
        disabled.disabled = true;
        engine
            .create_schedule(Schedule::new(enabled, "enabled", 1, Frequency::Weekly))
            .await
            .unwrap();
        engine.create_schedule(disabled.clone()).await.unwrap();

        let group = Ulid::new();
        engine.create_group(group, "flat").await.unwrap();
        engine.add_schedule_to_group(group, enabled).await.unwrap();
        engine.add_schedule_to_group(group, disabled.id).await.unwrap();
        let cleaner = Ulid::new();
        engine.create_cleaner(cleaner, "Ada", Preference::NoPreference).await.unwrap();
        engine
            .create_affiliation(Ulid::new(), cleaner, group, d(2010, 1, 1), None)
            .await
            .unwrap();

        // Monday 2010-01-11 plus two weeks: three due dates
        let planned = plan_once(&engine, d(2010, 1, 11), 2, RegenerationMode::KeepExisting).await;
        assert_eq!(planned, 1);
        assert_eq!(engine.assignments_for_schedule(enabled).await.len(), 3);
        assert!(engine.assignments_for_schedule(disabled.id).await.is_empty());

        // A second pass finds every slot filled
        plan_once(&engine, d(2010, 1, 11), 2, RegenerationMode::KeepExisting).await;
        assert_eq!(engine.assignments_for_schedule(enabled).await.len(), 3);
    }

    #[tokio::test]
    async fn planner_skips_horizon_past_calendar_end() {
        let engine = Engine::new(test_wal_path("calendar_end.wal")).unwrap();
        engine
            .create_schedule(Schedule::new(Ulid::new(), "hall", 1, Frequency::Weekly))
            .await
            .unwrap();

        let today = NaiveDate::MAX - Days::new(3);
        assert_eq!(plan_once(&engine, today, 1, RegenerationMode::KeepExisting).await, 0);
        assert_eq!(engine.counts().await.cleaning_days, 0);
    }

    #[tokio::test]
    async fn planner_reports_schedules_it_could_not_plan() {
        let engine = Engine::new(test_wal_path("too_wide.wal")).unwrap();
        engine
            .create_schedule(Schedule::new(Ulid::new(), "hall", 1, Frequency::Weekly))
            .await
            .unwrap();

        let planned = plan_once(&engine, d(2010, 1, 11), crate::limits::MAX_HORIZON_WEEKS + 1, RegenerationMode::KeepExisting).await;
        assert_eq!(planned, 0);
        let planned = plan_once(&engine, d(2010, 1, 11), crate::limits::MAX_HORIZON_WEEKS, RegenerationMode::KeepExisting).await;
        assert_eq!(planned, 1);
    }
}
