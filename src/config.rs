use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineError;
use crate::limits::MAX_HORIZON_WEEKS;
use crate::model::RegenerationMode;

/// Daemon settings, read from `ROTA_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// How often the planner tops up every enabled schedule.
    pub plan_interval: Duration,
    /// How many weeks ahead the planner keeps duties generated.
    pub horizon_weeks: u32,
    /// Mode used by the planner. Anything but keep-existing rewrites history on every pass.
    pub planner_mode: RegenerationMode,
    /// WAL appends after which the compactor rewrites the log.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            plan_interval: Duration::from_secs(3600),
            horizon_weeks: 8,
            planner_mode: RegenerationMode::KeepExisting,
            compact_threshold: 1000,
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable numbers fall back to defaults;
    /// an unknown planner mode or a horizon past `MAX_HORIZON_WEEKS` is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let defaults = Self::default();
        let planner_mode = match parsed::<u8>(&lookup, "ROTA_PLANNER_MODE") {
            Some(code) => RegenerationMode::try_from(code)?,
            None => defaults.planner_mode,
        };
        let horizon_weeks = parsed(&lookup, "ROTA_HORIZON_WEEKS").unwrap_or(defaults.horizon_weeks);
        if horizon_weeks > MAX_HORIZON_WEEKS {
            return Err(EngineError::LimitExceeded("planner horizon too long"));
        }
        Ok(Self {
            data_dir: lookup("ROTA_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            metrics_port: parsed(&lookup, "ROTA_METRICS_PORT"),
            plan_interval: parsed(&lookup, "ROTA_PLAN_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.plan_interval),
            horizon_weeks,
            planner_mode,
            compact_threshold: parsed(&lookup, "ROTA_COMPACT_THRESHOLD").unwrap_or(defaults.compact_threshold),
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("rota.wal")
    }
}
