/// Max length of schedule, group and cleaner names.
pub const MAX_NAME_LEN: usize = 256;

/// Max `cleaners_per_date` of a schedule.
pub const MAX_CLEANERS_PER_DATE: u32 = 64;

/// Widest date range a single regeneration may cover (about ten years).
pub const MAX_REGENERATION_DAYS: i64 = 3_660;

/// Longest planner horizon; one pass regenerates at most `MAX_REGENERATION_DAYS`.
pub const MAX_HORIZON_WEEKS: u32 = (MAX_REGENERATION_DAYS / 7) as u32;

/// Max number of cleaners excluded from one cleaning day.
pub const MAX_EXCLUSIONS_PER_DAY: usize = 256;

/// Largest encoded event accepted by the WAL. Longer length prefixes are treated as corruption.
pub const MAX_WAL_RECORD_BYTES: usize = 1 << 20;
