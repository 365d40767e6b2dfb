use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;
use ulid::Ulid;

use crate::limits::MAX_REGENERATION_DAYS;
use crate::model::{Assignment, Event, RegenerationMode};

use super::allocation::ensure_cleaning_day;
use super::store::Changeset;
use super::EngineError;

/// What one regeneration run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegenerationReport {
    pub dates_processed: usize,
    pub assignments_deleted: usize,
    pub assignments_created: usize,
}

fn delete_assignments(changes: &mut Changeset, ids: Vec<Ulid>) -> usize {
    let count = ids.len();
    for id in ids {
        changes.record(Event::AssignmentDeleted { id });
    }
    count
}

/// Regenerate the duties of `schedule_id` between `date1` and `date2` (either order, inclusive).
///
/// Due dates are processed oldest first. Processing a date makes sure its
/// cleaning day exists and calls `allocate` up to `cleaners_per_date` times,
/// stopping at the first `None`. Which dates get processed and which
/// assignments are dropped beforehand depends on `mode`; see [`RegenerationMode`].
pub fn new_cleaning_duties<F>(
    changes: &mut Changeset,
    schedule_id: Ulid,
    date1: NaiveDate,
    date2: NaiveDate,
    mode: RegenerationMode,
    mut allocate: F,
) -> Result<RegenerationReport, EngineError>
where
    F: FnMut(&mut Changeset, Ulid, NaiveDate) -> Option<Assignment>,
{
    let schedule = changes
        .store()
        .schedule(&schedule_id)
        .ok_or(EngineError::NotFound(schedule_id))?
        .clone();
    let (start, end) = (date1.min(date2), date1.max(date2));
    if (end - start).num_days() > MAX_REGENERATION_DAYS {
        return Err(EngineError::LimitExceeded("regeneration range too wide"));
    }

    let mut report = RegenerationReport::default();
    let due: Vec<NaiveDate> = schedule.due_dates(start, end).collect();

    let dates = match mode {
        RegenerationMode::KeepExisting => due,
        RegenerationMode::ClearExisting => {
            let ids: Vec<Ulid> = changes
                .store()
                .assignments_for_schedule(schedule_id)
                .map(|a| a.id)
                .collect();
            report.assignments_deleted = delete_assignments(changes, ids);
            due
        }
        RegenerationMode::ReassignExisting => {
            let store = changes.store();
            let mut ids = Vec::new();
            let mut dates = Vec::new();
            for date in due {
                let Some(day) = store.cleaning_day_on(schedule_id, date) else {
                    continue;
                };
                let before = ids.len();
                ids.extend(store.assignments_on_day(day.id).map(|a| a.id));
                if ids.len() > before {
                    dates.push(date);
                }
            }
            report.assignments_deleted = delete_assignments(changes, ids);
            dates
        }
    };

    for date in dates {
        ensure_cleaning_day(changes, schedule_id, date);
        for _ in 0..schedule.cleaners_per_date {
            if allocate(changes, schedule_id, date).is_none() {
                break;
            }
            report.assignments_created += 1;
        }
        report.dates_processed += 1;
    }

    debug!(
        "regenerated {} ({}) from {start} to {end}: {report:?}",
        schedule.name,
        mode.label()
    );
    Ok(report)
}
