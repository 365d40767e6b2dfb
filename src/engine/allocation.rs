use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::debug;
use ulid::Ulid;

use crate::model::{Assignment, Event};

use super::ratios::deployment_ratios;
use super::store::{Changeset, Store};

/// Id of the cleaning day for (`schedule_id`, `date`), created if missing.
pub(super) fn ensure_cleaning_day(changes: &mut Changeset, schedule_id: Ulid, date: NaiveDate) -> Ulid {
    if let Some(day) = changes.store().cleaning_day_on(schedule_id, date) {
        return day.id;
    }
    let id = Ulid::new();
    changes.record(Event::CleaningDayCreated { id, schedule_id, date });
    id
}

fn within_preference(store: &Store, cleaner_id: Ulid, date: NaiveDate) -> bool {
    store
        .cleaner(&cleaner_id)
        .and_then(|c| c.preference.daily_limit())
        .is_none_or(|limit| store.duties_on_date(cleaner_id, date) < limit)
}

/// Fill one open slot of `schedule_id` on `date` with the least deployed cleaner.
///
/// Returns `None` without touching anything when the schedule is not due on
/// `date`, the day is already full or nobody is eligible. Cleaners already
/// assigned to the day or excluded from it are skipped; if that leaves nobody,
/// the lowest ratio overall is assigned anyway.
///
/// When someone is assigned and `schedule_id` has no cleaning day on `date`
/// yet, the day is created in the same changeset.
pub fn create_assignment(changes: &mut Changeset, schedule_id: Ulid, date: NaiveDate) -> Option<Assignment> {
    let store = changes.store();
    let schedule = store.schedule(&schedule_id)?;
    if !schedule.defined_on_date(date) {
        return None;
    }

    let (assigned, excluded) = match store.cleaning_day_on(schedule_id, date) {
        Some(day) => (
            store
                .assignments_on_day(day.id)
                .map(|a| a.cleaner_id)
                .collect::<Vec<_>>(),
            day.excluded.clone(),
        ),
        None => (Vec::new(), BTreeSet::new()),
    };
    if assigned.len() >= schedule.cleaners_per_date as usize {
        return None;
    }

    let ratios = deployment_ratios(store, schedule_id, date);
    let &(lowest, _) = ratios.first()?;

    let candidates: Vec<Ulid> = ratios
        .iter()
        .map(|&(cleaner_id, _)| cleaner_id)
        .filter(|id| !assigned.contains(id) && !excluded.contains(id))
        .collect();
    let cleaner_id = candidates
        .iter()
        .copied()
        .find(|id| within_preference(store, *id, date))
        .or_else(|| candidates.first().copied())
        .unwrap_or(lowest);

    let cleaning_day_id = ensure_cleaning_day(changes, schedule_id, date);
    let id = Ulid::new();
    changes.record(Event::AssignmentCreated {
        id,
        schedule_id,
        cleaning_day_id,
        cleaner_id,
    });
    debug!("assigned cleaner {cleaner_id} to schedule {schedule_id} on {date}");
    changes.store().assignment(&id).cloned()
}
