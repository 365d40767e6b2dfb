//! Fairness metric: how much of their tenure a cleaner has spent on duty.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ulid::Ulid;

use super::eligibility::covering_affiliations;
use super::store::Store;

/// `(cleaner id, ratio)` for every cleaner eligible on `date`, ascending by
/// ratio. Equal ratios stay in cleaner id order.
///
/// A cleaner's window runs from the earliest beginning to the latest end of
/// the affiliations covering `date` (ongoing ones end at `date`). The ratio is
/// the cleaner's assignments on the schedule inside that window over the
/// schedule's due dates inside it; an empty window counts as one due date.
pub fn deployment_ratios(store: &Store, schedule_id: Ulid, date: NaiveDate) -> Vec<(Ulid, f64)> {
    let Some(schedule) = store.schedule(&schedule_id) else {
        return Vec::new();
    };

    let mut windows: BTreeMap<Ulid, (NaiveDate, NaiveDate)> = BTreeMap::new();
    for aff in covering_affiliations(store, schedule_id, date) {
        let end = aff.end.unwrap_or(date);
        windows
            .entry(aff.cleaner_id)
            .and_modify(|(from, to)| {
                *from = (*from).min(aff.beginning);
                *to = (*to).max(end);
            })
            .or_insert((aff.beginning, end));
    }

    let mut ratios: Vec<(Ulid, f64)> = windows
        .into_iter()
        .filter(|(cleaner_id, _)| store.cleaner(cleaner_id).is_some())
        .map(|(cleaner_id, (from, to))| {
            let due = schedule.due_dates(from, to).count().max(1);
            let assigned = store.assignments_between(schedule_id, cleaner_id, from, to);
            (cleaner_id, assigned as f64 / due as f64)
        })
        .collect();

    // sort_by is stable: ties keep id order from the BTreeMap.
    ratios.sort_by(|a, b| a.1.total_cmp(&b.1));
    ratios
}
