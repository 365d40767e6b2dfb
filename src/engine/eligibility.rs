use std::collections::BTreeSet;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{Affiliation, Cleaner};

use super::store::Store;

/// Affiliations that make a cleaner eligible for `schedule_id` on `date`.
pub fn covering_affiliations(store: &Store, schedule_id: Ulid, date: NaiveDate) -> impl Iterator<Item = &Affiliation> {
    store
        .groups_containing(schedule_id)
        .flat_map(move |g| store.affiliations_covering(g.id, date))
}

/// Cleaners eligible for `schedule_id` on `date`, each once, in id order.
pub fn eligible_cleaners(store: &Store, schedule_id: Ulid, date: NaiveDate) -> Vec<Cleaner> {
    let ids: BTreeSet<Ulid> = covering_affiliations(store, schedule_id, date)
        .map(|a| a.cleaner_id)
        .collect();
    ids.iter()
        .filter_map(|id| store.cleaner(id).cloned())
        .collect()
}
