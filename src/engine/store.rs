use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

/// All records of one engine. Every change goes through [`Store::apply`], so
/// replaying the WAL rebuilds exactly the state that was committed.
#[derive(Debug, Clone, Default)]
pub struct Store {
    schedules: BTreeMap<Ulid, Schedule>,
    groups: BTreeMap<Ulid, ScheduleGroup>,
    cleaners: BTreeMap<Ulid, Cleaner>,
    affiliations: BTreeMap<Ulid, Affiliation>,
    cleaning_days: BTreeMap<Ulid, CleaningDay>,
    assignments: BTreeMap<Ulid, Assignment>,
    duty_switches: BTreeMap<Ulid, DutySwitch>,
    /// (schedule, date) → cleaning day
    day_index: HashMap<(Ulid, NaiveDate), Ulid>,
    /// cleaning day → its assignments
    day_assignments: HashMap<Ulid, BTreeSet<Ulid>>,
    /// (schedule, cleaner) → assignments
    cleaner_assignments: HashMap<(Ulid, Ulid), BTreeSet<Ulid>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if any record of any kind uses `id`.
    pub fn contains_id(&self, id: &Ulid) -> bool {
        self.schedules.contains_key(id)
            || self.groups.contains_key(id)
            || self.cleaners.contains_key(id)
            || self.affiliations.contains_key(id)
            || self.cleaning_days.contains_key(id)
            || self.assignments.contains_key(id)
            || self.duty_switches.contains_key(id)
    }

    // ── Schedules & groups ───────────────────────────────────

    pub fn schedule(&self, id: &Ulid) -> Option<&Schedule> {
        self.schedules.get(id)
    }

    pub fn schedules(&self) -> impl Iterator<Item = &Schedule> {
        self.schedules.values()
    }

    pub fn group(&self, id: &Ulid) -> Option<&ScheduleGroup> {
        self.groups.get(id)
    }

    pub fn groups_containing(&self, schedule_id: Ulid) -> impl Iterator<Item = &ScheduleGroup> {
        self.groups
            .values()
            .filter(move |g| g.schedules.contains(&schedule_id))
    }

    // ── Cleaners & affiliations ──────────────────────────────

    pub fn cleaner(&self, id: &Ulid) -> Option<&Cleaner> {
        self.cleaners.get(id)
    }

    pub fn affiliation(&self, id: &Ulid) -> Option<&Affiliation> {
        self.affiliations.get(id)
    }

    /// Affiliations to `group_id` whose interval contains `date`.
    pub fn affiliations_covering(&self, group_id: Ulid, date: NaiveDate) -> impl Iterator<Item = &Affiliation> {
        self.affiliations
            .values()
            .filter(move |a| a.group_id == group_id && a.covers(date))
    }

    // ── Cleaning days ────────────────────────────────────────

    pub fn cleaning_day(&self, id: &Ulid) -> Option<&CleaningDay> {
        self.cleaning_days.get(id)
    }

    pub fn cleaning_day_on(&self, schedule_id: Ulid, date: NaiveDate) -> Option<&CleaningDay> {
        self.day_index
            .get(&(schedule_id, date))
            .and_then(|id| self.cleaning_days.get(id))
    }

    // ── Assignments ──────────────────────────────────────────

    pub fn assignment(&self, id: &Ulid) -> Option<&Assignment> {
        self.assignments.get(id)
    }

    pub fn assignments_for_schedule(&self, schedule_id: Ulid) -> impl Iterator<Item = &Assignment> {
        self.assignments
            .values()
            .filter(move |a| a.schedule_id == schedule_id)
    }

    pub fn assignments_for_cleaner(&self, cleaner_id: Ulid) -> impl Iterator<Item = &Assignment> {
        self.assignments
            .values()
            .filter(move |a| a.cleaner_id == cleaner_id)
    }

    pub fn assignments_on_day(&self, cleaning_day_id: Ulid) -> impl Iterator<Item = &Assignment> {
        self.day_assignments
            .get(&cleaning_day_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.assignments.get(id))
    }

    /// Assignments of `cleaner_id` on `schedule_id` dated in `[from, to]`.
    pub fn assignments_between(&self, schedule_id: Ulid, cleaner_id: Ulid, from: NaiveDate, to: NaiveDate) -> usize {
        self.cleaner_assignments
            .get(&(schedule_id, cleaner_id))
            .into_iter()
            .flatten()
            .filter_map(|id| self.assignments.get(id))
            .filter(|a| from <= a.date && a.date <= to)
            .count()
    }

    /// Duties of `cleaner_id` on `date` across all schedules.
    pub fn duties_on_date(&self, cleaner_id: Ulid, date: NaiveDate) -> usize {
        self.assignments_for_cleaner(cleaner_id)
            .filter(|a| a.date == date)
            .count()
    }

    // ── Duty switches ────────────────────────────────────────

    pub fn duty_switch(&self, id: &Ulid) -> Option<&DutySwitch> {
        self.duty_switches.get(id)
    }

    // ── Event application ────────────────────────────────────

    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::ScheduleCreated {
                id,
                name,
                slug,
                disabled,
                cleaners_per_date,
                frequency,
                due_day,
            } => {
                self.schedules.insert(
                    *id,
                    Schedule {
                        id: *id,
                        name: name.clone(),
                        slug: slug.clone(),
                        disabled: *disabled,
                        cleaners_per_date: *cleaners_per_date,
                        frequency: *frequency,
                        due_day: *due_day,
                    },
                );
            }
            Event::ScheduleUpdated {
                id,
                name,
                disabled,
                due_day,
            } => {
                if let Some(s) = self.schedules.get_mut(id) {
                    s.name = name.clone();
                    s.disabled = *disabled;
                    s.due_day = *due_day;
                }
            }
            Event::GroupCreated { id, name } => {
                self.groups.insert(
                    *id,
                    ScheduleGroup {
                        id: *id,
                        name: name.clone(),
                        schedules: BTreeSet::new(),
                    },
                );
            }
            Event::ScheduleGrouped { group_id, schedule_id } => {
                if let Some(g) = self.groups.get_mut(group_id) {
                    g.schedules.insert(*schedule_id);
                }
            }
            Event::CleanerCreated { id, name, preference } => {
                self.cleaners.insert(
                    *id,
                    Cleaner {
                        id: *id,
                        name: name.clone(),
                        preference: *preference,
                    },
                );
            }
            Event::AffiliationCreated {
                id,
                cleaner_id,
                group_id,
                beginning,
                end,
            } => {
                self.affiliations.insert(
                    *id,
                    Affiliation {
                        id: *id,
                        cleaner_id: *cleaner_id,
                        group_id: *group_id,
                        beginning: *beginning,
                        end: *end,
                    },
                );
            }
            Event::AffiliationEnded { id, end } => {
                if let Some(a) = self.affiliations.get_mut(id) {
                    a.end = Some(*end);
                }
            }
            Event::CleaningDayCreated { id, schedule_id, date } => {
                self.cleaning_days.insert(
                    *id,
                    CleaningDay {
                        id: *id,
                        schedule_id: *schedule_id,
                        date: *date,
                        excluded: BTreeSet::new(),
                    },
                );
                self.day_index.insert((*schedule_id, *date), *id);
            }
            Event::CleanerExcluded { cleaning_day_id, cleaner_id } => {
                if let Some(day) = self.cleaning_days.get_mut(cleaning_day_id) {
                    day.excluded.insert(*cleaner_id);
                }
            }
            Event::ExclusionLifted { cleaning_day_id, cleaner_id } => {
                if let Some(day) = self.cleaning_days.get_mut(cleaning_day_id) {
                    day.excluded.remove(cleaner_id);
                }
            }
            Event::AssignmentCreated {
                id,
                schedule_id,
                cleaning_day_id,
                cleaner_id,
            } => {
                let Some(day) = self.cleaning_days.get(cleaning_day_id) else {
                    return;
                };
                let date = day.date;
                self.assignments.insert(
                    *id,
                    Assignment {
                        id: *id,
                        schedule_id: *schedule_id,
                        cleaning_day_id: *cleaning_day_id,
                        cleaner_id: *cleaner_id,
                        date,
                    },
                );
                self.day_assignments.entry(*cleaning_day_id).or_default().insert(*id);
                self.cleaner_assignments
                    .entry((*schedule_id, *cleaner_id))
                    .or_default()
                    .insert(*id);
            }
            Event::AssignmentReassigned { id, cleaner_id } => {
                if let Some(a) = self.assignments.get_mut(id) {
                    let previous = (a.schedule_id, a.cleaner_id);
                    a.cleaner_id = *cleaner_id;
                    let current = (a.schedule_id, *cleaner_id);
                    if let Some(ids) = self.cleaner_assignments.get_mut(&previous) {
                        ids.remove(id);
                    }
                    self.cleaner_assignments.entry(current).or_default().insert(*id);
                }
            }
            Event::AssignmentDeleted { id } => {
                if let Some(a) = self.assignments.remove(id) {
                    if let Some(ids) = self.day_assignments.get_mut(&a.cleaning_day_id) {
                        ids.remove(id);
                    }
                    if let Some(ids) = self.cleaner_assignments.get_mut(&(a.schedule_id, a.cleaner_id)) {
                        ids.remove(id);
                    }
                }
                // Switches cannot outlive either of their assignments.
                self.duty_switches.retain(|_, s| {
                    s.source_assignment_id != *id && s.selected_assignment_id != Some(*id)
                });
            }
            Event::DutySwitchRequested {
                id,
                source_assignment_id,
                selected_assignment_id,
            } => {
                self.duty_switches.insert(
                    *id,
                    DutySwitch {
                        id: *id,
                        source_assignment_id: *source_assignment_id,
                        selected_assignment_id: *selected_assignment_id,
                        status: DutySwitchStatus::Pending,
                    },
                );
            }
            Event::DutySwitchUpdated {
                id,
                selected_assignment_id,
                status,
            } => {
                if let Some(s) = self.duty_switches.get_mut(id) {
                    s.selected_assignment_id = *selected_assignment_id;
                    s.status = *status;
                }
            }
        }
    }

    /// Minimal event sequence that recreates the current state, in dependency order.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for s in self.schedules.values() {
            events.push(Event::ScheduleCreated {
                id: s.id,
                name: s.name.clone(),
                slug: s.slug.clone(),
                disabled: s.disabled,
                cleaners_per_date: s.cleaners_per_date,
                frequency: s.frequency,
                due_day: s.due_day,
            });
        }
        for g in self.groups.values() {
            events.push(Event::GroupCreated { id: g.id, name: g.name.clone() });
            for schedule_id in &g.schedules {
                events.push(Event::ScheduleGrouped { group_id: g.id, schedule_id: *schedule_id });
            }
        }
        for c in self.cleaners.values() {
            events.push(Event::CleanerCreated {
                id: c.id,
                name: c.name.clone(),
                preference: c.preference,
            });
        }
        for a in self.affiliations.values() {
            events.push(Event::AffiliationCreated {
                id: a.id,
                cleaner_id: a.cleaner_id,
                group_id: a.group_id,
                beginning: a.beginning,
                end: a.end,
            });
        }
        for day in self.cleaning_days.values() {
            events.push(Event::CleaningDayCreated {
                id: day.id,
                schedule_id: day.schedule_id,
                date: day.date,
            });
            for cleaner_id in &day.excluded {
                events.push(Event::CleanerExcluded { cleaning_day_id: day.id, cleaner_id: *cleaner_id });
            }
        }
        for a in self.assignments.values() {
            events.push(Event::AssignmentCreated {
                id: a.id,
                schedule_id: a.schedule_id,
                cleaning_day_id: a.cleaning_day_id,
                cleaner_id: a.cleaner_id,
            });
        }
        for s in self.duty_switches.values() {
            events.push(Event::DutySwitchRequested {
                id: s.id,
                source_assignment_id: s.source_assignment_id,
                selected_assignment_id: s.selected_assignment_id,
            });
            if s.status != DutySwitchStatus::Pending {
                events.push(Event::DutySwitchUpdated {
                    id: s.id,
                    selected_assignment_id: s.selected_assignment_id,
                    status: s.status,
                });
            }
        }
        events
    }

    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            schedules: self.schedules.len(),
            groups: self.groups.len(),
            cleaners: self.cleaners.len(),
            affiliations: self.affiliations.len(),
            cleaning_days: self.cleaning_days.len(),
            assignments: self.assignments.len(),
            duty_switches: self.duty_switches.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreCounts {
    pub schedules: usize,
    pub groups: usize,
    pub cleaners: usize,
    pub affiliations: usize,
    pub cleaning_days: usize,
    pub assignments: usize,
    pub duty_switches: usize,
}

/// A draft of the store plus the events that produced it. Nothing becomes
/// visible until the engine commits the events to the WAL and swaps the draft in.
#[derive(Debug, Clone)]
pub struct Changeset {
    store: Store,
    events: Vec<Event>,
}

impl Changeset {
    /// Starts from a full copy of `base`, so every write operation costs
    /// O(records) on top of its own work.
    pub fn new(base: &Store) -> Self {
        Self {
            store: base.clone(),
            events: Vec::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn record(&mut self, event: Event) {
        self.store.apply(&event);
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_parts(self) -> (Store, Vec<Event>) {
        (self.store, self.events)
    }
}
