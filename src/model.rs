use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::calendar;
use crate::engine::EngineError;

/// How often a schedule recurs on its due day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Frequency {
    /// Every due day.
    #[default]
    Weekly,
    /// Due days in even weeks (counted from the calendar epoch).
    EvenWeeks,
    /// Due days in odd weeks.
    OddWeeks,
}

impl Frequency {
    /// Whether the week with the given index belongs to this frequency.
    pub fn includes_week(self, week: i64) -> bool {
        match self {
            Frequency::Weekly => true,
            Frequency::EvenWeeks => week.rem_euclid(2) == 0,
            Frequency::OddWeeks => week.rem_euclid(2) == 1,
        }
    }
}

/// How many duties a cleaner is willing to take on the same date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Preference {
    OneDuty,
    TwoDuties,
    #[default]
    NoPreference,
}

impl Preference {
    /// Max duties on one date, `None` when unbounded.
    pub fn daily_limit(self) -> Option<usize> {
        match self {
            Preference::OneDuty => Some(1),
            Preference::TwoDuties => Some(2),
            Preference::NoPreference => None,
        }
    }
}

/// What happens to existing assignments when duties are regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegenerationMode {
    /// Leave every assignment in place and only fill open slots.
    KeepExisting,
    /// Drop every assignment of the schedule, then allocate from scratch.
    ClearExisting,
    /// Reallocate only the dates in range that already hold assignments.
    ReassignExisting,
}

impl RegenerationMode {
    pub fn label(self) -> &'static str {
        match self {
            RegenerationMode::KeepExisting => "keep_existing",
            RegenerationMode::ClearExisting => "clear_existing",
            RegenerationMode::ReassignExisting => "reassign_existing",
        }
    }
}

impl TryFrom<u8> for RegenerationMode {
    type Error = EngineError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(RegenerationMode::KeepExisting),
            2 => Ok(RegenerationMode::ClearExisting),
            3 => Ok(RegenerationMode::ReassignExisting),
            other => Err(EngineError::InvalidMode(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Ulid,
    pub name: String,
    /// Derived from `name` when the schedule is created. Never changes afterwards.
    pub slug: String,
    pub disabled: bool,
    pub cleaners_per_date: u32,
    pub frequency: Frequency,
    pub due_day: Weekday,
}

impl Schedule {
    pub fn new(id: Ulid, name: impl Into<String>, cleaners_per_date: u32, frequency: Frequency) -> Self {
        let name = name.into();
        Self {
            id,
            slug: slugify(&name),
            name,
            disabled: false,
            cleaners_per_date,
            frequency,
            due_day: Weekday::Mon,
        }
    }

    /// First due day on or after `date`, if the calendar has one.
    pub fn correct_to_due_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        calendar::correct_dates_to_due_day(date, self.due_day)
    }

    /// True if `date` is one of this schedule's due dates.
    pub fn defined_on_date(&self, date: NaiveDate) -> bool {
        calendar::defined_on_date(self.due_day, self.frequency, date)
    }

    /// Due dates of this schedule in `[start, end]`, ascending.
    pub fn due_dates(&self, start: NaiveDate, end: NaiveDate) -> calendar::DueDates {
        calendar::DueDates::new(self.due_day, self.frequency, start, end)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleGroup {
    pub id: Ulid,
    pub name: String,
    pub schedules: BTreeSet<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cleaner {
    pub id: Ulid,
    pub name: String,
    pub preference: Preference,
}

impl fmt::Display for Cleaner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Membership of a cleaner in a group for the closed interval `[beginning, end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliation {
    pub id: Ulid,
    pub cleaner_id: Ulid,
    pub group_id: Ulid,
    pub beginning: NaiveDate,
    /// `None` while the membership is ongoing.
    pub end: Option<NaiveDate>,
}

impl Affiliation {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.beginning <= date && self.end.is_none_or(|end| date <= end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningDay {
    pub id: Ulid,
    pub schedule_id: Ulid,
    pub date: NaiveDate,
    pub excluded: BTreeSet<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Ulid,
    pub schedule_id: Ulid,
    pub cleaning_day_id: Ulid,
    pub cleaner_id: Ulid,
    /// Copied from the cleaning day so date filters need no join.
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DutySwitchStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutySwitch {
    pub id: Ulid,
    pub source_assignment_id: Ulid,
    pub selected_assignment_id: Option<Ulid>,
    pub status: DutySwitchStatus,
}

/// Every state change, flat. This is also the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ScheduleCreated {
        id: Ulid,
        name: String,
        slug: String,
        disabled: bool,
        cleaners_per_date: u32,
        frequency: Frequency,
        due_day: Weekday,
    },
    ScheduleUpdated {
        id: Ulid,
        name: String,
        disabled: bool,
        due_day: Weekday,
    },
    GroupCreated {
        id: Ulid,
        name: String,
    },
    ScheduleGrouped {
        group_id: Ulid,
        schedule_id: Ulid,
    },
    CleanerCreated {
        id: Ulid,
        name: String,
        preference: Preference,
    },
    AffiliationCreated {
        id: Ulid,
        cleaner_id: Ulid,
        group_id: Ulid,
        beginning: NaiveDate,
        end: Option<NaiveDate>,
    },
    AffiliationEnded {
        id: Ulid,
        end: NaiveDate,
    },
    CleaningDayCreated {
        id: Ulid,
        schedule_id: Ulid,
        date: NaiveDate,
    },
    CleanerExcluded {
        cleaning_day_id: Ulid,
        cleaner_id: Ulid,
    },
    ExclusionLifted {
        cleaning_day_id: Ulid,
        cleaner_id: Ulid,
    },
    AssignmentCreated {
        id: Ulid,
        schedule_id: Ulid,
        cleaning_day_id: Ulid,
        cleaner_id: Ulid,
    },
    AssignmentReassigned {
        id: Ulid,
        cleaner_id: Ulid,
    },
    AssignmentDeleted {
        id: Ulid,
    },
    DutySwitchRequested {
        id: Ulid,
        source_assignment_id: Ulid,
        selected_assignment_id: Option<Ulid>,
    },
    DutySwitchUpdated {
        id: Ulid,
        selected_assignment_id: Option<Ulid>,
        status: DutySwitchStatus,
    },
}

/// Lower-case ASCII slug: accents folded, whitespace and hyphen runs become a
/// single `-`, other punctuation dropped.
pub fn slugify(name: &str) -> String {
    use unicode_normalization::UnicodeNormalization;

    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.nfkd().filter(char::is_ascii) {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_ascii_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    slug.trim_matches(|c| c == '-' || c == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_folds_accents_and_spaces() {
        assert_eq!(slugify("Küche  putzen"), "kuche-putzen");
        assert_eq!(slugify("Bad & WC -- oben"), "bad-wc-oben");
        assert_eq!(slugify("  trailing!  "), "trailing");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn schedule_slug_follows_name() {
        let s = Schedule::new(Ulid::new(), "Treppenhaus Nord", 2, Frequency::Weekly);
        assert_eq!(s.slug, "treppenhaus-nord");
        assert_eq!(s.to_string(), "Treppenhaus Nord");
    }

    #[test]
    fn mode_codes() {
        assert_eq!(RegenerationMode::try_from(1).unwrap(), RegenerationMode::KeepExisting);
        assert_eq!(RegenerationMode::try_from(2).unwrap(), RegenerationMode::ClearExisting);
        assert_eq!(RegenerationMode::try_from(3).unwrap(), RegenerationMode::ReassignExisting);
        assert!(matches!(RegenerationMode::try_from(4), Err(EngineError::InvalidMode(4))));
        assert!(matches!(RegenerationMode::try_from(0), Err(EngineError::InvalidMode(0))));
    }

    #[test]
    fn affiliation_bounds_are_inclusive() {
        let d = |day| NaiveDate::from_ymd_opt(2010, 1, day).unwrap();
        let aff = Affiliation {
            id: Ulid::new(),
            cleaner_id: Ulid::new(),
            group_id: Ulid::new(),
            beginning: d(11),
            end: Some(d(25)),
        };
        assert!(!aff.covers(d(10)));
        assert!(aff.covers(d(11)));
        assert!(aff.covers(d(25)));
        assert!(!aff.covers(d(26)));

        let ongoing = Affiliation { end: None, ..aff };
        assert!(ongoing.covers(d(31)));
    }

    #[test]
    fn preference_limits() {
        assert_eq!(Preference::OneDuty.daily_limit(), Some(1));
        assert_eq!(Preference::TwoDuties.daily_limit(), Some(2));
        assert_eq!(Preference::default().daily_limit(), None);
    }
}
