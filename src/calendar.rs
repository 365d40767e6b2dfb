use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::model::Frequency;

/// `num_days_from_ce` of Monday 1970-01-05, the start of week 0.
const WEEK_EPOCH_DAYS_FROM_CE: i64 = 719_167;

/// Move `date` forward to the next `due_day`. Dates already on `due_day` are
/// unchanged. `None` if that day lies past the last representable date.
pub fn correct_dates_to_due_day(date: NaiveDate, due_day: Weekday) -> Option<NaiveDate> {
    let offset = (due_day.num_days_from_monday() + 7 - date.weekday().num_days_from_monday()) % 7;
    date.checked_add_days(Days::new(u64::from(offset)))
}

/// Whole weeks between the epoch Monday and `date`; negative before the epoch.
pub fn week_index(date: NaiveDate) -> i64 {
    (date.num_days_from_ce() as i64 - WEEK_EPOCH_DAYS_FROM_CE).div_euclid(7)
}

pub fn defined_on_date(due_day: Weekday, frequency: Frequency, date: NaiveDate) -> bool {
    date.weekday() == due_day && frequency.includes_week(week_index(date))
}

/// Due dates in `[start, end]`, ascending. Walks week by week from the first
/// `due_day` on or after `start` and skips weeks outside the frequency. Empty
/// when no such `due_day` exists in the calendar.
#[derive(Debug, Clone)]
pub struct DueDates {
    next: Option<NaiveDate>,
    end: NaiveDate,
    frequency: Frequency,
}

impl DueDates {
    pub fn new(due_day: Weekday, frequency: Frequency, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            next: correct_dates_to_due_day(start, due_day),
            end,
            frequency,
        }
    }
}

impl Iterator for DueDates {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        while let Some(date) = self.next {
            if date > self.end {
                self.next = None;
                return None;
            }
            self.next = date.checked_add_days(Days::new(7));
            if self.frequency.includes_week(week_index(date)) {
                return Some(date);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn correct_to_due_day_moves_forward() {
        // 2010-01-08 is a Friday
        assert_eq!(correct_dates_to_due_day(d(2010, 1, 8), Weekday::Mon), Some(d(2010, 1, 11)));
        assert_eq!(correct_dates_to_due_day(d(2010, 1, 8), Weekday::Fri), Some(d(2010, 1, 8)));
        assert_eq!(correct_dates_to_due_day(d(2010, 1, 8), Weekday::Sun), Some(d(2010, 1, 10)));
        assert_eq!(correct_dates_to_due_day(d(2010, 1, 11), Weekday::Mon), Some(d(2010, 1, 11)));
    }

    #[test]
    fn week_index_parity() {
        assert_eq!(week_index(d(1970, 1, 5)), 0);
        assert_eq!(week_index(d(1970, 1, 11)), 0);
        assert_eq!(week_index(d(1970, 1, 12)), 1);
        assert_eq!(week_index(d(1970, 1, 4)), -1);
        assert_eq!(week_index(d(2010, 2, 8)).rem_euclid(2), 0);
        assert_eq!(week_index(d(2010, 2, 1)).rem_euclid(2), 1);
        assert_eq!(week_index(d(2010, 2, 15)).rem_euclid(2), 1);
    }

    #[test]
    fn even_and_odd_weeks() {
        let even_week = d(2010, 2, 8);
        let odd_week = d(2010, 2, 1);

        assert!(defined_on_date(Weekday::Mon, Frequency::Weekly, even_week));
        assert!(defined_on_date(Weekday::Mon, Frequency::EvenWeeks, even_week));
        assert!(!defined_on_date(Weekday::Mon, Frequency::OddWeeks, even_week));

        assert!(!defined_on_date(Weekday::Mon, Frequency::EvenWeeks, odd_week));
        assert!(defined_on_date(Weekday::Mon, Frequency::OddWeeks, odd_week));
    }

    #[test]
    fn wrong_weekday_is_never_due() {
        let tuesday = d(2010, 2, 9);
        assert!(!defined_on_date(Weekday::Mon, Frequency::Weekly, tuesday));
        assert!(!defined_on_date(Weekday::Mon, Frequency::EvenWeeks, tuesday));
        assert!(!defined_on_date(Weekday::Mon, Frequency::OddWeeks, tuesday));
    }

    #[test]
    fn even_and_odd_partition_due_days() {
        let mut date = d(2008, 12, 1);
        while date < d(2012, 1, 1) {
            let even = defined_on_date(Weekday::Mon, Frequency::EvenWeeks, date);
            let odd = defined_on_date(Weekday::Mon, Frequency::OddWeeks, date);
            assert!(even ^ odd, "{date} must be in exactly one parity");
            assert!(defined_on_date(Weekday::Mon, Frequency::Weekly, date));
            date = date + Days::new(7);
        }
    }

    #[test]
    fn due_dates_weekly_inclusive() {
        let dates: Vec<_> = DueDates::new(Weekday::Mon, Frequency::Weekly, d(2010, 1, 8), d(2010, 2, 8)).collect();
        assert_eq!(
            dates,
            vec![d(2010, 1, 11), d(2010, 1, 18), d(2010, 1, 25), d(2010, 2, 1), d(2010, 2, 8)]
        );
    }

    #[test]
    fn due_dates_skip_other_parity() {
        let even: Vec<_> = DueDates::new(Weekday::Mon, Frequency::EvenWeeks, d(2010, 1, 11), d(2010, 2, 8)).collect();
        let odd: Vec<_> = DueDates::new(Weekday::Mon, Frequency::OddWeeks, d(2010, 1, 11), d(2010, 2, 8)).collect();
        assert_eq!(even, vec![d(2010, 1, 11), d(2010, 1, 25), d(2010, 2, 8)]);
        assert_eq!(odd, vec![d(2010, 1, 18), d(2010, 2, 1)]);
    }

    #[test]
    fn due_dates_empty_when_reversed() {
        assert_eq!(DueDates::new(Weekday::Mon, Frequency::Weekly, d(2010, 2, 8), d(2010, 1, 11)).count(), 0);
    }

    #[test]
    fn end_of_calendar_has_no_later_due_day() {
        let last = NaiveDate::MAX;
        let later_weekday = last.weekday().succ();
        assert_eq!(correct_dates_to_due_day(last, later_weekday), None);
        assert_eq!(correct_dates_to_due_day(last, last.weekday()), Some(last));

        assert_eq!(DueDates::new(later_weekday, Frequency::Weekly, last, last).count(), 0);
        let on_last: Vec<_> = DueDates::new(last.weekday(), Frequency::Weekly, last - Days::new(7), last).collect();
        assert_eq!(on_last, vec![last - Days::new(7), last]);
    }
}
