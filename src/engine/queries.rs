use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::store::StoreCounts;
use super::{eligibility, ratios, Engine};

impl Engine {
    pub async fn get_schedule(&self, id: Ulid) -> Option<Schedule> {
        self.state.read().await.schedule(&id).cloned()
    }

    pub async fn enabled_schedules(&self) -> Vec<Schedule> {
        let guard = self.state.read().await;
        guard.schedules().filter(|s| !s.disabled).cloned().collect()
    }

    pub async fn disabled_schedules(&self) -> Vec<Schedule> {
        let guard = self.state.read().await;
        guard.schedules().filter(|s| s.disabled).cloned().collect()
    }

    pub async fn get_group(&self, id: Ulid) -> Option<ScheduleGroup> {
        self.state.read().await.group(&id).cloned()
    }

    pub async fn get_cleaner(&self, id: Ulid) -> Option<Cleaner> {
        self.state.read().await.cleaner(&id).cloned()
    }

    pub async fn cleaning_day(&self, schedule_id: Ulid, date: NaiveDate) -> Option<CleaningDay> {
        self.state
            .read()
            .await
            .cleaning_day_on(schedule_id, date)
            .cloned()
    }

    /// Assignments of a schedule, oldest date first.
    pub async fn assignments_for_schedule(&self, schedule_id: Ulid) -> Vec<Assignment> {
        let guard = self.state.read().await;
        let mut assignments: Vec<Assignment> = guard.assignments_for_schedule(schedule_id).cloned().collect();
        assignments.sort_by_key(|a| (a.date, a.id));
        assignments
    }

    /// Assignments of a cleaner across all schedules, oldest date first.
    pub async fn assignments_for_cleaner(&self, cleaner_id: Ulid) -> Vec<Assignment> {
        let guard = self.state.read().await;
        let mut assignments: Vec<Assignment> = guard.assignments_for_cleaner(cleaner_id).cloned().collect();
        assignments.sort_by_key(|a| (a.date, a.id));
        assignments
    }

    pub async fn get_assignment(&self, id: Ulid) -> Option<Assignment> {
        self.state.read().await.assignment(&id).cloned()
    }

    pub async fn get_duty_switch(&self, id: Ulid) -> Option<DutySwitch> {
        self.state.read().await.duty_switch(&id).cloned()
    }

    pub async fn eligible_cleaners(&self, schedule_id: Ulid, date: NaiveDate) -> Vec<Cleaner> {
        let guard = self.state.read().await;
        eligibility::eligible_cleaners(&guard, schedule_id, date)
    }

    /// Empty for unknown schedules.
    pub async fn deployment_ratios(&self, schedule_id: Ulid, date: NaiveDate) -> Vec<(Ulid, f64)> {
        let guard = self.state.read().await;
        ratios::deployment_ratios(&guard, schedule_id, date)
    }

    pub async fn counts(&self) -> StoreCounts {
        self.state.read().await.counts()
    }
}
