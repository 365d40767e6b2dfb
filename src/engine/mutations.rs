use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::duties::RegenerationReport;
use super::store::{Changeset, Store};
use super::{allocation, duties, Engine, EngineError, WalCommand};

fn check_name(name: &str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn check_new_id(store: &Store, id: Ulid) -> Result<(), EngineError> {
    if store.contains_id(&id) {
        return Err(EngineError::AlreadyExists(id));
    }
    Ok(())
}

/// A switch may only move while it is pending.
fn pending_switch(store: &Store, id: Ulid) -> Result<&DutySwitch, EngineError> {
    let switch = store.duty_switch(&id).ok_or(EngineError::NotFound(id))?;
    if switch.status != DutySwitchStatus::Pending {
        return Err(EngineError::InvalidTransition("duty switch is no longer pending"));
    }
    Ok(switch)
}

/// The selected assignment must exist, share the schedule and belong to someone else.
fn check_switch_target(store: &Store, source_id: Ulid, selected_id: Ulid) -> Result<(), EngineError> {
    let source = store.assignment(&source_id).ok_or(EngineError::NotFound(source_id))?;
    let selected = store
        .assignment(&selected_id)
        .ok_or(EngineError::NotFound(selected_id))?;
    if selected.schedule_id != source.schedule_id {
        return Err(EngineError::InvalidTransition("assignments belong to different schedules"));
    }
    if selected.cleaner_id == source.cleaner_id {
        return Err(EngineError::InvalidTransition("both assignments belong to the same cleaner"));
    }
    Ok(())
}

impl Engine {
    // ── Schedules & groups ───────────────────────────────────

    /// Persist a new schedule. The slug is always derived from the name.
    pub async fn create_schedule(&self, schedule: Schedule) -> Result<Schedule, EngineError> {
        check_name(&schedule.name)?;
        if schedule.cleaners_per_date > MAX_CLEANERS_PER_DATE {
            return Err(EngineError::LimitExceeded("too many cleaners per date"));
        }
        let mut guard = self.state.write().await;
        check_new_id(&guard, schedule.id)?;

        let event = Event::ScheduleCreated {
            id: schedule.id,
            slug: slugify(&schedule.name),
            name: schedule.name,
            disabled: schedule.disabled,
            cleaners_per_date: schedule.cleaners_per_date,
            frequency: schedule.frequency,
            due_day: schedule.due_day,
        };
        self.persist_and_apply(&mut guard, event).await?;
        info!("created schedule {}", schedule.id);
        guard
            .schedule(&schedule.id)
            .cloned()
            .ok_or(EngineError::NotFound(schedule.id))
    }

    /// Save changes to name, `disabled` and due day. `cleaners_per_date` and
    /// `frequency` are compared against the persisted record and any change
    /// is rejected; the slug keeps its original value.
    pub async fn save_schedule(&self, schedule: Schedule) -> Result<Schedule, EngineError> {
        check_name(&schedule.name)?;
        let mut guard = self.state.write().await;
        let persisted = guard
            .schedule(&schedule.id)
            .ok_or(EngineError::NotFound(schedule.id))?;
        if persisted.cleaners_per_date != schedule.cleaners_per_date {
            return Err(EngineError::ImmutableField("cleaners_per_date"));
        }
        if persisted.frequency != schedule.frequency {
            return Err(EngineError::ImmutableField("frequency"));
        }

        let event = Event::ScheduleUpdated {
            id: schedule.id,
            name: schedule.name,
            disabled: schedule.disabled,
            due_day: schedule.due_day,
        };
        self.persist_and_apply(&mut guard, event).await?;
        guard
            .schedule(&schedule.id)
            .cloned()
            .ok_or(EngineError::NotFound(schedule.id))
    }

    pub async fn create_group(&self, id: Ulid, name: impl Into<String>) -> Result<(), EngineError> {
        let name = name.into();
        check_name(&name)?;
        let mut guard = self.state.write().await;
        check_new_id(&guard, id)?;
        self.persist_and_apply(&mut guard, Event::GroupCreated { id, name }).await
    }

    pub async fn add_schedule_to_group(&self, group_id: Ulid, schedule_id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.state.write().await;
        let group = guard.group(&group_id).ok_or(EngineError::NotFound(group_id))?;
        if guard.schedule(&schedule_id).is_none() {
            return Err(EngineError::NotFound(schedule_id));
        }
        if group.schedules.contains(&schedule_id) {
            return Ok(());
        }
        self.persist_and_apply(&mut guard, Event::ScheduleGrouped { group_id, schedule_id })
            .await
    }

    // ── Cleaners & affiliations ──────────────────────────────

    pub async fn create_cleaner(
        &self,
        id: Ulid,
        name: impl Into<String>,
        preference: Preference,
    ) -> Result<(), EngineError> {
        let name = name.into();
        check_name(&name)?;
        let mut guard = self.state.write().await;
        check_new_id(&guard, id)?;
        self.persist_and_apply(&mut guard, Event::CleanerCreated { id, name, preference })
            .await
    }

    pub async fn create_affiliation(
        &self,
        id: Ulid,
        cleaner_id: Ulid,
        group_id: Ulid,
        beginning: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<(), EngineError> {
        if let Some(end) = end
            && end < beginning {
                return Err(EngineError::InvalidInterval { beginning, end });
            }
        let mut guard = self.state.write().await;
        check_new_id(&guard, id)?;
        if guard.cleaner(&cleaner_id).is_none() {
            return Err(EngineError::NotFound(cleaner_id));
        }
        if guard.group(&group_id).is_none() {
            return Err(EngineError::NotFound(group_id));
        }
        let event = Event::AffiliationCreated { id, cleaner_id, group_id, beginning, end };
        self.persist_and_apply(&mut guard, event).await
    }

    /// Close an affiliation on `end` (inclusive).
    pub async fn end_affiliation(&self, id: Ulid, end: NaiveDate) -> Result<(), EngineError> {
        let mut guard = self.state.write().await;
        let aff = guard.affiliation(&id).ok_or(EngineError::NotFound(id))?;
        if end < aff.beginning {
            return Err(EngineError::InvalidInterval { beginning: aff.beginning, end });
        }
        self.persist_and_apply(&mut guard, Event::AffiliationEnded { id, end }).await
    }

    // ── Cleaning days ────────────────────────────────────────

    /// Create the cleaning day for (`schedule_id`, `date`). Fails with
    /// `AlreadyExists` (carrying the existing day's id) if there is one.
    pub async fn create_cleaning_day(&self, id: Ulid, schedule_id: Ulid, date: NaiveDate) -> Result<(), EngineError> {
        let mut guard = self.state.write().await;
        check_new_id(&guard, id)?;
        if guard.schedule(&schedule_id).is_none() {
            return Err(EngineError::NotFound(schedule_id));
        }
        if let Some(existing) = guard.cleaning_day_on(schedule_id, date) {
            return Err(EngineError::AlreadyExists(existing.id));
        }
        self.persist_and_apply(&mut guard, Event::CleaningDayCreated { id, schedule_id, date })
            .await
    }

    pub async fn exclude_cleaner(&self, cleaning_day_id: Ulid, cleaner_id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.state.write().await;
        let day = guard
            .cleaning_day(&cleaning_day_id)
            .ok_or(EngineError::NotFound(cleaning_day_id))?;
        if guard.cleaner(&cleaner_id).is_none() {
            return Err(EngineError::NotFound(cleaner_id));
        }
        if day.excluded.contains(&cleaner_id) {
            return Ok(());
        }
        if day.excluded.len() >= MAX_EXCLUSIONS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many exclusions on cleaning day"));
        }
        self.persist_and_apply(&mut guard, Event::CleanerExcluded { cleaning_day_id, cleaner_id })
            .await
    }

    pub async fn lift_exclusion(&self, cleaning_day_id: Ulid, cleaner_id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.state.write().await;
        let day = guard
            .cleaning_day(&cleaning_day_id)
            .ok_or(EngineError::NotFound(cleaning_day_id))?;
        if !day.excluded.contains(&cleaner_id) {
            return Ok(());
        }
        self.persist_and_apply(&mut guard, Event::ExclusionLifted { cleaning_day_id, cleaner_id })
            .await
    }

    // ── Assignments ──────────────────────────────────────────

    /// Assign a cleaner by hand. Neither eligibility nor free slots are checked.
    pub async fn create_manual_assignment(
        &self,
        id: Ulid,
        cleaning_day_id: Ulid,
        cleaner_id: Ulid,
    ) -> Result<Assignment, EngineError> {
        let mut guard = self.state.write().await;
        check_new_id(&guard, id)?;
        let schedule_id = guard
            .cleaning_day(&cleaning_day_id)
            .ok_or(EngineError::NotFound(cleaning_day_id))?
            .schedule_id;
        if guard.cleaner(&cleaner_id).is_none() {
            return Err(EngineError::NotFound(cleaner_id));
        }
        let event = Event::AssignmentCreated { id, schedule_id, cleaning_day_id, cleaner_id };
        self.persist_and_apply(&mut guard, event).await?;
        metrics::counter!(observability::ASSIGNMENTS_CREATED_TOTAL).increment(1);
        guard.assignment(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Delete an assignment and every duty switch referring to it.
    pub async fn delete_assignment(&self, id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.state.write().await;
        if guard.assignment(&id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        self.persist_and_apply(&mut guard, Event::AssignmentDeleted { id }).await?;
        metrics::counter!(observability::ASSIGNMENTS_DELETED_TOTAL).increment(1);
        Ok(())
    }

    /// Fill one open slot of `schedule_id` on `date`. `Ok(None)` when there is
    /// nothing to do: not a due date, no open slot or no eligible cleaner.
    pub async fn create_assignment(&self, schedule_id: Ulid, date: NaiveDate) -> Result<Option<Assignment>, EngineError> {
        let mut guard = self.state.write().await;
        if guard.schedule(&schedule_id).is_none() {
            return Err(EngineError::NotFound(schedule_id));
        }
        let mut changes = Changeset::new(&guard);
        let assignment = allocation::create_assignment(&mut changes, schedule_id, date);
        self.commit(&mut guard, changes).await?;
        if assignment.is_some() {
            metrics::counter!(observability::ASSIGNMENTS_CREATED_TOTAL).increment(1);
        }
        Ok(assignment)
    }

    /// Regenerate the duties of a schedule between two dates (either order, inclusive).
    pub async fn new_cleaning_duties(
        &self,
        schedule_id: Ulid,
        date1: NaiveDate,
        date2: NaiveDate,
        mode: RegenerationMode,
    ) -> Result<RegenerationReport, EngineError> {
        let started = std::time::Instant::now();
        let mut guard = self.state.write().await;
        let mut changes = Changeset::new(&guard);
        let report = duties::new_cleaning_duties(
            &mut changes,
            schedule_id,
            date1,
            date2,
            mode,
            allocation::create_assignment,
        )?;
        self.commit(&mut guard, changes).await?;

        metrics::counter!(observability::REGENERATIONS_TOTAL, "mode" => mode.label()).increment(1);
        metrics::counter!(observability::ASSIGNMENTS_CREATED_TOTAL)
            .increment(report.assignments_created as u64);
        metrics::counter!(observability::ASSIGNMENTS_DELETED_TOTAL)
            .increment(report.assignments_deleted as u64);
        metrics::histogram!(observability::REGENERATION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        info!(
            "schedule {schedule_id}: {} dates processed, {} assignments created, {} deleted",
            report.dates_processed, report.assignments_created, report.assignments_deleted
        );
        Ok(report)
    }

    // ── Duty switches ────────────────────────────────────────

    /// Ask to hand `source_assignment_id` to someone else, optionally naming the
    /// assignment to take in return.
    pub async fn request_duty_switch(
        &self,
        id: Ulid,
        source_assignment_id: Ulid,
        selected_assignment_id: Option<Ulid>,
    ) -> Result<(), EngineError> {
        let mut guard = self.state.write().await;
        check_new_id(&guard, id)?;
        if guard.assignment(&source_assignment_id).is_none() {
            return Err(EngineError::NotFound(source_assignment_id));
        }
        if let Some(selected) = selected_assignment_id {
            check_switch_target(&guard, source_assignment_id, selected)?;
        }
        let event = Event::DutySwitchRequested { id, source_assignment_id, selected_assignment_id };
        self.persist_and_apply(&mut guard, event).await
    }

    pub async fn select_duty_switch_target(&self, id: Ulid, selected_assignment_id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.state.write().await;
        let source = pending_switch(&guard, id)?.source_assignment_id;
        check_switch_target(&guard, source, selected_assignment_id)?;
        let event = Event::DutySwitchUpdated {
            id,
            selected_assignment_id: Some(selected_assignment_id),
            status: DutySwitchStatus::Pending,
        };
        self.persist_and_apply(&mut guard, event).await
    }

    /// Swap the cleaners of the two assignments and close the switch.
    pub async fn accept_duty_switch(&self, id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.state.write().await;
        let switch = pending_switch(&guard, id)?.clone();
        let selected_id = switch
            .selected_assignment_id
            .ok_or(EngineError::InvalidTransition("no assignment selected"))?;
        let source = guard
            .assignment(&switch.source_assignment_id)
            .ok_or(EngineError::NotFound(switch.source_assignment_id))?
            .clone();
        let selected = guard
            .assignment(&selected_id)
            .ok_or(EngineError::NotFound(selected_id))?
            .clone();

        let mut changes = Changeset::new(&guard);
        changes.record(Event::AssignmentReassigned { id: source.id, cleaner_id: selected.cleaner_id });
        changes.record(Event::AssignmentReassigned { id: selected.id, cleaner_id: source.cleaner_id });
        changes.record(Event::DutySwitchUpdated {
            id,
            selected_assignment_id: Some(selected_id),
            status: DutySwitchStatus::Accepted,
        });
        self.commit(&mut guard, changes).await?;
        info!("duty switch {id} accepted");
        Ok(())
    }

    pub async fn reject_duty_switch(&self, id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.state.write().await;
        let selected_assignment_id = pending_switch(&guard, id)?.selected_assignment_id;
        let event = Event::DutySwitchUpdated {
            id,
            selected_assignment_id,
            status: DutySwitchStatus::Rejected,
        };
        self.persist_and_apply(&mut guard, event).await
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Held for the whole rewrite so no append lands between snapshot and swap.
        let guard = self.state.write().await;
        let events = guard.snapshot_events();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
