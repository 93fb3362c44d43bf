//! Manual occurrence management: one-off creation, assignment, status
//! transitions and the weekly view.
//!
//! # Invariants
//! - Every aide change goes through the conflict check, excluding the
//!   occurrence being changed.
//! - Status changes follow `OccurrenceStatus::can_transition_to`.
//! - A batch never aborts on one bad request.

use super::conflict::{AvailabilityQuery, ConflictResolver};
use super::{run_item, ItemFailure, ServiceError, ServiceResult};
use crate::model::aide::AideId;
use crate::model::occurrence::{Occurrence, OccurrenceId, OccurrenceStatus};
use crate::model::task::TaskId;
use crate::model::{validate_time_range, ValidationError};
use crate::repo::ScheduleStore;
use chrono::{NaiveDate, NaiveTime, Weekday};
use log::{debug, error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static WEEK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-W?(\d{1,2})$").expect("valid week regex"));

/// One `{occurrence_id, aide_id}` pair of a batch assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub occurrence_id: OccurrenceId,
    pub aide_id: AideId,
}

/// Failures are keyed by the request's position in the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub assigned: Vec<Occurrence>,
    pub failures: Vec<ItemFailure<usize>>,
}

/// ISO week `YYYY-WW`, Monday to Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IsoWeek {
    pub year: i32,
    pub week: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl IsoWeek {
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidWeek(value.to_string());
        let captures = WEEK_RE.captures(value.trim()).ok_or_else(invalid)?;
        let year: i32 = captures[1].parse().map_err(|_| invalid())?;
        let week: u32 = captures[2].parse().map_err(|_| invalid())?;
        let start = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(invalid)?;
        let end = NaiveDate::from_isoywd_opt(year, week, Weekday::Sun).ok_or_else(invalid)?;
        Ok(Self {
            year,
            week,
            start,
            end,
        })
    }
}

/// Optional narrowing of the weekly view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleFilter {
    pub aide_id: Option<AideId>,
    pub status: Option<OccurrenceStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekSchedule {
    pub week: IsoWeek,
    pub occurrences: Vec<Occurrence>,
}

pub struct AssignmentService<'s, S> {
    store: &'s S,
}

impl<'s, S> AssignmentService<'s, S>
where
    S: ScheduleStore,
{
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Creates a one-off occurrence, assigned when `aide_id` is given.
    pub fn create_occurrence(
        &self,
        task_id: TaskId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        aide_id: Option<AideId>,
    ) -> ServiceResult<Occurrence> {
        validate_time_range(start_time, end_time)?;
        if self.store.get_task(task_id)?.is_none() {
            return Err(ServiceError::not_found("task", task_id));
        }
        if let Some(existing) = self
            .store
            .find_occurrence(task_id, date, start_time, end_time)?
        {
            return Err(ServiceError::DuplicateOccurrence {
                existing: existing.id,
            });
        }

        let mut occurrence = Occurrence::unassigned(task_id, date, start_time, end_time);
        if let Some(aide_id) = aide_id {
            self.ensure_available(&AvailabilityQuery::for_occurrence(&occurrence, aide_id))?;
            occurrence.assign_to(aide_id);
        }

        self.store.insert_occurrence(&occurrence).map_err(|err| {
            let err = ServiceError::from(err);
            if !err.is_item_scoped() {
                error!(
                    "event=occurrence_create module=assignment status=error task_id={task_id} date={date} error={err}"
                );
            }
            err
        })?;
        info!(
            "event=occurrence_create module=assignment status=ok occurrence_id={} task_id={task_id} date={date}",
            occurrence.id
        );
        Ok(occurrence)
    }

    /// Puts `aide_id` on the occurrence after a conflict check.
    pub fn assign(&self, occurrence_id: OccurrenceId, aide_id: AideId) -> ServiceResult<Occurrence> {
        let mut occurrence = self.load(occurrence_id)?;
        if occurrence.aide_id == Some(aide_id) {
            return Ok(occurrence);
        }
        check_transition(occurrence.status, OccurrenceStatus::Assigned)?;
        self.ensure_available(&AvailabilityQuery::for_occurrence(&occurrence, aide_id))?;

        occurrence.assign_to(aide_id);
        self.store.update_occurrence(&occurrence)?;
        info!(
            "event=occurrence_assign module=assignment status=ok occurrence_id={occurrence_id} aide_id={aide_id} date={}",
            occurrence.date
        );
        Ok(occurrence)
    }

    pub fn unassign(&self, occurrence_id: OccurrenceId) -> ServiceResult<Occurrence> {
        let mut occurrence = self.load(occurrence_id)?;
        check_transition(occurrence.status, OccurrenceStatus::Unassigned)?;
        if !occurrence.is_unassigned() {
            occurrence.release();
            self.store.update_occurrence(&occurrence)?;
            info!(
                "event=occurrence_unassign module=assignment status=ok occurrence_id={occurrence_id}"
            );
        }
        Ok(occurrence)
    }

    /// Moves the occurrence to `next`.
    ///
    /// Leaving UNASSIGNED needs an aide, so that direction goes through
    /// [`assign`](Self::assign) instead.
    pub fn transition_status(
        &self,
        occurrence_id: OccurrenceId,
        next: OccurrenceStatus,
    ) -> ServiceResult<Occurrence> {
        let mut occurrence = self.load(occurrence_id)?;
        check_transition(occurrence.status, next)?;
        if occurrence.status == next {
            return Ok(occurrence);
        }

        if next == OccurrenceStatus::Unassigned {
            occurrence.release();
        } else if occurrence.aide_id.is_none() {
            return Err(ValidationError::StatusAideMismatch {
                status: next,
                has_aide: false,
            }
            .into());
        } else {
            occurrence.status = next;
        }

        self.store.update_occurrence(&occurrence)?;
        info!(
            "event=occurrence_transition module=assignment status=ok occurrence_id={occurrence_id} to={next}"
        );
        Ok(occurrence)
    }

    /// Applies each request in its own unit; bad requests are reported by
    /// index and the rest still go through.
    pub fn assign_batch(&self, requests: &[AssignmentRequest]) -> ServiceResult<BatchReport> {
        let report = self.store.atomically(|| {
            let mut report = BatchReport::default();
            for (index, request) in requests.iter().enumerate() {
                match run_item(self.store, index, || {
                    self.assign(request.occurrence_id, request.aide_id)
                })? {
                    Ok(occurrence) => report.assigned.push(occurrence),
                    Err(failure) => report.failures.push(failure),
                }
            }
            Ok::<_, ServiceError>(report)
        });

        let report = report.map_err(|err| {
            error!(
                "event=assignment_batch module=assignment status=error requests={} error={err}",
                requests.len()
            );
            err
        })?;
        info!(
            "event=assignment_batch module=assignment status=ok requests={} assigned={} failed={}",
            requests.len(),
            report.assigned.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Occurrences in the ISO week `week` (`YYYY-WW`), in date and time order.
    pub fn week_schedule(&self, week: &str, filter: ScheduleFilter) -> ServiceResult<WeekSchedule> {
        let week = IsoWeek::parse(week)?;
        let occurrences = match filter.aide_id {
            Some(aide_id) => self
                .store
                .list_aide_occurrences_between(aide_id, week.start, week.end)?,
            None => self.store.list_occurrences_between(week.start, week.end)?,
        };
        let occurrences = occurrences
            .into_iter()
            .filter(|occ| filter.status.map_or(true, |status| occ.status == status))
            .collect();
        Ok(WeekSchedule { week, occurrences })
    }

    pub fn delete_occurrence(&self, occurrence_id: OccurrenceId) -> ServiceResult<()> {
        self.store.delete_occurrence(occurrence_id)?;
        info!(
            "event=occurrence_delete module=assignment status=ok occurrence_id={occurrence_id}"
        );
        Ok(())
    }

    fn load(&self, occurrence_id: OccurrenceId) -> ServiceResult<Occurrence> {
        self.store
            .get_occurrence(occurrence_id)?
            .ok_or_else(|| ServiceError::not_found("occurrence", occurrence_id))
    }

    fn ensure_available(&self, query: &AvailabilityQuery) -> ServiceResult<()> {
        ConflictResolver::new(self.store)
            .check_availability(query)?
            .into_result()
    }
}

fn check_transition(from: OccurrenceStatus, to: OccurrenceStatus) -> ServiceResult<()> {
    if from.can_transition_to(to) {
        return Ok(());
    }
    debug!("event=status_transition module=assignment status=skip from={from} to={to}");
    Err(ValidationError::IllegalTransition { from, to }.into())
}
