//! Availability checks for a candidate (aide, date, start, end).
//!
//! # Responsibility
//! - Decide whether an aide can take on a time slot, and why not.
//!
//! # Invariants
//! - Checks run in a fixed order and stop at the first failure:
//!   occurrence overlap, absence, weekly availability window.
//! - Occurrences that merely touch the candidate are not conflicts.
//! - An aide with no window on the candidate's weekday is not restricted.

use super::{ServiceError, ServiceResult};
use crate::model::absence::AbsenceRange;
use crate::model::aide::{AideId, AvailabilityWindow};
use crate::model::occurrence::{Occurrence, OccurrenceId};
use crate::model::{format_hhmm, validate_time_range};
use crate::repo::{AbsenceRepository, AideRepository, OccurrenceRepository};
use crate::schedule::interval::{contains, overlaps};
use chrono::{Datelike, NaiveDate, NaiveTime};
use log::debug;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Candidate slot to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityQuery {
    pub aide_id: AideId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Occurrence being re-evaluated in place; it never conflicts with itself.
    pub exclude: Option<OccurrenceId>,
}

impl AvailabilityQuery {
    pub fn new(aide_id: AideId, date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            aide_id,
            date,
            start_time,
            end_time,
            exclude: None,
        }
    }

    /// Query for moving `occurrence` onto `aide_id` as it stands.
    pub fn for_occurrence(occurrence: &Occurrence, aide_id: AideId) -> Self {
        Self {
            aide_id,
            date: occurrence.date,
            start_time: occurrence.start_time,
            end_time: occurrence.end_time,
            exclude: Some(occurrence.id),
        }
    }
}

/// Reason an aide cannot take a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Conflict {
    Overlap { occurrence: Occurrence },
    Absent { absence: AbsenceRange },
    OutsideAvailability { windows: Vec<AvailabilityWindow> },
}

impl Conflict {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Overlap { .. } => "overlap",
            Self::Absent { .. } => "absent",
            Self::OutsideAvailability { .. } => "outside availability",
        }
    }

    pub fn conflicting_occurrence(&self) -> Option<&Occurrence> {
        match self {
            Self::Overlap { occurrence } => Some(occurrence),
            Self::Absent { .. } | Self::OutsideAvailability { .. } => None,
        }
    }
}

impl Display for Conflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overlap { occurrence } => write!(
                f,
                "overlaps occurrence {} on {} {}-{}",
                occurrence.id,
                occurrence.date,
                format_hhmm(occurrence.start_time),
                format_hhmm(occurrence.end_time)
            ),
            Self::Absent { absence } => write!(
                f,
                "aide is absent from {} to {}",
                absence.start_date, absence.end_date
            ),
            Self::OutsideAvailability { .. } => f.write_str("outside availability"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailabilityVerdict {
    Available,
    Unavailable(Conflict),
}

impl AvailabilityVerdict {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Self::Available => None,
            Self::Unavailable(conflict) => Some(conflict),
        }
    }

    /// Flat `{available, conflicting_occurrence, reason}` view for callers.
    pub fn to_report(&self) -> AvailabilityReport {
        AvailabilityReport {
            available: self.is_available(),
            conflicting_occurrence: self
                .conflict()
                .and_then(Conflict::conflicting_occurrence)
                .cloned(),
            reason: self.conflict().map(Conflict::reason),
        }
    }

    /// Converts a negative verdict into `ServiceError::Conflict`.
    pub fn into_result(self) -> ServiceResult<()> {
        match self {
            Self::Available => Ok(()),
            Self::Unavailable(conflict) => Err(ServiceError::Conflict(conflict)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    pub available: bool,
    pub conflicting_occurrence: Option<Occurrence>,
    pub reason: Option<&'static str>,
}

pub struct ConflictResolver<'s, S> {
    store: &'s S,
}

impl<'s, S> ConflictResolver<'s, S>
where
    S: OccurrenceRepository + AideRepository + AbsenceRepository,
{
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub fn check_availability(&self, query: &AvailabilityQuery) -> ServiceResult<AvailabilityVerdict> {
        validate_time_range(query.start_time, query.end_time)?;
        if self.store.get_aide(query.aide_id)?.is_none() {
            return Err(ServiceError::not_found("aide", query.aide_id));
        }

        let verdict = self.evaluate(query)?;
        match &verdict {
            AvailabilityVerdict::Available => debug!(
                "event=availability_check module=conflict status=ok aide_id={} date={}",
                query.aide_id, query.date
            ),
            AvailabilityVerdict::Unavailable(conflict) => debug!(
                "event=availability_check module=conflict status=conflict aide_id={} date={} start={} end={} reason={}",
                query.aide_id,
                query.date,
                format_hhmm(query.start_time),
                format_hhmm(query.end_time),
                conflict.reason()
            ),
        }
        Ok(verdict)
    }

    fn evaluate(&self, query: &AvailabilityQuery) -> ServiceResult<AvailabilityVerdict> {
        let clash = self
            .store
            .list_aide_occurrences_on(query.aide_id, query.date)?
            .into_iter()
            .filter(|existing| Some(existing.id) != query.exclude)
            .find(|existing| {
                overlaps(
                    existing.start_time,
                    existing.end_time,
                    query.start_time,
                    query.end_time,
                )
            });
        if let Some(occurrence) = clash {
            return Ok(AvailabilityVerdict::Unavailable(Conflict::Overlap { occurrence }));
        }

        if let Some(absence) = self
            .store
            .list_absences_covering(query.aide_id, query.date)?
            .into_iter()
            .next()
        {
            return Ok(AvailabilityVerdict::Unavailable(Conflict::Absent { absence }));
        }

        let windows = self
            .store
            .list_availability_on(query.aide_id, query.date.weekday())?;
        let fits = windows.is_empty()
            || windows.iter().any(|window| {
                contains(
                    window.start_time,
                    window.end_time,
                    query.start_time,
                    query.end_time,
                )
            });
        if !fits {
            return Ok(AvailabilityVerdict::Unavailable(
                Conflict::OutsideAvailability { windows },
            ));
        }

        Ok(AvailabilityVerdict::Available)
    }
}
