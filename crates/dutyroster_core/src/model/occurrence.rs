//! Occurrence domain model.
//!
//! An occurrence is one dated, time-bounded instance of a recurring or
//! one-off task.
//!
//! # Invariants
//! - `start_time < end_time`.
//! - `status == Unassigned` exactly when `aide_id` is `None`.
//! - At most one occurrence exists per `(task_id, date, start_time, end_time)`;
//!   enforced by the store.

use super::aide::AideId;
use super::task::TaskId;
use super::{serde_hhmm, validate_time_range, ValidationError};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type OccurrenceId = Uuid;

/// Lifecycle status of an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccurrenceStatus {
    Unassigned,
    Assigned,
    InProgress,
    Complete,
}

impl OccurrenceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unassigned => "UNASSIGNED",
            Self::Assigned => "ASSIGNED",
            Self::InProgress => "IN_PROGRESS",
            Self::Complete => "COMPLETE",
        }
    }

    /// Parses the canonical upper-case form. Other casings are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "UNASSIGNED" => Some(Self::Unassigned),
            "ASSIGNED" => Some(Self::Assigned),
            "IN_PROGRESS" => Some(Self::InProgress),
            "COMPLETE" => Some(Self::Complete),
            _ => None,
        }
    }

    /// Whether this status requires an aide to be set.
    pub fn requires_aide(self) -> bool {
        match self {
            Self::Unassigned => false,
            Self::Assigned | Self::InProgress | Self::Complete => true,
        }
    }

    /// Whether a manual transition from `self` to `next` is allowed.
    ///
    /// Same-state transitions are accepted as no-ops.
    pub fn can_transition_to(self, next: Self) -> bool {
        use OccurrenceStatus::*;
        match (self, next) {
            (Unassigned, Unassigned)
            | (Assigned, Assigned)
            | (InProgress, InProgress)
            | (Complete, Complete) => true,
            (Unassigned, Assigned) => true,
            (Unassigned, InProgress | Complete) => false,
            (Assigned, Unassigned | InProgress) => true,
            (Assigned, Complete) => false,
            (InProgress, Assigned | Complete) => true,
            (InProgress, Unassigned) => false,
            (Complete, _) => false,
        }
    }
}

impl Display for OccurrenceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One concrete instance of a task on a calendar date.
///
/// Serialized shape: `{id, task_id, aide_id, date, start_time, end_time, status}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: OccurrenceId,
    pub task_id: TaskId,
    pub aide_id: Option<AideId>,
    pub date: NaiveDate,
    #[serde(with = "serde_hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "serde_hhmm")]
    pub end_time: NaiveTime,
    pub status: OccurrenceStatus,
}

impl Occurrence {
    /// Creates an unassigned occurrence with a fresh id.
    pub fn unassigned(
        task_id: TaskId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            aide_id: None,
            date,
            start_time,
            end_time,
            status: OccurrenceStatus::Unassigned,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_time_range(self.start_time, self.end_time)?;
        if self.status.requires_aide() != self.aide_id.is_some() {
            return Err(ValidationError::StatusAideMismatch {
                status: self.status,
                has_aide: self.aide_id.is_some(),
            });
        }
        Ok(())
    }

    /// Sets the aide and marks the occurrence assigned.
    pub fn assign_to(&mut self, aide_id: AideId) {
        self.aide_id = Some(aide_id);
        self.status = OccurrenceStatus::Assigned;
    }

    /// Clears the aide and marks the occurrence unassigned.
    pub fn release(&mut self) {
        self.aide_id = None;
        self.status = OccurrenceStatus::Unassigned;
    }

    pub fn is_unassigned(&self) -> bool {
        self.status == OccurrenceStatus::Unassigned
    }
}

#[cfg(test)]
mod tests {
    use super::{Occurrence, OccurrenceStatus};
    use crate::model::ValidationError;
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn sample() -> Occurrence {
        Occurrence::unassigned(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn status_parse_is_case_sensitive() {
        assert_eq!(
            OccurrenceStatus::parse("IN_PROGRESS"),
            Some(OccurrenceStatus::InProgress)
        );
        assert_eq!(OccurrenceStatus::parse("in_progress"), None);
        assert_eq!(OccurrenceStatus::parse("Assigned"), None);
    }

    #[test]
    fn complete_is_terminal() {
        for next in [
            OccurrenceStatus::Unassigned,
            OccurrenceStatus::Assigned,
            OccurrenceStatus::InProgress,
        ] {
            assert!(!OccurrenceStatus::Complete.can_transition_to(next));
        }
        assert!(OccurrenceStatus::Complete.can_transition_to(OccurrenceStatus::Complete));
    }

    #[test]
    fn work_must_start_before_it_completes() {
        assert!(!OccurrenceStatus::Assigned.can_transition_to(OccurrenceStatus::Complete));
        assert!(OccurrenceStatus::Assigned.can_transition_to(OccurrenceStatus::InProgress));
        assert!(OccurrenceStatus::InProgress.can_transition_to(OccurrenceStatus::Complete));
    }

    #[test]
    fn assigned_status_requires_aide() {
        let mut occurrence = sample();
        occurrence.status = OccurrenceStatus::Assigned;
        assert_eq!(
            occurrence.validate(),
            Err(ValidationError::StatusAideMismatch {
                status: OccurrenceStatus::Assigned,
                has_aide: false
            })
        );

        occurrence.assign_to(Uuid::new_v4());
        assert!(occurrence.validate().is_ok());

        occurrence.release();
        assert!(occurrence.aide_id.is_none());
        assert!(occurrence.validate().is_ok());
    }

    #[test]
    fn serializes_with_short_times_and_upper_case_status() {
        let occurrence = sample();
        let json = serde_json::to_value(&occurrence).unwrap();
        assert_eq!(json["date"], "2024-03-04");
        assert_eq!(json["start_time"], "09:00");
        assert_eq!(json["end_time"], "10:00");
        assert_eq!(json["status"], "UNASSIGNED");
        assert!(json["aide_id"].is_null());
    }
}
