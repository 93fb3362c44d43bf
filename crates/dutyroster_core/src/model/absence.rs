//! Absence range model.
//!
//! # Invariants
//! - `start_date <= end_date`; both ends inclusive.
//! - Absences of one aide never overlap (checked by the absence engine).

use super::aide::AideId;
use super::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AbsenceId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbsenceRange {
    pub id: AbsenceId,
    pub aide_id: AideId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
}

impl AbsenceRange {
    pub fn new(aide_id: AideId, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            aide_id,
            start_date,
            end_date,
            reason: None,
        }
    }

    /// Single-day absence.
    pub fn on(aide_id: AideId, date: NaiveDate) -> Self {
        Self::new(aide_id, date, date)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.start_date > self.end_date {
            return Err(ValidationError::InvalidDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        Ok(())
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}
