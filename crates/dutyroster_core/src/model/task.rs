//! Recurring task template.
//!
//! # Invariants
//! - `start_time < end_time`.
//! - A task without `recurrence_rule` never produces generated occurrences.
//! - A stored `recurrence_rule` always parses.

use super::{serde_hhmm, validate_time_range, ValidationError};
use crate::schedule::recurrence::RecurrenceRule;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TaskId = Uuid;

/// Template for generated occurrences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringTask {
    pub id: TaskId,
    pub title: String,
    pub category: String,
    #[serde(with = "serde_hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "serde_hhmm")]
    pub end_time: NaiveTime,
    /// iCal RRULE subset, e.g. `FREQ=WEEKLY;BYDAY=MO,WE,FR`.
    pub recurrence_rule: Option<String>,
    /// Last date (inclusive) on which occurrences may be generated.
    pub expires_on: Option<NaiveDate>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

/// The part of a task that determines which occurrences it generates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSchedule {
    pub recurrence_rule: Option<String>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub expires_on: Option<NaiveDate>,
}

impl RecurringTask {
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            category: category.into(),
            start_time,
            end_time,
            recurrence_rule: None,
            expires_on: None,
            location: None,
            notes: None,
        }
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.recurrence_rule = Some(rule.into());
        self
    }

    pub fn with_expiry(mut self, expires_on: NaiveDate) -> Self {
        self.expires_on = Some(expires_on);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyField("title"));
        }
        if self.category.trim().is_empty() {
            return Err(ValidationError::EmptyField("category"));
        }
        validate_time_range(self.start_time, self.end_time)?;
        if let Some(rule) = self.active_rule() {
            RecurrenceRule::parse(rule)?;
        }
        Ok(())
    }

    /// Returns the rule text when one is set and non-blank.
    pub fn active_rule(&self) -> Option<&str> {
        self.recurrence_rule
            .as_deref()
            .map(str::trim)
            .filter(|rule| !rule.is_empty())
    }

    pub fn is_recurring(&self) -> bool {
        self.active_rule().is_some()
    }

    pub fn schedule(&self) -> TaskSchedule {
        TaskSchedule {
            recurrence_rule: self.active_rule().map(str::to_owned),
            start_time: self.start_time,
            end_time: self.end_time,
            expires_on: self.expires_on,
        }
    }
}
