//! Roster domain model.
//!
//! # Responsibility
//! - Define the entities the scheduling engine reasons about.
//! - Own entity-level validation (`validate()`), shared by every write path.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID.
//! - Times of day have minute precision; dates are naive local dates.

use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod absence;
pub mod aide;
pub mod occurrence;
pub mod task;

use crate::schedule::recurrence::RecurrenceError;
use occurrence::OccurrenceStatus;

const HHMM_FORMAT: &str = "%H:%M";

/// Model invariant violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    InvalidTimeRange {
        start: NaiveTime,
        end: NaiveTime,
    },
    TimeNotMinuteAligned(NaiveTime),
    InvalidDateRange {
        start: NaiveDate,
        end: NaiveDate,
    },
    InvalidColour(String),
    NonSchoolDay(Weekday),
    OutsideBusinessHours {
        start: NaiveTime,
        end: NaiveTime,
        opens: NaiveTime,
        closes: NaiveTime,
    },
    StatusAideMismatch {
        status: OccurrenceStatus,
        has_aide: bool,
    },
    IllegalTransition {
        from: OccurrenceStatus,
        to: OccurrenceStatus,
    },
    InvalidWeek(String),
    Recurrence(RecurrenceError),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "{field} must not be empty"),
            Self::InvalidTimeRange { start, end } => write!(
                f,
                "start time {} must be before end time {}",
                format_hhmm(*start),
                format_hhmm(*end)
            ),
            Self::TimeNotMinuteAligned(time) => {
                write!(f, "time {time} must not carry seconds")
            }
            Self::InvalidDateRange { start, end } => {
                write!(f, "start date {start} must not be after end date {end}")
            }
            Self::InvalidColour(value) => {
                write!(f, "colour `{value}` must be formatted as #RRGGBB")
            }
            Self::NonSchoolDay(day) => write!(f, "{day} is not a school day"),
            Self::OutsideBusinessHours {
                start,
                end,
                opens,
                closes,
            } => write!(
                f,
                "window {}-{} lies outside business hours {}-{}",
                format_hhmm(*start),
                format_hhmm(*end),
                format_hhmm(*opens),
                format_hhmm(*closes)
            ),
            Self::StatusAideMismatch { status, has_aide } => {
                if *has_aide {
                    write!(f, "an occurrence with status {status} cannot have an aide")
                } else {
                    write!(f, "an occurrence with status {status} requires an aide")
                }
            }
            Self::IllegalTransition { from, to } => {
                write!(f, "status cannot change from {from} to {to}")
            }
            Self::InvalidWeek(value) => {
                write!(f, "invalid week `{value}`; expected YYYY-WW")
            }
            Self::Recurrence(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Recurrence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RecurrenceError> for ValidationError {
    fn from(value: RecurrenceError) -> Self {
        Self::Recurrence(value)
    }
}

/// Checks `start < end` with minute-aligned endpoints.
pub fn validate_time_range(start: NaiveTime, end: NaiveTime) -> Result<(), ValidationError> {
    for time in [start, end] {
        if time.second() != 0 || time.nanosecond() != 0 {
            return Err(ValidationError::TimeNotMinuteAligned(time));
        }
    }
    if start >= end {
        return Err(ValidationError::InvalidTimeRange { start, end });
    }
    Ok(())
}

/// Formats a time of day as `HH:MM`.
pub fn format_hhmm(time: NaiveTime) -> String {
    time.format(HHMM_FORMAT).to_string()
}

/// Parses `HH:MM` (and tolerates `HH:MM:SS` with zero seconds).
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, HHMM_FORMAT)
        .ok()
        .or_else(|| {
            NaiveTime::parse_from_str(value, "%H:%M:%S")
                .ok()
                .filter(|time| time.second() == 0)
        })
}

/// Serde adapter for `HH:MM` time fields.
pub(crate) mod serde_hhmm {
    use super::{format_hhmm, parse_hhmm};
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_hhmm(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_hhmm(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid time `{text}`; expected HH:MM")))
    }
}

#[cfg(test)]
mod tests {
    use super::{format_hhmm, parse_hhmm, validate_time_range, ValidationError};
    use chrono::NaiveTime;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn hhmm_parses_both_short_and_zero_second_forms() {
        assert_eq!(parse_hhmm("09:30"), Some(hm(9, 30)));
        assert_eq!(parse_hhmm("09:30:00"), Some(hm(9, 30)));
        assert_eq!(parse_hhmm("09:30:15"), None);
        assert_eq!(parse_hhmm("9.30"), None);
        assert_eq!(format_hhmm(hm(8, 5)), "08:05");
    }

    #[test]
    fn time_range_requires_strict_order() {
        assert!(validate_time_range(hm(9, 0), hm(9, 30)).is_ok());
        assert_eq!(
            validate_time_range(hm(9, 0), hm(9, 0)),
            Err(ValidationError::InvalidTimeRange {
                start: hm(9, 0),
                end: hm(9, 0)
            })
        );
    }

    #[test]
    fn time_range_rejects_seconds() {
        let odd = NaiveTime::from_hms_opt(9, 0, 30).unwrap();
        assert_eq!(
            validate_time_range(odd, hm(10, 0)),
            Err(ValidationError::TimeNotMinuteAligned(odd))
        );
    }
}
