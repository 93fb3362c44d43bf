//! Aide and weekly availability model.
//!
//! # Invariants
//! - `colour_hex` is `#RRGGBB`.
//! - At most one availability window per aide and weekday (store-enforced).
//! - Windows fall on Monday-Friday inside the business-hours envelope.

use super::{serde_hhmm, validate_time_range, ValidationError};
use crate::config::BusinessHours;
use chrono::{NaiveTime, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AideId = Uuid;
pub type AvailabilityId = Uuid;

static COLOUR_HEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid colour regex"));

/// A schedulable staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aide {
    pub id: AideId,
    pub name: String,
    pub colour_hex: String,
    pub qualifications: Option<String>,
}

impl Aide {
    pub fn new(name: impl Into<String>, colour_hex: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            colour_hex: colour_hex.into(),
            qualifications: None,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField("name"));
        }
        if !COLOUR_HEX_RE.is_match(&self.colour_hex) {
            return Err(ValidationError::InvalidColour(self.colour_hex.clone()));
        }
        Ok(())
    }
}

/// Weekly time band during which an aide can be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: AvailabilityId,
    pub aide_id: AideId,
    #[serde(with = "serde_weekday")]
    pub weekday: Weekday,
    #[serde(with = "serde_hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "serde_hhmm")]
    pub end_time: NaiveTime,
}

impl AvailabilityWindow {
    pub fn new(aide_id: AideId, weekday: Weekday, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            aide_id,
            weekday,
            start_time,
            end_time,
        }
    }

    pub fn validate(&self, hours: &BusinessHours) -> Result<(), ValidationError> {
        if weekday_code(self.weekday).is_none() {
            return Err(ValidationError::NonSchoolDay(self.weekday));
        }
        validate_time_range(self.start_time, self.end_time)?;
        if self.start_time < hours.opens || self.end_time > hours.closes {
            return Err(ValidationError::OutsideBusinessHours {
                start: self.start_time,
                end: self.end_time,
                opens: hours.opens,
                closes: hours.closes,
            });
        }
        Ok(())
    }
}

/// Two-letter iCal code for a school day; `None` on weekends.
pub fn weekday_code(day: Weekday) -> Option<&'static str> {
    match day {
        Weekday::Mon => Some("MO"),
        Weekday::Tue => Some("TU"),
        Weekday::Wed => Some("WE"),
        Weekday::Thu => Some("TH"),
        Weekday::Fri => Some("FR"),
        Weekday::Sat | Weekday::Sun => None,
    }
}

pub fn parse_weekday_code(value: &str) -> Option<Weekday> {
    match value.trim().to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        _ => None,
    }
}

mod serde_weekday {
    use super::{parse_weekday_code, weekday_code};
    use chrono::Weekday;
    use serde::{de, ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(day: &Weekday, serializer: S) -> Result<S::Ok, S::Error> {
        let code = weekday_code(*day)
            .ok_or_else(|| ser::Error::custom(format!("{day} is not a school day")))?;
        serializer.serialize_str(code)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Weekday, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_weekday_code(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid weekday `{text}`; expected MO..FR")))
    }
}
