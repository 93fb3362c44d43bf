//! Scheduler settings.
//!
//! # Responsibility
//! - Hold tunables shared by the engine: default horizon and business hours.
//! - Load them from a JSON file, falling back to defaults per field.
//!
//! # Invariants
//! - Horizon lengths are always within `[MIN_HORIZON_WEEKS, MAX_HORIZON_WEEKS]`.
//! - `business_hours.opens < business_hours.closes`.

use crate::model::serde_hhmm;
use chrono::{Days, NaiveDate, NaiveTime};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub const MIN_HORIZON_WEEKS: u32 = 1;
pub const MAX_HORIZON_WEEKS: u32 = 10;
pub const DEFAULT_HORIZON_WEEKS: u32 = 4;

/// Horizon length in weeks, validated to `[1, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HorizonWeeks(u32);

/// Rejected horizon length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidHorizon {
    pub weeks: u32,
}

impl Display for InvalidHorizon {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "horizon must be between {MIN_HORIZON_WEEKS} and {MAX_HORIZON_WEEKS} weeks, got {}",
            self.weeks
        )
    }
}

impl Error for InvalidHorizon {}

impl HorizonWeeks {
    pub fn new(weeks: u32) -> Result<Self, InvalidHorizon> {
        if (MIN_HORIZON_WEEKS..=MAX_HORIZON_WEEKS).contains(&weeks) {
            Ok(Self(weeks))
        } else {
            Err(InvalidHorizon { weeks })
        }
    }

    pub fn weeks(self) -> u32 {
        self.0
    }

    pub fn days(self) -> u64 {
        u64::from(self.0) * 7
    }

    /// Last day of a horizon starting on `from`.
    pub fn window_end(self, from: NaiveDate) -> NaiveDate {
        from.checked_add_days(Days::new(self.days()))
            .unwrap_or(NaiveDate::MAX)
    }
}

impl Default for HorizonWeeks {
    fn default() -> Self {
        Self(DEFAULT_HORIZON_WEEKS)
    }
}

/// Envelope every availability window must fit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BusinessHours {
    #[serde(with = "serde_hhmm")]
    pub opens: NaiveTime,
    #[serde(with = "serde_hhmm")]
    pub closes: NaiveTime,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            opens: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            closes: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub default_horizon_weeks: u32,
    pub business_hours: BusinessHours,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            default_horizon_weeks: DEFAULT_HORIZON_WEEKS,
            business_hours: BusinessHours::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Horizon(InvalidHorizon),
    BusinessHours { opens: NaiveTime, closes: NaiveTime },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read settings: {err}"),
            Self::Parse(err) => write!(f, "invalid settings: {err}"),
            Self::Horizon(err) => write!(f, "{err}"),
            Self::BusinessHours { opens, closes } => {
                write!(f, "business hours open at {opens} but close at {closes}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Horizon(err) => Some(err),
            Self::BusinessHours { .. } => None,
        }
    }
}

impl SchedulerSettings {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        HorizonWeeks::new(self.default_horizon_weeks).map_err(ConfigError::Horizon)?;
        if self.business_hours.opens >= self.business_hours.closes {
            return Err(ConfigError::BusinessHours {
                opens: self.business_hours.opens,
                closes: self.business_hours.closes,
            });
        }
        Ok(())
    }

    pub fn default_horizon(&self) -> HorizonWeeks {
        HorizonWeeks::new(self.default_horizon_weeks).unwrap_or_default()
    }
}
