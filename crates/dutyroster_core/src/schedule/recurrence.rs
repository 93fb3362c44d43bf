//! Recurrence rule parsing and date expansion.
//!
//! # Responsibility
//! - Accept the supported iCal RRULE subset (`FREQ`, `BYDAY`, `COUNT`,
//!   `UNTIL`, plus `INTERVAL`/`WKST`) and reject everything else up front.
//! - Expand a rule into the calendar dates it produces inside a closed window.
//!
//! # Invariants
//! - Expansion is anchored at `from` combined with the template start time.
//! - Results are sorted, de-duplicated, and never fall outside `[from, to]`.
//! - All date-times are naive; they are handed to the rrule engine as UTC so
//!   no DST shift can move an occurrence to another day.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rrule::{RRuleSet, Tz};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const SUPPORTED_FREQUENCIES: &[&str] = &["DAILY", "WEEKLY", "MONTHLY", "YEARLY"];
const RRULE_DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";
const EXPANSION_LIMIT: u16 = u16::MAX;

static UNTIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{8})(?:T(\d{6})(Z)?)?$").expect("valid until regex"));
static BYDAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[+-]?[1-5])?(?:MO|TU|WE|TH|FR|SA|SU)$").expect("valid byday regex")
});

/// A rule string that could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceError {
    InvalidRule { rule: String, reason: String },
}

impl RecurrenceError {
    fn invalid(rule: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }
}

impl Display for RecurrenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRule { rule, reason } => {
                write!(f, "invalid recurrence rule `{rule}`: {reason}")
            }
        }
    }
}

impl Error for RecurrenceError {}

/// A validated, normalized RRULE body (no `RRULE:` prefix, upper-case).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    body: String,
    until: Option<NaiveDateTime>,
}

impl RecurrenceRule {
    pub fn parse(text: &str) -> Result<Self, RecurrenceError> {
        let trimmed = text.trim();
        let upper = trimmed.to_ascii_uppercase();
        let unprefixed = upper.strip_prefix("RRULE:").unwrap_or(&upper);
        if unprefixed.is_empty() {
            return Err(RecurrenceError::invalid(trimmed, "rule is empty"));
        }
        if unprefixed.contains(':') || unprefixed.contains('\n') {
            return Err(RecurrenceError::invalid(
                trimmed,
                "only a single RRULE line without DTSTART is accepted",
            ));
        }

        let mut parts: Vec<String> = Vec::new();
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut has_freq = false;
        let mut until = None;
        for part in unprefixed.split(';').filter(|part| !part.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| RecurrenceError::invalid(trimmed, format!("malformed part `{part}`")))?;
            if !seen.insert(key) {
                return Err(RecurrenceError::invalid(trimmed, format!("duplicate {key}")));
            }
            let value = match key {
                "FREQ" => {
                    if !SUPPORTED_FREQUENCIES.contains(&value) {
                        return Err(RecurrenceError::invalid(
                            trimmed,
                            format!("unsupported frequency `{value}`"),
                        ));
                    }
                    has_freq = true;
                    value.to_string()
                }
                "COUNT" | "INTERVAL" => {
                    match value.parse::<u32>() {
                        Ok(n) if n > 0 => {}
                        _ => {
                            return Err(RecurrenceError::invalid(
                                trimmed,
                                format!("{key} must be a positive integer"),
                            ))
                        }
                    }
                    value.to_string()
                }
                "BYDAY" => {
                    if let Some(bad) = value.split(',').find(|day| !BYDAY_RE.is_match(day)) {
                        return Err(RecurrenceError::invalid(
                            trimmed,
                            format!("invalid weekday `{bad}`"),
                        ));
                    }
                    value.to_string()
                }
                "WKST" => {
                    if !BYDAY_RE.is_match(value) || value.len() != 2 {
                        return Err(RecurrenceError::invalid(
                            trimmed,
                            format!("invalid week start `{value}`"),
                        ));
                    }
                    value.to_string()
                }
                "UNTIL" => {
                    let (text, instant) = normalize_until(value).ok_or_else(|| {
                        RecurrenceError::invalid(trimmed, format!("invalid UNTIL `{value}`"))
                    })?;
                    until = Some(instant);
                    text
                }
                other => {
                    return Err(RecurrenceError::invalid(
                        trimmed,
                        format!("unsupported part `{other}`"),
                    ))
                }
            };
            parts.push(format!("{key}={value}"));
        }

        if !has_freq {
            return Err(RecurrenceError::invalid(trimmed, "FREQ is required"));
        }
        if seen.contains("COUNT") && seen.contains("UNTIL") {
            return Err(RecurrenceError::invalid(
                trimmed,
                "COUNT and UNTIL cannot be combined",
            ));
        }

        let rule = Self {
            body: parts.join(";"),
            until,
        };
        // Surface engine-level rejections at parse time, not on first expansion.
        let probe_anchor = match until {
            Some(instant) => instant.date().and_time(NaiveTime::MIN),
            None => NaiveDate::from_ymd_opt(2000, 1, 3)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .ok_or_else(|| RecurrenceError::invalid(trimmed, "probe anchor out of range"))?,
        };
        rule.rule_set(probe_anchor)
            .map_err(|err| RecurrenceError::invalid(trimmed, err))?;
        Ok(rule)
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }

    /// Expands the rule into dates within `[from, to]`.
    ///
    /// The rule is anchored at `from` + `start_time`, so `COUNT` counts from
    /// the window start.
    pub fn expand(
        &self,
        start_time: NaiveTime,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NaiveDate>, RecurrenceError> {
        if from > to {
            return Ok(Vec::new());
        }

        let anchor = from.and_time(start_time);
        if self.until.is_some_and(|until| until < anchor) {
            return Ok(Vec::new());
        }
        let set = self
            .rule_set(anchor)
            .map_err(|err| RecurrenceError::invalid(&self.body, err))?;
        let upper = to
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| RecurrenceError::invalid(&self.body, "window end out of range"))?
            .and_utc()
            .with_timezone(&Tz::UTC);

        let dates: BTreeSet<NaiveDate> = set
            .before(upper)
            .all(EXPANSION_LIMIT)
            .dates
            .into_iter()
            .map(|instant| instant.date_naive())
            .filter(|date| *date >= from && *date <= to)
            .collect();
        Ok(dates.into_iter().collect())
    }

    fn rule_set(&self, anchor: NaiveDateTime) -> Result<RRuleSet, String> {
        format!(
            "DTSTART:{}Z\nRRULE:{}",
            anchor.format(RRULE_DATETIME_FORMAT),
            self.body
        )
        .parse::<RRuleSet>()
        .map_err(|err| err.to_string())
    }
}

/// Expands an optional task rule within `[from, to]`, clipped at `expires_on`.
///
/// A missing or blank rule yields no dates.
pub fn expand_dates(
    rule: Option<&str>,
    start_time: NaiveTime,
    from: NaiveDate,
    to: NaiveDate,
    expires_on: Option<NaiveDate>,
) -> Result<Vec<NaiveDate>, RecurrenceError> {
    let Some(text) = rule.map(str::trim).filter(|text| !text.is_empty()) else {
        return Ok(Vec::new());
    };
    let rule = RecurrenceRule::parse(text)?;
    let to = match expires_on {
        Some(expiry) if expiry < to => expiry,
        _ => to,
    };
    rule.expand(start_time, from, to)
}

/// Rewrites `UNTIL` as a UTC date-time; a bare date means end of that day.
fn normalize_until(value: &str) -> Option<(String, NaiveDateTime)> {
    let captures = UNTIL_RE.captures(value)?;
    let date = captures.get(1)?.as_str();
    let time = captures.get(2).map_or("235959", |time| time.as_str());
    let text = format!("{date}T{time}");
    let instant = NaiveDateTime::parse_from_str(&text, RRULE_DATETIME_FORMAT).ok()?;
    Some((format!("{text}Z"), instant))
}

#[cfg(test)]
mod tests {
    use super::{expand_dates, normalize_until, RecurrenceError, RecurrenceRule};
    use chrono::{NaiveDate, NaiveTime};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn weekly_byday_expands_inside_window() {
        let rule = RecurrenceRule::parse("FREQ=WEEKLY;BYDAY=MO,WE,FR").unwrap();
        let dates = rule.expand(nine(), d(2024, 1, 1), d(2024, 1, 8)).unwrap();
        assert_eq!(
            dates,
            vec![d(2024, 1, 1), d(2024, 1, 3), d(2024, 1, 5), d(2024, 1, 8)]
        );
    }

    #[test]
    fn prefix_and_case_are_normalized() {
        let rule = RecurrenceRule::parse("rrule:freq=daily;count=3").unwrap();
        assert_eq!(rule.as_str(), "FREQ=DAILY;COUNT=3");
        let dates = rule.expand(nine(), d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);
    }

    #[test]
    fn date_only_until_is_inclusive() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;UNTIL=20240103").unwrap();
        let dates = rule.expand(nine(), d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);
        assert_eq!(
            normalize_until("20240103").map(|(text, _)| text).as_deref(),
            Some("20240103T235959Z")
        );
        assert_eq!(
            normalize_until("20240103T120000").map(|(text, _)| text).as_deref(),
            Some("20240103T120000Z")
        );
        assert!(normalize_until("20241301").is_none());
    }

    #[test]
    fn window_after_until_is_empty() {
        let rule = RecurrenceRule::parse("FREQ=DAILY;UNTIL=20240103").unwrap();
        assert!(rule.expand(nine(), d(2024, 2, 1), d(2024, 2, 29)).unwrap().is_empty());
    }

    #[test]
    fn rejects_garbage_and_unsupported_parts() {
        for text in [
            "not a rule",
            "FREQ=HOURLY",
            "BYDAY=MO",
            "FREQ=WEEKLY;BYDAY=XX",
            "FREQ=WEEKLY;BYMONTHDAY=3",
            "FREQ=DAILY;COUNT=0",
            "FREQ=DAILY;COUNT=2;UNTIL=20240101",
            "FREQ=DAILY;FREQ=WEEKLY",
            "DTSTART:20240101T000000Z\nRRULE:FREQ=DAILY",
        ] {
            assert!(
                matches!(
                    RecurrenceRule::parse(text),
                    Err(RecurrenceError::InvalidRule { .. })
                ),
                "`{text}` should be rejected"
            );
        }
    }

    #[test]
    fn missing_rule_expands_to_nothing() {
        assert!(expand_dates(None, nine(), d(2024, 1, 1), d(2024, 2, 1), None)
            .unwrap()
            .is_empty());
        assert!(expand_dates(Some("  "), nine(), d(2024, 1, 1), d(2024, 2, 1), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn expiry_clips_window_end() {
        let dates = expand_dates(
            Some("FREQ=DAILY"),
            nine(),
            d(2024, 1, 1),
            d(2024, 1, 31),
            Some(d(2024, 1, 2)),
        )
        .unwrap();
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 2)]);
    }

    #[test]
    fn inverted_window_is_empty() {
        let rule = RecurrenceRule::parse("FREQ=DAILY").unwrap();
        assert!(rule.expand(nine(), d(2024, 1, 5), d(2024, 1, 1)).unwrap().is_empty());
    }

    #[test]
    fn anchor_day_not_matching_byday_is_skipped() {
        // 2024-01-02 is a Tuesday.
        let rule = RecurrenceRule::parse("FREQ=WEEKLY;BYDAY=MO").unwrap();
        let dates = rule.expand(nine(), d(2024, 1, 2), d(2024, 1, 16)).unwrap();
        assert_eq!(dates, vec![d(2024, 1, 8), d(2024, 1, 15)]);
    }
}
