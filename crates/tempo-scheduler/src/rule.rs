//! Schedule rule parsing, normalization, and validation.
//!
//! Operator input is messy: a legacy single `time_of_day` next to a CSV
//! `times_of_day`, weekday tokens in any case (sometimes full names), time
//! slots with or without seconds. Parsing is lenient — unknown weekday tokens
//! are dropped, slots are de-duplicated and sorted — and [`ScheduleRule::validate`]
//! then enforces the strict well-formedness invariants on the result. The two
//! layers must stay composed in that order: a WEEKLY rule whose tokens were
//! *all* garbage degenerates to an empty day set and is rejected, not saved.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// How often a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScheduleType {
    /// Single fire at an absolute civil instant in the rule's zone.
    Once,
    /// Fire every day at each configured time slot.
    Daily,
    /// Fire on the configured weekdays at each configured time slot.
    Weekly,
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScheduleType::Once => "ONCE",
            ScheduleType::Daily => "DAILY",
            ScheduleType::Weekly => "WEEKLY",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ScheduleType {
    type Err = SchedulerError;

    /// Loud on unknown tags — a typo'd schedule type is a rejected edit,
    /// never a silent default.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ONCE" => Ok(ScheduleType::Once),
            "DAILY" => Ok(ScheduleType::Daily),
            "WEEKLY" => Ok(ScheduleType::Weekly),
            other => Err(SchedulerError::InvalidRule(format!(
                "unknown schedule type: {other}"
            ))),
        }
    }
}

/// Canonical weekday tokens, Monday-first (Mon=1 … Sun=7).
const WEEKDAY_TOKENS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Set of target weekdays for a WEEKLY rule.
///
/// Internally ordinal (1=Mon … 7=Sun, matching chrono's
/// `number_from_monday`); on the wire a comma-joined token list (`Mon,Wed,Fri`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekdaySet(BTreeSet<u8>);

impl WeekdaySet {
    /// Lenient parse of a CSV token list. Unknown tokens are silently
    /// dropped; full English names are accepted as aliases. The caller
    /// re-validates the result against the WEEKLY non-empty invariant.
    pub fn parse_lenient(raw: &str) -> Self {
        let mut days = BTreeSet::new();
        for token in raw.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if let Some(n) = weekday_ordinal(token) {
                days.insert(n);
            }
        }
        Self(days)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Membership by Monday-first ordinal (1..=7).
    pub fn contains(&self, ordinal: u8) -> bool {
        self.0.contains(&ordinal)
    }

    /// Wire encoding: `Mon,Wed,Fri` in Monday-first order.
    pub fn to_csv(&self) -> String {
        self.0
            .iter()
            .map(|n| WEEKDAY_TOKENS[(*n - 1) as usize])
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn weekday_ordinal(token: &str) -> Option<u8> {
    match token.to_ascii_uppercase().as_str() {
        "MON" | "MONDAY" => Some(1),
        "TUE" | "TUESDAY" => Some(2),
        "WED" | "WEDNESDAY" => Some(3),
        "THU" | "THURSDAY" => Some(4),
        "FRI" | "FRIDAY" => Some(5),
        "SAT" | "SATURDAY" => Some(6),
        "SUN" | "SUNDAY" => Some(7),
        _ => None,
    }
}

/// Parse a time slot: `HH:MM` or `HH:MM:SS`; any sub-second fraction is
/// truncated.
pub fn parse_time_slot(raw: &str) -> Result<NaiveTime> {
    let trimmed = raw.trim();
    // Truncate "HH:MM:SS.fff" to whole seconds.
    let s = trimmed.split('.').next().unwrap_or(trimmed);
    let parsed = if s.len() == 5 {
        NaiveTime::parse_from_str(s, "%H:%M")
    } else {
        NaiveTime::parse_from_str(s, "%H:%M:%S")
    };
    parsed.map_err(|_| SchedulerError::InvalidRule(format!("bad time of day: {raw:?}")))
}

/// Build the de-duplicated, ascending slot list from the CSV field, falling
/// back to the legacy single `time_of_day` field when the CSV is absent or
/// blank. The evaluator's ascending-scan assumption relies on this ordering.
pub fn normalize_slots(times_csv: Option<&str>, legacy: Option<&str>) -> Result<Vec<NaiveTime>> {
    let mut slots = Vec::new();
    if let Some(csv) = times_csv {
        for part in csv.split(',') {
            let part = part.trim();
            if !part.is_empty() {
                slots.push(parse_time_slot(part)?);
            }
        }
    }
    if slots.is_empty() {
        if let Some(single) = legacy.map(str::trim).filter(|s| !s.is_empty()) {
            slots.push(parse_time_slot(single)?);
        }
    }
    slots.sort();
    slots.dedup();
    Ok(slots)
}

/// Wire encoding of a slot list: comma-joined `HH:MM:SS`, already
/// de-duplicated and ascending.
pub fn slots_to_csv(slots: &[NaiveTime]) -> String {
    slots
        .iter()
        .map(|t| t.format("%H:%M:%S").to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a civil instant: `YYYY-MM-DD HH:MM:SS` (seconds optional, `T`
/// separator tolerated).
pub fn parse_civil_datetime(raw: &str) -> Result<NaiveDateTime> {
    let s = raw.trim().replace('T', " ");
    NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M"))
        .map_err(|_| SchedulerError::InvalidRule(format!("bad civil datetime: {raw:?}")))
}

/// Wire encoding of a civil instant.
pub fn format_civil(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Validated timing configuration of a job. Immutable once built; edits go
/// through [`RuleInput::normalize`] again.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRule {
    pub schedule_type: ScheduleType,
    /// Civil instant in `timezone`; required for `Once`, ignored otherwise.
    pub run_at: Option<NaiveDateTime>,
    /// De-duplicated, ascending. Used by `Daily` and `Weekly`.
    pub times_of_day: Vec<NaiveTime>,
    /// Required non-empty for `Weekly`; ignored otherwise.
    pub days_of_week: WeekdaySet,
    /// All civil arithmetic happens in this zone's calendar, so wall-clock
    /// fire times survive daylight-saving transitions.
    pub timezone: Tz,
}

impl ScheduleRule {
    /// Strict well-formedness check, applied after the lenient parse.
    pub fn validate(&self) -> Result<()> {
        match self.schedule_type {
            ScheduleType::Once if self.run_at.is_none() => Err(SchedulerError::InvalidRule(
                "ONCE schedule requires run_at".into(),
            )),
            ScheduleType::Daily if self.times_of_day.is_empty() => Err(
                SchedulerError::InvalidRule("DAILY schedule requires at least one time of day".into()),
            ),
            ScheduleType::Weekly if self.days_of_week.is_empty() => Err(
                SchedulerError::InvalidRule("WEEKLY schedule requires at least one weekday".into()),
            ),
            ScheduleType::Weekly if self.times_of_day.is_empty() => Err(
                SchedulerError::InvalidRule("WEEKLY schedule requires at least one time of day".into()),
            ),
            _ => Ok(()),
        }
    }
}

/// Raw operator input for a rule, exactly as it crosses the edit boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleInput {
    pub schedule_type: String,
    /// `YYYY-MM-DD HH:MM:SS` civil string in the rule's zone.
    #[serde(default)]
    pub run_at: Option<String>,
    /// Legacy single slot; used only when `times_of_day` is absent or blank.
    #[serde(default)]
    pub time_of_day: Option<String>,
    /// Comma-joined `HH:MM[:SS]` slots.
    #[serde(default)]
    pub times_of_day: Option<String>,
    /// Comma-joined weekday tokens (`Mon,Wed,Fri`).
    #[serde(default)]
    pub days_of_week: Option<String>,
    /// IANA zone name; blank falls back to the configured default.
    #[serde(default)]
    pub timezone: Option<String>,
}

impl RuleInput {
    /// Normalize raw input into a well-formed [`ScheduleRule`], or reject the
    /// edit with an [`SchedulerError::InvalidRule`].
    pub fn normalize(&self, default_tz: Tz) -> Result<ScheduleRule> {
        let schedule_type: ScheduleType = self.schedule_type.parse()?;

        let timezone = match self
            .timezone
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| SchedulerError::InvalidRule(format!("unknown timezone: {name}")))?,
            None => default_tz,
        };

        let times_of_day =
            normalize_slots(self.times_of_day.as_deref(), self.time_of_day.as_deref())?;

        let days_of_week = self
            .days_of_week
            .as_deref()
            .map(WeekdaySet::parse_lenient)
            .unwrap_or_default();

        let run_at = match self
            .run_at
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(raw) => Some(parse_civil_datetime(raw)?),
            None => None,
        };

        let rule = ScheduleRule {
            schedule_type,
            run_at,
            times_of_day,
            days_of_week,
            timezone,
        };
        rule.validate()?;
        Ok(rule)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn weekly_input(days: &str, times: &str) -> RuleInput {
        RuleInput {
            schedule_type: "WEEKLY".into(),
            days_of_week: Some(days.into()),
            times_of_day: Some(times.into()),
            ..RuleInput::default()
        }
    }

    #[test]
    fn slots_dedup_and_sort() {
        let slots = normalize_slots(Some("15:00,09:00,09:00"), None).unwrap();
        assert_eq!(slots_to_csv(&slots), "09:00:00,15:00:00");
    }

    #[test]
    fn legacy_single_slot_used_when_csv_blank() {
        let slots = normalize_slots(Some("  "), Some("09:30")).unwrap();
        assert_eq!(slots_to_csv(&slots), "09:30:00");
    }

    #[test]
    fn csv_takes_precedence_over_legacy() {
        let slots = normalize_slots(Some("08:00"), Some("09:30")).unwrap();
        assert_eq!(slots_to_csv(&slots), "08:00:00");
    }

    #[test]
    fn subsecond_fraction_truncated() {
        let t = parse_time_slot("09:15:30.750").unwrap();
        assert_eq!(t.format("%H:%M:%S").to_string(), "09:15:30");
    }

    #[test]
    fn bad_slot_rejected() {
        assert!(parse_time_slot("25:00").is_err());
        assert!(parse_time_slot("not a time").is_err());
    }

    #[test]
    fn weekday_tokens_case_insensitive_with_full_names() {
        let days = WeekdaySet::parse_lenient("monday, WED ,fri");
        assert_eq!(days.to_csv(), "Mon,Wed,Fri");
    }

    #[test]
    fn unknown_weekday_tokens_dropped_silently() {
        let days = WeekdaySet::parse_lenient("Mon,Caturday,Wed");
        assert_eq!(days.to_csv(), "Mon,Wed");
    }

    #[test]
    fn all_garbage_weekdays_fail_weekly_validation() {
        let err = weekly_input("Caturday,Smarch", "09:00")
            .normalize(chrono_tz::Asia::Taipei)
            .unwrap_err();
        assert!(err.to_string().contains("weekday"));
    }

    #[test]
    fn weekly_without_slots_rejected() {
        assert!(weekly_input("Mon", "").normalize(chrono_tz::Asia::Taipei).is_err());
    }

    #[test]
    fn once_without_run_at_rejected() {
        let input = RuleInput {
            schedule_type: "ONCE".into(),
            ..RuleInput::default()
        };
        assert!(input.normalize(chrono_tz::Asia::Taipei).is_err());
    }

    #[test]
    fn unknown_schedule_type_rejected() {
        let input = RuleInput {
            schedule_type: "MONTHLY".into(),
            ..RuleInput::default()
        };
        assert!(input.normalize(chrono_tz::Asia::Taipei).is_err());
    }

    #[test]
    fn unknown_timezone_rejected() {
        let mut input = weekly_input("Mon", "09:00");
        input.timezone = Some("Narnia/Lantern".into());
        assert!(input.normalize(chrono_tz::Asia::Taipei).is_err());
    }

    #[test]
    fn blank_timezone_falls_back_to_default() {
        let mut input = weekly_input("Mon", "09:00");
        input.timezone = Some("  ".into());
        let rule = input.normalize(chrono_tz::Europe::Berlin).unwrap();
        assert_eq!(rule.timezone, chrono_tz::Europe::Berlin);
    }

    #[test]
    fn civil_datetime_accepts_t_separator_and_no_seconds() {
        let a = parse_civil_datetime("2026-03-02T09:00:00").unwrap();
        let b = parse_civil_datetime("2026-03-02 09:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(format_civil(&a), "2026-03-02 09:00:00");
    }

    #[test]
    fn schedule_type_roundtrip_loud_on_unknown() {
        assert_eq!("daily".parse::<ScheduleType>().unwrap(), ScheduleType::Daily);
        assert_eq!(ScheduleType::Weekly.to_string(), "WEEKLY");
        assert!("EVERY_FULL_MOON".parse::<ScheduleType>().is_err());
    }
}
