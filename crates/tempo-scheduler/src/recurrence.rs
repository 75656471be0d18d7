//! Next-occurrence computation.
//!
//! Pure function of a rule and a "now" instant — no storage access, no I/O,
//! safe to call concurrently. All arithmetic happens in the rule's own civil
//! calendar so that "09:00" means 09:00 on the wall clock across
//! daylight-saving transitions, not a fixed UTC offset.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::rule::{ScheduleRule, ScheduleType};

/// Three days suffice for DAILY: even when every slot on day 0 and day 1 has
/// passed, day 2 always holds a future slot.
const DAILY_WINDOW_DAYS: i64 = 3;

/// Fourteen days cover every weekday at least once even when the current
/// weekday's own slots have all passed.
const WEEKLY_WINDOW_DAYS: i64 = 14;

/// Compute the next execution time for `rule` strictly after `now`.
///
/// `now` must already be expressed in the rule's zone; the result is in the
/// same zone (callers normalize for storage, never this function). Returns
/// `None` when the rule has no future occurrence: a `Once` whose instant has
/// passed, an empty slot list, or (defensively) an exhausted search window.
///
/// The comparison is strictly-greater: an exact `now` match is never
/// re-selected, so a sub-second reschedule race cannot re-fire the same
/// instant. Malformed rules are a caller error — validate before invoking.
pub fn compute_next_run(rule: &ScheduleRule, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    match rule.schedule_type {
        ScheduleType::Once => {
            let at = resolve_civil(rule.timezone, rule.run_at?)?;
            (at > now).then_some(at)
        }
        ScheduleType::Daily => scan_days(rule, now, DAILY_WINDOW_DAYS, |_| true),
        ScheduleType::Weekly => scan_days(rule, now, WEEKLY_WINDOW_DAYS, |date| {
            rule.days_of_week
                .contains(date.weekday().number_from_monday() as u8)
        }),
    }
}

/// Walk `window` civil days from `now`'s date, skipping days rejected by
/// `day_ok`, and return the first (date, slot) candidate strictly after
/// `now`. Slots are already ascending, so the first hit is the earliest.
fn scan_days(
    rule: &ScheduleRule,
    now: DateTime<Tz>,
    window: i64,
    day_ok: impl Fn(NaiveDate) -> bool,
) -> Option<DateTime<Tz>> {
    let start = now.date_naive();
    for offset in 0..window {
        let date = start + Duration::days(offset);
        if !day_ok(date) {
            continue;
        }
        for slot in &rule.times_of_day {
            let Some(candidate) = resolve_civil(rule.timezone, date.and_time(*slot)) else {
                // Slot falls in a spring-forward gap on this date; no such
                // wall-clock moment exists, so it cannot fire.
                continue;
            };
            if candidate > now {
                return Some(candidate);
            }
        }
    }
    None
}

/// Localize a civil datetime in `tz`. The ambiguous fall-back hour resolves
/// to its first occurrence; a nonexistent spring-forward time yields `None`.
fn resolve_civil(tz: Tz, civil: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&civil).earliest()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
