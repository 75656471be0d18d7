//! Durable job table.
//!
//! The store is the only writer of the cached `next_run_at`. Every cached
//! value is persisted as a civil `YYYY-MM-DD HH:MM:SS` string in the store's
//! single display zone (the configured default timezone), regardless of the
//! job's own rule zone — that keeps the due-job poll a plain indexed string
//! comparison across jobs in different zones. The evaluator itself never
//! converts zones; conversion happens here, at write time.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use tempo_core::types::DispatchTarget;

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::recurrence::compute_next_run;
use crate::rule::{
    format_civil, normalize_slots, parse_civil_datetime, slots_to_csv, RuleInput, ScheduleRule,
    ScheduleType, WeekdaySet,
};

/// A persisted job record.
#[derive(Debug, Clone)]
pub struct ScheduleJob {
    /// UUID v4 string — primary key.
    pub id: String,
    /// Human-readable label.
    pub name: String,
    pub enabled: bool,
    pub rule: ScheduleRule,
    /// Where a fire is dispatched; opaque to this core beyond validation.
    pub target: DispatchTarget,
    /// Payload forwarded verbatim to the executor.
    pub payload: String,
    /// Retry policy — stored for the executor, never interpreted here.
    pub max_retries: u32,
    pub retry_backoff_sec: u32,
    pub timeout_sec: u32,
    /// Cached next fire, civil string in the store zone. `None` means the
    /// rule currently has no future occurrence.
    pub next_run_at: Option<String>,
    /// Bumped on every rule edit; guards recalculation write-backs against
    /// lost updates from concurrent edits.
    pub rule_version: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Operator input for creating or editing a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInput {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub rule: RuleInput,
    pub target: DispatchTarget,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_backoff")]
    pub retry_backoff_sec: u32,
    #[serde(default = "default_timeout")]
    pub timeout_sec: u32,
}

fn default_enabled() -> bool {
    true
}
fn default_backoff() -> u32 {
    60
}
fn default_timeout() -> u32 {
    10
}

const JOB_SELECT: &str = "SELECT id, name, enabled, schedule_type, run_at, times_of_day,
        days_of_week, timezone, target, payload, max_retries, retry_backoff_sec,
        timeout_sec, next_run_at, rule_version, created_at, updated_at FROM jobs";

/// Raw row image, converted to [`ScheduleJob`] in a second step so rusqlite
/// mapping errors and domain parse errors stay distinct.
struct JobRow {
    id: String,
    name: String,
    enabled: i64,
    schedule_type: String,
    run_at: Option<String>,
    times_of_day: String,
    days_of_week: String,
    timezone: String,
    target: String,
    payload: String,
    max_retries: i64,
    retry_backoff_sec: i64,
    timeout_sec: i64,
    next_run_at: Option<String>,
    rule_version: i64,
    created_at: String,
    updated_at: String,
}

/// Map a SELECT row (column order from JOB_SELECT) to a JobRow.
/// Centralised here so every query in this module stays consistent.
fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRow> {
    Ok(JobRow {
        id: row.get(0)?,
        name: row.get(1)?,
        enabled: row.get(2)?,
        schedule_type: row.get(3)?,
        run_at: row.get(4)?,
        times_of_day: row.get(5)?,
        days_of_week: row.get(6)?,
        timezone: row.get(7)?,
        target: row.get(8)?,
        payload: row.get(9)?,
        max_retries: row.get(10)?,
        retry_backoff_sec: row.get(11)?,
        timeout_sec: row.get(12)?,
        next_run_at: row.get(13)?,
        rule_version: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

impl JobRow {
    fn into_job(self) -> Result<ScheduleJob> {
        let schedule_type: ScheduleType = self.schedule_type.parse()?;
        let timezone: Tz = self.timezone.parse().map_err(|_| {
            SchedulerError::InvalidRule(format!("unknown timezone: {}", self.timezone))
        })?;
        let run_at = self.run_at.as_deref().map(parse_civil_datetime).transpose()?;
        let times_of_day = normalize_slots(Some(&self.times_of_day), None)?;
        let days_of_week = WeekdaySet::parse_lenient(&self.days_of_week);
        // Stored rules are deliberately not re-validated: a degenerate row
        // (e.g. WEEKLY whose day set emptied out) must still load so bulk
        // recalculation can observe and tally it instead of aborting.
        let rule = ScheduleRule {
            schedule_type,
            run_at,
            times_of_day,
            days_of_week,
            timezone,
        };
        let target: DispatchTarget = serde_json::from_str(&self.target)?;
        Ok(ScheduleJob {
            id: self.id,
            name: self.name,
            enabled: self.enabled != 0,
            rule,
            target,
            payload: self.payload,
            max_retries: self.max_retries as u32,
            retry_backoff_sec: self.retry_backoff_sec as u32,
            timeout_sec: self.timeout_sec as u32,
            next_run_at: self.next_run_at,
            rule_version: self.rule_version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SQLite-backed store of [`ScheduleJob`] rows.
pub struct JobStore {
    conn: Connection,
    /// Zone used both as the fallback for rules without an explicit
    /// `timezone` and as the uniform zone of persisted civil strings.
    store_tz: Tz,
}

impl JobStore {
    /// Open a store over `conn`, initialising the schema if needed.
    pub fn new(conn: Connection, store_tz: Tz) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn, store_tz })
    }

    /// Validate `input`, compute the initial `next_run_at`, and insert.
    pub fn create_job(&self, input: &JobInput, now: DateTime<Utc>) -> Result<ScheduleJob> {
        let rule = input.rule.normalize(self.store_tz)?;
        validate_target(&input.target)?;

        let id = Uuid::new_v4().to_string();
        let now_str = self.now_civil(now);
        let next = self.cached_next(&rule, now);
        let target_json = serde_json::to_string(&input.target)?;

        self.conn.execute(
            "INSERT INTO jobs
             (id, name, enabled, schedule_type, run_at, times_of_day, days_of_week,
              timezone, target, payload, max_retries, retry_backoff_sec, timeout_sec,
              next_run_at, rule_version, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,1,?15,?15)",
            rusqlite::params![
                id,
                input.name,
                input.enabled as i64,
                rule.schedule_type.to_string(),
                rule.run_at.as_ref().map(format_civil),
                slots_to_csv(&rule.times_of_day),
                rule.days_of_week.to_csv(),
                rule.timezone.name(),
                target_json,
                input.payload,
                input.max_retries as i64,
                input.retry_backoff_sec as i64,
                input.timeout_sec as i64,
                next,
                now_str,
            ],
        )?;
        info!(job_id = %id, name = %input.name, "job created");
        self.get_job(&id)
    }

    /// Replace a job's definition. The rule version is bumped so any
    /// in-flight recalculation based on the old rule is discarded on
    /// write-back.
    pub fn update_job(&self, id: &str, input: &JobInput, now: DateTime<Utc>) -> Result<ScheduleJob> {
        let rule = input.rule.normalize(self.store_tz)?;
        validate_target(&input.target)?;

        let now_str = self.now_civil(now);
        let next = self.cached_next(&rule, now);
        let target_json = serde_json::to_string(&input.target)?;

        let n = self.conn.execute(
            "UPDATE jobs SET name=?1, enabled=?2, schedule_type=?3, run_at=?4,
                times_of_day=?5, days_of_week=?6, timezone=?7, target=?8, payload=?9,
                max_retries=?10, retry_backoff_sec=?11, timeout_sec=?12,
                next_run_at=?13, rule_version=rule_version+1, updated_at=?14
             WHERE id=?15",
            rusqlite::params![
                input.name,
                input.enabled as i64,
                rule.schedule_type.to_string(),
                rule.run_at.as_ref().map(format_civil),
                slots_to_csv(&rule.times_of_day),
                rule.days_of_week.to_csv(),
                rule.timezone.name(),
                target_json,
                input.payload,
                input.max_retries as i64,
                input.retry_backoff_sec as i64,
                input.timeout_sec as i64,
                next,
                now_str,
                id,
            ],
        )?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job updated");
        self.get_job(id)
    }

    pub fn get_job(&self, id: &str) -> Result<ScheduleJob> {
        let sql = format!("{JOB_SELECT} WHERE id=?1");
        let row = self
            .conn
            .query_row(&sql, [id], read_row)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    SchedulerError::JobNotFound { id: id.to_string() }
                }
                other => other.into(),
            })?;
        row.into_job()
    }

    /// Delete a job. Its `schedule_runs` rows are retained as orphaned
    /// history.
    pub fn delete_job(&self, id: &str) -> Result<()> {
        let n = self.conn.execute("DELETE FROM jobs WHERE id=?1", [id])?;
        if n == 0 {
            return Err(SchedulerError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job deleted");
        Ok(())
    }

    /// Flip the enabled flag. Re-enabling recomputes `next_run_at` from the
    /// stored rule so the job never comes back with a stale (past) estimate;
    /// the recompute is written under the rule version just read, so a
    /// concurrent edit's own (fresher) recompute is never overwritten — on a
    /// version conflict only the flag is flipped.
    pub fn set_enabled(&self, id: &str, enabled: bool, now: DateTime<Utc>) -> Result<()> {
        let now_str = self.now_civil(now);

        if !enabled {
            // Disabling leaves next_run_at untouched; no derived value, no
            // version guard needed.
            let n = self.conn.execute(
                "UPDATE jobs SET enabled=0, updated_at=?1 WHERE id=?2",
                rusqlite::params![now_str, id],
            )?;
            if n == 0 {
                return Err(SchedulerError::JobNotFound { id: id.to_string() });
            }
            info!(job_id = %id, enabled, "job enabled flag set");
            return Ok(());
        }

        let job = self.get_job(id)?;
        let next = self.cached_next(&job.rule, now);
        let n = self.conn.execute(
            "UPDATE jobs SET enabled=1, next_run_at=?1, updated_at=?2
             WHERE id=?3 AND rule_version=?4",
            rusqlite::params![next, now_str, id, job.rule_version],
        )?;
        if n == 0 {
            // The edit already recomputed next_run_at from the new rule.
            self.conn.execute(
                "UPDATE jobs SET enabled=1, updated_at=?1 WHERE id=?2",
                rusqlite::params![now_str, id],
            )?;
        }
        info!(job_id = %id, enabled, "job enabled flag set");
        Ok(())
    }

    /// All enabled DAILY/WEEKLY jobs — the bulk-recalculation working set.
    /// Rows too corrupt to load (bad target JSON, missing zone data) are
    /// skipped with a warning rather than failing the whole listing.
    pub fn list_enabled_recurring(&self) -> Result<Vec<ScheduleJob>> {
        let sql = format!(
            "{JOB_SELECT} WHERE enabled=1 AND schedule_type IN ('DAILY','WEEKLY')
             ORDER BY created_at"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows: Vec<JobRow> = stmt.query_map([], read_row)?.filter_map(|r| r.ok()).collect();

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match row.into_job() {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(job_id = %id, "skipping unreadable job row: {e}"),
            }
        }
        Ok(jobs)
    }

    /// Jobs whose cached `next_run_at` has arrived — what the external timer
    /// polls, oldest first.
    pub fn due_jobs(&self, now: DateTime<Utc>, batch: usize) -> Result<Vec<ScheduleJob>> {
        let sql = format!(
            "{JOB_SELECT} WHERE enabled=1 AND next_run_at IS NOT NULL AND next_run_at<=?1
             ORDER BY next_run_at ASC LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(rusqlite::params![self.now_civil(now), batch as i64], read_row)?
            .filter_map(|r| r.ok())
            .collect();

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match row.into_job() {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(job_id = %id, "skipping unreadable job row: {e}"),
            }
        }
        Ok(jobs)
    }

    /// Write back a recalculated `next_run_at`, guarded by the rule version
    /// the caller read. Returns `false` when a concurrent edit bumped the
    /// version first — the stale result is discarded, never applied.
    pub fn write_next_run(
        &self,
        id: &str,
        next_run_at: Option<&str>,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let n = self.conn.execute(
            "UPDATE jobs SET next_run_at=?1, updated_at=?2 WHERE id=?3 AND rule_version=?4",
            rusqlite::params![next_run_at, self.now_civil(now), id, expected_version],
        )?;
        Ok(n == 1)
    }

    /// Post-fire bookkeeping, applied after the executor reports an attempt
    /// on `job` (the row the caller took from the due poll): a `Once` job is
    /// disabled (a fired one-time rule is never recalculated into the
    /// future); a recurring job gets a fresh `next_run_at`, or is paused when
    /// its rule no longer yields one — a paused job beats one that stays due
    /// forever. Every write is guarded by the rule version the caller read;
    /// returns `false` when a concurrent edit bumped it first, in which case
    /// the edit's own recompute stands and this refresh is a no-op.
    pub fn refresh_after_fire(&self, job: &ScheduleJob, now: DateTime<Utc>) -> Result<bool> {
        let now_str = self.now_civil(now);

        let applied = if job.rule.schedule_type == ScheduleType::Once {
            let n = self.conn.execute(
                "UPDATE jobs SET enabled=0, updated_at=?1 WHERE id=?2 AND rule_version=?3",
                rusqlite::params![now_str, job.id, job.rule_version],
            )?;
            if n == 1 {
                info!(job_id = %job.id, "one-time job fired; disabled");
            }
            n == 1
        } else {
            let now_local = now.with_timezone(&job.rule.timezone);
            match compute_next_run(&job.rule, now_local) {
                Some(next) => {
                    let civil = self.to_store_civil(next);
                    let n = self.conn.execute(
                        "UPDATE jobs SET next_run_at=?1, updated_at=?2
                         WHERE id=?3 AND rule_version=?4",
                        rusqlite::params![civil, now_str, job.id, job.rule_version],
                    )?;
                    if n == 1 {
                        info!(job_id = %job.id, next_run_at = %civil, "next run scheduled");
                    }
                    n == 1
                }
                None => {
                    let n = self.conn.execute(
                        "UPDATE jobs SET enabled=0, updated_at=?1 WHERE id=?2 AND rule_version=?3",
                        rusqlite::params![now_str, job.id, job.rule_version],
                    )?;
                    if n == 1 {
                        warn!(job_id = %job.id, "rule yields no future occurrence; job paused");
                    }
                    n == 1
                }
            }
        };

        if !applied {
            info!(job_id = %job.id, "concurrent edit won; post-fire refresh skipped");
        }
        Ok(applied)
    }

    /// Convert an evaluator result into the persisted civil encoding.
    pub fn to_store_civil(&self, instant: DateTime<Tz>) -> String {
        format_civil(&instant.with_timezone(&self.store_tz).naive_local())
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    fn now_civil(&self, now: DateTime<Utc>) -> String {
        format_civil(&now.with_timezone(&self.store_tz).naive_local())
    }

    /// Cached `next_run_at` for a freshly validated rule. A lapsed `Once`
    /// rule gets a forward-shifted sentinel (now + 60 s) so every enabled
    /// job keeps a displayable non-NULL estimate.
    fn cached_next(&self, rule: &ScheduleRule, now: DateTime<Utc>) -> Option<String> {
        let now_local = now.with_timezone(&rule.timezone);
        match compute_next_run(rule, now_local) {
            Some(next) => Some(self.to_store_civil(next)),
            None if rule.schedule_type == ScheduleType::Once => {
                Some(self.now_civil(now + Duration::minutes(1)))
            }
            None => None,
        }
    }
}

fn validate_target(target: &DispatchTarget) -> Result<()> {
    target.validate().map_err(|field| {
        SchedulerError::InvalidRule(format!(
            "{} target requires a non-empty {field}",
            target.channel_name()
        ))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
