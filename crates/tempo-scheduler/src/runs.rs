//! Execution-history records.
//!
//! One row per attempt, append-only: a retry is a new row with an
//! incremented `attempt`, never a mutation of the previous one, so the audit
//! trail stays complete. Each row moves through exactly one path,
//! PLANNED → STARTED → FINISHED(SUCCESS|FAILED), and every transition is
//! applied at most once — the recorder rejects replays and out-of-order
//! reports instead of silently overwriting.

use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, SchedulerError};

/// Terminal outcome of one attempt. Absent until the executor reports
/// completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Success,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(RunStatus::Success),
            "FAILED" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// A persisted execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRun {
    /// UUID v4 string — primary key.
    pub id: String,
    /// Owning job. Weak reference: the record outlives job deletion.
    pub job_id: String,
    /// Civil instant the fire was scheduled for.
    pub planned_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    /// Set exactly once, together with `finished_at`.
    pub status: Option<RunStatus>,
    /// 1-based attempt counter.
    pub attempt: u32,
    pub response_code: Option<i64>,
    pub error_message: Option<String>,
    pub response_body: Option<String>,
}

/// What the executor reports when an attempt completes. Captured atomically
/// with `finished_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub response_code: Option<i64>,
    pub error_message: Option<String>,
    pub response_body: Option<String>,
}

/// Writer/reader of the `schedule_runs` table.
pub struct RunRecorder {
    conn: Connection,
}

impl RunRecorder {
    /// Open a recorder over `conn`, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn })
    }

    /// Create a PLANNED record for an upcoming fire.
    pub fn plan(&self, job_id: &str, planned_at: &str, attempt: u32) -> Result<ScheduleRun> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO schedule_runs (id, job_id, planned_at, attempt)
             VALUES (?1,?2,?3,?4)",
            rusqlite::params![id, job_id, planned_at, attempt as i64],
        )?;
        info!(run_id = %id, %job_id, attempt, "run planned");
        self.get_run(&id)
    }

    /// PLANNED → STARTED. Rejected if the record has already started or
    /// finished.
    pub fn mark_started(&self, run_id: &str, started_at: &str) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE schedule_runs SET started_at=?1
             WHERE id=?2 AND started_at IS NULL AND finished_at IS NULL",
            rusqlite::params![started_at, run_id],
        )?;
        if n == 0 {
            let run = self.get_run(run_id)?;
            return Err(SchedulerError::InvalidTransition {
                run_id: run_id.to_string(),
                detail: if run.finished_at.is_some() {
                    "already finished".into()
                } else {
                    "already started".into()
                },
            });
        }
        Ok(())
    }

    /// STARTED → FINISHED, exactly once; status and response fields land
    /// together with `finished_at`. `finished_at` must not precede
    /// `started_at`.
    pub fn finish(&self, run_id: &str, finished_at: &str, outcome: &RunOutcome) -> Result<()> {
        let run = self.get_run(run_id)?;
        let Some(started_at) = run.started_at.as_deref() else {
            return Err(SchedulerError::InvalidTransition {
                run_id: run_id.to_string(),
                detail: "not started".into(),
            });
        };
        if run.finished_at.is_some() {
            return Err(SchedulerError::InvalidTransition {
                run_id: run_id.to_string(),
                detail: "already finished".into(),
            });
        }
        // Civil strings compare chronologically as text.
        if finished_at < started_at {
            return Err(SchedulerError::InvalidTransition {
                run_id: run_id.to_string(),
                detail: format!("finished_at {finished_at} precedes started_at {started_at}"),
            });
        }

        self.conn.execute(
            "UPDATE schedule_runs
             SET finished_at=?1, status=?2, response_code=?3, error_message=?4, response_body=?5
             WHERE id=?6 AND finished_at IS NULL",
            rusqlite::params![
                finished_at,
                outcome.status.to_string(),
                outcome.response_code,
                outcome.error_message,
                outcome.response_body,
                run_id,
            ],
        )?;
        info!(run_id = %run_id, status = %outcome.status, "run finished");
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<ScheduleRun> {
        self.conn
            .query_row(
                "SELECT id, job_id, planned_at, started_at, finished_at, status, attempt,
                        response_code, error_message, response_body
                 FROM schedule_runs WHERE id=?1",
                [run_id],
                read_run,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => SchedulerError::RunNotFound {
                    id: run_id.to_string(),
                },
                other => other.into(),
            })
    }

    /// All attempts for a job, oldest planned first then by attempt.
    pub fn history(&self, job_id: &str) -> Result<Vec<ScheduleRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, job_id, planned_at, started_at, finished_at, status, attempt,
                    response_code, error_message, response_body
             FROM schedule_runs WHERE job_id=?1 ORDER BY planned_at, attempt",
        )?;
        let runs = stmt
            .query_map([job_id], read_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }
}

fn read_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleRun> {
    let status = row
        .get::<_, Option<String>>(5)?
        .and_then(|s| s.parse::<RunStatus>().ok());
    Ok(ScheduleRun {
        id: row.get(0)?,
        job_id: row.get(1)?,
        planned_at: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status,
        attempt: row.get::<_, i64>(6)? as u32,
        response_code: row.get(7)?,
        error_message: row.get(8)?,
        response_body: row.get(9)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
