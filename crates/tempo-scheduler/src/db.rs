use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `jobs` and `schedule_runs` tables (idempotent) and an index
/// on `next_run_at` so the due-job poll stays efficient with thousands of
/// jobs. `schedule_runs.job_id` is deliberately not a foreign key: history
/// rows survive job deletion as orphaned audit records.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id                TEXT    NOT NULL PRIMARY KEY,
            name              TEXT    NOT NULL,
            enabled           INTEGER NOT NULL DEFAULT 1,
            schedule_type     TEXT    NOT NULL,   -- ONCE | DAILY | WEEKLY
            run_at            TEXT,               -- civil, rule zone; ONCE only
            times_of_day      TEXT    NOT NULL DEFAULT '',  -- CSV HH:MM:SS, ascending
            days_of_week      TEXT    NOT NULL DEFAULT '',  -- CSV Mon..Sun tokens
            timezone          TEXT    NOT NULL,   -- IANA zone name
            target            TEXT    NOT NULL,   -- JSON-encoded DispatchTarget
            payload           TEXT    NOT NULL DEFAULT '',
            max_retries       INTEGER NOT NULL DEFAULT 0,
            retry_backoff_sec INTEGER NOT NULL DEFAULT 60,
            timeout_sec       INTEGER NOT NULL DEFAULT 10,
            next_run_at       TEXT,               -- civil, store zone; NULL = no occurrence
            rule_version      INTEGER NOT NULL DEFAULT 1,
            created_at        TEXT    NOT NULL,
            updated_at        TEXT    NOT NULL
        ) STRICT;

        -- Efficient polling: SELECT … WHERE next_run_at <= ?  ORDER BY next_run_at
        CREATE INDEX IF NOT EXISTS idx_jobs_next_run_at ON jobs (next_run_at);

        CREATE TABLE IF NOT EXISTS schedule_runs (
            id            TEXT    NOT NULL PRIMARY KEY,
            job_id        TEXT    NOT NULL,       -- weak reference, no FK
            planned_at    TEXT    NOT NULL,       -- civil, store zone
            started_at    TEXT,
            finished_at   TEXT,
            status        TEXT,                   -- SUCCESS | FAILED; NULL until finished
            attempt       INTEGER NOT NULL DEFAULT 1,
            response_code INTEGER,
            error_message TEXT,
            response_body TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_runs_job_id ON schedule_runs (job_id, planned_at);
        ",
    )?;
    Ok(())
}
