//! End-to-end flow over the public API: edit → evaluate → fire → record →
//! recalculate, the way the surrounding system drives the engine.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;
use tempo_core::types::DispatchTarget;
use tempo_scheduler::{
    BulkRecalculator, JobInput, JobStore, RuleInput, RunOutcome, RunRecorder, RunStatus,
};

const TAIPEI: Tz = chrono_tz::Asia::Taipei;

fn utc_of_taipei(s: &str) -> DateTime<Utc> {
    let civil = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
    TAIPEI.from_local_datetime(&civil).unwrap().with_timezone(&Utc)
}

fn weekly_report_job() -> JobInput {
    JobInput {
        name: "weekly report".into(),
        enabled: true,
        rule: RuleInput {
            schedule_type: "WEEKLY".into(),
            days_of_week: Some("Mon,Wed".into()),
            times_of_day: Some("09:00,15:00".into()),
            timezone: Some("Asia/Taipei".into()),
            ..RuleInput::default()
        },
        target: DispatchTarget::Http {
            url: "https://example.test/report".into(),
            method: "POST".into(),
            content_type: Some("application/json".into()),
            headers: None,
        },
        payload: r#"{"kind":"report"}"#.into(),
        max_retries: 2,
        retry_backoff_sec: 30,
        timeout_sec: 10,
    }
}

#[test]
fn fire_record_and_reschedule_cycle() {
    let store = JobStore::new(Connection::open_in_memory().unwrap(), TAIPEI).unwrap();
    let recorder = RunRecorder::new(Connection::open_in_memory().unwrap()).unwrap();

    // Monday morning: the operator saves the job.
    let created_at = utc_of_taipei("2026-03-02 08:00:00");
    let job = store.create_job(&weekly_report_job(), created_at).unwrap();
    assert_eq!(job.next_run_at.as_deref(), Some("2026-03-02 09:00:00"));

    // The timer sees it become due.
    let fire_time = utc_of_taipei("2026-03-02 09:00:01");
    let due = store.due_jobs(fire_time, 20).unwrap();
    assert_eq!(due.len(), 1);
    let planned_at = due[0].next_run_at.clone().unwrap();

    // First attempt fails; the executor reports it, and a retry attempt
    // lands as a second, separate history row.
    let run1 = recorder.plan(&job.id, &planned_at, 1).unwrap();
    recorder.mark_started(&run1.id, "2026-03-02 09:00:01").unwrap();
    recorder
        .finish(
            &run1.id,
            "2026-03-02 09:00:11",
            &RunOutcome {
                status: RunStatus::Failed,
                response_code: Some(502),
                error_message: Some("bad gateway".into()),
                response_body: None,
            },
        )
        .unwrap();

    let run2 = recorder.plan(&job.id, &planned_at, 2).unwrap();
    recorder.mark_started(&run2.id, "2026-03-02 09:00:41").unwrap();
    recorder
        .finish(
            &run2.id,
            "2026-03-02 09:00:42",
            &RunOutcome {
                status: RunStatus::Success,
                response_code: Some(200),
                error_message: None,
                response_body: Some("ok".into()),
            },
        )
        .unwrap();

    let history = recorder.history(&job.id).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history.iter().map(|r| r.attempt).collect::<Vec<_>>(),
        vec![1, 2]
    );

    // Post-fire bookkeeping (from the due row the timer holds) advances to
    // the same-day later slot.
    let applied = store
        .refresh_after_fire(&due[0], utc_of_taipei("2026-03-02 09:00:42"))
        .unwrap();
    assert!(applied);
    let fresh = store.get_job(&job.id).unwrap();
    assert_eq!(fresh.next_run_at.as_deref(), Some("2026-03-02 15:00:00"));
    assert!(fresh.enabled);

    // Nothing is due anymore until that slot arrives.
    assert!(store.due_jobs(utc_of_taipei("2026-03-02 10:00:00"), 20).unwrap().is_empty());
}

#[test]
fn history_survives_job_deletion() {
    let store = JobStore::new(Connection::open_in_memory().unwrap(), TAIPEI).unwrap();
    let recorder = RunRecorder::new(Connection::open_in_memory().unwrap()).unwrap();

    let now = utc_of_taipei("2026-03-02 08:00:00");
    let job = store.create_job(&weekly_report_job(), now).unwrap();
    let run = recorder.plan(&job.id, "2026-03-02 09:00:00", 1).unwrap();
    recorder.mark_started(&run.id, "2026-03-02 09:00:01").unwrap();
    recorder
        .finish(
            &run.id,
            "2026-03-02 09:00:02",
            &RunOutcome {
                status: RunStatus::Success,
                response_code: Some(200),
                error_message: None,
                response_body: None,
            },
        )
        .unwrap();

    store.delete_job(&job.id).unwrap();

    // Orphaned history rows stay readable.
    let history = recorder.history(&job.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, Some(RunStatus::Success));
}

#[test]
fn bulk_recalculation_after_downtime() {
    let store = JobStore::new(Connection::open_in_memory().unwrap(), TAIPEI).unwrap();

    let monday = utc_of_taipei("2026-03-02 08:00:00");
    let job = store.create_job(&weekly_report_job(), monday).unwrap();

    // The process was down for a week; cached estimates are stale.
    let next_tuesday = utc_of_taipei("2026-03-10 12:00:00");
    let report = BulkRecalculator::new(&store).recalculate_all(next_tuesday).unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed, 0);

    // Next member day after Tuesday noon is Wednesday 09:00.
    let fresh = store.get_job(&job.id).unwrap();
    assert_eq!(fresh.next_run_at.as_deref(), Some("2026-03-11 09:00:00"));
}
