//! `tempo-scheduler` — recurrence evaluation and execution-record
//! bookkeeping over SQLite.
//!
//! # Overview
//!
//! A job's timing lives in a [`rule::ScheduleRule`]; the pure
//! [`recurrence::compute_next_run`] maps a rule plus "now" to the next future
//! fire in the rule's own civil calendar. The [`store::JobStore`] persists
//! jobs and their cached `next_run_at` (guarded by a rule version against
//! lost updates), the [`runs::RunRecorder`] keeps one append-only history row
//! per attempt, and the [`recalc::BulkRecalculator`] refreshes every enabled
//! recurring job in one fault-isolated pass. Actual HTTP/MQTT dispatch is the
//! executor process's business, reached through `tempo-dispatch`.
//!
//! # Schedule variants
//!
//! | Variant  | Behaviour                                                    |
//! |----------|--------------------------------------------------------------|
//! | `ONCE`   | Single fire at an absolute civil instant in the rule's zone  |
//! | `DAILY`  | Fire every day at each configured time slot                  |
//! | `WEEKLY` | Fire on the configured weekdays at each configured time slot |

pub mod db;
pub mod error;
pub mod recalc;
pub mod recurrence;
pub mod rule;
pub mod runs;
pub mod store;

pub use error::{Result, SchedulerError};
pub use recalc::{BulkRecalculator, RecalcReport};
pub use recurrence::compute_next_run;
pub use rule::{RuleInput, ScheduleRule, ScheduleType, WeekdaySet};
pub use runs::{RunOutcome, RunRecorder, RunStatus, ScheduleRun};
pub use store::{JobInput, JobStore, ScheduleJob};
