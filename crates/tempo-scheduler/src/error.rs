use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The rule rejected at the edit boundary: missing ONCE instant, empty
    /// WEEKLY day set, missing time slot, unknown tag or timezone, or a
    /// missing dispatch destination field.
    #[error("Invalid schedule rule: {0}")]
    InvalidRule(String),

    /// No job with the given ID exists in the store.
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// No execution record with the given ID exists.
    #[error("Run not found: {id}")]
    RunNotFound { id: String },

    /// An execution-record transition was attempted out of order
    /// (PLANNED → STARTED → FINISHED, each applied exactly once).
    #[error("Invalid run transition for {run_id}: {detail}")]
    InvalidTransition { run_id: String, detail: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
