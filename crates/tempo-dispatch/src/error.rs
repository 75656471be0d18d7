use thiserror::Error;

/// Errors crossing the executor control boundary.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The control endpoint could not be reached. Surfaced verbatim to the
    /// operator; never retried here — retrying is the operator's or the
    /// external timer's call.
    #[error("Executor unreachable: {0}")]
    Transport(String),

    /// The endpoint answered with a body the client could not interpret.
    #[error("Bad executor response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
