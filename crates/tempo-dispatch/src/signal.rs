use async_trait::async_trait;

use crate::error::Result;

/// Acknowledgement for a "run now" signal: a boolean success flag plus the
/// HTTP-style status code the executor answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorAck {
    pub ok: bool,
    pub status: u16,
}

/// Outbound executor boundary: "run job `<id>` now".
///
/// Implementations must be `Send + Sync` so a single client can be shared
/// across Tokio tasks.
#[async_trait]
pub trait ExecutorSignal: Send + Sync {
    /// Ask the executor to run the job immediately, bypassing its schedule.
    /// A transport failure is an error; a refusal (bad token, unknown job)
    /// is a normal `ok: false` acknowledgement.
    async fn run_now(&self, job_id: &str) -> Result<ExecutorAck>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DispatchError;
    use std::sync::Mutex;

    /// Scripted stand-in used to exercise caller-side handling of acks and
    /// transport failures without a live executor.
    struct ScriptedExecutor {
        calls: Mutex<Vec<String>>,
        reachable: bool,
        accept: bool,
    }

    #[async_trait]
    impl ExecutorSignal for ScriptedExecutor {
        async fn run_now(&self, job_id: &str) -> Result<ExecutorAck> {
            self.calls.lock().unwrap().push(job_id.to_string());
            if !self.reachable {
                return Err(DispatchError::Transport("connection refused".into()));
            }
            Ok(ExecutorAck {
                ok: self.accept,
                status: if self.accept { 200 } else { 403 },
            })
        }
    }

    #[tokio::test]
    async fn accepted_signal_acks_ok() {
        let exec = ScriptedExecutor {
            calls: Mutex::new(Vec::new()),
            reachable: true,
            accept: true,
        };
        let ack = exec.run_now("job-42").await.unwrap();
        assert!(ack.ok);
        assert_eq!(ack.status, 200);
        assert_eq!(exec.calls.lock().unwrap().as_slice(), ["job-42"]);
    }

    #[tokio::test]
    async fn refusal_is_an_ack_not_an_error() {
        let exec = ScriptedExecutor {
            calls: Mutex::new(Vec::new()),
            reachable: true,
            accept: false,
        };
        let ack = exec.run_now("job-42").await.unwrap();
        assert!(!ack.ok);
        assert_eq!(ack.status, 403);
    }

    #[tokio::test]
    async fn transport_failure_carries_textual_reason() {
        let exec = ScriptedExecutor {
            calls: Mutex::new(Vec::new()),
            reachable: false,
            accept: true,
        };
        let err = exec.run_now("job-42").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }
}
