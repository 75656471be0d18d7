//! `tempo-dispatch` — the outbound half of the executor boundary.
//!
//! The executor is a separate long-running process that performs the actual
//! HTTP/MQTT sends. This crate only *signals* it ("run job N now") over its
//! control endpoint; completed attempts flow back into `tempo-scheduler`'s
//! `RunRecorder` out of band.

pub mod client;
pub mod error;
pub mod signal;

pub use client::HttpExecutorClient;
pub use error::{DispatchError, Result};
pub use signal::{ExecutorAck, ExecutorSignal};
