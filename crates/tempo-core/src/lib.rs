//! `tempo-core` — configuration, shared error type, and the dispatch-target
//! types shared between the scheduler and the executor boundary.

pub mod config;
pub mod error;
pub mod types;

pub use config::TempoConfig;
pub use error::{CoreError, Result};
pub use types::DispatchTarget;
