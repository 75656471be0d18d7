//! Dispatch-target types — shared between the scheduler (which validates them
//! at the edit boundary) and the executor process (which performs the actual
//! send; out of scope here).

use serde::{Deserialize, Serialize};

/// Where a fired job's payload goes. Stored as a JSON string in the
/// `jobs.target` column; the recurrence engine treats it as opaque apart from
/// edit-time validation of the required destination fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "UPPERCASE")]
pub enum DispatchTarget {
    Http {
        url: String,
        #[serde(default = "default_http_method")]
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
        /// Extra request headers as a JSON object.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<serde_json::Value>,
    },
    Mqtt {
        topic: String,
        #[serde(default)]
        qos: u8,
        #[serde(default)]
        retained: bool,
    },
}

fn default_http_method() -> String {
    "POST".to_string()
}

impl DispatchTarget {
    /// Wire name of the channel: `"HTTP"` or `"MQTT"`.
    pub fn channel_name(&self) -> &'static str {
        match self {
            DispatchTarget::Http { .. } => "HTTP",
            DispatchTarget::Mqtt { .. } => "MQTT",
        }
    }

    /// Edit-time check that the required destination field is present.
    /// Returns the missing field name on failure.
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        match self {
            DispatchTarget::Http { url, .. } if url.trim().is_empty() => Err("url"),
            DispatchTarget::Mqtt { topic, .. } if topic.trim().is_empty() => Err("topic"),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
