use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Every job carries its own IANA zone; this is only the fallback applied to
/// jobs that leave the field blank.
pub const DEFAULT_TIMEZONE: &str = "Asia/Taipei";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_BATCH: usize = 20;
pub const DEFAULT_CONTROL_URL: &str = "http://127.0.0.1:5055";

/// Top-level config (tempo.toml + TEMPO_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TempoConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Scheduling defaults consumed by the store and the external poll loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fallback IANA zone for jobs without an explicit `timezone`.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// Cadence at which the external timer polls for due jobs.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_sec: u64,
    /// Maximum due jobs fetched per poll.
    #[serde(default = "default_batch")]
    pub batch: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            poll_interval_sec: default_poll_interval(),
            batch: default_batch(),
        }
    }
}

impl SchedulerConfig {
    /// Parse `default_timezone` into a real zone, failing loudly on an
    /// unrecognised name rather than falling back to UTC.
    pub fn default_tz(&self) -> crate::error::Result<chrono_tz::Tz> {
        self.default_timezone.parse::<chrono_tz::Tz>().map_err(|_| {
            crate::error::CoreError::Config(format!(
                "unknown default_timezone: {}",
                self.default_timezone
            ))
        })
    }
}

/// Where the long-running executor process listens for "run job N now".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_control_url")]
    pub control_url: String,
    /// Shared secret sent as X-Token; `None` disables the check.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            control_url: default_control_url(),
            token: None,
        }
    }
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_batch() -> usize {
    DEFAULT_BATCH
}
fn default_control_url() -> String {
    DEFAULT_CONTROL_URL.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.tempo/tempo.db")
}

impl TempoConfig {
    /// Load config from a TOML file with TEMPO_* env var overrides.
    ///
    /// Falls back to `~/.tempo/tempo.toml` when no explicit path is given.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TempoConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TEMPO_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.tempo/tempo.toml")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = TempoConfig::default();
        assert_eq!(cfg.scheduler.default_timezone, "Asia/Taipei");
        assert_eq!(cfg.scheduler.poll_interval_sec, 2);
        assert_eq!(cfg.scheduler.batch, 20);
        assert!(cfg.executor.token.is_none());
    }

    #[test]
    fn default_tz_parses() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.default_tz().unwrap(), chrono_tz::Asia::Taipei);
    }

    #[test]
    fn unknown_default_tz_is_config_error() {
        let cfg = SchedulerConfig {
            default_timezone: "Mars/Olympus_Mons".into(),
            ..SchedulerConfig::default()
        };
        assert!(cfg.default_tz().is_err());
    }
}
