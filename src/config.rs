//! Configuration types for hiperfetch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Transfer engine settings (admission and connection pooling)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum transfers in flight at once (None = unbounded)
    ///
    /// Submissions beyond the cap are queued and started as running
    /// transfers complete; they are never rejected.
    #[serde(default)]
    pub max_parallel_transfers: Option<usize>,

    /// Maximum connections per host kept by the transport (None = transport default)
    #[serde(default)]
    pub max_host_connections: Option<usize>,

    /// Maximum connections overall kept by the transport (None = transport default)
    #[serde(default)]
    pub max_total_connections: Option<usize>,
}

/// Job intake settings (named pipe and batching)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Path of the named pipe URLs are written into (default: "hiper.fifo")
    #[serde(default = "default_fifo_path")]
    pub fifo_path: PathBuf,

    /// Submissions performed per intake invocation before yielding (default: 120)
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Longest token accepted as a URL; longer tokens are truncated (default: 1023)
    #[serde(default = "default_max_token_len")]
    pub max_token_len: usize,

    /// Interval of the fallback intake poll (default: 4 seconds)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            fifo_path: default_fifo_path(),
            batch_limit: default_batch_limit(),
            max_token_len: default_max_token_len(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Per-transfer options handed to the transport unmodified
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// User-Agent header (None = transport default)
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Connection timeout in seconds (None = transport default)
    #[serde(default, with = "opt_duration_serde")]
    pub connect_timeout: Option<Duration>,

    /// Whole-transfer timeout in seconds (None = no limit)
    #[serde(default, with = "opt_duration_serde")]
    pub timeout: Option<Duration>,

    /// Follow HTTP redirects (default: true)
    #[serde(default = "default_true")]
    pub follow_redirects: bool,

    /// Largest body kept per transfer (None = unbounded)
    ///
    /// A transfer whose body grows past the limit is aborted and drains with
    /// the bytes received so far and an error message.
    #[serde(default)]
    pub max_body_bytes: Option<usize>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            connect_timeout: None,
            timeout: None,
            follow_redirects: true,
            max_body_bytes: None,
        }
    }
}

/// Which completion field is stored in the `name` column
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    /// Store the source URL (default)
    #[default]
    Url,
    /// Store the response body, decoded lossily as UTF-8
    Body,
}

/// Where completions go
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkBackend {
    /// Store rows in the SQLite database (default)
    #[default]
    Sqlite,
    /// Log each completion and discard the body
    Log,
}

/// Data storage settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Completion sink backend (default: sqlite)
    #[serde(default)]
    pub backend: SinkBackend,

    /// Database path (default: "./hiperfetch.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Field persisted as the row name (default: url)
    #[serde(default)]
    pub name_source: NameSource,

    /// Persist transfers that ended with an error (default: true)
    #[serde(default = "default_true")]
    pub record_failures: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: SinkBackend::default(),
            database_path: default_database_path(),
            name_source: NameSource::default(),
            record_failures: true,
        }
    }
}

/// Main configuration for the fetch daemon
///
/// Every section and every field has a default, so an empty JSON object is a
/// valid configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transfer engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Job intake settings
    #[serde(default)]
    pub intake: IntakeConfig,

    /// Per-transfer transport options
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Completion persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load a configuration from a JSON file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                "config",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.intake.batch_limit == 0 {
            return Err(Error::config("intake.batch_limit", "must be at least 1"));
        }
        if self.intake.max_token_len == 0 {
            return Err(Error::config("intake.max_token_len", "must be at least 1"));
        }
        if self.intake.poll_interval.is_zero() {
            return Err(Error::config(
                "intake.poll_interval",
                "must be at least 1 second",
            ));
        }
        if self.engine.max_parallel_transfers == Some(0) {
            return Err(Error::config(
                "engine.max_parallel_transfers",
                "must be at least 1 when set",
            ));
        }
        if self.transfer.max_body_bytes == Some(0) {
            return Err(Error::config(
                "transfer.max_body_bytes",
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

fn default_fifo_path() -> PathBuf {
    PathBuf::from("hiper.fifo")
}

fn default_batch_limit() -> usize {
    120
}

fn default_max_token_len() -> usize {
    1023
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(4)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./hiperfetch.db")
}

fn default_true() -> bool {
    true
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod opt_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.intake.fifo_path, PathBuf::from("hiper.fifo"));
        assert_eq!(config.intake.batch_limit, 120);
        assert_eq!(config.intake.max_token_len, 1023);
        assert_eq!(config.intake.poll_interval, Duration::from_secs(4));
        assert_eq!(config.engine.max_parallel_transfers, None);
        assert!(config.transfer.follow_redirects);
        assert_eq!(config.persistence.name_source, NameSource::Url);
        assert!(config.persistence.record_failures);
        assert_eq!(config.persistence.backend, SinkBackend::Sqlite);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let json = r#"{
            "engine": { "max_parallel_transfers": 450 },
            "intake": { "batch_limit": 10, "poll_interval": 2 },
            "transfer": { "timeout": 30, "max_body_bytes": 512000 },
            "persistence": { "name_source": "body", "backend": "log" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.engine.max_parallel_transfers, Some(450));
        assert_eq!(config.intake.batch_limit, 10);
        assert_eq!(config.intake.max_token_len, 1023);
        assert_eq!(config.intake.poll_interval, Duration::from_secs(2));
        assert_eq!(config.transfer.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.transfer.connect_timeout, None);
        assert_eq!(config.transfer.max_body_bytes, Some(512_000));
        assert_eq!(config.persistence.name_source, NameSource::Body);
        assert_eq!(config.persistence.backend, SinkBackend::Log);
    }

    #[test]
    fn validate_rejects_zero_batch_limit() {
        let mut config = Config::default();
        config.intake.batch_limit = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "intake.batch_limit"));
    }

    #[test]
    fn validate_rejects_zero_parallel_cap() {
        let mut config = Config::default();
        config.engine.max_parallel_transfers = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hiperfetch.json");
        std::fs::write(&path, r#"{ "intake": { "fifo_path": "/tmp/urls.fifo" } }"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.intake.fifo_path, PathBuf::from("/tmp/urls.fifo"));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn timeouts_serialize_as_seconds() {
        let mut config = Config::default();
        config.transfer.connect_timeout = Some(Duration::from_secs(5));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["transfer"]["connect_timeout"], 5);
        assert!(value["transfer"]["timeout"].is_null());
        assert_eq!(value["intake"]["poll_interval"], 4);
    }
}
