//! Configuration management for the client.

use offsync_engine::ConflictStrategy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of queued items at which a category is synced in bulk.
pub const DEFAULT_BULK_SYNC_THRESHOLD: usize = 5;
/// Default deadline for a reachability probe.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
/// Default period of the reachability probe while changes are pending.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(60);

/// Tuning for the sync scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Conflict strategy for every category
    pub strategy: ConflictStrategy,
    /// Queued-item count at which a category switches to one bulk write
    pub bulk_sync_threshold: usize,
    /// Deadline for a reachability probe
    pub health_timeout: Duration,
    /// Period of the reachability probe while changes are pending
    pub health_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            strategy: ConflictStrategy::default(),
            bulk_sync_threshold: DEFAULT_BULK_SYNC_THRESHOLD,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }
}

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote data service
    pub remote_url: Option<String>,
    /// Directory for the file-backed local store
    pub data_dir: PathBuf,
    /// Scheduler tuning
    pub sync: SyncOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_url: None,
            data_dir: PathBuf::from(".offsync"),
            sync: SyncOptions::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let remote_url = lookup("REMOTE_URL").filter(|url| !url.trim().is_empty());

        let data_dir = lookup("OFFSYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let strategy = match lookup("CONFLICT_STRATEGY") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidStrategy(value))?,
            None => defaults.sync.strategy,
        };

        let bulk_sync_threshold = match lookup("BULK_SYNC_THRESHOLD") {
            Some(value) => match value.parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => return Err(ConfigError::InvalidNumber("BULK_SYNC_THRESHOLD", value)),
            },
            None => defaults.sync.bulk_sync_threshold,
        };

        let health_timeout = match lookup("HEALTH_TIMEOUT_MS") {
            Some(value) => match value.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => return Err(ConfigError::InvalidNumber("HEALTH_TIMEOUT_MS", value)),
            },
            None => defaults.sync.health_timeout,
        };

        let health_interval = match lookup("HEALTH_INTERVAL_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidNumber("HEALTH_INTERVAL_SECS", value)),
            },
            None => defaults.sync.health_interval,
        };

        Ok(Self {
            remote_url,
            data_dir,
            sync: SyncOptions {
                strategy,
                bulk_sync_threshold,
                health_timeout,
                health_interval,
            },
        })
    }

    /// The remote URL, required by the agent.
    pub fn require_remote_url(&self) -> Result<&str, ConfigError> {
        self.remote_url
            .as_deref()
            .ok_or(ConfigError::MissingRemoteUrl)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("REMOTE_URL environment variable is required")]
    MissingRemoteUrl,

    #[error("Invalid CONFLICT_STRATEGY value: {0}")]
    InvalidStrategy(String),

    #[error("Invalid {0} value: {1}")]
    InvalidNumber(&'static str, String),
}
