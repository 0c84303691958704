//! Configuration types for the adtrack validator

mod settings;
mod store;

pub use settings::{ConversionRateLimit, FormulaParams, Setting};
pub use store::{PostgresConfig, StorageConfig, StorageType, StoresConfig};

use {
    crate::{
        errors::{Error, Result},
        utils,
    },
    serde::{Deserialize, Serialize},
    std::{collections::HashMap, fs, path::Path, time::Duration},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Identity this validator signs its observations with.
    pub hotkey: String,
    #[serde(default)]
    pub feed_url: Option<String>,
    /// Address book for peer identities, hotkey -> base url.
    #[serde(default)]
    pub peers: HashMap<String, String>,
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Seconds after which a repeat visit from the same ip counts as a return.
    #[serde(default = "default_return_window_secs")]
    pub return_window_secs: u64,
    #[serde(default = "default_migration_age_days")]
    pub migration_age_days: u64,
    #[serde(default = "default_migration_batch_size")]
    pub migration_batch_size: usize,
    #[serde(default = "default_ndigits")]
    pub ndigits: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Periods and limits of the control loop. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_cycle_secs")]
    pub cycle_secs: u64,
    #[serde(default = "default_ping_period_secs")]
    pub ping_period_secs: u64,
    #[serde(default = "default_sales_completion_secs")]
    pub sales_completion_secs: u64,
    #[serde(default = "default_migration_period_secs")]
    pub migration_period_secs: u64,
    #[serde(default = "default_peer_timeout_secs")]
    pub peer_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_sync_limit")]
    pub sync_limit: usize,
    #[serde(default = "default_queue_batch_size")]
    pub queue_batch_size: usize,
    #[serde(default = "default_queue_max_attempts")]
    pub queue_max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_secs: default_cycle_secs(),
            ping_period_secs: default_ping_period_secs(),
            sales_completion_secs: default_sales_completion_secs(),
            migration_period_secs: default_migration_period_secs(),
            peer_timeout_secs: default_peer_timeout_secs(),
            max_concurrent_requests: default_max_concurrent_requests(),
            sync_limit: default_sync_limit(),
            queue_batch_size: default_queue_batch_size(),
            queue_max_attempts: default_queue_max_attempts(),
        }
    }
}

impl SchedulerConfig {
    pub fn cycle(&self) -> Duration {
        Duration::from_secs(self.cycle_secs)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            hotkey: "validator".to_string(),
            feed_url: None,
            peers: HashMap::new(),
            stores: StoresConfig::default(),
            scheduler: SchedulerConfig::default(),
            return_window_secs: default_return_window_secs(),
            migration_age_days: default_migration_age_days(),
            migration_batch_size: default_migration_batch_size(),
            ndigits: default_ndigits(),
            log_level: default_log_level(),
        }
    }
}

impl ValidatorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str::<Self>(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hotkey.trim().is_empty() {
            return Err(Error::Config("hotkey must not be empty".to_string()));
        }
        if self.scheduler.cycle_secs == 0 {
            return Err(Error::Config("scheduler.cycle_secs must be positive".to_string()));
        }
        if self.scheduler.max_concurrent_requests == 0 {
            return Err(Error::Config(
                "scheduler.max_concurrent_requests must be positive".to_string(),
            ));
        }
        if self.migration_batch_size == 0 {
            return Err(Error::Config("migration_batch_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn return_window(&self) -> chrono::TimeDelta {
        utils::seconds(self.return_window_secs)
    }

    pub fn migration_age(&self) -> chrono::TimeDelta {
        utils::days(self.migration_age_days)
    }
}

fn default_return_window_secs() -> u64 {
    3600
}

// Twice the reputation lookback of 30 days.
fn default_migration_age_days() -> u64 {
    60
}

fn default_migration_batch_size() -> usize {
    1000
}

fn default_ndigits() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cycle_secs() -> u64 {
    14
}

fn default_ping_period_secs() -> u64 {
    30 * 60
}

fn default_sales_completion_secs() -> u64 {
    5 * 60
}

fn default_migration_period_secs() -> u64 {
    60 * 60
}

fn default_peer_timeout_secs() -> u64 {
    12
}

fn default_max_concurrent_requests() -> usize {
    30
}

fn default_sync_limit() -> usize {
    2500
}

fn default_queue_batch_size() -> usize {
    10
}

fn default_queue_max_attempts() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Write};

    #[test]
    fn test_from_file_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "hotkey": "5Validator",
                "peers": {{"5Peer": "http://10.0.0.2:8080"}},
                "stores": {{"main": {{"storage_type": "postgres", "postgres": {{"connection_string": "postgres://localhost/main"}}}}}},
                "scheduler": {{"queue_batch_size": 25}}
            }}"#
        )
        .unwrap();

        let config = ValidatorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.hotkey, "5Validator");
        assert_eq!(config.peers.get("5Peer").map(String::as_str), Some("http://10.0.0.2:8080"));
        assert_eq!(config.stores.active.storage_type, StorageType::Memory);
        assert_eq!(config.stores.main.storage_type, StorageType::Postgres);
        assert_eq!(config.stores.main.postgres.as_ref().unwrap().max_connections, 5);
        assert_eq!(config.scheduler.queue_batch_size, 25);
        assert_eq!(config.scheduler.max_concurrent_requests, 30);
        assert_eq!(config.migration_batch_size, 1000);
        assert_eq!(config.return_window(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_empty_hotkey_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"hotkey": " "}}"#).unwrap();
        assert!(matches!(ValidatorConfig::from_file(file.path()), Err(Error::Config(_))));
    }
}
