//! Configuration
//!
//! Defaults suit a single-user install; each field can be overridden from
//! the environment.
//!
//! | Variable                           | Field                  |
//! |------------------------------------|------------------------|
//! | `LIFE_LEDGER_DATA_DIR`             | `data_dir`             |
//! | `LIFE_LEDGER_COMPACTION_THRESHOLD` | `compaction.threshold` |
//! | `LIFE_LEDGER_SYNC_TIMEOUT_SECS`    | `sync_timeout`         |
//! | `LIFE_LEDGER_DEVICE`               | `device`               |
//! | `LEDGER_AUTHORITY_ADDR`            | `AuthorityConfig::addr`|
//! | `LEDGER_AUTHORITY_LOG`             | `AuthorityConfig::log_path` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::event_store::{CompactionPolicy, EventStoreConfig};
use crate::utils::default_device;
use crate::windows::UsageCaps;

pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_AUTHORITY_ADDR: &str = "127.0.0.1:8787";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for one device's ledger
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub data_dir: PathBuf,
    pub compaction: CompactionPolicy,
    pub caps: UsageCaps,
    /// Bound on each network call made by a sync pass
    pub sync_timeout: Duration,
    /// Recorded on locally created events
    pub device: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            compaction: CompactionPolicy::default(),
            caps: UsageCaps::default(),
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
            device: default_device(),
        }
    }
}

impl LedgerConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = lookup("LIFE_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(threshold) = parse(&lookup, "LIFE_LEDGER_COMPACTION_THRESHOLD")? {
            if threshold == 0 {
                return Err(ConfigError::Invalid {
                    key: "LIFE_LEDGER_COMPACTION_THRESHOLD",
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.compaction.threshold = threshold;
        }
        if let Some(secs) = parse::<u64>(&lookup, "LIFE_LEDGER_SYNC_TIMEOUT_SECS")? {
            config.sync_timeout = Duration::from_secs(secs);
        }
        if let Some(device) = lookup("LIFE_LEDGER_DEVICE").filter(|d| !d.trim().is_empty()) {
            config.device = device;
        }
        Ok(config)
    }

    pub fn store_config(&self) -> EventStoreConfig {
        EventStoreConfig::new(&self.data_dir)
    }
}

/// Settings for the `ledger-authority` server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityConfig {
    pub addr: SocketAddr,
    /// JSON Lines file the authority persists its log to; in memory when unset
    pub log_path: Option<PathBuf>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            log_path: None,
        }
    }
}

impl AuthorityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(addr) = parse(&lookup, "LEDGER_AUTHORITY_ADDR")? {
            config.addr = addr;
        }
        config.log_path = lookup("LEDGER_AUTHORITY_LOG").map(PathBuf::from);
        Ok(config)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: value.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
