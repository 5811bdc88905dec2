//! Core configuration types.

use super::defaults::*;
use super::oper::{OperBlock, OperClassBlock};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Services configuration.
///
/// Every section is optional; an empty file yields a working setup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub expire: ExpireConfig,
    /// Operator classes, in declaration order.
    #[serde(default)]
    pub operclass: Vec<OperClassBlock>,
    /// Services operators declared by configuration.
    #[serde(default)]
    pub oper: Vec<OperBlock>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

/// General services identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    /// Three-character prefix of generated entity ids.
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
    /// Also test host-based access entries against the real host and IP
    /// of users whose displayed host differs.
    #[serde(default)]
    pub masks_through_vhost: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            id_prefix: default_id_prefix(),
            masks_through_vhost: false,
        }
    }
}

/// Account and nickname policy.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountsConfig {
    /// Every account owns a nickname equal to its name.
    #[serde(default = "default_true")]
    pub nick_ownership: bool,
    /// Seconds since last login (accounts) or last use (nicknames)
    /// before expiry. 0 disables.
    #[serde(default = "default_expiry")]
    pub expiry: u64,
    /// Concurrent sessions per account.
    #[serde(default = "default_max_logins")]
    pub max_logins: usize,
    /// Certificate fingerprints per account. 0 means unlimited.
    #[serde(default = "default_max_certfp")]
    pub max_certfp: usize,
    #[serde(default = "default_max_access_masks")]
    pub max_access_masks: usize,
    /// Permit password-less identification by access mask.
    #[serde(default = "default_true")]
    pub use_access: bool,
    /// Email domains whose local part ignores dots and `+suffix`.
    #[serde(default)]
    pub canonical_domains: Vec<String>,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            nick_ownership: true,
            expiry: default_expiry(),
            max_logins: default_max_logins(),
            max_certfp: default_max_certfp(),
            max_access_masks: default_max_access_masks(),
            use_access: true,
            canonical_domains: Vec::new(),
        }
    }
}

/// Channel registration policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    /// Seconds since last use before expiry. 0 disables.
    #[serde(default = "default_expiry")]
    pub expiry: u64,
    /// Founder entries an entity may hold before needing an exemption.
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,
    /// Access entries per channel. 0 means unlimited.
    #[serde(default)]
    pub max_acl_entries: usize,
    /// Network supports channel owners (`+q`).
    #[serde(default = "default_true")]
    pub owner: bool,
    /// Network supports protected users (`+a`).
    #[serde(default = "default_true")]
    pub protect: bool,
    #[serde(default = "default_true")]
    pub halfops: bool,
    /// Honor the per-channel LIMITFLAGS setting.
    #[serde(default = "default_true")]
    pub use_limitflags: bool,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            expiry: default_expiry(),
            max_channels: default_max_channels(),
            max_acl_entries: 0,
            owner: true,
            protect: true,
            halfops: true,
            use_limitflags: true,
        }
    }
}

/// Snapshot storage.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    /// Seconds between snapshot saves.
    #[serde(default = "default_save_interval")]
    pub save_interval: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            save_interval: default_save_interval(),
        }
    }
}

/// Expiration sweep scheduling.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpireConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_expire_interval")]
    pub interval: u64,
}

impl Default for ExpireConfig {
    fn default() -> Self {
        Self {
            interval: default_expire_interval(),
        }
    }
}
