//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config and its sections)
//! - [`oper`]: Operator class and services operator blocks
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup checks

mod defaults;
mod oper;
mod types;
pub mod validation;

pub use oper::{OperBlock, OperClassBlock, ResolvedOperClass, resolve_operclasses};
pub use types::{
    AccountsConfig, ChannelsConfig, Config, ConfigError, DatabaseConfig, ExpireConfig,
    ServicesConfig,
};
