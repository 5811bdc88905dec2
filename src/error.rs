//! Unified error handling for the services core.
//!
//! Guarded operations return one of the enums below. An `Err` always means
//! nothing was changed. Lookups that find nothing return `None` instead,
//! and caller bugs go through [`soft_assert!`](crate::soft_assert).

use crate::acl::AclFlags;
use thiserror::Error;

/// Log a failed invariant and return `$ret` from the enclosing function.
///
/// These indicate a caller bug; the core keeps running.
#[macro_export]
macro_rules! soft_assert {
    ($cond:expr, $ret:expr) => {
        if !($cond) {
            ::tracing::warn!(condition = stringify!($cond), "soft assertion failed");
            return $ret;
        }
    };
}

// ============================================================================
// Account Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("account {0} already exists")]
    Exists(String),

    #[error("no such account: {0}")]
    NotFound(String),

    #[error("name {0} is already registered")]
    NameInUse(String),

    #[error("nickname {0} is already registered")]
    NickInUse(String),

    #[error("account {0} has reached its login limit")]
    LoginLimit(String),

    #[error("access list for {0} is full")]
    AccessListFull(String),

    #[error("access mask {0} is already listed")]
    AccessExists(String),

    #[error("fingerprint limit reached for {0}")]
    CertFpLimit(String),

    #[error("fingerprint {0} is already registered")]
    CertFpInUse(String),

    #[error("no such user: {0}")]
    NoSuchUser(String),

    #[error("credential backend failure: {0}")]
    Credential(String),
}

impl AccountError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Exists(_) => "account_exists",
            Self::NotFound(_) => "account_not_found",
            Self::NameInUse(_) => "name_in_use",
            Self::NickInUse(_) => "nick_in_use",
            Self::LoginLimit(_) => "login_limit",
            Self::AccessListFull(_) => "access_list_full",
            Self::AccessExists(_) => "access_exists",
            Self::CertFpLimit(_) => "certfp_limit",
            Self::CertFpInUse(_) => "certfp_in_use",
            Self::NoSuchUser(_) => "no_such_user",
            Self::Credential(_) => "credential_error",
        }
    }
}

// ============================================================================
// Channel Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel {0} is already registered")]
    Exists(String),

    #[error("invalid channel name: {0}")]
    InvalidName(String),

    #[error("channel {0} is not registered")]
    NotRegistered(String),
}

impl ChannelError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Exists(_) => "channel_exists",
            Self::InvalidName(_) => "invalid_channel_name",
            Self::NotRegistered(_) => "channel_not_registered",
        }
    }
}

// ============================================================================
// Access Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    /// The change touches flags outside what the caller may edit.
    #[error("permission denied: change needs {needed:?}, caller may edit {allowed:?}")]
    Denied { needed: AclFlags, allowed: AclFlags },

    #[error("channel {0} is not registered")]
    NoSuchChannel(String),

    #[error("no such entity: {0}")]
    NoSuchEntity(String),

    #[error("no such access entry")]
    NoSuchEntry,

    #[error("access list of {0} is full")]
    TableFull(String),
}

impl AclError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Denied { .. } => "acl_denied",
            Self::NoSuchChannel(_) => "no_such_channel",
            Self::NoSuchEntity(_) => "no_such_entity",
            Self::NoSuchEntry => "no_such_entry",
            Self::TableFull(_) => "acl_table_full",
        }
    }
}

// ============================================================================
// Group Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("group {0} already exists")]
    Exists(String),

    #[error("no such group: {0}")]
    NotFound(String),

    #[error("group names must start with '!': {0}")]
    InvalidName(String),

    #[error("{0} is already a member")]
    AlreadyMember(String),
}

// ============================================================================
// Operator Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperError {
    #[error("operclass {0} is built in")]
    Builtin(String),

    #[error("no such operclass: {0}")]
    NoSuchClass(String),

    #[error("{0} is already a services operator")]
    Duplicate(String),

    #[error("{0} is a services operator from configuration")]
    ConfigOwned(String),
}

// ============================================================================
// Snapshot Errors
// ============================================================================

/// Errors raised while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("snapshot i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("snapshot version {0} is newer than this build supports")]
    UnsupportedVersion(u32),

    #[error("cannot store {0:?} as a single field")]
    Unencodable(String),
}

impl DbError {
    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }
}
