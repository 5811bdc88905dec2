//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Services Defaults
// =============================================================================

pub fn default_id_prefix() -> String {
    "AAA".to_string()
}

// =============================================================================
// Account Defaults
// =============================================================================

/// Five weeks.
pub fn default_expiry() -> u64 {
    35 * 24 * 60 * 60
}

pub fn default_max_logins() -> usize {
    5
}

pub fn default_max_certfp() -> usize {
    20
}

pub fn default_max_access_masks() -> usize {
    5
}

// =============================================================================
// Channel Defaults
// =============================================================================

pub fn default_max_channels() -> usize {
    5
}

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "services.db".to_string()
}

pub fn default_save_interval() -> u64 {
    300
}

// =============================================================================
// Expire Defaults
// =============================================================================

pub fn default_expire_interval() -> u64 {
    3600
}
