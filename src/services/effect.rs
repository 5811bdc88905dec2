//! Effects queued for the protocol layer.

/// Unified effect type produced by core operations.
///
/// The core never talks to the network itself. Operations that need the
/// protocol layer to act (re-tag a user's login, tell a new founder about
/// their channel, leave a dropped channel) queue an effect instead, and the
/// driver drains them with [`Matrix::take_effects`](crate::state::Matrix::take_effects).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEffect {
    /// Mark a connected user as logged in to `account`.
    Login { uid: String, account: String },

    /// Clear a connected user's login.
    Logout { uid: String, account: String },

    /// Tell every session of an account something.
    AccountNotice { account: String, text: String },

    /// Announce something in a channel.
    ChannelNotice { channel: String, text: String },

    /// Services should leave a channel.
    Part { channel: String },
}
