//! State management module.
//!
//! Contains the Matrix (services state) and the records it owns.

mod account;
mod channel;
mod credentials;
mod entity;
mod exttarget;
mod group;
mod matrix;
mod nick;
pub mod registry;
mod uid;
mod user;

pub use account::{Account, AccountFlags, MD_DOENFORCE, Memo};
pub use channel::{ChannelFlags, ChannelReg, FOUNDER_NAMES_MAX, ModeLock};
pub use credentials::{AUTHCOOKIE_TTL, AuthCookie, MD_FREEZE_FREEZER};
pub use entity::{Entity, EntityData, EntityKind, MD_RESTRICT_SETTER, Metadata};
pub use exttarget::{EXTTARGET_MAX_DEPTH, ExtTarget};
pub use group::{Group, GroupAccessFlags, GroupFlags, GroupMember};
pub use matrix::Matrix;
pub use nick::{MD_MARK_REASON, MD_MARK_SETTER, MD_MARK_TIMESTAMP, Nick, OldName};
pub use uid::{EntityId, IdAllocator};
pub use user::{LiveChannel, Uid, User};
