//! Channel registrations.

use crate::acl::{AclFlags, AclId, AclTarget};
use crate::error::ChannelError;
use crate::services::HookEvent;
use crate::soft_assert;
use crate::state::Matrix;
use crate::state::entity::Metadata;
use crate::state::uid::EntityId;
use bitflags::bitflags;
use tracing::{debug, info};

bitflags! {
    /// Channel registration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct ChannelFlags: u32 {
        /// Never expires.
        const HOLD        = 0x0000_0001;
        const NOOP        = 0x0000_0002;
        /// Only flag holders with `+f` and the founder's level may edit
        /// access above their own.
        const LIMITFLAGS  = 0x0000_0004;
        const SECURE      = 0x0000_0008;
        const VERBOSE     = 0x0000_0010;
        const RESTRICTED  = 0x0000_0020;
        const KEEPTOPIC   = 0x0000_0040;
        const VERBOSE_OPS = 0x0000_0080;
        const TOPICLOCK   = 0x0000_0100;
        const GUARD       = 0x0000_0200;
        const PRIVATE     = 0x0000_0400;
        const NOSYNC      = 0x0000_0800;
        const ANTIFLOOD   = 0x0000_1000;
        const PUBACL      = 0x0000_2000;
    }
}

/// Longest rendering of [`Matrix::founder_names`].
pub const FOUNDER_NAMES_MAX: usize = 512;

/// Modes pinned on or off by the registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeLock {
    /// Mode bits forced on.
    pub on: u32,
    /// Mode bits forced off.
    pub off: u32,
    pub limit: u32,
    pub key: Option<String>,
    /// Parameterized modes outside the bitmask, kept opaque.
    pub ext: String,
}

/// A registered channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelReg {
    pub name: String,
    pub registered: i64,
    /// Last time the channel was seen in use.
    pub used: i64,
    pub flags: ChannelFlags,
    pub mlock: ModeLock,
    pub metadata: Metadata,
    /// Access entries in insertion order.
    pub(crate) acl: Vec<AclId>,
}

impl ChannelReg {
    pub fn acl_ids(&self) -> &[AclId] {
        &self.acl
    }
}

impl Matrix {
    pub fn channel(&self, name: &str) -> Option<&ChannelReg> {
        self.channels.get(name)
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut ChannelReg> {
        self.channels.get_mut(name)
    }

    /// Registered channels, in folded order.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelReg> {
        self.channels.values()
    }

    /// Create an empty registration.
    pub fn channel_add(&mut self, name: &str) -> Result<(), ChannelError> {
        if !name.starts_with('#') {
            return Err(ChannelError::InvalidName(name.to_string()));
        }
        let now = self.now();
        let record = ChannelReg {
            name: name.to_string(),
            registered: now,
            used: now,
            ..ChannelReg::default()
        };
        if self.channels.insert(name, record).is_err() {
            return Err(ChannelError::Exists(name.to_string()));
        }

        debug!(channel = %name, live = self.is_live(name), "Channel registration created");
        Ok(())
    }

    /// Register a channel to a founder with the initial founder flags and
    /// announce it to observers.
    pub fn channel_register(&mut self, name: &str, founder: &EntityId) -> Result<(), ChannelError> {
        if self.entities.get(founder).is_none() {
            return Err(ChannelError::NotRegistered(name.to_string()));
        }
        self.channel_add(name)?;

        let level = AclFlags::INITIAL & self.policy.all();
        self.acl_add(name, AclTarget::Entity(founder.clone()), level, None);

        info!(channel = %name, founder = %self.entity_name(founder).unwrap_or_default(), "Channel registered");
        self.hook_call(&mut HookEvent::ChannelRegister {
            channel: name.to_string(),
        });
        Ok(())
    }

    /// Delete a registration together with all its access entries.
    pub fn channel_delete(&mut self, name: &str) -> bool {
        let Some(ids) = self.channels.get(name).map(|c| c.acl.clone()) else {
            return false;
        };
        for id in ids {
            self.acl_delete(id);
        }

        let Some(record) = self.channels.remove(name) else {
            return false;
        };
        debug!(channel = %record.name, "Channel registration deleted");
        true
    }

    /// Number of entity entries holding the founder flag.
    pub fn num_founders(&self, channel: &str) -> usize {
        self.founder_ids(channel).len()
    }

    pub(crate) fn founder_ids(&self, channel: &str) -> Vec<EntityId> {
        self.acl_entries(channel)
            .filter(|e| e.level.contains(AclFlags::FOUNDER))
            .filter_map(|e| e.target.entity().cloned())
            .collect()
    }

    /// Names of all founders, joined with ", ". The rendering is cut at
    /// [`FOUNDER_NAMES_MAX`] bytes on a name boundary.
    pub fn founder_names(&self, channel: &str) -> String {
        let mut out = String::new();
        for id in self.founder_ids(channel) {
            let Some(name) = self.entity_name(&id) else {
                continue;
            };
            let extra = if out.is_empty() { name.len() } else { name.len() + 2 };
            if out.len() + extra > FOUNDER_NAMES_MAX {
                break;
            }
            if !out.is_empty() {
                out.push_str(", ");
            }
            out.push_str(name);
        }
        out
    }

    /// Is the channel occupied by someone holding a flag that keeps the
    /// registration fresh?
    pub fn isused(&self, channel: &str) -> bool {
        let Some(live) = self.live_channels.get(channel) else {
            return false;
        };
        live.members.iter().any(|uid| {
            self.users.get(uid).is_some_and(|user| {
                self.user_flags_depth(channel, user, 0)
                    .intersects(AclFlags::USEDUPDATE)
            })
        })
    }

    /// Does the channel currently exist on the network?
    pub fn is_live(&self, channel: &str) -> bool {
        self.live_channels.contains(channel)
    }

    /// Drop a registration through the full sequence: notify observers,
    /// part the services client if present, delete.
    pub(crate) fn channel_drop(&mut self, name: &str) -> bool {
        soft_assert!(self.channels.contains(name), false);
        self.hook_call(&mut HookEvent::ChannelDrop {
            channel: name.to_string(),
        });
        if self.is_live(name) {
            self.push_effect(crate::services::ServiceEffect::Part {
                channel: name.to_string(),
            });
        }
        self.channel_delete(name)
    }
}
