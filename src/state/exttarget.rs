//! Extended targets: synthetic entities like `$chanacs:#staff` that match
//! live users by a rule instead of by identity.

use crate::acl::AclFlags;
use crate::matching::wildcard_match;
use crate::state::Matrix;
use crate::state::entity::{Entity, EntityData, EntityKind};
use crate::state::uid::EntityId;
use crate::state::user::User;
use tracing::debug;

/// Deepest `$chanacs` nesting followed before giving up.
pub const EXTTARGET_MAX_DEPTH: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtTarget {
    /// Anyone with non-ban access to the channel.
    ChanAcs { channel: String },
    /// Anyone currently in the channel.
    Channel { channel: String },
    /// Anyone connected through a matching server.
    Server { mask: String },
}

impl ExtTarget {
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix('$')?;
        let (kind, param) = rest.split_once(':')?;
        if param.is_empty() {
            return None;
        }

        match kind.to_ascii_lowercase().as_str() {
            "chanacs" if param.starts_with('#') => Some(Self::ChanAcs {
                channel: param.to_string(),
            }),
            "channel" if param.starts_with('#') => Some(Self::Channel {
                channel: param.to_string(),
            }),
            "server" => Some(Self::Server {
                mask: param.to_string(),
            }),
            _ => None,
        }
    }

    /// Canonical `$kind:param` name.
    pub fn name(&self) -> String {
        match self {
            Self::ChanAcs { channel } => format!("$chanacs:{channel}"),
            Self::Channel { channel } => format!("$channel:{channel}"),
            Self::Server { mask } => format!("$server:{mask}"),
        }
    }
}

impl Matrix {
    /// Look up an extended target by name, creating it if the name parses.
    pub fn exttarget_find_or_create(&mut self, name: &str) -> Option<EntityId> {
        let ext = ExtTarget::parse(name)?;
        let canonical = ext.name();
        if let Some(entity) = self.entity_find(&canonical) {
            return (entity.kind() == EntityKind::ExtTarget).then(|| entity.id.clone());
        }

        let id = self.alloc_id();
        let entity = Entity {
            id: id.clone(),
            name: canonical.clone(),
            data: EntityData::ExtTarget(ext),
        };
        if !self.entity_put(entity) {
            return None;
        }
        debug!(target = %canonical, id = %id, "Extended target created");
        Some(id)
    }

    pub(crate) fn ext_matches_user(&self, ext: &ExtTarget, user: &User, depth: u32) -> bool {
        match ext {
            ExtTarget::ChanAcs { channel } => {
                if depth >= EXTTARGET_MAX_DEPTH {
                    return false;
                }
                let flags = self.user_flags_depth(channel, user, depth + 1);
                !flags.is_empty() && !flags.contains(AclFlags::AKICK)
            }
            ExtTarget::Channel { channel } => self
                .live_channels
                .get(channel)
                .is_some_and(|live| live.members.iter().any(|m| m == &user.uid)),
            ExtTarget::Server { mask } => wildcard_match(mask, &user.server),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        assert_eq!(
            ExtTarget::parse("$chanacs:#staff"),
            Some(ExtTarget::ChanAcs {
                channel: "#staff".into()
            })
        );
        assert_eq!(
            ExtTarget::parse("$SERVER:*.eu"),
            Some(ExtTarget::Server { mask: "*.eu".into() })
        );
        assert_eq!(ExtTarget::parse("$channel:staff"), None);
        assert_eq!(ExtTarget::parse("$bogus:x"), None);
        assert_eq!(ExtTarget::parse("chanacs:#x"), None);
    }

    #[test]
    fn name_is_canonical() {
        let ext = ExtTarget::parse("$ChanAcs:#Staff").unwrap();
        assert_eq!(ext.name(), "$chanacs:#Staff");
    }
}
