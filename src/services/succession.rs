//! Founder succession.
//!
//! When the last founder of a channel goes away, a successor is elected
//! from the remaining access holders. Observers of
//! [`HookKind::ChannelPickSuccessor`](super::HookKind) may name one
//! outright; otherwise candidates are tried tier by tier.

use super::{HookEvent, ServiceEffect};
use crate::acl::{AclFlags, AclId, AclTarget};
use crate::state::{ChannelFlags, EntityId, Matrix};
use tracing::{debug, info};

/// An account logged in this recently counts as active.
pub const RECENTLY_SEEN: i64 = 7 * 24 * 60 * 60;

impl Matrix {
    /// Best holder of at least `min` on a channel, if any.
    ///
    /// Banned entries, host entries and existing founders never qualify.
    /// A candidate must have every flag the best so far has; on equal
    /// flags it must be recently active while the best so far is not.
    /// Remaining ties go to the earlier entry.
    pub fn pick_candidate(&self, channel: &str, min: AclFlags) -> Option<EntityId> {
        let now = self.now();
        let mut best: Option<(EntityId, AclFlags, bool)> = None;

        for entry in self.acl_entries(channel) {
            if entry.level.intersects(AclFlags::AKICK | AclFlags::FOUNDER) {
                continue;
            }
            let Some(entity) = entry.target.entity() else {
                continue;
            };
            if !entry.level.contains(min) {
                continue;
            }

            let recent = self
                .account(entity)
                .is_some_and(|a| !a.logins.is_empty() || now - a.last_login < RECENTLY_SEEN);
            let level = entry.level.with_auto();

            if let Some((_, hi_level, hi_recent)) = &best {
                if !(*hi_level - level).is_empty() {
                    continue;
                }
                if *hi_level == level && (!recent || *hi_recent) {
                    continue;
                }
            }
            if self.can_register_channel(entity) {
                best = Some((entity.clone(), level, recent));
            }
        }

        best.map(|(id, _, _)| id)
    }

    /// Elect a successor for a channel whose founder `leaving` is going away.
    pub fn pick_successor(&mut self, channel: &str, leaving: &EntityId) -> Option<EntityId> {
        let mut event = HookEvent::ChannelPickSuccessor {
            channel: channel.to_string(),
            successor: None,
        };
        self.hook_call(&mut event);
        if let HookEvent::ChannelPickSuccessor {
            successor: Some(id),
            ..
        } = event
            && &id != leaving
            && self.entities.contains_key(&id)
        {
            debug!(channel = %channel, successor = %id, "Successor chosen by observer");
            return Some(id);
        }

        let mut tiers = vec![AclFlags::RECOVER, AclFlags::FLAGS];
        if self.policy.supports_owner() {
            tiers.push(AclFlags::USEOWNER | AclFlags::AUTOOP);
        }
        tiers.push(AclFlags::OP);
        tiers.push(AclFlags::empty());

        tiers
            .into_iter()
            .find_map(|min| self.pick_candidate(channel, min))
    }

    /// Release every access entry of an entity that is going away.
    ///
    /// Sole founderships pass to a successor, or the channel is dropped
    /// when nobody qualifies. Entries are walked from a snapshot since
    /// observers may remove others along the way.
    pub(crate) fn release_entity_access(&mut self, id: &EntityId, name: &str) {
        let entries: Vec<AclId> = self.acl.of_entity(id).to_vec();

        for acl_id in entries {
            let Some((channel, level)) = self
                .acl
                .get(acl_id)
                .map(|e| (e.channel.clone(), e.level))
            else {
                continue;
            };

            if !level.contains(AclFlags::FOUNDER) || self.num_founders(&channel) != 1 {
                self.acl_delete(acl_id);
                continue;
            }

            match self.pick_successor(&channel, id) {
                Some(successor) => self.succeed(&channel, acl_id, &successor, name),
                None => {
                    info!(channel = %channel, account = %name, "DELETE: channel from dropped founder");
                    self.channel_drop(&channel);
                }
            }
        }
    }

    fn succeed(&mut self, channel: &str, old: AclId, successor: &EntityId, from: &str) {
        let successor_name = self.entity_name(successor).unwrap_or_default().to_string();
        info!(channel = %channel, successor = %successor_name, from = %from, "SUCCESSION");

        if self
            .channel(channel)
            .is_some_and(|c| c.flags.contains(ChannelFlags::VERBOSE))
        {
            self.push_effect(ServiceEffect::ChannelNotice {
                channel: channel.to_string(),
                text: format!("Foundership changed to {successor_name} because {from} was dropped."),
            });
        }

        let target = AclTarget::Entity(successor.clone());
        if let Err(e) = self.acl_change_simple(
            channel,
            &target,
            AclFlags::FOUNDER | AclFlags::FLAGS,
            AclFlags::empty(),
            None,
        ) {
            debug!(channel = %channel, error = %e, "Could not grant founder to successor");
        }

        self.hook_call(&mut HookEvent::ChannelSuccession {
            channel: channel.to_string(),
            successor: successor.clone(),
        });
        if self.account(successor).is_some() {
            self.push_effect(ServiceEffect::AccountNotice {
                account: successor_name.clone(),
                text: format!("You are now founder on {channel} (as {successor_name})."),
            });
        }

        self.acl_delete(old);
    }
}
