//! Guarded access mutations.
//!
//! A caller is described by its `restrict` mask: the flags it may edit.
//! A change is refused when it would add or remove a flag outside that
//! mask, or when the entry already holds one. Refusals leave the entry
//! untouched.

use super::{AclFlags, AclId, AclTarget, FlagDelta};
use crate::error::AclError;
use crate::soft_assert;
use crate::state::{ChannelFlags, EntityId, Matrix};
use tracing::debug;

/// Narrow a requested change to what would actually change on `level`.
fn effective_delta(level: AclFlags, add: AclFlags, remove: AclFlags) -> FlagDelta {
    let added = add - level;
    FlagDelta {
        added,
        removed: remove & (level - added),
    }
}

/// Check a delta against `restrict` for an entry currently at `level`.
fn check_restrict(level: AclFlags, delta: FlagDelta, restrict: AclFlags) -> Result<(), AclError> {
    let outside = (delta.added | delta.removed | level) - restrict;
    if outside.is_empty() {
        Ok(())
    } else {
        Err(AclError::Denied {
            needed: outside,
            allowed: restrict,
        })
    }
}

impl Matrix {
    /// Create an entry with `level` (masked to the supported flags).
    ///
    /// Returns `None` for caller bugs: a channel name without `#`, an
    /// unregistered channel or a missing target entity.
    pub fn acl_add(
        &mut self,
        channel: &str,
        target: AclTarget,
        level: AclFlags,
        setter: Option<EntityId>,
    ) -> Option<AclId> {
        soft_assert!(channel.starts_with('#'), None);
        soft_assert!(self.channels.contains(channel), None);
        let name = self.channels.get(channel).map(|c| c.name.clone())?;
        if let AclTarget::Entity(entity) = &target {
            soft_assert!(self.entities.contains_key(entity), None);
        }

        let now = self.now();
        let level = level & self.policy.all();
        debug!(channel = %name, target = ?target, level = ?level, "Access entry added");
        let id = self.acl.insert(&name, target, level, setter, now);
        if let Some(reg) = self.channels.get_mut(&name) {
            reg.acl.push(id);
        }
        Some(id)
    }

    /// Find the entry for exactly `target`, creating an empty one when
    /// `create` is set.
    pub fn acl_open(
        &mut self,
        channel: &str,
        target: &AclTarget,
        create: bool,
        setter: Option<EntityId>,
    ) -> Result<AclId, AclError> {
        if !self.channels.contains(channel) {
            return Err(AclError::NoSuchChannel(channel.to_string()));
        }
        if let Some(id) = self.acl_find_target(channel, target) {
            return Ok(id);
        }
        if !create {
            return Err(AclError::NoSuchEntry);
        }
        if let AclTarget::Entity(entity) = target
            && !self.entities.contains_key(entity)
        {
            return Err(AclError::NoSuchEntity(entity.to_string()));
        }
        if self.acl_is_table_full(channel, target) {
            return Err(AclError::TableFull(channel.to_string()));
        }

        self.acl_add(channel, target.clone(), AclFlags::empty(), setter)
            .ok_or_else(|| AclError::NoSuchChannel(channel.to_string()))
    }

    /// Literal entry for an entity or a host.
    fn acl_find_target(&self, channel: &str, target: &AclTarget) -> Option<AclId> {
        let entry = match target {
            AclTarget::Entity(entity) => self.acl_find_literal(channel, entity, AclFlags::empty()),
            AclTarget::Host(mask) => self.acl_find_host_literal(channel, mask, AclFlags::empty()),
        };
        entry.map(|e| e.id)
    }

    /// Apply a guarded change to an existing entry.
    ///
    /// Returns what actually changed; a request that changes nothing always
    /// succeeds. The entry is kept even if its level drops to nothing.
    pub fn acl_modify(
        &mut self,
        id: AclId,
        add: AclFlags,
        remove: AclFlags,
        restrict: AclFlags,
        setter: Option<EntityId>,
    ) -> Result<FlagDelta, AclError> {
        let now = self.now();
        let entry = self.acl.get_mut(id).ok_or(AclError::NoSuchEntry)?;

        let delta = effective_delta(entry.level, add, remove);
        if delta.is_empty() {
            return Ok(delta);
        }
        check_restrict(entry.level, delta, restrict)?;

        entry.level = (entry.level | delta.added) - delta.removed;
        entry.modified = now;
        entry.setter = setter;
        debug!(channel = %entry.channel, target = ?entry.target, level = ?entry.level, "Access entry modified");
        Ok(delta)
    }

    /// [`acl_modify`](Self::acl_modify) without a caller restriction.
    pub fn acl_modify_simple(
        &mut self,
        id: AclId,
        add: AclFlags,
        remove: AclFlags,
        setter: Option<EntityId>,
    ) -> Result<FlagDelta, AclError> {
        let all = self.policy.all();
        self.acl_modify(id, add, remove, all, setter)
    }

    /// Change the access of `target`, creating the entry if needed and
    /// deleting it when no flags remain.
    pub fn acl_change(
        &mut self,
        channel: &str,
        target: &AclTarget,
        add: AclFlags,
        remove: AclFlags,
        restrict: AclFlags,
        setter: Option<EntityId>,
    ) -> Result<FlagDelta, AclError> {
        if !self.channels.contains(channel) {
            return Err(AclError::NoSuchChannel(channel.to_string()));
        }

        let Some(id) = self.acl_find_target(channel, target) else {
            if add.is_empty() {
                return Ok(FlagDelta::default());
            }
            let delta = FlagDelta {
                added: add,
                removed: AclFlags::empty(),
            };
            check_restrict(AclFlags::empty(), delta, restrict)?;
            if let AclTarget::Entity(entity) = target
                && !self.entities.contains_key(entity)
            {
                return Err(AclError::NoSuchEntity(entity.to_string()));
            }

            let id = self
                .acl_add(channel, target.clone(), add, setter)
                .ok_or_else(|| AclError::NoSuchChannel(channel.to_string()))?;
            let added = self.acl.get(id).map(|e| e.level).unwrap_or_default();
            return Ok(FlagDelta {
                added,
                removed: AclFlags::empty(),
            });
        };

        let delta = self.acl_modify(id, add, remove, restrict, setter)?;
        if !delta.is_empty() && self.acl.get(id).is_some_and(|e| e.level.is_empty()) {
            self.acl_delete(id);
        }
        Ok(delta)
    }

    /// [`acl_change`](Self::acl_change) without a caller restriction.
    pub fn acl_change_simple(
        &mut self,
        channel: &str,
        target: &AclTarget,
        add: AclFlags,
        remove: AclFlags,
        setter: Option<EntityId>,
    ) -> Result<FlagDelta, AclError> {
        let all = self.policy.all();
        self.acl_change(channel, target, add, remove, all, setter)
    }

    /// Delete an entry, unlinking it from its channel and target.
    pub fn acl_delete(&mut self, id: AclId) -> bool {
        let Some(entry) = self.acl.remove(id) else {
            return false;
        };
        if let Some(reg) = self.channels.get_mut(&entry.channel) {
            reg.acl.retain(|a| *a != id);
        }
        debug!(channel = %entry.channel, target = ?entry.target, "Access entry deleted");

        if let AclTarget::Entity(entity) = &entry.target {
            self.release_if_unreferenced(entity);
        }
        true
    }

    /// Delete an entry left without flags, as after an [`acl_open`](Self::acl_open)
    /// that was never filled in.
    pub fn acl_close(&mut self, id: AclId) -> bool {
        if self.acl.get(id).is_some_and(|e| e.level.is_empty()) {
            return self.acl_delete(id);
        }
        false
    }

    /// Flags a holder of `theirs` may hand out on `channel`.
    pub fn allow_flags(&self, channel: &str, theirs: AclFlags) -> AclFlags {
        let limitflags = self.config.channels.use_limitflags
            && self
                .channels
                .get(channel)
                .is_some_and(|c| c.flags.contains(ChannelFlags::LIMITFLAGS));
        self.policy.allow_flags(theirs, limitflags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::AccountFlags;

    fn setup() -> (Matrix, EntityId) {
        let mut config = Config::default();
        config.accounts.nick_ownership = false;
        let mut m = Matrix::new(config);
        let alice = m
            .account_add("alice", "$x", "a@example.com", AccountFlags::CRYPTPASS)
            .unwrap();
        m.channel_register("#foo", &alice).unwrap();
        let bob = m
            .account_add("bob", "$x", "b@example.com", AccountFlags::CRYPTPASS)
            .unwrap();
        (m, bob)
    }

    #[test]
    fn escalation_to_founder_is_denied() {
        let (mut m, bob) = setup();
        let id = m
            .acl_add("#foo", AclTarget::Entity(bob), AclFlags::OP, None)
            .unwrap();
        let err = m
            .acl_modify(id, AclFlags::FOUNDER, AclFlags::empty(), AclFlags::OP | AclFlags::VOICE, None)
            .unwrap_err();
        assert_eq!(err.error_code(), "acl_denied");
        assert_eq!(m.acl.get(id).unwrap().level, AclFlags::OP);
    }

    #[test]
    fn no_op_change_succeeds_even_when_restricted() {
        let (mut m, bob) = setup();
        let id = m
            .acl_add("#foo", AclTarget::Entity(bob), AclFlags::SOP_DEF, None)
            .unwrap();
        let delta = m
            .acl_modify(id, AclFlags::OP, AclFlags::empty(), AclFlags::VOICE, None)
            .unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn cannot_touch_entries_above_restrict() {
        let (mut m, bob) = setup();
        let id = m
            .acl_add("#foo", AclTarget::Entity(bob), AclFlags::OP | AclFlags::VOICE, None)
            .unwrap();
        assert!(
            m.acl_modify(id, AclFlags::empty(), AclFlags::VOICE, AclFlags::VOICE, None)
                .is_err()
        );
    }

    #[test]
    fn delta_reports_actual_change() {
        let (mut m, bob) = setup();
        let id = m
            .acl_add("#foo", AclTarget::Entity(bob), AclFlags::VOICE | AclFlags::TOPIC, None)
            .unwrap();
        let delta = m
            .acl_modify_simple(id, AclFlags::VOICE | AclFlags::OP, AclFlags::TOPIC | AclFlags::INVITE, None)
            .unwrap();
        assert_eq!(delta.added, AclFlags::OP);
        assert_eq!(delta.removed, AclFlags::TOPIC);
        assert_eq!(m.acl.get(id).unwrap().level, AclFlags::VOICE | AclFlags::OP);
    }

    #[test]
    fn change_creates_and_deletes_entries() {
        let (mut m, bob) = setup();
        let target = AclTarget::Entity(bob.clone());
        let delta = m
            .acl_change_simple("#foo", &target, AclFlags::VOP_DEF, AclFlags::OP, None)
            .unwrap();
        assert_eq!(delta.added, AclFlags::VOP_DEF);
        assert!(delta.removed.is_empty());
        assert!(m.acl_find_literal("#foo", &bob, AclFlags::empty()).is_some());

        m.acl_change_simple("#foo", &target, AclFlags::empty(), AclFlags::VOP_DEF, None)
            .unwrap();
        assert!(m.acl_find_literal("#foo", &bob, AclFlags::empty()).is_none());
    }

    #[test]
    fn change_checks_restrict_on_create() {
        let (mut m, bob) = setup();
        let target = AclTarget::Entity(bob.clone());
        let res = m.acl_change("#foo", &target, AclFlags::OP, AclFlags::empty(), AclFlags::VOICE, None);
        assert!(matches!(res, Err(AclError::Denied { .. })));
        assert!(m.acl_find_literal("#foo", &bob, AclFlags::empty()).is_none());
    }

    #[test]
    fn no_op_change_keeps_an_opened_entry() {
        let (mut m, bob) = setup();
        let target = AclTarget::Entity(bob);
        let id = m.acl_open("#foo", &target, true, None).unwrap();
        let delta = m
            .acl_change("#foo", &target, AclFlags::empty(), AclFlags::empty(), AclFlags::VOICE, None)
            .unwrap();
        assert!(delta.is_empty());
        assert!(m.acl.get(id).is_some());

        m.acl_change("#foo", &target, AclFlags::VOICE, AclFlags::empty(), AclFlags::VOICE, None)
            .unwrap();
        m.acl_change("#foo", &target, AclFlags::empty(), AclFlags::VOICE, AclFlags::VOICE, None)
            .unwrap();
        assert!(m.acl.get(id).is_none());
    }

    #[test]
    fn open_and_close_host_entry() {
        let (mut m, _) = setup();
        let target = AclTarget::Host("*!*@example.net".into());
        assert_eq!(m.acl_open("#foo", &target, false, None), Err(AclError::NoSuchEntry));
        let id = m.acl_open("#foo", &target, true, None).unwrap();
        assert_eq!(m.acl_open("#foo", &target, false, None), Ok(id));
        assert!(m.acl_close(id));
        assert!(m.acl.get(id).is_none());
    }

    #[test]
    fn exttarget_released_with_last_entry() {
        let (mut m, _) = setup();
        let ext = m.exttarget_find_or_create("$server:*.example").unwrap();
        let id = m
            .acl_add("#foo", AclTarget::Entity(ext.clone()), AclFlags::VOICE, None)
            .unwrap();
        assert!(m.entity(&ext).is_some());
        m.acl_delete(id);
        assert!(m.entity(&ext).is_none());
    }

    #[test]
    fn limitflags_narrows_grantable_flags() {
        let (mut m, _) = setup();
        let theirs = AclFlags::AOP_DEF | AclFlags::FLAGS;
        let open = m.allow_flags("#foo", theirs);
        assert!(open.contains(AclFlags::OP));

        m.channel_mut("#foo").unwrap().flags |= ChannelFlags::LIMITFLAGS;
        assert_eq!(m.allow_flags("#foo", theirs), AclFlags::empty());
    }
}
