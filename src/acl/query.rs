//! Access lookups and flag aggregation.
//!
//! All queries take the channel by name and are side-effect free. Finders
//! require the entry to hold every flag in `flags`; an empty `flags`
//! accepts any entry for the target.

use super::{AclEntry, AclFlags, AclId, AclTarget};
use crate::casemap::irc_eq;
use crate::matching::wildcard_match;
use crate::privs::Source;
use crate::state::{AccountFlags, EntityId, GroupFlags, Matrix, User};
use tracing::trace;

impl Matrix {
    /// Entries of a channel in insertion order.
    pub fn acl_entries<'a>(&'a self, channel: &str) -> impl Iterator<Item = &'a AclEntry> + use<'a> {
        self.channels
            .get(channel)
            .map(|c| c.acl.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|id| self.acl.get(*id))
    }

    pub fn acl_entry(&self, id: AclId) -> Option<&AclEntry> {
        self.acl.get(id)
    }

    /// Entry targeting exactly `entity`.
    pub fn acl_find_literal(
        &self,
        channel: &str,
        entity: &EntityId,
        flags: AclFlags,
    ) -> Option<&AclEntry> {
        self.acl_entries(channel)
            .find(|e| e.target.entity() == Some(entity) && e.level.contains(flags))
    }

    /// Entry applying to `entity`, directly or through the target's own
    /// matching rule (group membership).
    pub fn acl_find(&self, channel: &str, entity: &EntityId, flags: AclFlags) -> Option<&AclEntry> {
        if let Some(entry) = self.acl_find_literal(channel, entity, flags) {
            return Some(entry);
        }
        self.acl_entries(channel).find(|e| {
            e.level.contains(flags)
                && e
                    .target
                    .entity()
                    .is_some_and(|target| self.entity_matches_entity(target, entity))
        })
    }

    /// Host entry whose mask is exactly `mask`.
    pub fn acl_find_host_literal(
        &self,
        channel: &str,
        mask: &str,
        flags: AclFlags,
    ) -> Option<&AclEntry> {
        self.acl_entries(channel).find(|e| {
            e.level.contains(flags) && e.target.host().is_some_and(|h| irc_eq(h, mask))
        })
    }

    /// Host entry whose mask matches `host`.
    pub fn acl_find_host(&self, channel: &str, host: &str, flags: AclFlags) -> Option<&AclEntry> {
        self.acl_entries(channel).find(|e| {
            e.level.contains(flags) && e.target.host().is_some_and(|m| wildcard_match(m, host))
        })
    }

    /// Host entry whose mask matches a connected user.
    pub fn acl_find_host_by_user(
        &self,
        channel: &str,
        uid: &str,
        flags: AclFlags,
    ) -> Option<&AclEntry> {
        let user = self.users.get(uid)?;
        self.acl_entries(channel).find(|e| {
            e.level.contains(flags)
                && e.target.host().is_some_and(|m| self.mask_matches_user(m, user))
        })
    }

    /// Entry for a name as typed by a user: a hostmask if it looks like
    /// one, otherwise an entity name.
    pub fn acl_find_by_mask(&self, channel: &str, mask: &str, flags: AclFlags) -> Option<&AclEntry> {
        if looks_like_hostmask(mask) {
            return self.acl_find_host_literal(channel, mask, flags);
        }
        let entity = self
            .entity_find(mask)
            .map(|e| e.id.clone())
            .or_else(|| self.account_find_ext(mask))?;
        self.acl_find_literal(channel, &entity, flags)
    }

    /// Does `mask` match a connected user, honoring the vhost policy?
    pub fn mask_matches_user(&self, mask: &str, user: &User) -> bool {
        user.matches_mask(mask, self.config.services.masks_through_vhost)
    }

    // ------------------------------------------------------------------------
    // Aggregation
    // ------------------------------------------------------------------------

    /// Union of all entries applying to `entity`.
    pub fn entity_flags(&self, channel: &str, entity: &EntityId) -> AclFlags {
        self.acl_entries(channel)
            .filter(|e| {
                e.target
                    .entity()
                    .is_some_and(|t| t == entity || self.entity_matches_entity(t, entity))
            })
            .fold(AclFlags::empty(), |acc, e| acc | e.level)
    }

    /// Union of all host entries matching `host`.
    pub fn host_flags(&self, channel: &str, host: &str) -> AclFlags {
        self.acl_entries(channel)
            .filter(|e| e.target.host().is_some_and(|m| wildcard_match(m, host)))
            .fold(AclFlags::empty(), |acc, e| acc | e.level)
    }

    fn host_flags_by_user(&self, channel: &str, user: &User) -> AclFlags {
        self.acl_entries(channel)
            .filter(|e| {
                e.target
                    .host()
                    .is_some_and(|m| self.mask_matches_user(m, user))
            })
            .fold(AclFlags::empty(), |acc, e| acc | e.level)
    }

    /// Effective flags of a connected user.
    ///
    /// Combines the logged-in account's flags, entries whose target matches
    /// the user directly, and host entries. While the account awaits email
    /// verification only the ban flag survives from the first two.
    pub fn user_flags(&self, channel: &str, uid: &str) -> AclFlags {
        match self.users.get(uid) {
            Some(user) => self.user_flags_depth(channel, user, 0),
            None => AclFlags::empty(),
        }
    }

    pub(crate) fn user_flags_depth(&self, channel: &str, user: &User, depth: u32) -> AclFlags {
        let mut result = AclFlags::empty();

        if let Some(account) = &user.account {
            result |= self.entity_flags(channel, account);
        }
        for entry in self.acl_entries(channel) {
            if let Some(target) = entry.target.entity()
                && self.entity_matches_user(target, user, depth)
            {
                result |= entry.level;
            }
        }

        let waitauth = user
            .account
            .as_ref()
            .and_then(|id| self.account(id))
            .is_some_and(|a| a.flags.contains(AccountFlags::WAITAUTH));
        if waitauth {
            result &= AclFlags::AKICK;
        }

        // host entries describe the connection, not the account
        result |= self.host_flags_by_user(channel, user);

        trace!(channel = %channel, uid = %user.uid, flags = ?result, "User flags");
        result
    }

    /// Flags of a command source: a live user's effective flags, or an
    /// account's entity flags.
    pub fn source_flags(&self, channel: &str, source: Source<'_>) -> AclFlags {
        match source {
            Source::User(uid) => self.user_flags(channel, uid),
            Source::Account(id) => self.entity_flags(channel, id),
        }
    }

    /// Does the user hold any of `flags`?
    pub fn user_has_flag(&self, channel: &str, uid: &str, flags: AclFlags) -> bool {
        self.user_flags(channel, uid).intersects(flags)
    }

    /// Does the entity hold any of `flags`?
    pub fn entity_has_flag(&self, channel: &str, entity: &EntityId, flags: AclFlags) -> bool {
        self.entity_flags(channel, entity).intersects(flags)
    }

    /// Would one more entry for `target` exceed the per-channel limit?
    ///
    /// Groups flagged ACSNOLIMIT never hit the limit.
    pub fn acl_is_table_full(&self, channel: &str, target: &AclTarget) -> bool {
        let max = self.config.channels.max_acl_entries;
        if max == 0 {
            return false;
        }
        if let Some(id) = target.entity()
            && self
                .group(id)
                .is_some_and(|g| g.flags.contains(GroupFlags::ACSNOLIMIT))
        {
            return false;
        }
        self.channels
            .get(channel)
            .is_some_and(|c| c.acl.len() >= max)
    }
}

/// Hostmasks carry an `@`, or a `!` past the first character (group
/// names start with `!`).
fn looks_like_hostmask(mask: &str) -> bool {
    mask.contains('@') || mask.get(1..).is_some_and(|rest| rest.contains('!'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::GroupAccessFlags;

    fn setup() -> (Matrix, EntityId, EntityId) {
        let mut config = Config::default();
        config.accounts.nick_ownership = false;
        let mut m = Matrix::new(config);
        let alice = m
            .account_add("alice", "$x", "a@example.com", AccountFlags::CRYPTPASS)
            .unwrap();
        let bob = m
            .account_add("bob", "$x", "b@example.com", AccountFlags::CRYPTPASS)
            .unwrap();
        m.channel_register("#foo", &alice).unwrap();
        (m, alice, bob)
    }

    #[test]
    fn literal_find_respects_required_flags() {
        let (mut m, _, bob) = setup();
        m.acl_add("#foo", AclTarget::Entity(bob.clone()), AclFlags::VOP_DEF, None);
        assert!(m.acl_find_literal("#foo", &bob, AclFlags::empty()).is_some());
        assert!(m.acl_find_literal("#foo", &bob, AclFlags::VOICE).is_some());
        assert!(m.acl_find_literal("#foo", &bob, AclFlags::OP).is_none());
    }

    #[test]
    fn group_entries_apply_to_members() {
        let (mut m, _, bob) = setup();
        let staff = m.group_add("!staff").unwrap();
        m.group_access_add(&staff, &bob, GroupAccessFlags::CHANACS).unwrap();
        m.acl_add("#foo", AclTarget::Entity(staff.clone()), AclFlags::AOP_DEF, None);

        assert!(m.acl_find_literal("#foo", &bob, AclFlags::empty()).is_none());
        let found = m.acl_find("#foo", &bob, AclFlags::OP).unwrap();
        assert_eq!(found.target, AclTarget::Entity(staff));
        assert!(m.entity_flags("#foo", &bob).contains(AclFlags::OP));
    }

    #[test]
    fn user_flags_combine_account_and_host_entries() {
        let (mut m, _, bob) = setup();
        m.acl_add("#foo", AclTarget::Entity(bob.clone()), AclFlags::VOICE, None);
        m.acl_add("#foo", AclTarget::Host("*!*@trusted.example".into()), AclFlags::TOPIC, None);
        m.user_add(User::new("001AAAAAA", "bob", "b", "trusted.example"));
        m.login("001AAAAAA", &bob).unwrap();

        let flags = m.user_flags("#foo", "001AAAAAA");
        assert!(flags.contains(AclFlags::VOICE | AclFlags::TOPIC));
        assert!(m.user_has_flag("#foo", "001AAAAAA", AclFlags::TOPIC | AclFlags::OP));
        assert!(!m.user_has_flag("#foo", "001AAAAAA", AclFlags::OP));
    }

    #[test]
    fn unverified_accounts_keep_only_bans() {
        let (mut m, _, _) = setup();
        let carol = m
            .account_add(
                "carol",
                "$x",
                "c@example.com",
                AccountFlags::CRYPTPASS | AccountFlags::WAITAUTH,
            )
            .unwrap();
        m.acl_add("#foo", AclTarget::Entity(carol.clone()), AclFlags::AOP_DEF | AclFlags::AKICK, None);
        m.user_add(User::new("001AAAAAC", "carol", "c", "host.example"));
        m.login("001AAAAAC", &carol).unwrap();

        assert_eq!(m.user_flags("#foo", "001AAAAAC"), AclFlags::AKICK);
        assert!(m.entity_flags("#foo", &carol).contains(AclFlags::OP));
    }

    #[test]
    fn chanacs_exttarget_matches_users_with_access() {
        let (mut m, _, bob) = setup();
        m.channel_register("#staff", &bob).unwrap();
        let ext = m.exttarget_find_or_create("$chanacs:#staff").unwrap();
        m.acl_add("#foo", AclTarget::Entity(ext), AclFlags::VOICE, None);

        m.user_add(User::new("001AAAAAB", "bob", "b", "host.example"));
        m.login("001AAAAAB", &bob).unwrap();
        m.user_add(User::new("001AAAAAD", "dave", "d", "host.example"));

        assert!(m.user_has_flag("#foo", "001AAAAAB", AclFlags::VOICE));
        assert!(!m.user_has_flag("#foo", "001AAAAAD", AclFlags::VOICE));
    }

    #[test]
    fn find_by_mask_distinguishes_hosts_and_names() {
        let (mut m, _, bob) = setup();
        m.acl_add("#foo", AclTarget::Entity(bob.clone()), AclFlags::VOICE, None);
        m.acl_add("#foo", AclTarget::Host("*!*@spam.example".into()), AclFlags::AKICK, None);
        assert!(m.acl_find_by_mask("#foo", "BOB", AclFlags::empty()).is_some());
        assert!(m.acl_find_by_mask("#foo", "*!*@SPAM.example", AclFlags::AKICK).is_some());
        assert!(m.acl_find_by_mask("#foo", "*!*@other", AclFlags::empty()).is_none());
    }

    #[test]
    fn table_full_ignores_acsnolimit_groups() {
        let (mut m, _, bob) = setup();
        m.config.channels.max_acl_entries = 1;
        let staff = m.group_add("!staff").unwrap();
        m.group_mut(&staff).unwrap().flags |= GroupFlags::ACSNOLIMIT;
        assert!(m.acl_is_table_full("#foo", &AclTarget::Entity(bob)));
        assert!(!m.acl_is_table_full("#foo", &AclTarget::Entity(staff)));
    }
}
