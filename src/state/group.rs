//! Groups: named collections of accounts (and other groups) that can hold
//! channel access as a unit.

use crate::error::GroupError;
use crate::state::Matrix;
use crate::state::entity::{Entity, EntityData, EntityKind, Metadata};
use crate::state::uid::EntityId;
use bitflags::bitflags;
use std::collections::HashSet;
use tracing::{debug, info};

bitflags! {
    /// Group registration flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct GroupFlags: u32 {
        /// Exempt from the per-entity channel limit.
        const REGNOLIMIT = 0x1;
        /// Exempt from per-channel access list limits.
        const ACSNOLIMIT = 0x2;
        const OPEN       = 0x4;
        const PUBLIC     = 0x8;
    }
}

bitflags! {
    /// What a member may do with a group.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct GroupAccessFlags: u32 {
        const FOUNDER = 0x001;
        const FLAGS   = 0x002;
        /// Member inherits the group's channel access.
        const CHANACS = 0x004;
        const MEMOS   = 0x008;
        const SET     = 0x010;
        const VHOST   = 0x020;
        const BAN     = 0x040;
        const INVITE  = 0x080;
        const ACLVIEW = 0x100;
    }
}

impl GroupAccessFlags {
    /// Flags given to a member added without explicit flags.
    pub const DEFAULT: Self = Self::CHANACS.union(Self::ACLVIEW);
}

/// One membership line of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub member: EntityId,
    pub flags: GroupAccessFlags,
}

/// A registered group.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub registered: i64,
    pub flags: GroupFlags,
    pub(crate) members: Vec<GroupMember>,
    pub metadata: Metadata,
}

impl Group {
    pub fn new(registered: i64) -> Self {
        Self {
            registered,
            ..Self::default()
        }
    }

    pub fn members(&self) -> &[GroupMember] {
        &self.members
    }
}

impl Matrix {
    pub fn group(&self, id: &EntityId) -> Option<&Group> {
        self.entities.get(id).and_then(Entity::as_group)
    }

    pub fn group_mut(&mut self, id: &EntityId) -> Option<&mut Group> {
        self.entities.get_mut(id).and_then(Entity::as_group_mut)
    }

    /// Find a group by name.
    pub fn group_find(&self, name: &str) -> Option<&Entity> {
        self.entity_find(name)
            .filter(|e| e.kind() == EntityKind::Group)
    }

    /// Register a group. Names start with `!`.
    pub fn group_add(&mut self, name: &str) -> Result<EntityId, GroupError> {
        self.group_add_id(None, name)
    }

    pub fn group_add_id(&mut self, id: Option<&str>, name: &str) -> Result<EntityId, GroupError> {
        if !name.starts_with('!') || name.len() < 2 {
            return Err(GroupError::InvalidName(name.to_string()));
        }
        if self.entity_names.contains(name) {
            return Err(GroupError::Exists(name.to_string()));
        }

        let id = match id.map(EntityId::new) {
            Some(id) if !self.entities.contains_key(&id) => id,
            _ => self.alloc_id(),
        };
        let entity = Entity {
            id: id.clone(),
            name: name.to_string(),
            data: EntityData::Group(Box::new(Group::new(self.now()))),
        };
        if !self.entity_put(entity) {
            return Err(GroupError::Exists(name.to_string()));
        }

        debug!(group = %name, id = %id, "Group created");
        Ok(id)
    }

    /// Delete a group: its membership lines, its place in other groups and
    /// its channel access all go.
    pub fn group_delete(&mut self, id: &EntityId) -> bool {
        let Some(name) = self
            .entities
            .get(id)
            .filter(|e| e.kind() == EntityKind::Group)
            .map(|e| e.name.clone())
        else {
            return false;
        };

        self.release_entity_access(id, &name);
        self.group_memberships_purge(id);
        self.entity_del(id);
        info!(group = %name, "Group deleted");
        true
    }

    /// Add `member` to a group. Only accounts and groups can be members.
    pub fn group_access_add(
        &mut self,
        group: &EntityId,
        member: &EntityId,
        flags: GroupAccessFlags,
    ) -> Result<(), GroupError> {
        let member_ok = self
            .entities
            .get(member)
            .is_some_and(|e| matches!(e.kind(), EntityKind::Account | EntityKind::Group));
        if !member_ok || member == group {
            return Err(GroupError::NotFound(member.to_string()));
        }
        let member_name = self.entity_name(member).unwrap_or_default().to_string();
        let record = self
            .group_mut(group)
            .ok_or_else(|| GroupError::NotFound(group.to_string()))?;

        if record.members.iter().any(|m| &m.member == member) {
            return Err(GroupError::AlreadyMember(member_name));
        }
        record.members.push(GroupMember {
            member: member.clone(),
            flags,
        });
        debug!(group = %group, member = %member_name, "Group member added");
        Ok(())
    }

    pub fn group_access_delete(&mut self, group: &EntityId, member: &EntityId) -> bool {
        let Some(record) = self.group_mut(group) else {
            return false;
        };
        let before = record.members.len();
        record.members.retain(|m| &m.member != member);
        before != record.members.len()
    }

    /// Find `member`'s membership line in a group holding all of `flags`.
    ///
    /// With `recurse`, membership through nested groups counts too; the
    /// returned line is the one in the innermost group that matched.
    pub fn group_access_find(
        &self,
        group: &EntityId,
        member: &EntityId,
        flags: GroupAccessFlags,
        recurse: bool,
    ) -> Option<&GroupMember> {
        let mut visited = HashSet::new();
        self.group_access_find_inner(group, member, flags, recurse, &mut visited)
    }

    fn group_access_find_inner<'a>(
        &'a self,
        group: &EntityId,
        member: &EntityId,
        flags: GroupAccessFlags,
        recurse: bool,
        visited: &mut HashSet<EntityId>,
    ) -> Option<&'a GroupMember> {
        if !visited.insert(group.clone()) {
            return None;
        }
        let record = self.group(group)?;

        for line in &record.members {
            if &line.member == member && line.flags.contains(flags) {
                return Some(line);
            }
        }
        if !recurse {
            return None;
        }
        for line in &record.members {
            if self.group(&line.member).is_some()
                && let Some(found) =
                    self.group_access_find_inner(&line.member, member, flags, true, visited)
            {
                return Some(found);
            }
        }
        None
    }

    /// Groups `id` is a direct member of.
    pub fn groups_of(&self, id: &EntityId) -> Vec<EntityId> {
        self.entities_of(EntityKind::Group)
            .filter(|e| {
                e.as_group()
                    .is_some_and(|g| g.members.iter().any(|m| &m.member == id))
            })
            .map(|e| e.id.clone())
            .collect()
    }

    /// Remove `id` from every group, and a group's own lines if `id` is one.
    pub(crate) fn group_memberships_purge(&mut self, id: &EntityId) {
        for group in self.groups_of(id) {
            self.group_access_delete(&group, id);
        }
        if let Some(group) = self.group_mut(id) {
            group.members.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::AccountFlags;

    fn matrix() -> Matrix {
        let mut config = Config::default();
        config.accounts.nick_ownership = false;
        Matrix::new(config)
    }

    #[test]
    fn group_names_need_bang() {
        let mut m = matrix();
        assert_eq!(
            m.group_add("staff"),
            Err(GroupError::InvalidName("staff".into()))
        );
        let id = m.group_add("!staff").unwrap();
        assert_eq!(m.group_find("!STAFF").map(|e| &e.id), Some(&id));
        assert_eq!(m.group_add("!staff"), Err(GroupError::Exists("!staff".into())));
    }

    #[test]
    fn nested_membership_is_found_and_cycles_terminate() {
        let mut m = matrix();
        let alice = m
            .account_add("alice", "$x", "a@example.com", AccountFlags::CRYPTPASS)
            .unwrap();
        let outer = m.group_add("!outer").unwrap();
        let inner = m.group_add("!inner").unwrap();
        m.group_access_add(&outer, &inner, GroupAccessFlags::DEFAULT).unwrap();
        m.group_access_add(&inner, &outer, GroupAccessFlags::DEFAULT).unwrap();
        m.group_access_add(&inner, &alice, GroupAccessFlags::CHANACS).unwrap();

        assert!(m.group_access_find(&outer, &alice, GroupAccessFlags::CHANACS, false).is_none());
        assert!(m.group_access_find(&outer, &alice, GroupAccessFlags::CHANACS, true).is_some());
        assert!(m.group_access_find(&outer, &alice, GroupAccessFlags::FOUNDER, true).is_none());
    }

    #[test]
    fn deleting_a_group_leaves_no_memberships() {
        let mut m = matrix();
        let a = m.group_add("!a").unwrap();
        let b = m.group_add("!b").unwrap();
        m.group_access_add(&a, &b, GroupAccessFlags::DEFAULT).unwrap();
        assert!(m.group_delete(&b));
        assert!(m.group(&a).unwrap().members().is_empty());
    }
}
