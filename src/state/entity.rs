//! Entities: the identities access entries can point at.
//!
//! An entity is an account, a group, or an extended target (a synthetic
//! identity such as `$chanacs:#staff`). What an entity "matches" is
//! decided per kind, which is how groups and extended targets take part
//! in access checks without the access engine knowing their shape.

use crate::acl::AclFlags;
use crate::privs::PRIV_REG_NOLIMIT;
use crate::state::Matrix;
use crate::state::account::{Account, AccountFlags};
use crate::state::exttarget::ExtTarget;
use crate::state::group::{Group, GroupAccessFlags, GroupFlags};
use crate::state::uid::EntityId;
use crate::state::user::User;
use std::collections::BTreeMap;
use tracing::debug;

/// Arbitrary key/value data attached to records.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key set while an account may not hold foundership.
pub const MD_RESTRICT_SETTER: &str = "private:restrict:setter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Account,
    Group,
    ExtTarget,
}

#[derive(Debug, Clone)]
pub enum EntityData {
    Account(Box<Account>),
    Group(Box<Group>),
    ExtTarget(ExtTarget),
}

/// A named identity.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub data: EntityData,
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self.data {
            EntityData::Account(_) => EntityKind::Account,
            EntityData::Group(_) => EntityKind::Group,
            EntityData::ExtTarget(_) => EntityKind::ExtTarget,
        }
    }

    pub fn as_account(&self) -> Option<&Account> {
        match &self.data {
            EntityData::Account(account) => Some(account),
            _ => None,
        }
    }

    pub fn as_account_mut(&mut self) -> Option<&mut Account> {
        match &mut self.data {
            EntityData::Account(account) => Some(account),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match &self.data {
            EntityData::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut Group> {
        match &mut self.data {
            EntityData::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_ext(&self) -> Option<&ExtTarget> {
        match &self.data {
            EntityData::ExtTarget(ext) => Some(ext),
            _ => None,
        }
    }
}

impl Matrix {
    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Find an entity by name.
    pub fn entity_find(&self, name: &str) -> Option<&Entity> {
        self.entity_names
            .get(name)
            .and_then(|id| self.entities.get(id))
    }

    /// Find an entity by id string.
    pub fn entity_find_uid(&self, id: &str) -> Option<&Entity> {
        self.entities.get(&EntityId::new(id))
    }

    /// Entities of one kind, in id order.
    pub fn entities_of(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(move |e| e.kind() == kind)
    }

    /// Display name of an entity, if it exists.
    pub fn entity_name(&self, id: &EntityId) -> Option<&str> {
        self.entities.get(id).map(|e| e.name.as_str())
    }

    /// Bind an entity into the arena and the name index.
    pub(crate) fn entity_put(&mut self, entity: Entity) -> bool {
        if self.entities.contains_key(&entity.id) {
            return false;
        }
        if self.entity_names.insert(&entity.name, entity.id.clone()).is_err() {
            return false;
        }
        self.entities.insert(entity.id.clone(), entity);
        true
    }

    /// Unbind an entity, returning it.
    pub(crate) fn entity_del(&mut self, id: &EntityId) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        if self.entity_names.get(&entity.name) == Some(id) {
            self.entity_names.remove(&entity.name);
        }
        Some(entity)
    }

    // ------------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------------

    /// Does an access entry pointing at `target` apply to `query`?
    pub fn entity_matches_entity(&self, target: &EntityId, query: &EntityId) -> bool {
        let Some(entity) = self.entities.get(target) else {
            return false;
        };

        match &entity.data {
            EntityData::Account(_) | EntityData::ExtTarget(_) => target == query,
            EntityData::Group(_) => {
                target == query
                    || (self
                        .entities
                        .get(query)
                        .is_some_and(|q| q.kind() == EntityKind::Account)
                        && self
                            .group_access_find(target, query, GroupAccessFlags::CHANACS, true)
                            .is_some())
            }
        }
    }

    /// Does an access entry pointing at `target` apply directly to a
    /// connected user? `depth` bounds nested `$chanacs` evaluation.
    pub(crate) fn entity_matches_user(&self, target: &EntityId, user: &User, depth: u32) -> bool {
        let Some(entity) = self.entities.get(target) else {
            return false;
        };

        match &entity.data {
            EntityData::Account(_) | EntityData::Group(_) => false,
            EntityData::ExtTarget(ext) => self.ext_matches_user(ext, user, depth),
        }
    }

    /// Number of channels where `id` holds an entry containing `flag`.
    pub fn entity_count_channels_with_flag(&self, id: &EntityId, flag: AclFlags) -> usize {
        self.acl
            .of_entity(id)
            .iter()
            .filter_map(|acl_id| self.acl.get(*acl_id))
            .filter(|entry| entry.level.contains(flag))
            .count()
    }

    /// May `id` take on (another) channel as founder?
    pub fn can_register_channel(&self, id: &EntityId) -> bool {
        let Some(entity) = self.entities.get(id) else {
            return false;
        };
        let max = self.config.channels.max_channels;

        let exempt = match &entity.data {
            EntityData::Account(account) => {
                account.flags.contains(AccountFlags::REGNOLIMIT)
                    || self.has_priv_account(id, Some(PRIV_REG_NOLIMIT))
            }
            EntityData::Group(group) => group.flags.contains(GroupFlags::REGNOLIMIT),
            EntityData::ExtTarget(_) => return false,
        };

        exempt || self.entity_count_channels_with_flag(id, AclFlags::FOUNDER) < max
    }

    /// May `id` hold the founder flag at all?
    pub fn allow_foundership(&self, id: &EntityId) -> bool {
        match self.entities.get(id).map(|e| &e.data) {
            Some(EntityData::Account(account)) => {
                !account.metadata.contains_key(MD_RESTRICT_SETTER)
            }
            Some(EntityData::Group(_)) => true,
            Some(EntityData::ExtTarget(_)) | None => false,
        }
    }

    /// Drop an extended target once nothing refers to it.
    pub(crate) fn release_if_unreferenced(&mut self, id: &EntityId) {
        let dynamic = self
            .entities
            .get(id)
            .is_some_and(|e| e.kind() == EntityKind::ExtTarget);
        if dynamic && self.acl.of_entity(id).is_empty() {
            debug!(entity = %id, "Releasing unreferenced extended target");
            self.entity_del(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn entity_put_rejects_duplicates() {
        let mut matrix = Matrix::new(Config::default());
        let id = matrix.alloc_id();
        let entity = Entity {
            id: id.clone(),
            name: "!staff".into(),
            data: EntityData::Group(Box::new(Group::new(0))),
        };
        assert!(matrix.entity_put(entity.clone()));
        assert!(!matrix.entity_put(entity));
        assert_eq!(matrix.entity_find("!STAFF").map(|e| &e.id), Some(&id));
        assert!(matrix.entity_del(&id).is_some());
        assert!(matrix.entity_find("!staff").is_none());
    }
}
