//! Channel access control lists.
//!
//! Access entries live in a single arena ([`AclStore`]) keyed by
//! [`AclId`]. Each channel registration keeps the ids of its entries in
//! insertion order, and the store keeps a reverse index from target entity
//! to entry ids so an entity's access can be released without a scan.
//!
//! - [`flags`]: flag bits, letters and the deployment flag universe
//! - [`query`]: lookup and flag aggregation
//! - [`mutate`]: guarded creation, modification and deletion

pub mod flags;
mod mutate;
mod query;

pub use flags::{
    AclFlags, FlagDelta, FlagPolicy, delta_letters, flag_by_name, flag_name, to_letters,
};

use crate::state::{EntityId, Metadata};
use std::collections::{BTreeMap, HashMap};

/// Handle of an access entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AclId(pub(crate) u64);

impl std::fmt::Display for AclId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "acl#{}", self.0)
    }
}

/// Who an access entry applies to: an entity or a hostmask, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AclTarget {
    Entity(EntityId),
    Host(String),
}

impl AclTarget {
    pub fn entity(&self) -> Option<&EntityId> {
        match self {
            Self::Entity(id) => Some(id),
            Self::Host(_) => None,
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Entity(_) => None,
            Self::Host(mask) => Some(mask),
        }
    }
}

/// One access entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    pub id: AclId,
    /// Owning channel registration.
    pub channel: String,
    pub target: AclTarget,
    pub level: AclFlags,
    /// Entity that last changed the entry; `None` for system changes.
    pub setter: Option<EntityId>,
    pub modified: i64,
    pub metadata: Metadata,
}

/// Arena of access entries with a reverse index by target entity.
#[derive(Debug, Default)]
pub struct AclStore {
    entries: BTreeMap<AclId, AclEntry>,
    by_entity: HashMap<EntityId, Vec<AclId>>,
    next: u64,
}

impl AclStore {
    pub(crate) fn insert(
        &mut self,
        channel: &str,
        target: AclTarget,
        level: AclFlags,
        setter: Option<EntityId>,
        modified: i64,
    ) -> AclId {
        self.next += 1;
        let id = AclId(self.next);
        if let AclTarget::Entity(entity) = &target {
            self.by_entity.entry(entity.clone()).or_default().push(id);
        }
        self.entries.insert(
            id,
            AclEntry {
                id,
                channel: channel.to_string(),
                target,
                level,
                setter,
                modified,
                metadata: Metadata::new(),
            },
        );
        id
    }

    pub(crate) fn remove(&mut self, id: AclId) -> Option<AclEntry> {
        let entry = self.entries.remove(&id)?;
        if let AclTarget::Entity(entity) = &entry.target
            && let Some(ids) = self.by_entity.get_mut(entity)
        {
            ids.retain(|i| *i != id);
            if ids.is_empty() {
                self.by_entity.remove(entity);
            }
        }
        Some(entry)
    }

    pub fn get(&self, id: AclId) -> Option<&AclEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: AclId) -> Option<&mut AclEntry> {
        self.entries.get_mut(&id)
    }

    /// Entries targeting `entity`, in creation order.
    pub fn of_entity(&self, entity: &EntityId) -> &[AclId] {
        self.by_entity.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
