//! The Matrix - central state of the services core.
//!
//! The Matrix owns every registered record (entities, nicknames, channel
//! registrations, access entries, operator records) together with the live
//! view reported by the protocol layer (connected users and occupied
//! channels). All operations are synchronous and run to completion; the
//! driver calls one at a time.

use crate::acl::{AclStore, FlagPolicy};
use crate::config::{Config, resolve_operclasses};
use crate::privs::{OperClassFlags, PrivRegistry, SoperFlags};
use crate::security::{Argon2Backend, CredentialBackend};
use crate::services::{HookBus, ServiceEffect};
use crate::state::channel::ChannelReg;
use crate::state::entity::Entity;
use crate::state::nick::{Nick, OldName};
use crate::state::registry::NameIndex;
use crate::state::uid::{EntityId, IdAllocator};
use crate::state::user::{LiveChannel, Uid, User};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// The Matrix - central state container.
pub struct Matrix {
    /// Services configuration.
    pub config: Config,

    /// Entity arena, keyed by id.
    pub(crate) entities: BTreeMap<EntityId, Entity>,

    /// Entity name to id.
    pub(crate) entity_names: NameIndex<EntityId>,

    /// Registered nicknames.
    pub(crate) nicks: NameIndex<Nick>,

    /// Marks remembered for dropped names.
    pub(crate) old_names: NameIndex<OldName>,

    /// Channel registrations.
    pub(crate) channels: NameIndex<ChannelReg>,

    /// Certificate fingerprint (lowercase) to owning account.
    pub(crate) certfps: HashMap<String, EntityId>,

    /// Access entry arena and reverse index.
    pub(crate) acl: AclStore,

    /// Operator classes and services operators.
    pub(crate) privs: PrivRegistry,

    /// Connected users, indexed by UID.
    pub(crate) users: HashMap<Uid, User>,

    /// Nick to UID mapping for connected users.
    pub(crate) user_nicks: NameIndex<Uid>,

    /// Occupied channels.
    pub(crate) live_channels: NameIndex<LiveChannel>,

    /// Registered observers.
    pub(crate) hooks: HookBus,

    /// Effects waiting for the protocol layer.
    pub(crate) effects: Vec<ServiceEffect>,

    pub(crate) ids: IdAllocator,
    pub(crate) policy: FlagPolicy,
    pub(crate) credentials: Box<dyn CredentialBackend>,

    /// Pinned clock for deterministic sweeps.
    clock: Option<i64>,
}

impl Matrix {
    /// Build an empty Matrix with Argon2 credentials.
    pub fn new(config: Config) -> Self {
        Self::with_credentials(config, Box::new(Argon2Backend))
    }

    /// Build an empty Matrix with a specific credential backend.
    pub fn with_credentials(config: Config, credentials: Box<dyn CredentialBackend>) -> Self {
        let policy = FlagPolicy::new(
            config.channels.owner,
            config.channels.protect,
            config.channels.halfops,
        );
        let ids = IdAllocator::new(config.services.id_prefix.clone());

        let mut matrix = Self {
            config,
            entities: BTreeMap::new(),
            entity_names: NameIndex::new(),
            nicks: NameIndex::new(),
            old_names: NameIndex::new(),
            channels: NameIndex::new(),
            certfps: HashMap::new(),
            acl: AclStore::default(),
            privs: PrivRegistry::with_builtins(),
            users: HashMap::new(),
            user_nicks: NameIndex::new(),
            live_channels: NameIndex::new(),
            hooks: HookBus::default(),
            effects: Vec::new(),
            ids,
            policy,
            credentials,
            clock: None,
        };
        matrix.apply_oper_config();
        matrix
    }

    /// Create the operator classes and services operators declared in
    /// configuration.
    pub fn apply_oper_config(&mut self) {
        for class in resolve_operclasses(&self.config.operclass) {
            let mut flags = OperClassFlags::empty();
            if class.needoper {
                flags |= OperClassFlags::NEEDOPER;
            }
            if class.needpass {
                flags |= OperClassFlags::NEEDPASS;
            }
            self.operclass_add(&class.name, &class.privs, flags);
        }

        let opers = self.config.oper.clone();
        for oper in opers {
            if let Err(e) = self.soper_add(
                &oper.name,
                &oper.operclass,
                SoperFlags::CONF,
                oper.password.clone(),
            ) {
                warn!(oper = %oper.name, error = %e, "Ignoring configured services operator");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Clock
    // ------------------------------------------------------------------------

    /// Current time in seconds since the epoch.
    pub fn now(&self) -> i64 {
        self.clock.unwrap_or_else(|| Utc::now().timestamp())
    }

    /// Pin the clock.
    pub fn set_time(&mut self, ts: i64) {
        self.clock = Some(ts);
    }

    /// Move a pinned clock forward (pins it first if needed).
    pub fn advance_time(&mut self, secs: i64) {
        let now = self.now();
        self.clock = Some(now + secs);
    }

    // ------------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------------

    /// The flag universe this deployment supports.
    pub fn flag_policy(&self) -> FlagPolicy {
        self.policy
    }

    /// Queue an effect for the protocol layer.
    pub(crate) fn push_effect(&mut self, effect: ServiceEffect) {
        debug!(?effect, "Queued effect");
        self.effects.push(effect);
    }

    /// Drain queued effects.
    pub fn take_effects(&mut self) -> Vec<ServiceEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Allocate an unused entity id.
    pub(crate) fn alloc_id(&mut self) -> EntityId {
        loop {
            let id = self.ids.next_id();
            if !self.entities.contains_key(&id) {
                return id;
            }
        }
    }

    /// The last allocated entity id, for persistence.
    pub fn last_entity_id(&self) -> Option<EntityId> {
        self.ids.last_id()
    }

    /// Continue id allocation after a persisted id.
    pub fn resume_entity_ids(&mut self, last: &str) {
        self.ids.resume_from(last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_can_be_pinned_and_advanced() {
        let mut matrix = Matrix::new(Config::default());
        matrix.set_time(1_000);
        assert_eq!(matrix.now(), 1_000);
        matrix.advance_time(60);
        assert_eq!(matrix.now(), 1_060);
    }

    #[test]
    fn configured_opers_are_loaded() {
        let config = Config::parse(
            r#"
            [[operclass]]
            name = "admin"
            privs = ["general:admin"]

            [[oper]]
            name = "alice"
            operclass = "admin"
            "#,
        )
        .unwrap();
        let matrix = Matrix::new(config);
        let soper = matrix.soper_find_named("alice").unwrap();
        assert!(soper.flags.contains(SoperFlags::CONF));
        assert!(matrix.operclass_find("ADMIN").is_some());
    }

    #[test]
    fn alloc_skips_taken_ids() {
        let mut matrix = Matrix::new(Config::default());
        let first = matrix.alloc_id();
        assert_eq!(first.as_str(), "AAAAAAAAB");
        assert_eq!(matrix.last_entity_id(), Some(first));
    }
}
