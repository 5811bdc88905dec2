//! Registered nicknames and remembered names.

use crate::error::AccountError;
use crate::state::Matrix;
use crate::state::entity::{EntityKind, Metadata};
use crate::state::uid::EntityId;
use tracing::{debug, info};

pub const MD_MARK_SETTER: &str = "private:mark:setter";
pub const MD_MARK_REASON: &str = "private:mark:reason";
pub const MD_MARK_TIMESTAMP: &str = "private:mark:timestamp";

const RESTORED_PREFIX: &str = "(restored) ";

/// A nickname owned by an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nick {
    pub nick: String,
    pub owner: EntityId,
    pub registered: i64,
    pub last_seen: i64,
}

/// Marks kept for a name after the account or nickname holding it is gone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OldName {
    pub name: String,
    pub metadata: Metadata,
}

impl Matrix {
    pub fn nick_find(&self, nick: &str) -> Option<&Nick> {
        self.nicks.get(nick)
    }

    /// Registered nicknames, in folded order.
    pub fn nicks(&self) -> impl Iterator<Item = &Nick> {
        self.nicks.values()
    }

    /// Register `nick` to an account.
    pub fn nick_add(&mut self, owner: &EntityId, nick: &str) -> Result<(), AccountError> {
        let now = self.now();
        self.nick_insert(Nick {
            nick: nick.to_string(),
            owner: owner.clone(),
            registered: now,
            last_seen: now,
        })
    }

    /// Bind a fully formed nickname record.
    pub(crate) fn nick_insert(&mut self, record: Nick) -> Result<(), AccountError> {
        let nick = record.nick.clone();
        let owner = record.owner.clone();
        if self.account(&owner).is_none() {
            return Err(AccountError::NotFound(owner.to_string()));
        }
        let owner_name = self.entity_name(&owner).unwrap_or_default().to_string();

        if self.nicks.insert(&nick, record).is_err() {
            return Err(AccountError::NickInUse(nick));
        }
        if let Some(account) = self.account_mut(&owner) {
            account.nicks.push(nick.clone());
        }
        self.name_restore(&nick, &owner);

        debug!(nick = %nick, account = %owner_name, "Nickname registered");
        Ok(())
    }

    /// Drop a nickname registration, remembering any mark on its owner.
    pub fn nick_delete(&mut self, nick: &str) -> bool {
        let Some(owner) = self.nicks.get(nick).map(|n| n.owner.clone()) else {
            return false;
        };
        self.name_remember(nick, &owner);

        let Some(record) = self.nicks.remove(nick) else {
            return false;
        };
        if let Some(account) = self.account_mut(&owner) {
            account
                .nicks
                .retain(|n| !crate::casemap::irc_eq(n, &record.nick));
        }

        debug!(nick = %record.nick, "Nickname dropped");
        true
    }

    pub fn old_name_find(&self, name: &str) -> Option<&OldName> {
        self.old_names.get(name)
    }

    /// Remember the mark on `account` under `name`.
    pub(crate) fn name_remember(&mut self, name: &str, account: &EntityId) {
        let Some(source) = self.account(account) else {
            return;
        };
        if !source.metadata.contains_key(MD_MARK_SETTER) {
            return;
        }

        let metadata: Metadata = [MD_MARK_SETTER, MD_MARK_REASON, MD_MARK_TIMESTAMP]
            .iter()
            .filter_map(|key| {
                source
                    .metadata
                    .get(*key)
                    .map(|v| (key.to_string(), v.clone()))
            })
            .collect();

        self.old_names.remove(name);
        let _ = self.old_names.insert(
            name,
            OldName {
                name: name.to_string(),
                metadata,
            },
        );
        debug!(name = %name, "Remembering mark for dropped name");
    }

    /// Carry a remembered mark for `name` over to `account`.
    pub(crate) fn name_restore(&mut self, name: &str, account: &EntityId) {
        let Some(old) = self.old_names.remove(name) else {
            return;
        };
        let Some(target) = self.account_mut(account) else {
            return;
        };

        if let Some(setter) = old.metadata.get(MD_MARK_SETTER) {
            target
                .metadata
                .insert(MD_MARK_SETTER.to_string(), setter.clone());
            if let Some(ts) = old.metadata.get(MD_MARK_TIMESTAMP) {
                target
                    .metadata
                    .insert(MD_MARK_TIMESTAMP.to_string(), ts.clone());
            }
            let reason = old
                .metadata
                .get(MD_MARK_REASON)
                .map(String::as_str)
                .unwrap_or_default();
            let reason = if reason.starts_with(RESTORED_PREFIX) {
                reason.to_string()
            } else {
                format!("{RESTORED_PREFIX}{reason}")
            };
            target.metadata.insert(MD_MARK_REASON.to_string(), reason);
            info!(name = %name, "Restored mark on re-registered name");
        }
    }

    /// Reconcile accounts with their nicknames after a load.
    ///
    /// Under nickname ownership every account ends up owning a nickname
    /// equal to its name, and its registration and last-login times cover
    /// those of its nicknames.
    pub fn db_check(&mut self) {
        if !self.config.accounts.nick_ownership {
            return;
        }

        let ids: Vec<EntityId> = self
            .entities_of(EntityKind::Account)
            .map(|e| e.id.clone())
            .collect();

        for id in ids {
            let Some(name) = self.entity_name(&id).map(str::to_string) else {
                continue;
            };
            let owned: Vec<(i64, i64)> = self
                .account(&id)
                .map(|a| {
                    a.nicks
                        .iter()
                        .filter_map(|n| self.nicks.get(n))
                        .map(|n| (n.registered, n.last_seen))
                        .collect()
                })
                .unwrap_or_default();

            let (registered, last_login) = match self.account_mut(&id) {
                Some(account) => {
                    for (reg, seen) in owned {
                        account.registered = account.registered.min(reg);
                        account.last_login = account.last_login.max(seen);
                    }
                    (account.registered, account.last_login)
                }
                None => continue,
            };

            let current_owner = self.nicks.get(&name).map(|n| n.owner.clone());
            if current_owner.as_ref() == Some(&id) {
                continue;
            }
            if let Some(other) = current_owner {
                info!(nick = %name, old_owner = %other, account = %name, "db_check: replacing nick owner");
                self.nick_delete(&name);
            } else {
                info!(nick = %name, "db_check: adding missing nick");
            }
            let _ = self.nick_insert(Nick {
                nick: name.clone(),
                owner: id.clone(),
                registered,
                last_seen: last_login,
            });
        }
    }
}
