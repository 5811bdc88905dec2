//! Account lifecycle.
//!
//! Accounts are created with [`Matrix::account_add`], renamed with
//! [`Matrix::account_rename`] and destroyed with [`Matrix::account_delete`].
//! Deletion cascades: sessions are logged out, channel access is released
//! (with founder succession), and every satellite record goes with it.

use crate::error::AccountError;
use crate::privs::{PRIV_LOGIN_NOLIMIT, SoperTarget};
use crate::services::{HookEvent, ServiceEffect};
use crate::soft_assert;
use crate::state::Matrix;
use crate::state::credentials::AuthCookie;
use crate::state::entity::{Entity, EntityData, EntityKind, Metadata};
use crate::state::uid::EntityId;
use crate::state::user::Uid;
use bitflags::bitflags;
use tracing::{debug, info};

bitflags! {
    /// Account status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct AccountFlags: u32 {
        /// Never expires.
        const HOLD         = 0x0000_0001;
        const NEVEROP      = 0x0000_0002;
        const NOOP         = 0x0000_0004;
        /// Registered but email not yet verified.
        const WAITAUTH     = 0x0000_0008;
        const HIDEMAIL     = 0x0000_0010;
        const NOMEMO       = 0x0000_0040;
        const EMAILMEMOS   = 0x0000_0080;
        /// Stored password is already hashed.
        const CRYPTPASS    = 0x0000_0100;
        const NOBURSTLOGIN = 0x0000_0400;
        /// Creation-time request for nickname enforcement.
        const ENFORCE      = 0x0000_0800;
        const USE_PRIVMSG  = 0x0000_1000;
        const PRIVATE      = 0x0000_2000;
        const QUIETCHG     = 0x0000_4000;
        const NOGREET      = 0x0000_8000;
        /// Exempt from the per-entity channel limit.
        const REGNOLIMIT   = 0x0001_0000;
        const NEVERGROUP   = 0x0002_0000;
        const PENDINGLOGIN = 0x0004_0000;
        const NOPASSWORD   = 0x0008_0000;
        /// Exempt from the concurrent session limit.
        const LOGINNOLIMIT = 0x0010_0000;
    }
}

/// Metadata key standing in for the ENFORCE creation flag.
pub const MD_DOENFORCE: &str = "private:doenforce";

/// Width of one nickname audit line written on account deletion.
const NICK_AUDIT_WIDTH: usize = 200;

/// A stored memo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memo {
    pub sender: String,
    pub sent: i64,
    pub status: u32,
    pub text: String,
}

/// A registered account.
#[derive(Debug, Clone, Default)]
pub struct Account {
    pub(crate) pass: String,
    pub(crate) email: String,
    pub(crate) email_canonical: String,
    pub registered: i64,
    pub last_login: i64,
    pub flags: AccountFlags,
    pub language: Option<String>,
    pub metadata: Metadata,
    pub(crate) logins: Vec<Uid>,
    pub(crate) nicks: Vec<String>,
    pub(crate) access_masks: Vec<String>,
    pub(crate) certfps: Vec<String>,
    pub(crate) memos: Vec<Memo>,
    pub(crate) memo_ignores: Vec<String>,
    pub(crate) cookies: Vec<AuthCookie>,
}

impl Account {
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn email_canonical(&self) -> &str {
        &self.email_canonical
    }

    /// Stored credential (hashed when CRYPTPASS is set).
    pub fn password(&self) -> &str {
        &self.pass
    }

    /// UIDs of connected users logged in to this account.
    pub fn logins(&self) -> &[Uid] {
        &self.logins
    }

    /// Owned nicknames, in registration order.
    pub fn nicks(&self) -> &[String] {
        &self.nicks
    }

    pub fn access_masks(&self) -> &[String] {
        &self.access_masks
    }

    pub fn certfps(&self) -> &[String] {
        &self.certfps
    }

    pub fn memos(&self) -> &[Memo] {
        &self.memos
    }

    pub fn memo_ignores(&self) -> &[String] {
        &self.memo_ignores
    }
}

impl Matrix {
    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    pub fn account(&self, id: &EntityId) -> Option<&Account> {
        self.entities.get(id).and_then(Entity::as_account)
    }

    pub fn account_mut(&mut self, id: &EntityId) -> Option<&mut Account> {
        self.entities.get_mut(id).and_then(Entity::as_account_mut)
    }

    /// Find an account by name.
    pub fn account_find(&self, name: &str) -> Option<&Entity> {
        self.entity_find(name)
            .filter(|e| e.kind() == EntityKind::Account)
    }

    /// Find an account id by name.
    pub fn account_id(&self, name: &str) -> Option<EntityId> {
        self.account_find(name).map(|e| e.id.clone())
    }

    /// Extended lookup: `=nick` resolves a connected user's account,
    /// `?ID` an entity id, otherwise the account name and, under nickname
    /// ownership, the owner of a registered nickname.
    pub fn account_find_ext(&self, name: &str) -> Option<EntityId> {
        if let Some(nick) = name.strip_prefix('=') {
            return self.user_find_named(nick).and_then(|u| u.account.clone());
        }
        if let Some(id) = name.strip_prefix('?') {
            return self
                .entity_find_uid(id)
                .filter(|e| e.kind() == EntityKind::Account)
                .map(|e| e.id.clone());
        }
        if let Some(id) = self.account_id(name) {
            return Some(id);
        }
        if self.config.accounts.nick_ownership {
            return self.nicks.get(name).map(|n| n.owner.clone());
        }
        None
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    /// Register an account with a fresh id.
    pub fn account_add(
        &mut self,
        name: &str,
        password: &str,
        email: &str,
        flags: AccountFlags,
    ) -> Result<EntityId, AccountError> {
        self.account_add_id(None, name, password, email, flags)
    }

    /// Register an account, preferring the supplied id. A supplied id that
    /// is already taken is replaced by a freshly allocated one.
    ///
    /// Unless `flags` contains CRYPTPASS the password is hashed through the
    /// credential backend. Under nickname ownership the account's own
    /// nickname is registered with it.
    pub fn account_add_id(
        &mut self,
        id: Option<&str>,
        name: &str,
        password: &str,
        email: &str,
        flags: AccountFlags,
    ) -> Result<EntityId, AccountError> {
        if self.entity_names.contains(name) {
            return Err(AccountError::Exists(name.to_string()));
        }
        let own_nick = self.config.accounts.nick_ownership;
        if own_nick && self.nicks.contains(name) {
            return Err(AccountError::NickInUse(name.to_string()));
        }

        let pass = if flags.contains(AccountFlags::CRYPTPASS) {
            password.to_string()
        } else {
            self.credentials
                .hash(password)
                .map_err(|e| AccountError::Credential(e.to_string()))?
        };

        let id = match id.map(EntityId::new) {
            Some(id) if !self.entities.contains_key(&id) => id,
            _ => self.alloc_id(),
        };

        let now = self.now();
        let mut account = Account {
            pass,
            email: email.to_string(),
            email_canonical: self.canonicalize_email(email),
            registered: now,
            last_login: now,
            flags: flags | AccountFlags::CRYPTPASS,
            ..Account::default()
        };
        if account.flags.contains(AccountFlags::ENFORCE) {
            account.flags.remove(AccountFlags::ENFORCE);
            account.metadata.insert(MD_DOENFORCE.to_string(), "1".to_string());
        }

        let entity = Entity {
            id: id.clone(),
            name: name.to_string(),
            data: EntityData::Account(Box::new(account)),
        };
        soft_assert!(
            self.entity_put(entity),
            Err(AccountError::Exists(name.to_string()))
        );

        self.soper_bind(name, &id);

        self.name_restore(name, &id);
        if own_nick {
            self.nick_add(&id, name)?;
        }

        debug!(account = %name, id = %id, email = %email, "Account created");
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Credentials and email
    // ------------------------------------------------------------------------

    /// Replace the stored password.
    pub fn set_password(&mut self, id: &EntityId, password: &str) -> Result<(), AccountError> {
        let hashed = self
            .credentials
            .hash(password)
            .map_err(|e| AccountError::Credential(e.to_string()))?;
        let account = self
            .account_mut(id)
            .ok_or_else(|| AccountError::NotFound(id.to_string()))?;
        account.pass = hashed;
        account.flags.insert(AccountFlags::CRYPTPASS);
        Ok(())
    }

    /// Check a password against the stored credential.
    pub fn verify_password(&self, id: &EntityId, password: &str) -> bool {
        let Some(account) = self.account(id) else {
            return false;
        };
        if account.flags.contains(AccountFlags::CRYPTPASS) {
            self.credentials.verify(password, &account.pass)
        } else {
            account.pass == password
        }
    }

    pub fn set_email(&mut self, id: &EntityId, email: &str) -> bool {
        let canonical = self.canonicalize_email(email);
        let Some(account) = self.account_mut(id) else {
            return false;
        };
        account.email = email.to_string();
        account.email_canonical = canonical;
        true
    }

    /// Canonical form used to spot duplicate registrations: lowercased, and
    /// for configured domains with dots and `+suffix` dropped from the
    /// local part.
    pub fn canonicalize_email(&self, email: &str) -> String {
        let lowered = email.to_ascii_lowercase();
        let Some((local, domain)) = lowered.rsplit_once('@') else {
            return lowered;
        };

        let folds = self
            .config
            .accounts
            .canonical_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain));
        if !folds {
            return lowered;
        }

        let local = local.split('+').next().unwrap_or(local);
        format!("{}@{}", local.replace('.', ""), domain)
    }

    /// Accounts whose canonical email matches `email`.
    pub fn accounts_by_email(&self, email: &str) -> Vec<EntityId> {
        let canonical = self.canonicalize_email(email);
        self.entities_of(EntityKind::Account)
            .filter(|e| e.as_account().is_some_and(|a| a.email_canonical == canonical))
            .map(|e| e.id.clone())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Metadata and memos
    // ------------------------------------------------------------------------

    pub fn account_metadata_set(&mut self, id: &EntityId, key: &str, value: &str) -> bool {
        match self.account_mut(id) {
            Some(account) => {
                account.metadata.insert(key.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn account_metadata(&self, id: &EntityId, key: &str) -> Option<&str> {
        self.account(id)
            .and_then(|a| a.metadata.get(key))
            .map(String::as_str)
    }

    pub fn account_metadata_delete(&mut self, id: &EntityId, key: &str) -> Option<String> {
        self.account_mut(id).and_then(|a| a.metadata.remove(key))
    }

    /// Store a memo for an account. Refused when the account takes no memos
    /// or ignores the sender.
    pub fn memo_add(&mut self, id: &EntityId, sender: &str, text: &str) -> bool {
        let now = self.now();
        let Some(account) = self.account_mut(id) else {
            return false;
        };
        if account.flags.contains(AccountFlags::NOMEMO)
            || account
                .memo_ignores
                .iter()
                .any(|i| crate::casemap::irc_eq(i, sender))
        {
            return false;
        }
        account.memos.push(Memo {
            sender: sender.to_string(),
            sent: now,
            status: 0,
            text: text.to_string(),
        });
        true
    }

    pub fn memo_ignore_add(&mut self, id: &EntityId, sender: &str) -> bool {
        match self.account_mut(id) {
            Some(account) => {
                account.memo_ignores.push(sender.to_string());
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Has the account used up its concurrent sessions?
    pub fn user_loginmaxed(&self, id: &EntityId) -> bool {
        let Some(account) = self.account(id) else {
            return false;
        };
        if account.flags.contains(AccountFlags::LOGINNOLIMIT) {
            return false;
        }
        if self.has_priv_account(id, Some(PRIV_LOGIN_NOLIMIT)) {
            return false;
        }
        account.logins.len() >= self.config.accounts.max_logins
    }

    // ------------------------------------------------------------------------
    // Rename
    // ------------------------------------------------------------------------

    /// Rename an account. The new name must not belong to another entity.
    pub fn account_rename(&mut self, id: &EntityId, new_name: &str) -> Result<(), AccountError> {
        let Some(entity) = self.entities.get(id) else {
            return Err(AccountError::NotFound(id.to_string()));
        };
        let Some(account) = entity.as_account() else {
            return Err(AccountError::NotFound(id.to_string()));
        };
        if let Some(holder) = self.entity_names.get(new_name)
            && holder != id
        {
            return Err(AccountError::NameInUse(new_name.to_string()));
        }

        let old_name = entity.name.clone();
        let sessions = account.logins.clone();
        let relogin = !account.flags.contains(AccountFlags::WAITAUTH);
        let cycle_sessions = self.config.accounts.nick_ownership;

        if cycle_sessions {
            for uid in &sessions {
                self.push_effect(ServiceEffect::Logout {
                    uid: uid.clone(),
                    account: old_name.clone(),
                });
            }
        }

        self.entity_names.remove(&old_name);
        if self.entity_names.insert(new_name, id.clone()).is_err() {
            // only reachable if the name index and arena disagree
            let _ = self.entity_names.insert(&old_name, id.clone());
            return Err(AccountError::NameInUse(new_name.to_string()));
        }
        if let Some(entity) = self.entities.get_mut(id) {
            entity.name = new_name.to_string();
        }

        if cycle_sessions && relogin {
            for uid in &sessions {
                self.push_effect(ServiceEffect::Login {
                    uid: uid.clone(),
                    account: new_name.to_string(),
                });
            }
        }

        info!(old = %old_name, new = %new_name, "Account renamed");
        self.hook_call(&mut HookEvent::AccountRename {
            account: id.clone(),
            old_name,
        });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------------

    /// Delete an account and everything hanging off it.
    ///
    /// Returns false if `id` is not an account.
    pub fn account_delete(&mut self, id: &EntityId) -> bool {
        let Some(name) = self
            .entities
            .get(id)
            .filter(|e| e.kind() == EntityKind::Account)
            .map(|e| e.name.clone())
        else {
            return false;
        };

        debug!(account = %name, "Deleting account");
        self.name_remember(&name, id);
        self.hook_call(&mut HookEvent::AccountDelete {
            account: id.clone(),
            name: name.clone(),
        });
        if !self.entities.contains_key(id) {
            // an observer already took care of it
            return true;
        }

        // sessions
        let sessions = self
            .account_mut(id)
            .map(|a| std::mem::take(&mut a.logins))
            .unwrap_or_default();
        for uid in sessions {
            if let Some(user) = self.users.get_mut(&uid) {
                user.account = None;
                user.soper_pass = false;
            }
            self.push_effect(ServiceEffect::Logout {
                uid,
                account: name.clone(),
            });
        }

        // channel access, with succession
        self.release_entity_access(id, &name);
        self.group_memberships_purge(id);

        // operator record
        if self.privs.soper_of(id).is_some() {
            self.soper_delete(&SoperTarget::Account(id.clone()));
        }

        // satellite records
        let certfps = match self.account_mut(id) {
            Some(account) => {
                account.metadata.clear();
                account.cookies.clear();
                account.memos.clear();
                account.memo_ignores.clear();
                account.access_masks.clear();
                std::mem::take(&mut account.certfps)
            }
            None => Vec::new(),
        };
        for fp in certfps {
            self.certfps.remove(&fp.to_ascii_lowercase());
        }

        // nicknames
        let nicks = self.account(id).map(|a| a.nicks.clone()).unwrap_or_default();
        let reported: Vec<String> = nicks
            .iter()
            .filter(|n| !crate::casemap::irc_eq(n, &name))
            .cloned()
            .collect();
        for line in audit_lines(&reported, NICK_AUDIT_WIDTH) {
            info!(account = %name, nicks = %line, "DELETE: nicks from account");
        }
        for nick in nicks {
            self.nick_delete(&nick);
        }

        self.entity_del(id);
        info!(account = %name, "Account deleted");
        true
    }
}

/// Join names with ", " into lines no longer than `width`. A single name
/// longer than `width` gets a line to itself.
pub(crate) fn audit_lines(names: &[String], width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for name in names {
        if !current.is_empty() && current.len() + name.len() + 2 > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str(", ");
        }
        current.push_str(name);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_lines_wrap_at_width() {
        let names: Vec<String> = ["alpha", "beta", "gamma"].iter().map(|s| s.to_string()).collect();
        assert_eq!(audit_lines(&names, 100), vec!["alpha, beta, gamma"]);
        assert_eq!(audit_lines(&names, 12), vec!["alpha, beta", "gamma"]);
        assert!(audit_lines(&[], 10).is_empty());
    }

    #[test]
    fn audit_lines_never_drop_long_names() {
        let names = vec!["x".repeat(30), "y".to_string()];
        let lines = audit_lines(&names, 10);
        assert_eq!(lines, vec!["x".repeat(30), "y".to_string()]);
    }
}
