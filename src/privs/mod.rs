//! Operator classes and services operators.
//!
//! An operator class is a named, space-separated list of privilege names.
//! A services operator ("soper") binds an account, or a name not yet
//! registered, to a class. Three classes are built in and cannot be
//! removed: `user` (everyone), `authenticated` (anyone logged in) and
//! `ircop` (anyone with live operator status).
//!
//! - [`resolve`]: the privilege resolution chain

mod resolve;

pub use resolve::{Source, has_priv_operclass};

use crate::casemap::irc_eq;
use crate::error::OperError;
use crate::security::verify_oper_password;
use crate::state::{EntityId, Matrix};
use bitflags::bitflags;
use tracing::{debug, info};

// ============================================================================
// Privilege names
// ============================================================================

pub const PRIV_USER_AUSPEX: &str = "user:auspex";
pub const PRIV_USER_ADMIN: &str = "user:admin";
pub const PRIV_USER_SENDPASS: &str = "user:sendpass";
pub const PRIV_USER_VHOST: &str = "user:vhost";
pub const PRIV_USER_FREGISTER: &str = "user:fregister";
pub const PRIV_CHAN_AUSPEX: &str = "chan:auspex";
pub const PRIV_CHAN_ADMIN: &str = "chan:admin";
pub const PRIV_CHAN_CMODES: &str = "chan:cmodes";
pub const PRIV_JOIN_STAFFONLY: &str = "chan:joinstaffonly";
pub const PRIV_MARK: &str = "user:mark";
pub const PRIV_HOLD: &str = "user:hold";
pub const PRIV_REG_NOLIMIT: &str = "user:regnolimit";
pub const PRIV_LOGIN_NOLIMIT: &str = "user:loginnolimit";
pub const PRIV_GROUP_ADMIN: &str = "group:admin";
pub const PRIV_GROUP_AUSPEX: &str = "group:auspex";
pub const PRIV_SERVER_AUSPEX: &str = "general:auspex";
pub const PRIV_VIEWPRIVS: &str = "general:viewprivs";
pub const PRIV_FLOOD: &str = "general:flood";
pub const PRIV_HELPER: &str = "general:helper";
pub const PRIV_METADATA: &str = "general:metadata";
pub const PRIV_ADMIN: &str = "general:admin";
pub const PRIV_OMODE: &str = "operserv:omode";
pub const PRIV_AKILL: &str = "operserv:akill";
pub const PRIV_JUPE: &str = "operserv:jupe";
pub const PRIV_NOOP: &str = "operserv:noop";
pub const PRIV_GLOBAL: &str = "operserv:global";
pub const PRIV_GRANT: &str = "operserv:grant";

/// Granted to every logged-in user by the `authenticated` class.
pub const AC_AUTHENTICATED: &str = "special:authenticated";
/// Granted to nobody.
pub const AC_DISABLED: &str = "special:disabled";

pub const CLASS_USER: &str = "user";
pub const CLASS_AUTHENTICATED: &str = "authenticated";
pub const CLASS_IRCOP: &str = "ircop";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct OperClassFlags: u32 {
        /// Privileges apply only while the user holds live operator status.
        const NEEDOPER = 0x1;
        /// Cannot be deleted; survives updates.
        const BUILTIN  = 0x2;
        /// Privileges apply only after the operator password was given.
        const NEEDPASS = 0x4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct SoperFlags: u32 {
        /// Declared in configuration.
        const CONF = 0x1;
        /// Matches an account by id (`?ID` name) instead of by name.
        const EID  = 0x2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperClass {
    pub name: String,
    /// Space-separated privilege names.
    pub privs: String,
    pub flags: OperClassFlags,
}

/// What a services operator record is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoperTarget {
    Account(EntityId),
    /// A name (or `?ID`) with no account yet; bound when it registers.
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Soper {
    pub target: SoperTarget,
    /// Class by name; the class may not exist (yet).
    pub classname: String,
    pub flags: SoperFlags,
    pub password: Option<String>,
}

/// Operator classes (in declaration order) and services operators.
#[derive(Debug, Clone, Default)]
pub struct PrivRegistry {
    classes: Vec<OperClass>,
    sopers: Vec<Soper>,
}

impl PrivRegistry {
    /// A registry holding only the built-in classes.
    pub fn with_builtins() -> Self {
        let builtin = |name: &str, privs: &str| OperClass {
            name: name.to_string(),
            privs: privs.to_string(),
            flags: OperClassFlags::BUILTIN,
        };
        Self {
            classes: vec![
                builtin(CLASS_USER, ""),
                builtin(CLASS_AUTHENTICATED, AC_AUTHENTICATED),
                builtin(CLASS_IRCOP, ""),
            ],
            sopers: Vec::new(),
        }
    }

    pub fn classes(&self) -> &[OperClass] {
        &self.classes
    }

    pub fn sopers(&self) -> &[Soper] {
        &self.sopers
    }

    pub(crate) fn class(&self, name: &str) -> Option<&OperClass> {
        self.classes
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub(crate) fn soper_of(&self, id: &EntityId) -> Option<&Soper> {
        self.sopers
            .iter()
            .find(|s| s.target == SoperTarget::Account(id.clone()))
    }

    fn soper_position(&self, target: &SoperTarget) -> Option<usize> {
        self.sopers.iter().position(|s| match (&s.target, target) {
            (SoperTarget::Account(a), SoperTarget::Account(b)) => a == b,
            (SoperTarget::Named(a), SoperTarget::Named(b)) => irc_eq(a, b),
            _ => false,
        })
    }

    pub(crate) fn soper_find_named_mut(&mut self, name: &str) -> Option<&mut Soper> {
        self.sopers
            .iter_mut()
            .find(|s| matches!(&s.target, SoperTarget::Named(n) if irc_eq(n, name)))
    }
}

impl Matrix {
    // ------------------------------------------------------------------------
    // Operator classes
    // ------------------------------------------------------------------------

    /// Create a class, or update an existing one in place. Built-in classes
    /// stay built in.
    pub fn operclass_add(&mut self, name: &str, privs: &str, flags: OperClassFlags) {
        if let Some(class) = self
            .privs
            .classes
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        {
            let builtin = class.flags & OperClassFlags::BUILTIN;
            class.privs = privs.to_string();
            class.flags = flags | builtin;
            debug!(class = %name, privs = %privs, "Operator class updated");
            return;
        }

        self.privs.classes.push(OperClass {
            name: name.to_string(),
            privs: privs.to_string(),
            flags,
        });
        debug!(class = %name, privs = %privs, "Operator class created");
    }

    /// Delete a class. Built-in classes refuse.
    pub fn operclass_delete(&mut self, name: &str) -> Result<(), OperError> {
        let Some(pos) = self
            .privs
            .classes
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
        else {
            return Err(OperError::NoSuchClass(name.to_string()));
        };
        if self.privs.classes[pos].flags.contains(OperClassFlags::BUILTIN) {
            return Err(OperError::Builtin(name.to_string()));
        }
        self.privs.classes.remove(pos);
        debug!(class = %name, "Operator class deleted");
        Ok(())
    }

    pub fn operclass_find(&self, name: &str) -> Option<&OperClass> {
        self.privs.class(name)
    }

    // ------------------------------------------------------------------------
    // Services operators
    // ------------------------------------------------------------------------

    /// Declare a services operator.
    ///
    /// A configuration record replaces a runtime one for the same account;
    /// a runtime record never replaces a configuration one.
    pub fn soper_add(
        &mut self,
        name: &str,
        classname: &str,
        flags: SoperFlags,
        password: Option<String>,
    ) -> Result<(), OperError> {
        let target = match self.account_id(name) {
            Some(id) => SoperTarget::Account(id),
            None => SoperTarget::Named(name.to_string()),
        };

        if let Some(pos) = self.privs.soper_position(&target) {
            let existing = &self.privs.sopers[pos];
            let existing_conf = existing.flags.contains(SoperFlags::CONF);
            let incoming_conf = flags.contains(SoperFlags::CONF);
            if incoming_conf && !existing_conf {
                info!(oper = %name, class = %classname, old_class = %existing.classname, "Configured services operator replaces stored one");
                self.privs.sopers.remove(pos);
            } else if existing_conf && !incoming_conf {
                info!(oper = %name, class = %classname, "Ignoring stored services operator shadowed by configuration");
                return Err(OperError::ConfigOwned(name.to_string()));
            } else {
                info!(oper = %name, "Duplicate services operator");
                return Err(OperError::Duplicate(name.to_string()));
            }
        }

        debug!(oper = %name, class = %classname, "Services operator added");
        self.privs.sopers.push(Soper {
            target,
            classname: classname.to_string(),
            flags,
            password,
        });
        Ok(())
    }

    /// Remove a services operator record.
    pub fn soper_delete(&mut self, target: &SoperTarget) -> bool {
        let Some(pos) = self.privs.soper_position(target) else {
            return false;
        };
        let soper = self.privs.sopers.remove(pos);
        debug!(target = ?soper.target, "Services operator removed");
        true
    }

    /// Operator record of an account.
    pub fn soper_find(&self, id: &EntityId) -> Option<&Soper> {
        self.privs.soper_of(id)
    }

    /// Record waiting for an account of this name.
    pub fn soper_find_named(&self, name: &str) -> Option<&Soper> {
        self.privs
            .sopers
            .iter()
            .find(|s| matches!(&s.target, SoperTarget::Named(n) if irc_eq(n, name)))
    }

    /// Record waiting for the account with entity id `eid`.
    pub fn soper_find_eid(&self, eid: &str) -> Option<&Soper> {
        self.soper_find_named(&format!("?{eid}"))
    }

    pub fn is_soper(&self, id: &EntityId) -> bool {
        self.privs.soper_of(id).is_some()
    }

    pub fn is_conf_soper(&self, id: &EntityId) -> bool {
        self.privs
            .soper_of(id)
            .is_some_and(|s| s.flags.contains(SoperFlags::CONF))
    }

    /// Check a services operator password for an account. Accounts whose
    /// record has no password never pass.
    pub fn soper_verify_password(&self, id: &EntityId, password: &str) -> bool {
        self.privs
            .soper_of(id)
            .and_then(|s| s.password.as_deref())
            .is_some_and(|stored| verify_oper_password(stored, password))
    }

    /// Record that a connected user supplied their operator password.
    pub fn mark_soper_password(&mut self, uid: &str) -> bool {
        let Some(user) = self.users.get_mut(uid) else {
            return false;
        };
        user.soper_pass = true;
        true
    }

    /// Bind a waiting record (by name or `?ID`) to a new account.
    pub(crate) fn soper_bind(&mut self, name: &str, id: &EntityId) {
        let eid = format!("?{id}");
        let soper = match self.privs.soper_find_named_mut(name) {
            Some(soper) => Some(soper),
            None => self.privs.soper_find_named_mut(&eid),
        };
        if let Some(soper) = soper {
            debug!(account = %name, class = %soper.classname, "Activating declared services operator");
            soper.target = SoperTarget::Account(id.clone());
        }
    }
}
