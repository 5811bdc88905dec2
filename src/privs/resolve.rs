//! Privilege resolution.
//!
//! A privilege holds for a source when any of these grant it, tried in
//! order: the `user` class; the `ircop` class if the user has live operator
//! status; the `authenticated` class if logged in; the services operator
//! class of the account, subject to its operator and password gates.

use super::{CLASS_AUTHENTICATED, CLASS_IRCOP, CLASS_USER, OperClass, OperClassFlags, Soper};
use crate::state::{EntityId, Matrix, User};

/// Who is asking: a connected user or an account acting without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    User(&'a str),
    Account(&'a EntityId),
}

/// Does the class list `privilege` as one of its words?
pub fn has_priv_operclass(class: &OperClass, privilege: &str) -> bool {
    class.privs.split_whitespace().any(|p| p == privilege)
}

impl Matrix {
    fn class_grants(&self, name: &str, privilege: &str) -> bool {
        self.privs
            .class(name)
            .is_some_and(|c| has_priv_operclass(c, privilege))
    }

    /// Does the soper's class grant `privilege` to this (possibly absent)
    /// connection?
    fn soper_grants(&self, soper: &Soper, user: Option<&User>, privilege: &str) -> bool {
        let Some(class) = self.privs.class(&soper.classname) else {
            return false;
        };
        if let Some(user) = user {
            if class.flags.contains(OperClassFlags::NEEDOPER) && !user.is_oper {
                return false;
            }
            let needs_pass =
                soper.password.is_some() || class.flags.contains(OperClassFlags::NEEDPASS);
            if needs_pass && !user.soper_pass {
                return false;
            }
        }
        has_priv_operclass(class, privilege)
    }

    /// Does a connected user hold `privilege`? `None` always holds.
    pub fn has_priv_user(&self, uid: &str, privilege: Option<&str>) -> bool {
        let Some(privilege) = privilege else {
            return true;
        };
        let Some(user) = self.users.get(uid) else {
            return false;
        };

        if self.class_grants(CLASS_USER, privilege) {
            return true;
        }
        if user.is_oper && self.class_grants(CLASS_IRCOP, privilege) {
            return true;
        }
        let Some(account) = &user.account else {
            return false;
        };
        if self.class_grants(CLASS_AUTHENTICATED, privilege) {
            return true;
        }
        self.privs
            .soper_of(account)
            .is_some_and(|soper| self.soper_grants(soper, Some(user), privilege))
    }

    /// Does an account hold `privilege`, independent of any connection?
    pub fn has_priv_account(&self, id: &EntityId, privilege: Option<&str>) -> bool {
        let Some(privilege) = privilege else {
            return true;
        };
        if self.account(id).is_none() {
            return false;
        }
        if self.class_grants(CLASS_AUTHENTICATED, privilege) {
            return true;
        }
        self.privs
            .soper_of(id)
            .is_some_and(|soper| self.soper_grants(soper, None, privilege))
    }

    pub fn has_priv(&self, source: Source<'_>, privilege: Option<&str>) -> bool {
        match source {
            Source::User(uid) => self.has_priv_user(uid, privilege),
            Source::Account(id) => self.has_priv_account(id, privilege),
        }
    }

    /// Does the source hold every privilege of the named class? Unknown
    /// classes grant nothing to check and hold trivially.
    pub fn has_all_operclass(&self, source: Source<'_>, class: &str) -> bool {
        let Some(class) = self.privs.class(class) else {
            return true;
        };
        class
            .privs
            .split_whitespace()
            .all(|p| self.has_priv(source, Some(p)))
    }

    /// Is the source an IRC operator or a services operator?
    pub fn has_any_privs(&self, source: Source<'_>) -> bool {
        if let Source::User(uid) = source
            && self.users.get(uid).is_some_and(|u| u.is_oper)
        {
            return true;
        }
        self.source_soper(source).is_some()
    }

    /// Services operator record behind a source, if any.
    pub fn source_soper(&self, source: Source<'_>) -> Option<&Soper> {
        let account = match source {
            Source::User(uid) => self.users.get(uid)?.account.as_ref()?,
            Source::Account(id) => id,
        };
        self.privs.soper_of(account)
    }

    /// The class that best describes a source: its services operator class,
    /// else `ircop` for live operators, else `user`.
    pub fn source_operclass(&self, source: Source<'_>) -> Option<&OperClass> {
        if let Some(class) = self
            .source_soper(source)
            .and_then(|s| self.privs.class(&s.classname))
        {
            return Some(class);
        }
        if let Source::User(uid) = source
            && self.users.get(uid).is_some_and(|u| u.is_oper)
        {
            return self.privs.class(CLASS_IRCOP);
        }
        self.privs.class(CLASS_USER)
    }
}
