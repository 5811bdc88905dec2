//! Connected users and occupied channels, as reported by the protocol layer.

use crate::casemap::irc_eq;
use crate::error::AccountError;
use crate::matching::{mask_matches, wildcard_match};
use crate::services::ServiceEffect;
use crate::soft_assert;
use crate::state::Matrix;
use crate::state::uid::EntityId;
use std::net::IpAddr;
use tracing::debug;

/// Unique user identifier (TS6 format: 9 characters).
pub type Uid = String;

/// A connected user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: Uid,
    pub nick: String,
    pub ident: String,
    /// Real host.
    pub host: String,
    /// Displayed host.
    pub vhost: String,
    /// Cloaked host.
    pub chost: String,
    pub ip: Option<IpAddr>,
    pub server: String,
    /// Holds live IRC operator status.
    pub is_oper: bool,
    /// Has supplied the services operator password this session.
    pub soper_pass: bool,
    pub account: Option<EntityId>,
    pub channels: Vec<String>,
}

impl User {
    /// A user whose displayed and cloaked hosts equal the real host.
    pub fn new(uid: &str, nick: &str, ident: &str, host: &str) -> Self {
        Self {
            uid: uid.to_string(),
            nick: nick.to_string(),
            ident: ident.to_string(),
            host: host.to_string(),
            vhost: host.to_string(),
            chost: host.to_string(),
            ip: None,
            server: String::new(),
            is_oper: false,
            soper_pass: false,
            account: None,
            channels: Vec::new(),
        }
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_vhost(mut self, vhost: &str) -> Self {
        self.vhost = vhost.to_string();
        self
    }

    pub fn with_chost(mut self, chost: &str) -> Self {
        self.chost = chost.to_string();
        self
    }

    pub fn with_server(mut self, server: &str) -> Self {
        self.server = server.to_string();
        self
    }

    /// Does a `nick!user@host` mask match this user?
    ///
    /// The displayed and cloaked forms are always tried; the real host and
    /// IP only when the user shows no vhost or `through_vhost` is set.
    pub fn matches_mask(&self, mask: &str, through_vhost: bool) -> bool {
        let shown = format!("{}!{}@{}", self.nick, self.ident, self.vhost);
        let cloaked = format!("{}!{}@{}", self.nick, self.ident, self.chost);
        if wildcard_match(mask, &shown) || wildcard_match(mask, &cloaked) {
            return true;
        }
        if !through_vhost && self.host != self.vhost {
            return false;
        }

        let real = format!("{}!{}@{}", self.nick, self.ident, self.host);
        let ip = format!(
            "{}!{}@{}",
            self.nick,
            self.ident,
            self.ip.map(|ip| ip.to_string()).unwrap_or_default()
        );
        wildcard_match(mask, &real) || mask_matches(mask, &ip)
    }
}

/// A channel with members on the network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveChannel {
    pub name: String,
    pub members: Vec<Uid>,
}

impl Matrix {
    pub fn user(&self, uid: &str) -> Option<&User> {
        self.users.get(uid)
    }

    pub fn user_find_named(&self, nick: &str) -> Option<&User> {
        self.user_nicks.get(nick).and_then(|uid| self.users.get(uid))
    }

    pub fn live_channel(&self, name: &str) -> Option<&LiveChannel> {
        self.live_channels.get(name)
    }

    /// A user connected.
    pub fn user_add(&mut self, user: User) -> bool {
        soft_assert!(!self.users.contains_key(&user.uid), false);
        soft_assert!(!self.user_nicks.contains(&user.nick), false);

        let _ = self.user_nicks.insert(&user.nick, user.uid.clone());
        debug!(uid = %user.uid, nick = %user.nick, "User connected");
        self.users.insert(user.uid.clone(), user);
        true
    }

    /// A user disconnected.
    pub fn user_quit(&mut self, uid: &str) -> bool {
        if self.users.get(uid).is_some_and(|u| u.account.is_some()) {
            self.logout(uid);
        }
        let Some(user) = self.users.remove(uid) else {
            return false;
        };
        self.user_nicks.remove(&user.nick);
        for channel in &user.channels {
            self.live_part(channel, uid);
        }
        debug!(uid = %uid, nick = %user.nick, "User disconnected");
        true
    }

    pub fn user_nick_change(&mut self, uid: &str, new_nick: &str) -> bool {
        let Some(old) = self.users.get(uid).map(|u| u.nick.clone()) else {
            return false;
        };
        if !irc_eq(&old, new_nick) {
            soft_assert!(!self.user_nicks.contains(new_nick), false);
        }
        self.user_nicks.remove(&old);
        let _ = self.user_nicks.insert(new_nick, uid.to_string());
        if let Some(user) = self.users.get_mut(uid) {
            user.nick = new_nick.to_string();
        }
        true
    }

    /// Live operator status changed. Dropping it also drops a supplied
    /// services operator password.
    pub fn user_set_oper(&mut self, uid: &str, is_oper: bool) -> bool {
        let Some(user) = self.users.get_mut(uid) else {
            return false;
        };
        user.is_oper = is_oper;
        if !is_oper {
            user.soper_pass = false;
        }
        true
    }

    pub fn channel_join(&mut self, uid: &str, channel: &str) -> bool {
        let Some(user) = self.users.get_mut(uid) else {
            return false;
        };
        if user.channels.iter().any(|c| irc_eq(c, channel)) {
            return true;
        }
        user.channels.push(channel.to_string());

        if self.live_channels.get(channel).is_none() {
            let _ = self.live_channels.insert(
                channel,
                LiveChannel {
                    name: channel.to_string(),
                    members: Vec::new(),
                },
            );
        }
        if let Some(live) = self.live_channels.get_mut(channel) {
            live.members.push(uid.to_string());
        }
        true
    }

    pub fn channel_part(&mut self, uid: &str, channel: &str) -> bool {
        let Some(user) = self.users.get_mut(uid) else {
            return false;
        };
        user.channels.retain(|c| !irc_eq(c, channel));
        self.live_part(channel, uid);
        true
    }

    fn live_part(&mut self, channel: &str, uid: &str) {
        let empty = match self.live_channels.get_mut(channel) {
            Some(live) => {
                live.members.retain(|m| m != uid);
                live.members.is_empty()
            }
            None => false,
        };
        if empty {
            self.live_channels.remove(channel);
        }
    }

    /// Log a connected user in to an account.
    pub fn login(&mut self, uid: &str, id: &EntityId) -> Result<(), AccountError> {
        if !self.users.contains_key(uid) {
            return Err(AccountError::NoSuchUser(uid.to_string()));
        }
        let Some(name) = self.account(id).and_then(|_| self.entity_name(id)) else {
            return Err(AccountError::NotFound(id.to_string()));
        };
        let name = name.to_string();

        if self.users.get(uid).and_then(|u| u.account.as_ref()) == Some(id) {
            return Ok(());
        }
        if self.user_loginmaxed(id) {
            return Err(AccountError::LoginLimit(name));
        }
        if self.users.get(uid).is_some_and(|u| u.account.is_some()) {
            self.logout(uid);
        }

        let now = self.now();
        let nick = match self.users.get_mut(uid) {
            Some(user) => {
                user.account = Some(id.clone());
                user.nick.clone()
            }
            None => return Err(AccountError::NoSuchUser(uid.to_string())),
        };
        if let Some(account) = self.account_mut(id) {
            account.logins.push(uid.to_string());
            account.last_login = now;
        }
        if let Some(record) = self.nicks.get_mut(&nick)
            && &record.owner == id
        {
            record.last_seen = now;
        }

        debug!(uid = %uid, account = %name, "Logged in");
        self.push_effect(ServiceEffect::Login {
            uid: uid.to_string(),
            account: name,
        });
        Ok(())
    }

    /// Log a connected user out.
    pub fn logout(&mut self, uid: &str) -> bool {
        let Some(id) = self.users.get_mut(uid).and_then(|u| {
            u.soper_pass = false;
            u.account.take()
        }) else {
            return false;
        };
        let now = self.now();
        if let Some(account) = self.account_mut(&id) {
            account.logins.retain(|l| l != uid);
            account.last_login = now;
        }
        let name = self.entity_name(&id).unwrap_or_default().to_string();

        debug!(uid = %uid, account = %name, "Logged out");
        self.push_effect(ServiceEffect::Logout {
            uid: uid.to_string(),
            account: name,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_matches_shown_and_cloaked_hosts() {
        let user = User::new("001AAAAAA", "alice", "al", "real.example.net")
            .with_vhost("staff/alice")
            .with_chost("cloak-1234.example.net");
        assert!(user.matches_mask("*!*@staff/alice", false));
        assert!(user.matches_mask("*!al@cloak-*", false));
        assert!(!user.matches_mask("*!*@real.example.net", false));
        assert!(user.matches_mask("*!*@real.example.net", true));
    }

    #[test]
    fn mask_matches_ip_and_cidr_without_vhost() {
        let user = User::new("001AAAAAB", "bob", "b", "host.example.net")
            .with_ip("192.0.2.10".parse().unwrap());
        assert!(user.matches_mask("*!*@192.0.2.10", false));
        assert!(user.matches_mask("*!b@192.0.2.0/24", false));
        assert!(!user.matches_mask("*!b@198.51.100.0/24", false));
    }
}
