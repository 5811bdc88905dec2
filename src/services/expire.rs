//! Periodic expiration sweep.
//!
//! The sweep walks accounts, then nicknames, then channel registrations,
//! reclaiming records that have gone unused for longer than configured.
//! Observers can veto (or force) each decision through the `do_expire`
//! flag of the matching check event, except that unverified accounts past
//! their grace period always go.

use super::HookEvent;
use crate::casemap::irc_eq;
use crate::state::{AccountFlags, ChannelFlags, EntityId, EntityKind, Matrix};
use crate::telemetry::{OpTimer, spans};
use tracing::{debug, info};

/// Grace period for accounts that never verified their email.
pub const UNVERIFIED_GRACE: i64 = 24 * 60 * 60;

/// A used-time older than this is refreshed if the channel is in use.
pub const USED_REFRESH_AFTER: i64 = 24 * 60 * 60 - 60 * 60 - 60;

/// What one sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpireReport {
    pub accounts: Vec<String>,
    pub nicks: Vec<String>,
    pub channels: Vec<String>,
}

impl ExpireReport {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.nicks.is_empty() && self.channels.is_empty()
    }
}

/// Has `expiry` seconds passed since `last`? A zero expiry never passes.
fn elapsed(now: i64, last: i64, expiry: u64) -> bool {
    expiry > 0 && now - last >= i64::try_from(expiry).unwrap_or(i64::MAX)
}

impl Matrix {
    /// Run one expiration sweep.
    pub fn expire_check(&mut self) -> ExpireReport {
        let span = spans::sweep();
        let _enter = span.enter();
        let _timer = OpTimer::new("expire");

        let mut report = ExpireReport::default();
        self.expire_accounts(&mut report);
        self.expire_nicks(&mut report);
        self.expire_channels(&mut report);

        if !report.is_empty() {
            info!(
                accounts = report.accounts.len(),
                nicks = report.nicks.len(),
                channels = report.channels.len(),
                "Expiration sweep finished"
            );
        }
        report
    }

    fn expire_accounts(&mut self, report: &mut ExpireReport) {
        let ids: Vec<EntityId> = self
            .entities_of(EntityKind::Account)
            .map(|e| e.id.clone())
            .collect();
        let expiry = self.config.accounts.expiry;

        for id in ids {
            let now = self.now();
            let is_conf = self.is_conf_soper(&id);
            let Some(account) = self.account_mut(&id) else {
                continue;
            };
            if account.flags.contains(AccountFlags::HOLD) || is_conf {
                continue;
            }
            if !account.logins.is_empty() {
                account.last_login = now;
            }

            let unverified = account.flags.contains(AccountFlags::WAITAUTH)
                && now - account.registered >= UNVERIFIED_GRACE;
            let stale = elapsed(now, account.last_login, expiry);

            let mut event = HookEvent::AccountCheckExpire {
                account: id.clone(),
                do_expire: stale,
            };
            self.hook_call(&mut event);
            let vote = matches!(event, HookEvent::AccountCheckExpire { do_expire: true, .. });

            if !(unverified || vote) {
                continue;
            }
            // an observer may have removed it already
            let Some(name) = self.entity_name(&id).map(str::to_string) else {
                continue;
            };
            let by = if unverified || stale { "CORE" } else { "HOOK" };
            info!(account = %name, email = %self.account(&id).map(|a| a.email()).unwrap_or_default(), by, "EXPIRE: account");
            self.account_delete(&id);
            report.accounts.push(name);
        }
    }

    fn expire_nicks(&mut self, report: &mut ExpireReport) {
        let nicks: Vec<String> = self.nicks.keys().map(str::to_string).collect();
        let expiry = self.config.accounts.expiry;

        for key in nicks {
            let Some((nick, owner, last_seen)) = self
                .nicks
                .get(&key)
                .map(|n| (n.nick.clone(), n.owner.clone(), n.last_seen))
            else {
                continue;
            };

            let mut event = HookEvent::NickCheckExpire {
                nick: nick.clone(),
                do_expire: true,
            };
            self.hook_call(&mut event);
            if matches!(event, HookEvent::NickCheckExpire { do_expire: false, .. }) {
                continue;
            }

            let now = self.now();
            if last_seen >= now || !elapsed(now, last_seen, expiry) {
                continue;
            }
            let Some(owner_name) = self.entity_name(&owner).map(str::to_string) else {
                continue;
            };
            if self
                .account(&owner)
                .is_some_and(|a| a.flags.contains(AccountFlags::HOLD))
            {
                continue;
            }
            if irc_eq(&nick, &owner_name) {
                continue;
            }

            let in_use = self
                .user_find_named(&nick)
                .is_some_and(|u| u.account.as_ref() == Some(&owner));
            if in_use {
                if let Some(record) = self.nicks.get_mut(&nick) {
                    record.last_seen = now;
                }
                if let Some(account) = self.account_mut(&owner) {
                    account.last_login = now;
                }
                continue;
            }

            info!(nick = %nick, account = %owner_name, "EXPIRE: nick");
            self.nick_delete(&nick);
            report.nicks.push(nick);
        }
    }

    fn expire_channels(&mut self, report: &mut ExpireReport) {
        let names: Vec<String> = self.channels.values().map(|c| c.name.clone()).collect();
        let expiry = self.config.channels.expiry;

        for name in names {
            let Some(used) = self.channels.get(&name).map(|c| c.used) else {
                continue;
            };

            let mut event = HookEvent::ChannelCheckExpire {
                channel: name.clone(),
                do_expire: true,
            };
            self.hook_call(&mut event);
            if matches!(event, HookEvent::ChannelCheckExpire { do_expire: false, .. }) {
                continue;
            }

            let now = self.now();
            if now - used >= USED_REFRESH_AFTER && self.isused(&name) {
                if let Some(record) = self.channels.get_mut(&name) {
                    record.used = now;
                }
                debug!(channel = %name, "Refreshing used time of occupied channel");
                continue;
            }

            if used >= now || !elapsed(now, used, expiry) {
                continue;
            }
            let held = self
                .channels
                .get(&name)
                .is_none_or(|c| c.flags.contains(ChannelFlags::HOLD));
            if held {
                continue;
            }

            info!(channel = %name, founders = %self.founder_names(&name), "EXPIRE: channel");
            self.channel_drop(&name);
            report.channels.push(name);
        }
    }
}
