//! Account satellites used for identification: access masks, certificate
//! fingerprints and one-time auth cookies.

use crate::error::AccountError;
use crate::matching::{match_cidr, wildcard_match};
use crate::state::Matrix;
use crate::state::uid::EntityId;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::debug;

/// Metadata key present while an account is frozen.
pub const MD_FREEZE_FREEZER: &str = "private:freeze:freezer";

/// Seconds an auth cookie stays valid.
pub const AUTHCOOKIE_TTL: i64 = 60 * 60;

const AUTHCOOKIE_LEN: usize = 20;

/// A one-time ticket letting a web frontend act for an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCookie {
    pub ticket: String,
    pub issued: i64,
}

impl Matrix {
    // ------------------------------------------------------------------------
    // Access masks
    // ------------------------------------------------------------------------

    /// Add an access mask. Fails when the list is full or already holds the
    /// mask.
    pub fn access_add(&mut self, id: &EntityId, mask: &str) -> Result<(), AccountError> {
        let limit = self.config.accounts.max_access_masks;
        let name = self.entity_name(id).unwrap_or_default().to_string();
        let account = self
            .account_mut(id)
            .ok_or_else(|| AccountError::NotFound(id.to_string()))?;

        if account.access_masks.len() >= limit {
            return Err(AccountError::AccessListFull(name));
        }
        if account
            .access_masks
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mask))
        {
            return Err(AccountError::AccessExists(mask.to_string()));
        }

        account.access_masks.push(mask.to_string());
        debug!(account = %name, mask = %mask, "Access mask added");
        Ok(())
    }

    pub fn access_find(&self, id: &EntityId, mask: &str) -> Option<&str> {
        self.account(id)?
            .access_masks
            .iter()
            .find(|m| m.eq_ignore_ascii_case(mask))
            .map(String::as_str)
    }

    pub fn access_delete(&mut self, id: &EntityId, mask: &str) -> bool {
        let Some(account) = self.account_mut(id) else {
            return false;
        };
        let before = account.access_masks.len();
        account
            .access_masks
            .retain(|m| !m.eq_ignore_ascii_case(mask));
        before != account.access_masks.len()
    }

    /// Does a connected user match one of the account's access masks?
    /// Returns the matching mask.
    pub fn access_verify(&self, uid: &str, id: &EntityId) -> Option<&str> {
        if !self.config.accounts.use_access {
            return None;
        }
        let account = self.account(id)?;
        if account.metadata.contains_key(MD_FREEZE_FREEZER) {
            return None;
        }
        let user = self.users.get(uid)?;

        let mut candidates = vec![
            format!("{}@{}", user.ident, user.vhost),
            format!("{}@{}", user.ident, user.chost),
        ];
        if user.host != user.vhost {
            candidates.push(format!("{}@{}", user.ident, user.host));
        }
        let ip = user.ip.map(|ip| format!("{}@{}", user.ident, ip));
        if let Some(ip) = &ip {
            candidates.push(ip.clone());
        }

        account
            .access_masks
            .iter()
            .find(|mask| {
                candidates.iter().any(|c| wildcard_match(mask, c))
                    || ip.as_ref().is_some_and(|ip| match_cidr(mask, ip))
            })
            .map(String::as_str)
    }

    // ------------------------------------------------------------------------
    // Certificate fingerprints
    // ------------------------------------------------------------------------

    /// Attach a fingerprint. `force` ignores the per-account limit.
    pub fn certfp_add(&mut self, id: &EntityId, fp: &str, force: bool) -> Result<(), AccountError> {
        let key = fp.to_ascii_lowercase();
        if self.certfps.contains_key(&key) {
            return Err(AccountError::CertFpInUse(fp.to_string()));
        }
        let limit = self.config.accounts.max_certfp;
        let name = self.entity_name(id).unwrap_or_default().to_string();
        let account = self
            .account_mut(id)
            .ok_or_else(|| AccountError::NotFound(id.to_string()))?;

        if !force && limit > 0 && account.certfps.len() >= limit {
            return Err(AccountError::CertFpLimit(name));
        }

        account.certfps.push(fp.to_string());
        self.certfps.insert(key, id.clone());
        debug!(account = %name, fp = %fp, "Certificate fingerprint added");
        Ok(())
    }

    /// Owner of a fingerprint.
    pub fn certfp_find(&self, fp: &str) -> Option<&EntityId> {
        self.certfps.get(&fp.to_ascii_lowercase())
    }

    pub fn certfp_delete(&mut self, fp: &str) -> bool {
        let Some(owner) = self.certfps.remove(&fp.to_ascii_lowercase()) else {
            return false;
        };
        if let Some(account) = self.account_mut(&owner) {
            account.certfps.retain(|f| !f.eq_ignore_ascii_case(fp));
        }
        true
    }

    // ------------------------------------------------------------------------
    // Auth cookies
    // ------------------------------------------------------------------------

    /// Issue a new auth cookie for an account.
    pub fn authcookie_create(&mut self, id: &EntityId) -> Option<String> {
        let now = self.now();
        let ticket: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(AUTHCOOKIE_LEN)
            .map(char::from)
            .collect();

        let account = self.account_mut(id)?;
        account.cookies.retain(|c| now - c.issued < AUTHCOOKIE_TTL);
        account.cookies.push(AuthCookie {
            ticket: ticket.clone(),
            issued: now,
        });
        Some(ticket)
    }

    /// Is `ticket` a live cookie for the account?
    pub fn authcookie_validate(&self, id: &EntityId, ticket: &str) -> bool {
        let now = self.now();
        self.account(id).is_some_and(|a| {
            a.cookies
                .iter()
                .any(|c| c.ticket == ticket && now - c.issued < AUTHCOOKIE_TTL)
        })
    }

    pub fn authcookie_destroy_all(&mut self, id: &EntityId) {
        if let Some(account) = self.account_mut(id) {
            account.cookies.clear();
        }
    }
}
