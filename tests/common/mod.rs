//! Shared builders for integration tests.

#![allow(dead_code)]

use slircd_services::config::Config;
use slircd_services::security::CredentialBackend;
use slircd_services::state::{AccountFlags, EntityId, Matrix, User};

/// Fixed start of the test clock.
pub const T0: i64 = 1_700_000_000;

pub const DAY: i64 = 24 * 60 * 60;

/// Stores passwords with a marker prefix instead of hashing them, so tests
/// stay fast.
pub struct PlainBackend;

impl CredentialBackend for PlainBackend {
    fn hash(&self, password: &str) -> Result<String, argon2::password_hash::Error> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        stored.strip_prefix("plain:") == Some(password)
    }
}

/// A services core with a pinned clock and cheap credentials.
pub struct TestServices {
    pub matrix: Matrix,
    next_uid: u32,
}

impl TestServices {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let mut matrix = Matrix::with_credentials(config, Box::new(PlainBackend));
        matrix.set_time(T0);
        Self { matrix, next_uid: 0 }
    }

    /// Parse a TOML configuration and build from it.
    pub fn from_toml(toml: &str) -> anyhow::Result<Self> {
        Ok(Self::with_config(Config::parse(toml)?))
    }

    pub fn account(&mut self, name: &str) -> EntityId {
        self.matrix
            .account_add(name, "secret", &format!("{name}@example.com"), AccountFlags::empty())
            .expect("account registration")
    }

    /// Connect a user with the given nick; returns its uid.
    pub fn connect(&mut self, nick: &str) -> String {
        self.next_uid += 1;
        let uid = format!("001{:06}", self.next_uid);
        let user = User::new(&uid, nick, "user", &format!("{nick}.example.net"));
        assert!(self.matrix.user_add(user));
        uid
    }

    /// Connect a user and log it in to `account`.
    pub fn connect_as(&mut self, nick: &str, account: &EntityId) -> String {
        let uid = self.connect(nick);
        self.matrix.login(&uid, account).expect("login");
        uid
    }
}
