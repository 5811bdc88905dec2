//! slircd-services - identity and access control core for IRC services.
//!
//! Accounts, nicknames, groups and channel registrations live in one
//! [`state::Matrix`]. Channel access lists ([`acl`]) grant flag sets to
//! entities and hostmasks; [`privs`] resolves operator privileges;
//! [`services`] carries the hook bus, founder succession and the
//! expiration sweep; [`db`] snapshots everything to a flat file.
//!
//! The core is synchronous. A protocol layer reports users and channels
//! through the `state::user` operations and drains the queued
//! [`services::ServiceEffect`]s.

pub mod acl;
pub mod casemap;
pub mod config;
pub mod db;
pub mod error;
pub mod matching;
pub mod privs;
pub mod security;
pub mod services;
pub mod state;
pub mod telemetry;

