//! Credential handling.

pub mod password;

pub use password::{Argon2Backend, CredentialBackend, verify_oper_password};
