//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("services.id_prefix must be exactly 3 characters of [A-Z0-9], got '{0}'")]
    InvalidIdPrefix(String),
    #[error("accounts.max_logins must be at least 1")]
    ZeroMaxLogins,
    #[error("expire.interval must be at least 1 second")]
    ZeroExpireInterval,
    #[error("database.save_interval must be at least 1 second")]
    ZeroSaveInterval,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
    #[error("operclass name must not be empty")]
    EmptyOperClassName,
    #[error("operclass '{0}' is declared twice")]
    DuplicateOperClass(String),
    #[error("operclass '{0}' extends '{1}', which is not declared before it")]
    UnknownParentClass(String, String),
    #[error("oper '{0}' uses unknown operclass '{1}'")]
    UnknownOperClass(String, String),
    #[error("oper '{0}' is declared twice")]
    DuplicateOper(String),
}

/// Classes that always exist.
const BUILTIN_CLASSES: &[&str] = &["user", "authenticated", "ircop"];

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let prefix = &config.services.id_prefix;
    if prefix.len() != 3
        || !prefix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        errors.push(ValidationError::InvalidIdPrefix(prefix.clone()));
    }

    if config.accounts.max_logins == 0 {
        errors.push(ValidationError::ZeroMaxLogins);
    }
    if config.expire.interval == 0 {
        errors.push(ValidationError::ZeroExpireInterval);
    }
    if config.database.save_interval == 0 {
        errors.push(ValidationError::ZeroSaveInterval);
    }

    if let Some(parent) = Path::new(&config.database.path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        errors.push(ValidationError::DatabasePathInvalid(
            parent.display().to_string(),
        ));
    }

    let mut classes: HashSet<String> = BUILTIN_CLASSES.iter().map(|c| c.to_string()).collect();
    let mut declared: HashSet<String> = HashSet::new();
    for block in &config.operclass {
        let name = block.name.to_ascii_lowercase();
        if name.is_empty() {
            errors.push(ValidationError::EmptyOperClassName);
            continue;
        }
        if let Some(parent) = &block.extends
            && !classes.contains(&parent.to_ascii_lowercase())
        {
            errors.push(ValidationError::UnknownParentClass(
                block.name.clone(),
                parent.clone(),
            ));
        }
        if !declared.insert(name.clone()) {
            errors.push(ValidationError::DuplicateOperClass(block.name.clone()));
        }
        classes.insert(name);
    }

    let mut opers = HashSet::new();
    for oper in &config.oper {
        if !classes.contains(&oper.operclass.to_ascii_lowercase()) {
            errors.push(ValidationError::UnknownOperClass(
                oper.name.clone(),
                oper.operclass.clone(),
            ));
        }
        if !opers.insert(crate::casemap::irc_to_lower(&oper.name)) {
            errors.push(ValidationError::DuplicateOper(oper.name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_valid() {
        let config = Config::parse("").unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let config = Config::parse(
            r#"
            [services]
            id_prefix = "a1"

            [accounts]
            max_logins = 0

            [[operclass]]
            name = "admin"
            extends = "sra"

            [[oper]]
            name = "alice"
            operclass = "nope"

            [[oper]]
            name = "ALICE"
            operclass = "admin"
            "#,
        )
        .unwrap();

        let errors = validate(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidIdPrefix("a1".into())));
        assert!(errors.contains(&ValidationError::ZeroMaxLogins));
        assert!(errors.contains(&ValidationError::UnknownParentClass("admin".into(), "sra".into())));
        assert!(errors.contains(&ValidationError::UnknownOperClass("alice".into(), "nope".into())));
        assert!(errors.contains(&ValidationError::DuplicateOper("ALICE".into())));
    }

    #[test]
    fn opers_may_use_builtin_classes() {
        let config = Config::parse(
            r#"
            [[oper]]
            name = "bob"
            operclass = "ircop"
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_ok());
    }
}
