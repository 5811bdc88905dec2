//! Operator class and services operator configuration.

use serde::Deserialize;

/// Operator class block.
///
/// ```toml
/// [[operclass]]
/// name = "sra"
/// extends = "admin"
/// privs = ["general:admin"]
/// needoper = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct OperClassBlock {
    pub name: String,
    /// Privilege names granted by this class.
    #[serde(default)]
    pub privs: Vec<String>,
    /// Inherit the privileges of a class declared earlier.
    pub extends: Option<String>,
    /// Only usable while the user holds live operator status.
    #[serde(default)]
    pub needoper: bool,
    /// Only usable once the session has supplied the operator password.
    #[serde(default)]
    pub needpass: bool,
}

/// Services operator block.
#[derive(Debug, Clone, Deserialize)]
pub struct OperBlock {
    /// Account name (the account may not be registered yet).
    pub name: String,
    pub operclass: String,
    /// Password (plaintext or bcrypt hash).
    pub password: Option<String>,
}

/// An operator class with inheritance flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOperClass {
    pub name: String,
    /// Space-separated privilege names.
    pub privs: String,
    pub needoper: bool,
    pub needpass: bool,
}

/// Flatten `extends` chains. A parent must be declared before its child;
/// unknown parents contribute nothing.
pub fn resolve_operclasses(blocks: &[OperClassBlock]) -> Vec<ResolvedOperClass> {
    let mut resolved: Vec<ResolvedOperClass> = Vec::with_capacity(blocks.len());

    for block in blocks {
        let mut privs: Vec<String> = Vec::new();
        if let Some(parent) = &block.extends
            && let Some(parent) = resolved.iter().find(|c| c.name.eq_ignore_ascii_case(parent))
        {
            privs.extend(parent.privs.split_whitespace().map(str::to_string));
        }
        for p in &block.privs {
            if !privs.contains(p) {
                privs.push(p.clone());
            }
        }

        resolved.push(ResolvedOperClass {
            name: block.name.clone(),
            privs: privs.join(" "),
            needoper: block.needoper,
            needpass: block.needpass,
        });
    }

    resolved
}
