use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::permissions::{self, Permission};

/// Named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Protocol owner: creates the ledger and lowers the global rate.
    pub fn owner() -> Self {
        Self(Cow::Borrowed("owner"))
    }

    /// Supply manager (typically the vault): mints and burns.
    pub fn minter() -> Self {
        Self(Cow::Borrowed("minter"))
    }

    /// Everything.
    pub fn admin() -> Self {
        Self(Cow::Borrowed("admin"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Permissions granted by this role. Unknown roles grant nothing.
    pub fn permissions(&self) -> Vec<Permission> {
        match self.as_str() {
            "admin" => vec![Permission::wildcard()],
            "owner" => vec![
                permissions::INITIALIZE.clone(),
                permissions::SET_GLOBAL_RATE.clone(),
            ],
            "minter" => vec![permissions::MINT.clone(), permissions::BURN.clone()],
            _ => Vec::new(),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minter_cannot_change_the_rate() {
        let perms = Role::minter().permissions();
        assert!(perms.contains(&permissions::MINT));
        assert!(perms.contains(&permissions::BURN));
        assert!(!perms.contains(&permissions::SET_GLOBAL_RATE));
    }

    #[test]
    fn unknown_role_grants_nothing() {
        assert!(Role::new("auditor").permissions().is_empty());
    }
}
