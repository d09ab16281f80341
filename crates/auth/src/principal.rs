use serde::{Deserialize, Serialize};

use accrual_core::HolderId;

use crate::{Permission, Role};

/// The caller of a ledger operation: a holder identity plus its grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub holder: HolderId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// A plain holder with no capabilities beyond acting on its own balance.
    pub fn holder(holder: HolderId) -> Self {
        Self {
            holder,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Explicit permissions plus everything granted by roles.
    pub fn effective_permissions(&self) -> Vec<Permission> {
        let mut perms = self.permissions.clone();
        for role in &self.roles {
            for perm in role.permissions() {
                if !perms.contains(&perm) {
                    perms.push(perm);
                }
            }
        }
        perms
    }
}
