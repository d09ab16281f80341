use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Opaque permission name (e.g. "ledger.mint").
///
/// `"*"` is the wildcard that satisfies any requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

/// Lower the global interest rate.
pub static SET_GLOBAL_RATE: Permission = Permission(Cow::Borrowed("ledger.rate.set"));

/// Issue new units to a holder.
pub static MINT: Permission = Permission(Cow::Borrowed("ledger.mint"));

/// Destroy units held by a holder.
pub static BURN: Permission = Permission(Cow::Borrowed("ledger.burn"));

/// Create the ledger.
pub static INITIALIZE: Permission = Permission(Cow::Borrowed("ledger.initialize"));

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn wildcard() -> Self {
        Self(Cow::Borrowed("*"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
