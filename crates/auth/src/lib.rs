//! `accrual-auth` — capability checks at the command boundary.
//!
//! Decoupled from transport and storage: callers resolve a `Principal` however
//! they like and the ledger only asks "does this principal hold permission P".

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, authorize, authorize_command};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
