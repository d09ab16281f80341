//! `accrual-vault`: swaps an external asset for ledger units and back.
//!
//! Deposits mint at the ledger's current global rate; redemptions burn and pay
//! out the same amount of the asset. The asset movement runs inside the
//! ledger command, so a failed transfer leaves the ledger untouched.

pub mod asset;
pub mod vault;

pub use asset::{AssetError, ExternalAsset, InMemoryAsset};
pub use vault::{RedeemAmount, Vault, VaultError};
