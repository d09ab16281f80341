//! Interest-bearing balance ledger (event-sourced).
//!
//! Pure domain logic only: no IO, no clocks, no persistence. Every command
//! carries the instant it executes at, and every mutating command reconciles
//! the holders it touches before changing their principal.

pub mod accrual;
pub mod error;
pub mod ledger;
pub mod rate;
pub mod serde_u128;

pub use accrual::HolderAccount;
pub use error::LedgerError;
pub use ledger::{
    AccountReconciled, AllowanceChanged, Approve, Burn, Burned, GlobalRateChanged,
    InitializeLedger, InterestLedger, LEDGER_AGGREGATE_TYPE, LedgerCommand, LedgerEvent,
    LedgerInitialized, Mint, Minted, RateInherited, Reconcile, SetGlobalRate, TokenMetadata,
    Transfer, TransferOnBehalf, Transferred, BURN_ALL, TRANSFER_ALL, UNLIMITED_ALLOWANCE,
};
pub use rate::{Rate, SCALE, SECONDS_PER_YEAR};
