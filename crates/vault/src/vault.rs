use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use accrual_auth::{Principal, Role};
use accrual_core::{Clock, HolderId};
use accrual_events::{EventBus, EventEnvelope};
use accrual_infra::{DispatchError, EventStore, LedgerService, MintRate, ServiceError};
use accrual_ledger::{BURN_ALL, LedgerError, LedgerEvent, Rate};

use crate::asset::{AssetError, ExternalAsset};

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("collecting the deposit failed: {0}")]
    CollectFailed(#[source] AssetError),

    #[error("paying out the redemption failed: {0}")]
    PayoutFailed(#[source] AssetError),

    #[error(transparent)]
    Ledger(#[from] ServiceError),
}

impl From<DispatchError<LedgerError>> for VaultError {
    fn from(value: DispatchError<LedgerError>) -> Self {
        VaultError::Ledger(ServiceError::Dispatch(value))
    }
}

impl VaultError {
    pub fn ledger_error(&self) -> Option<&LedgerError> {
        match self {
            VaultError::Ledger(e) => e.ledger_error(),
            _ => None,
        }
    }
}

/// How much to redeem.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RedeemAmount {
    Exact(u128),
    /// The holder's whole effective balance at redemption time.
    All,
}

impl RedeemAmount {
    fn as_burn_amount(self) -> u128 {
        match self {
            RedeemAmount::Exact(n) => n,
            RedeemAmount::All => BURN_ALL,
        }
    }
}

/// Exchange between an external asset and the ledger, one unit for one unit.
pub struct Vault<S, B, C, A> {
    ledger: Arc<LedgerService<S, B, C>>,
    asset: A,
    authority: Principal,
}

impl<S, B, C, A> Vault<S, B, C, A>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    C: Clock,
    A: ExternalAsset,
{
    /// `holder` is the vault's own identity on the ledger; it acts as minter.
    pub fn new(ledger: Arc<LedgerService<S, B, C>>, asset: A, holder: HolderId) -> Self {
        Self {
            ledger,
            asset,
            authority: Principal::holder(holder).with_role(Role::minter()),
        }
    }

    pub fn ledger(&self) -> &LedgerService<S, B, C> {
        &self.ledger
    }

    pub fn asset(&self) -> &A {
        &self.asset
    }

    /// Take `amount` of the asset from the caller and mint the same number of
    /// units to the caller at the global rate. Returns the minted amount.
    pub fn deposit(&self, caller: &Principal, amount: u128) -> Result<u128, VaultError> {
        let depositor = caller.holder;
        let events = self.ledger.mint_with(&self.authority, depositor, amount, MintRate::Global, |_| {
            self.asset.collect(depositor, amount).map_err(|e| {
                tracing::warn!(depositor = %depositor, amount = %amount, error = %e, "deposit collection failed");
                VaultError::CollectFailed(e)
            })
        })?;

        if let Some(rate) = minted_rate(&events) {
            tracing::info!(depositor = %depositor, amount = %amount, rate = %rate, "vault deposit");
        }
        Ok(amount)
    }

    /// Burn the caller's units and pay out the same amount of the asset.
    /// Returns the amount paid.
    pub fn redeem(&self, caller: &Principal, amount: RedeemAmount) -> Result<u128, VaultError> {
        let holder = caller.holder;
        let events = self.ledger.burn_with(&self.authority, holder, amount.as_burn_amount(), |events| {
            let amount = burned_amount(events);
            self.asset.pay(holder, amount).map_err(|e| {
                tracing::warn!(holder = %holder, amount = %amount, error = %e, "redemption payout failed");
                VaultError::PayoutFailed(e)
            })
        })?;
        let paid = burned_amount(&events);

        tracing::info!(holder = %holder, amount = %paid, "vault redemption");
        Ok(paid)
    }
}

fn minted_rate(events: &[LedgerEvent]) -> Option<Rate> {
    events.iter().find_map(|e| match e {
        LedgerEvent::Minted(m) => Some(m.rate),
        _ => None,
    })
}

fn burned_amount(events: &[LedgerEvent]) -> u128 {
    events
        .iter()
        .find_map(|e| match e {
            LedgerEvent::Burned(b) => Some(b.amount),
            _ => None,
        })
        .unwrap_or(0)
}
