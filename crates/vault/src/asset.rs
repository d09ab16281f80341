use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use accrual_core::HolderId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("{holder} holds {available} of the asset, {requested} requested")]
    InsufficientFunds {
        holder: HolderId,
        available: u128,
        requested: u128,
    },

    #[error("vault reserve holds {available}, {requested} requested")]
    ReserveExhausted { available: u128, requested: u128 },

    #[error("asset state lock poisoned")]
    Poisoned,
}

/// The asset the vault takes in and pays out.
///
/// `collect` moves funds from a holder into the vault's reserve; `pay` moves
/// them from the reserve to a holder. Both must be all-or-nothing.
pub trait ExternalAsset: Send + Sync {
    fn collect(&self, from: HolderId, amount: u128) -> Result<(), AssetError>;

    fn pay(&self, to: HolderId, amount: u128) -> Result<(), AssetError>;

    fn reserve(&self) -> u128;
}

impl<A> ExternalAsset for std::sync::Arc<A>
where
    A: ExternalAsset + ?Sized,
{
    fn collect(&self, from: HolderId, amount: u128) -> Result<(), AssetError> {
        (**self).collect(from, amount)
    }

    fn pay(&self, to: HolderId, amount: u128) -> Result<(), AssetError> {
        (**self).pay(to, amount)
    }

    fn reserve(&self) -> u128 {
        (**self).reserve()
    }
}

#[derive(Debug, Default)]
struct Balances {
    wallets: HashMap<HolderId, u128>,
    reserve: u128,
}

/// Asset kept in process memory: one wallet per holder plus the vault reserve.
///
/// Interest is paid out of the reserve, so it has to be topped up with
/// `fund_reserve` beyond what deposits brought in.
#[derive(Debug, Default)]
pub struct InMemoryAsset {
    balances: Mutex<Balances>,
}

impl InMemoryAsset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund_wallet(&self, holder: HolderId, amount: u128) -> Result<(), AssetError> {
        let mut b = self.balances.lock().map_err(|_| AssetError::Poisoned)?;
        let wallet = b.wallets.entry(holder).or_default();
        *wallet = wallet.saturating_add(amount);
        Ok(())
    }

    pub fn fund_reserve(&self, amount: u128) -> Result<(), AssetError> {
        let mut b = self.balances.lock().map_err(|_| AssetError::Poisoned)?;
        b.reserve = b.reserve.saturating_add(amount);
        Ok(())
    }

    pub fn wallet(&self, holder: HolderId) -> u128 {
        self.balances
            .lock()
            .map(|b| b.wallets.get(&holder).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl ExternalAsset for InMemoryAsset {
    fn collect(&self, from: HolderId, amount: u128) -> Result<(), AssetError> {
        let mut b = self.balances.lock().map_err(|_| AssetError::Poisoned)?;
        let available = b.wallets.get(&from).copied().unwrap_or(0);
        if available < amount {
            return Err(AssetError::InsufficientFunds {
                holder: from,
                available,
                requested: amount,
            });
        }
        b.wallets.insert(from, available - amount);
        b.reserve = b.reserve.saturating_add(amount);
        Ok(())
    }

    fn pay(&self, to: HolderId, amount: u128) -> Result<(), AssetError> {
        let mut b = self.balances.lock().map_err(|_| AssetError::Poisoned)?;
        if b.reserve < amount {
            return Err(AssetError::ReserveExhausted {
                available: b.reserve,
                requested: amount,
            });
        }
        b.reserve -= amount;
        let wallet = b.wallets.entry(to).or_default();
        *wallet = wallet.saturating_add(amount);
        Ok(())
    }

    fn reserve(&self) -> u128 {
        self.balances.lock().map(|b| b.reserve).unwrap_or(0)
    }
}
