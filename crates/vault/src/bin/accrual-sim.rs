//! Deposit into a vault, let a simulated year pass, then redeem everything.
//!
//! Reads `ACCRUAL_*` configuration from the environment and logs every ledger
//! event through the shared tracing setup.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use accrual_auth::{Principal, Role};
use accrual_core::{HolderId, LedgerId, ManualClock};
use accrual_events::{EventEnvelope, InMemoryEventBus};
use accrual_infra::{InMemoryEventStore, LedgerConfig, LedgerService};
use accrual_ledger::SCALE;
use accrual_observability::TracingConfig;
use accrual_vault::{ExternalAsset, InMemoryAsset, RedeemAmount, Vault};

const DEPOSIT: u128 = 1_000 * SCALE;
const DAYS: i64 = 365;

fn main() -> Result<()> {
    accrual_observability::tracing::init(&TracingConfig::from_env());
    let config = LedgerConfig::from_env().context("invalid ledger configuration")?;

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let ledger = Arc::new(LedgerService::new(
        LedgerId::new(),
        InMemoryEventStore::new(),
        InMemoryEventBus::<EventEnvelope<serde_json::Value>>::new(),
        clock.clone(),
    ));

    let owner = Principal::holder(HolderId::new()).with_role(Role::owner());
    ledger
        .initialize(&owner, config.metadata.clone(), config.initial_rate())
        .context("initializing ledger")?;

    let asset = Arc::new(InMemoryAsset::new());
    let vault = Vault::new(ledger.clone(), asset.clone(), HolderId::new());

    let depositor = Principal::holder(HolderId::new());
    asset.fund_wallet(depositor.holder, DEPOSIT)?;
    asset.fund_reserve(DEPOSIT / 5)?;

    vault.deposit(&depositor, DEPOSIT).context("deposit")?;
    clock.advance_secs(DAYS * 86_400);

    let balance = ledger.balance_of(depositor.holder)?;
    tracing::info!(
        symbol = %config.metadata.symbol,
        days = DAYS,
        deposited = %DEPOSIT,
        balance = %balance,
        "balance after simulated period"
    );

    let paid = vault.redeem(&depositor, RedeemAmount::All).context("redeem")?;
    tracing::info!(
        paid = %paid,
        wallet = %asset.wallet(depositor.holder),
        reserve_left = %asset.reserve(),
        "redeemed"
    );

    Ok(())
}
