//! Application service for one interest-bearing ledger.
//!
//! Commands are only built here: the acting holder comes from the caller's
//! principal and the instant from the clock, both read under a write gate held
//! from load to publish. Writers therefore commit in clock order, and the
//! optimistic check on append only fails when another process shares the store.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use accrual_auth::{AuthzError, Principal, authorize_command};
use accrual_core::{Clock, HolderId, LedgerId};
use accrual_events::{EventBus, EventEnvelope};
use accrual_ledger::{
    Approve, Burn, InitializeLedger, InterestLedger, LEDGER_AGGREGATE_TYPE, LedgerCommand,
    LedgerError, LedgerEvent, Mint, Rate, Reconcile, SetGlobalRate, TokenMetadata, Transfer,
    TransferOnBehalf,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Unauthorized(#[from] AuthzError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError<LedgerError>),
}

impl ServiceError {
    /// The ledger's own rejection, if the command got that far.
    pub fn ledger_error(&self) -> Option<&LedgerError> {
        match self {
            ServiceError::Dispatch(e) => e.domain(),
            ServiceError::Unauthorized(_) => None,
        }
    }
}

impl From<LedgerError> for ServiceError {
    fn from(value: LedgerError) -> Self {
        ServiceError::Dispatch(DispatchError::Domain(value))
    }
}

/// Rate a mint assigns to the recipient.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MintRate {
    Fixed(Rate),
    /// The global rate in force when the mint is decided.
    Global,
}

pub struct LedgerService<S, B, C> {
    ledger_id: LedgerId,
    dispatcher: CommandDispatcher<S, B>,
    clock: C,
    write_gate: Mutex<()>,
}

impl<S, B, C> LedgerService<S, B, C>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    C: Clock,
{
    pub fn new(ledger_id: LedgerId, store: S, bus: B, clock: C) -> Self {
        Self {
            ledger_id,
            dispatcher: CommandDispatcher::new(store, bus),
            clock,
            write_gate: Mutex::new(()),
        }
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    pub fn initialize(
        &self,
        caller: &Principal,
        metadata: TokenMetadata,
        initial_rate: Rate,
    ) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.run(
            caller,
            |at| {
                Ok(LedgerCommand::Initialize(InitializeLedger {
                    ledger_id: self.ledger_id,
                    owner: caller.holder,
                    metadata,
                    initial_rate,
                    at,
                }))
            },
            no_effect,
        )
    }

    pub fn set_global_rate(&self, caller: &Principal, rate: Rate) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.run(
            caller,
            |at| Ok(LedgerCommand::SetGlobalRate(SetGlobalRate { rate, at })),
            no_effect,
        )
    }

    pub fn mint(
        &self,
        caller: &Principal,
        to: HolderId,
        amount: u128,
        rate: Rate,
    ) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.mint_with(caller, to, amount, MintRate::Fixed(rate), no_effect)
    }

    /// Mint, running `effect` on the decided events before they are appended.
    /// A failing effect aborts the mint with nothing stored.
    pub fn mint_with<X>(
        &self,
        caller: &Principal,
        to: HolderId,
        amount: u128,
        rate: MintRate,
        effect: impl FnOnce(&[LedgerEvent]) -> Result<(), X>,
    ) -> Result<Vec<LedgerEvent>, X>
    where
        X: From<ServiceError> + From<DispatchError<LedgerError>>,
    {
        self.run(
            caller,
            |at| {
                let rate = match rate {
                    MintRate::Fixed(rate) => rate,
                    MintRate::Global => self.snapshot()?.global_rate(),
                };
                Ok(LedgerCommand::Mint(Mint { to, amount, rate, at }))
            },
            effect,
        )
    }

    /// `amount == BURN_ALL` burns the holder's whole effective balance.
    pub fn burn(&self, caller: &Principal, from: HolderId, amount: u128) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.burn_with(caller, from, amount, no_effect)
    }

    /// Burn, running `effect` on the decided events before they are appended.
    pub fn burn_with<X>(
        &self,
        caller: &Principal,
        from: HolderId,
        amount: u128,
        effect: impl FnOnce(&[LedgerEvent]) -> Result<(), X>,
    ) -> Result<Vec<LedgerEvent>, X>
    where
        X: From<ServiceError> + From<DispatchError<LedgerError>>,
    {
        self.run(
            caller,
            |at| Ok(LedgerCommand::Burn(Burn { from, amount, at })),
            effect,
        )
    }

    /// Move the caller's own units. `amount == TRANSFER_ALL` moves everything.
    pub fn transfer(&self, caller: &Principal, to: HolderId, amount: u128) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.run(
            caller,
            |at| {
                Ok(LedgerCommand::Transfer(Transfer {
                    from: caller.holder,
                    to,
                    amount,
                    at,
                }))
            },
            no_effect,
        )
    }

    /// Move `from`'s units with the caller as spender.
    pub fn transfer_on_behalf(
        &self,
        caller: &Principal,
        from: HolderId,
        to: HolderId,
        amount: u128,
    ) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.run(
            caller,
            |at| {
                Ok(LedgerCommand::TransferOnBehalf(TransferOnBehalf {
                    spender: caller.holder,
                    from,
                    to,
                    amount,
                    at,
                }))
            },
            no_effect,
        )
    }

    /// Set the allowance the caller grants `spender`.
    pub fn approve(&self, caller: &Principal, spender: HolderId, amount: u128) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.run(
            caller,
            |at| {
                Ok(LedgerCommand::Approve(Approve {
                    owner: caller.holder,
                    spender,
                    amount,
                    at,
                }))
            },
            no_effect,
        )
    }

    /// Fold a holder's accrued interest into principal without moving funds.
    pub fn reconcile(&self, caller: &Principal, holder: HolderId) -> Result<Vec<LedgerEvent>, ServiceError> {
        self.run(
            caller,
            |at| Ok(LedgerCommand::Reconcile(Reconcile { holder, at })),
            no_effect,
        )
    }

    /// Build the command under the write gate, stamped with the clock, then
    /// authorize and dispatch it.
    fn run<X>(
        &self,
        caller: &Principal,
        build: impl FnOnce(DateTime<Utc>) -> Result<LedgerCommand, ServiceError>,
        effect: impl FnOnce(&[LedgerEvent]) -> Result<(), X>,
    ) -> Result<Vec<LedgerEvent>, X>
    where
        X: From<ServiceError> + From<DispatchError<LedgerError>>,
    {
        let _gate = self.write_gate.lock().unwrap_or_else(|e| e.into_inner());

        let command = build(self.clock.now()).map_err(X::from)?;
        if let Err(e) = authorize_command(caller, &command) {
            tracing::warn!(caller = %caller.holder, error = %e, "ledger command not authorized");
            return Err(ServiceError::from(e).into());
        }

        let committed = self
            .dispatcher
            .dispatch_with(
                self.ledger_id.stream_id(),
                LEDGER_AGGREGATE_TYPE,
                command,
                InterestLedger::empty_for_stream,
                effect,
            )
            .inspect_err(|_| {
                tracing::warn!(caller = %caller.holder, "ledger command rejected");
            })?;

        for event in &committed.events {
            log_committed(event);
        }
        tracing::debug!(caller = %caller.holder, version = ?committed.version(), "ledger command committed");

        Ok(committed.events)
    }

    /// Current aggregate state, rebuilt from the stream.
    pub fn snapshot(&self) -> Result<InterestLedger, ServiceError> {
        Ok(self
            .dispatcher
            .load(self.ledger_id.stream_id(), InterestLedger::empty_for_stream)?)
    }

    pub fn stream_version(&self) -> Result<u64, ServiceError> {
        Ok(accrual_core::AggregateRoot::version(&self.snapshot()?))
    }

    pub fn balance_of(&self, holder: HolderId) -> Result<u128, ServiceError> {
        Ok(self.snapshot()?.balance_of(holder, self.clock.now())?)
    }

    pub fn principal_balance_of(&self, holder: HolderId) -> Result<u128, ServiceError> {
        Ok(self.snapshot()?.principal_balance_of(holder))
    }

    pub fn global_rate(&self) -> Result<Rate, ServiceError> {
        Ok(self.snapshot()?.global_rate())
    }

    pub fn holder_rate(&self, holder: HolderId) -> Result<Option<Rate>, ServiceError> {
        Ok(self.snapshot()?.holder_rate(holder))
    }

    pub fn allowance(&self, owner: HolderId, spender: HolderId) -> Result<u128, ServiceError> {
        Ok(self.snapshot()?.allowance(owner, spender))
    }

    pub fn total_principal_supply(&self) -> Result<u128, ServiceError> {
        Ok(self.snapshot()?.total_principal_supply())
    }

    pub fn total_supply(&self) -> Result<u128, ServiceError> {
        Ok(self.snapshot()?.total_supply(self.clock.now())?)
    }

    pub fn metadata(&self) -> Result<Option<TokenMetadata>, ServiceError> {
        Ok(self.snapshot()?.metadata().cloned())
    }

    pub fn owner(&self) -> Result<Option<HolderId>, ServiceError> {
        Ok(self.snapshot()?.owner())
    }
}

fn no_effect(_: &[LedgerEvent]) -> Result<(), ServiceError> {
    Ok(())
}

fn log_committed(event: &LedgerEvent) {
    match event {
        LedgerEvent::LedgerInitialized(e) => {
            tracing::info!(owner = %e.owner, symbol = %e.metadata.symbol, rate = %e.initial_rate, "ledger initialized");
        }
        LedgerEvent::GlobalRateChanged(e) => {
            tracing::info!(previous = %e.previous, rate = %e.rate, "global rate lowered");
        }
        LedgerEvent::AccountReconciled(e) => {
            tracing::debug!(holder = %e.holder, interest = %e.interest, "account reconciled");
        }
        LedgerEvent::Minted(e) => {
            tracing::info!(to = %e.to, amount = %e.amount, rate = %e.rate, "minted");
        }
        LedgerEvent::Burned(e) => {
            tracing::info!(from = %e.from, amount = %e.amount, "burned");
        }
        LedgerEvent::RateInherited(e) => {
            tracing::debug!(holder = %e.holder, from = %e.from, rate = %e.rate, "rate inherited");
        }
        LedgerEvent::Transferred(e) => {
            tracing::info!(from = %e.from, to = %e.to, amount = %e.amount, on_behalf = e.spender.is_some(), "transferred");
        }
        LedgerEvent::AllowanceChanged(e) => {
            tracing::info!(owner = %e.owner, spender = %e.spender, allowance = %e.allowance, "allowance changed");
        }
    }
}
