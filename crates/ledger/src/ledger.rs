use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accrual_auth::{CommandAuthorization, Permission, permissions};
use accrual_core::{Aggregate, AggregateId, AggregateRoot, HolderId, LedgerId, ValueObject};
use accrual_events::Event;

use crate::accrual::HolderAccount;
use crate::error::LedgerError;
use crate::rate::{self, Rate};

/// Stream type recorded alongside every ledger event.
pub const LEDGER_AGGREGATE_TYPE: &str = "ledger.interest_ledger";

/// Transfer amount meaning "the sender's whole effective balance".
pub const TRANSFER_ALL: u128 = u128::MAX;

/// Burn amount meaning "the holder's whole effective balance".
pub const BURN_ALL: u128 = u128::MAX;

/// Allowance that is never decremented by delegated transfers.
pub const UNLIMITED_ALLOWANCE: u128 = u128::MAX;

/// Descriptive token data, fixed at initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl ValueObject for TokenMetadata {}

/// Aggregate root: InterestLedger.
///
/// Holds every holder account, every allowance and the global rate. State only
/// changes through `apply`; `handle` decides events against a reconciled view
/// of the touched holders, so a rejected command leaves nothing behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterestLedger {
    id: LedgerId,
    owner: Option<HolderId>,
    metadata: Option<TokenMetadata>,
    global_rate: Rate,
    accounts: HashMap<HolderId, HolderAccount>,
    allowances: HashMap<(HolderId, HolderId), u128>,
    version: u64,
    created: bool,
}

impl InterestLedger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            owner: None,
            metadata: None,
            global_rate: Rate::ZERO,
            accounts: HashMap::new(),
            allowances: HashMap::new(),
            version: 0,
            created: false,
        }
    }

    /// Empty aggregate for the ledger whose stream is `stream`.
    pub fn empty_for_stream(stream: AggregateId) -> Self {
        Self::empty(LedgerId::from_uuid(*stream.as_uuid()))
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn is_initialized(&self) -> bool {
        self.created
    }

    pub fn owner(&self) -> Option<HolderId> {
        self.owner
    }

    pub fn metadata(&self) -> Option<&TokenMetadata> {
        self.metadata.as_ref()
    }

    /// Rate offered to new deposits.
    pub fn global_rate(&self) -> Rate {
        self.global_rate
    }

    /// Personal rate of a holder that has ever been credited or reconciled.
    pub fn holder_rate(&self, holder: HolderId) -> Option<Rate> {
        self.accounts.get(&holder).map(|a| a.rate)
    }

    pub fn account(&self, holder: HolderId) -> Option<&HolderAccount> {
        self.accounts.get(&holder)
    }

    /// Reported balance at `now`, including unreconciled interest.
    pub fn balance_of(&self, holder: HolderId, now: DateTime<Utc>) -> Result<u128, LedgerError> {
        self.account_or_default(holder).effective_balance(now)
    }

    /// Stored principal only: units actually issued, no pending interest.
    pub fn principal_balance_of(&self, holder: HolderId) -> u128 {
        self.accounts.get(&holder).map(|a| a.principal).unwrap_or(0)
    }

    pub fn allowance(&self, owner: HolderId, spender: HolderId) -> u128 {
        self.allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }

    pub fn total_principal_supply(&self) -> u128 {
        self.accounts
            .values()
            .fold(0u128, |acc, a| acc.saturating_add(a.principal))
    }

    /// Sum of every holder's effective balance at `now`.
    pub fn total_supply(&self, now: DateTime<Utc>) -> Result<u128, LedgerError> {
        self.accounts.values().try_fold(0u128, |acc, a| {
            acc.checked_add(a.effective_balance(now)?)
                .ok_or(LedgerError::ArithmeticOverflow("total supply"))
        })
    }

    pub fn holder_count(&self) -> usize {
        self.accounts.len()
    }

    fn account_or_default(&self, holder: HolderId) -> HolderAccount {
        self.accounts.get(&holder).copied().unwrap_or_default()
    }
}

impl AggregateRoot for InterestLedger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: InitializeLedger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeLedger {
    pub ledger_id: LedgerId,
    pub owner: HolderId,
    pub metadata: TokenMetadata,
    pub initial_rate: Rate,
    pub at: DateTime<Utc>,
}

/// Command: SetGlobalRate (may only lower it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetGlobalRate {
    pub rate: Rate,
    pub at: DateTime<Utc>,
}

/// Command: Mint. Always overwrites the recipient's personal rate, even for a
/// zero amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mint {
    pub to: HolderId,
    pub amount: u128,
    pub rate: Rate,
    pub at: DateTime<Utc>,
}

/// Command: Burn. `BURN_ALL` burns the whole effective balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Burn {
    pub from: HolderId,
    pub amount: u128,
    pub at: DateTime<Utc>,
}

/// Command: Transfer. `TRANSFER_ALL` moves the whole effective balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: HolderId,
    pub to: HolderId,
    pub amount: u128,
    pub at: DateTime<Utc>,
}

/// Command: TransferOnBehalf (spender moves `from`'s units under an allowance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOnBehalf {
    pub spender: HolderId,
    pub from: HolderId,
    pub to: HolderId,
    pub amount: u128,
    pub at: DateTime<Utc>,
}

/// Command: Approve (sets, does not add to, the allowance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approve {
    pub owner: HolderId,
    pub spender: HolderId,
    pub amount: u128,
    pub at: DateTime<Utc>,
}

/// Command: Reconcile a single holder without moving funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconcile {
    pub holder: HolderId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Initialize(InitializeLedger),
    SetGlobalRate(SetGlobalRate),
    Mint(Mint),
    Burn(Burn),
    Transfer(Transfer),
    TransferOnBehalf(TransferOnBehalf),
    Approve(Approve),
    Reconcile(Reconcile),
}

impl CommandAuthorization for LedgerCommand {
    fn required_permissions(&self) -> &[Permission] {
        match self {
            LedgerCommand::Initialize(_) => std::slice::from_ref(&permissions::INITIALIZE),
            LedgerCommand::SetGlobalRate(_) => std::slice::from_ref(&permissions::SET_GLOBAL_RATE),
            LedgerCommand::Mint(_) => std::slice::from_ref(&permissions::MINT),
            LedgerCommand::Burn(_) => std::slice::from_ref(&permissions::BURN),
            LedgerCommand::Transfer(_)
            | LedgerCommand::TransferOnBehalf(_)
            | LedgerCommand::Approve(_)
            | LedgerCommand::Reconcile(_) => &[],
        }
    }
}

/// Event: LedgerInitialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInitialized {
    pub ledger_id: LedgerId,
    pub owner: HolderId,
    pub metadata: TokenMetadata,
    pub initial_rate: Rate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GlobalRateChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRateChanged {
    pub previous: Rate,
    pub rate: Rate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AccountReconciled. Recorded even when no interest was due, since
/// the reconciliation instant itself is state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountReconciled {
    pub holder: HolderId,
    #[serde(with = "crate::serde_u128")]
    pub interest: u128,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Minted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minted {
    pub to: HolderId,
    #[serde(with = "crate::serde_u128")]
    pub amount: u128,
    pub rate: Rate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Burned (amount already resolved from any sentinel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Burned {
    pub from: HolderId,
    #[serde(with = "crate::serde_u128")]
    pub amount: u128,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RateInherited (an empty recipient adopted the sender's rate).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateInherited {
    pub holder: HolderId,
    pub from: HolderId,
    pub rate: Rate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Transferred (amount already resolved from any sentinel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transferred {
    pub from: HolderId,
    pub to: HolderId,
    #[serde(with = "crate::serde_u128")]
    pub amount: u128,
    pub spender: Option<HolderId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllowanceChanged (carries the new absolute allowance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceChanged {
    pub owner: HolderId,
    pub spender: HolderId,
    #[serde(with = "crate::serde_u128")]
    pub allowance: u128,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    LedgerInitialized(LedgerInitialized),
    GlobalRateChanged(GlobalRateChanged),
    AccountReconciled(AccountReconciled),
    Minted(Minted),
    Burned(Burned),
    RateInherited(RateInherited),
    Transferred(Transferred),
    AllowanceChanged(AllowanceChanged),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::LedgerInitialized(_) => "ledger.initialized",
            LedgerEvent::GlobalRateChanged(_) => "ledger.global_rate_changed",
            LedgerEvent::AccountReconciled(_) => "ledger.account_reconciled",
            LedgerEvent::Minted(_) => "ledger.minted",
            LedgerEvent::Burned(_) => "ledger.burned",
            LedgerEvent::RateInherited(_) => "ledger.rate_inherited",
            LedgerEvent::Transferred(_) => "ledger.transferred",
            LedgerEvent::AllowanceChanged(_) => "ledger.allowance_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::LedgerInitialized(e) => e.occurred_at,
            LedgerEvent::GlobalRateChanged(e) => e.occurred_at,
            LedgerEvent::AccountReconciled(e) => e.occurred_at,
            LedgerEvent::Minted(e) => e.occurred_at,
            LedgerEvent::Burned(e) => e.occurred_at,
            LedgerEvent::RateInherited(e) => e.occurred_at,
            LedgerEvent::Transferred(e) => e.occurred_at,
            LedgerEvent::AllowanceChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InterestLedger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::LedgerInitialized(e) => {
                self.id = e.ledger_id;
                self.owner = Some(e.owner);
                self.metadata = Some(e.metadata.clone());
                self.global_rate = e.initial_rate;
                self.created = true;
            }
            LedgerEvent::GlobalRateChanged(e) => {
                self.global_rate = e.rate;
            }
            LedgerEvent::AccountReconciled(e) => {
                let acct = self.accounts.entry(e.holder).or_default();
                acct.principal = acct.principal.saturating_add(e.interest);
                acct.last_reconciled_at = acct.last_reconciled_at.max(Some(e.occurred_at));
            }
            LedgerEvent::Minted(e) => {
                let acct = self.accounts.entry(e.to).or_default();
                acct.rate = e.rate;
                acct.principal = acct.principal.saturating_add(e.amount);
            }
            LedgerEvent::Burned(e) => {
                let acct = self.accounts.entry(e.from).or_default();
                acct.principal = acct.principal.saturating_sub(e.amount);
            }
            LedgerEvent::RateInherited(e) => {
                self.accounts.entry(e.holder).or_default().rate = e.rate;
            }
            LedgerEvent::Transferred(e) => {
                let from = self.accounts.entry(e.from).or_default();
                from.principal = from.principal.saturating_sub(e.amount);
                let to = self.accounts.entry(e.to).or_default();
                to.principal = to.principal.saturating_add(e.amount);
            }
            LedgerEvent::AllowanceChanged(e) => {
                self.allowances.insert((e.owner, e.spender), e.allowance);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::Initialize(cmd) => self.handle_initialize(cmd),
            LedgerCommand::SetGlobalRate(cmd) => self.handle_set_global_rate(cmd),
            LedgerCommand::Mint(cmd) => self.handle_mint(cmd),
            LedgerCommand::Burn(cmd) => self.handle_burn(cmd),
            LedgerCommand::Transfer(cmd) => {
                self.handle_transfer(cmd.from, cmd.to, cmd.amount, None, cmd.at)
            }
            LedgerCommand::TransferOnBehalf(cmd) => {
                self.handle_transfer(cmd.from, cmd.to, cmd.amount, Some(cmd.spender), cmd.at)
            }
            LedgerCommand::Approve(cmd) => self.handle_approve(cmd),
            LedgerCommand::Reconcile(cmd) => self.handle_reconcile(cmd),
        }
    }
}

impl InterestLedger {
    fn ensure_created(&self) -> Result<(), LedgerError> {
        if !self.created {
            return Err(LedgerError::NotInitialized);
        }
        Ok(())
    }

    /// Reconciled view of `holder` at `at`, plus the event that records it.
    fn reconcile(
        &self,
        holder: HolderId,
        at: DateTime<Utc>,
    ) -> Result<(HolderAccount, LedgerEvent), LedgerError> {
        let (acct, interest) = self.account_or_default(holder).reconciled(at)?;
        let event = LedgerEvent::AccountReconciled(AccountReconciled {
            holder,
            interest,
            occurred_at: at,
        });
        Ok((acct, event))
    }

    fn handle_initialize(&self, cmd: &InitializeLedger) -> Result<Vec<LedgerEvent>, LedgerError> {
        if self.created {
            return Err(LedgerError::AlreadyInitialized);
        }
        if cmd.metadata.name.trim().is_empty() {
            return Err(LedgerError::validation("token name cannot be empty"));
        }
        if cmd.metadata.symbol.trim().is_empty() {
            return Err(LedgerError::validation("token symbol cannot be empty"));
        }

        Ok(vec![LedgerEvent::LedgerInitialized(LedgerInitialized {
            ledger_id: cmd.ledger_id,
            owner: cmd.owner,
            metadata: cmd.metadata.clone(),
            initial_rate: cmd.initial_rate,
            occurred_at: cmd.at,
        })])
    }

    fn handle_set_global_rate(&self, cmd: &SetGlobalRate) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_created()?;
        rate::ensure_decrease(self.global_rate, cmd.rate)?;

        Ok(vec![LedgerEvent::GlobalRateChanged(GlobalRateChanged {
            previous: self.global_rate,
            rate: cmd.rate,
            occurred_at: cmd.at,
        })])
    }

    fn handle_mint(&self, cmd: &Mint) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_created()?;

        let (acct, reconciled) = self.reconcile(cmd.to, cmd.at)?;
        acct.principal
            .checked_add(cmd.amount)
            .ok_or(LedgerError::ArithmeticOverflow("minted principal"))?;

        Ok(vec![
            reconciled,
            LedgerEvent::Minted(Minted {
                to: cmd.to,
                amount: cmd.amount,
                rate: cmd.rate,
                occurred_at: cmd.at,
            }),
        ])
    }

    fn handle_burn(&self, cmd: &Burn) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_created()?;

        // After reconciliation at `at`, principal equals the effective balance.
        let (acct, reconciled) = self.reconcile(cmd.from, cmd.at)?;
        let amount = if cmd.amount == BURN_ALL {
            acct.principal
        } else {
            cmd.amount
        };

        if amount > acct.principal {
            return Err(LedgerError::InsufficientBalance {
                holder: cmd.from,
                available: acct.principal,
                requested: amount,
            });
        }
        Ok(vec![
            reconciled,
            LedgerEvent::Burned(Burned {
                from: cmd.from,
                amount,
                occurred_at: cmd.at,
            }),
        ])
    }

    fn handle_transfer(
        &self,
        from: HolderId,
        to: HolderId,
        amount: u128,
        spender: Option<HolderId>,
        at: DateTime<Utc>,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_created()?;

        let (from_acct, from_reconciled) = self.reconcile(from, at)?;
        let mut events = vec![from_reconciled];

        let to_acct = if to == from {
            from_acct
        } else {
            let (acct, reconciled) = self.reconcile(to, at)?;
            events.push(reconciled);
            acct
        };

        let amount = if amount == TRANSFER_ALL {
            from_acct.principal
        } else {
            amount
        };

        if let Some(spender) = spender {
            let allowance = self.allowance(from, spender);
            if allowance < amount {
                return Err(LedgerError::InsufficientAllowance {
                    owner: from,
                    spender,
                    allowance,
                    requested: amount,
                });
            }
            if allowance != UNLIMITED_ALLOWANCE {
                events.push(LedgerEvent::AllowanceChanged(AllowanceChanged {
                    owner: from,
                    spender,
                    allowance: allowance - amount,
                    occurred_at: at,
                }));
            }
        }

        if amount > from_acct.principal {
            return Err(LedgerError::InsufficientBalance {
                holder: from,
                available: from_acct.principal,
                requested: amount,
            });
        }

        if to != from {
            // An empty recipient takes the sender's locked-in rate instead of
            // keeping whatever it held (or the zero default).
            if to_acct.principal == 0 {
                events.push(LedgerEvent::RateInherited(RateInherited {
                    holder: to,
                    from,
                    rate: from_acct.rate,
                    occurred_at: at,
                }));
            }
            to_acct
                .principal
                .checked_add(amount)
                .ok_or(LedgerError::ArithmeticOverflow("recipient principal"))?;
        }

        events.push(LedgerEvent::Transferred(Transferred {
            from,
            to,
            amount,
            spender,
            occurred_at: at,
        }));

        Ok(events)
    }

    fn handle_approve(&self, cmd: &Approve) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_created()?;

        Ok(vec![LedgerEvent::AllowanceChanged(AllowanceChanged {
            owner: cmd.owner,
            spender: cmd.spender,
            allowance: cmd.amount,
            occurred_at: cmd.at,
        })])
    }

    fn handle_reconcile(&self, cmd: &Reconcile) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.ensure_created()?;
        let (_, reconciled) = self.reconcile(cmd.holder, cmd.at)?;
        Ok(vec![reconciled])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate::{SCALE, SECONDS_PER_YEAR};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    const UNIT: u128 = SCALE;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn five_percent() -> Rate {
        Rate::from_annual_bps(500)
    }

    fn execute(ledger: &mut InterestLedger, cmd: LedgerCommand) -> Result<Vec<LedgerEvent>, LedgerError> {
        let events = ledger.handle(&cmd)?;
        for e in &events {
            ledger.apply(e);
        }
        Ok(events)
    }

    fn initialized(rate: Rate) -> InterestLedger {
        let id = LedgerId::new();
        let mut ledger = InterestLedger::empty(id);
        execute(
            &mut ledger,
            LedgerCommand::Initialize(InitializeLedger {
                ledger_id: id,
                owner: HolderId::new(),
                metadata: TokenMetadata {
                    name: "Test Token".to_string(),
                    symbol: "TST".to_string(),
                    decimals: 18,
                },
                initial_rate: rate,
                at: t0(),
            }),
        )
        .unwrap();
        ledger
    }

    fn mint(ledger: &mut InterestLedger, to: HolderId, amount: u128, rate: Rate, secs: i64) {
        execute(
            ledger,
            LedgerCommand::Mint(Mint {
                to,
                amount,
                rate,
                at: at(secs),
            }),
        )
        .unwrap();
    }

    fn transfer(from: HolderId, to: HolderId, amount: u128, secs: i64) -> LedgerCommand {
        LedgerCommand::Transfer(Transfer {
            from,
            to,
            amount,
            at: at(secs),
        })
    }

    fn on_behalf(spender: HolderId, from: HolderId, to: HolderId, amount: u128, secs: i64) -> LedgerCommand {
        LedgerCommand::TransferOnBehalf(TransferOnBehalf {
            spender,
            from,
            to,
            amount,
            at: at(secs),
        })
    }

    fn approve(ledger: &mut InterestLedger, owner: HolderId, spender: HolderId, amount: u128) {
        execute(
            ledger,
            LedgerCommand::Approve(Approve {
                owner,
                spender,
                amount,
                at: at(0),
            }),
        )
        .unwrap();
    }

    fn expected_after(principal: u128, rate: Rate, secs: u128) -> u128 {
        principal + principal * (rate.raw() * secs) / SCALE
    }

    #[test]
    fn commands_before_initialization_are_rejected() {
        let ledger = InterestLedger::empty(LedgerId::new());
        let err = ledger
            .handle(&LedgerCommand::Mint(Mint {
                to: HolderId::new(),
                amount: 1,
                rate: Rate::ZERO,
                at: t0(),
            }))
            .unwrap_err();
        assert_eq!(err, LedgerError::NotInitialized);
    }

    #[test]
    fn second_initialization_conflicts() {
        let ledger = initialized(five_percent());
        let err = ledger
            .handle(&LedgerCommand::Initialize(InitializeLedger {
                ledger_id: ledger.id_typed(),
                owner: HolderId::new(),
                metadata: ledger.metadata().unwrap().clone(),
                initial_rate: Rate::ZERO,
                at: t0(),
            }))
            .unwrap_err();
        assert_eq!(err, LedgerError::AlreadyInitialized);
    }

    #[test]
    fn empty_symbol_is_invalid() {
        let id = LedgerId::new();
        let err = InterestLedger::empty(id)
            .handle(&LedgerCommand::Initialize(InitializeLedger {
                ledger_id: id,
                owner: HolderId::new(),
                metadata: TokenMetadata {
                    name: "Name".to_string(),
                    symbol: "  ".to_string(),
                    decimals: 6,
                },
                initial_rate: Rate::ZERO,
                at: t0(),
            }))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Domain(_)));
    }

    #[test]
    fn global_rate_only_goes_down() {
        let mut ledger = initialized(five_percent());
        let higher = Rate::from_annual_bps(600);

        let err = execute(
            &mut ledger,
            LedgerCommand::SetGlobalRate(SetGlobalRate { rate: higher, at: at(1) }),
        )
        .unwrap_err();
        assert_eq!(
            err,
            LedgerError::RateIncreaseRejected {
                current: five_percent(),
                requested: higher
            }
        );

        let same = execute(
            &mut ledger,
            LedgerCommand::SetGlobalRate(SetGlobalRate {
                rate: five_percent(),
                at: at(1),
            }),
        );
        assert!(same.is_err());

        let lower = Rate::from_annual_bps(300);
        let events = execute(
            &mut ledger,
            LedgerCommand::SetGlobalRate(SetGlobalRate { rate: lower, at: at(2) }),
        )
        .unwrap();
        assert_eq!(
            events,
            vec![LedgerEvent::GlobalRateChanged(GlobalRateChanged {
                previous: five_percent(),
                rate: lower,
                occurred_at: at(2),
            })]
        );
        assert_eq!(ledger.global_rate(), lower);
    }

    #[test]
    fn minted_balance_grows_linearly() {
        let mut ledger = initialized(five_percent());
        let alice = HolderId::new();
        let amount = 1_000 * UNIT;
        mint(&mut ledger, alice, amount, five_percent(), 0);

        assert_eq!(ledger.balance_of(alice, at(0)).unwrap(), amount);
        assert_eq!(
            ledger.balance_of(alice, at(86_400)).unwrap(),
            expected_after(amount, five_percent(), 86_400)
        );
        let one_year = SECONDS_PER_YEAR as i64;
        let after_year = ledger.balance_of(alice, at(one_year)).unwrap();
        // 5% of 1000 units, give or take the floored per-second rate.
        assert!(after_year > 1_049 * UNIT && after_year <= 1_050 * UNIT);
        assert_eq!(ledger.principal_balance_of(alice), amount);
    }

    #[test]
    fn mint_reconciles_before_adding() {
        let mut ledger = initialized(five_percent());
        let alice = HolderId::new();
        mint(&mut ledger, alice, 1_000 * UNIT, five_percent(), 0);

        let accrued = ledger.balance_of(alice, at(3_600)).unwrap();
        mint(&mut ledger, alice, 10 * UNIT, five_percent(), 3_600);

        assert_eq!(ledger.principal_balance_of(alice), accrued + 10 * UNIT);
        assert_eq!(ledger.balance_of(alice, at(3_600)).unwrap(), accrued + 10 * UNIT);
    }

    #[test]
    fn mint_always_overwrites_the_personal_rate() {
        let mut ledger = initialized(five_percent());
        let alice = HolderId::new();
        mint(&mut ledger, alice, UNIT, five_percent(), 0);
        let lower = Rate::from_annual_bps(100);
        mint(&mut ledger, alice, UNIT, lower, 10);
        assert_eq!(ledger.holder_rate(alice), Some(lower));
    }

    #[test]
    fn zero_mint_reconciles_and_resets_the_rate() {
        let mut ledger = initialized(five_percent());
        let alice = HolderId::new();
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);
        let accrued = ledger.balance_of(alice, at(3_600)).unwrap();

        let lower = Rate::from_annual_bps(100);
        mint(&mut ledger, alice, 0, lower, 3_600);

        assert_eq!(ledger.principal_balance_of(alice), accrued);
        assert_eq!(ledger.holder_rate(alice), Some(lower));
    }

    #[test]
    fn burning_nothing_is_a_no_op() {
        let mut ledger = initialized(five_percent());
        let (alice, nobody) = (HolderId::new(), HolderId::new());
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);

        let events = execute(
            &mut ledger,
            LedgerCommand::Burn(Burn {
                from: alice,
                amount: 0,
                at: at(0),
            }),
        )
        .unwrap();
        assert!(events.contains(&LedgerEvent::Burned(Burned {
            from: alice,
            amount: 0,
            occurred_at: at(0),
        })));
        assert_eq!(ledger.principal_balance_of(alice), 100 * UNIT);

        let events = execute(
            &mut ledger,
            LedgerCommand::Burn(Burn {
                from: nobody,
                amount: BURN_ALL,
                at: at(10),
            }),
        )
        .unwrap();
        assert!(events.contains(&LedgerEvent::Burned(Burned {
            from: nobody,
            amount: 0,
            occurred_at: at(10),
        })));
    }

    #[test]
    fn an_earlier_reconcile_does_not_restart_the_interval() {
        let mut ledger = initialized(five_percent());
        let (alice, bob) = (HolderId::new(), HolderId::new());
        mint(&mut ledger, alice, 1_000 * UNIT, five_percent(), 0);
        mint(&mut ledger, bob, 1_000 * UNIT, five_percent(), 0);
        for holder in [alice, bob] {
            execute(
                &mut ledger,
                LedgerCommand::Reconcile(Reconcile { holder, at: at(86_400) }),
            )
            .unwrap();
        }

        let events = execute(
            &mut ledger,
            LedgerCommand::Reconcile(Reconcile { holder: alice, at: at(0) }),
        )
        .unwrap();

        assert!(matches!(
            events.as_slice(),
            [LedgerEvent::AccountReconciled(AccountReconciled { interest: 0, .. })]
        ));
        assert_eq!(
            ledger.account(alice).and_then(|a| a.last_reconciled_at),
            Some(at(86_400))
        );
        assert_eq!(
            ledger.balance_of(alice, at(2 * 86_400)).unwrap(),
            ledger.balance_of(bob, at(2 * 86_400)).unwrap()
        );
    }

    #[test]
    fn reconcile_twice_at_one_instant_is_idempotent() {
        let mut ledger = initialized(five_percent());
        let alice = HolderId::new();
        mint(&mut ledger, alice, 1_000 * UNIT, five_percent(), 0);

        let reconcile = LedgerCommand::Reconcile(Reconcile { holder: alice, at: at(500) });
        execute(&mut ledger, reconcile.clone()).unwrap();
        let principal = ledger.principal_balance_of(alice);
        assert!(principal > 1_000 * UNIT);

        let events = execute(&mut ledger, reconcile).unwrap();
        assert_eq!(
            events,
            vec![LedgerEvent::AccountReconciled(AccountReconciled {
                holder: alice,
                interest: 0,
                occurred_at: at(500),
            })]
        );
        assert_eq!(ledger.principal_balance_of(alice), principal);
    }

    #[test]
    fn burn_beyond_effective_balance_fails_without_side_effects() {
        let mut ledger = initialized(five_percent());
        let alice = HolderId::new();
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);
        let before = ledger.clone();

        let available = ledger.balance_of(alice, at(60)).unwrap();
        let err = execute(
            &mut ledger,
            LedgerCommand::Burn(Burn {
                from: alice,
                amount: available + 1,
                at: at(60),
            }),
        )
        .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                holder: alice,
                available,
                requested: available + 1
            }
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn burn_can_consume_accrued_interest() {
        let mut ledger = initialized(five_percent());
        let alice = HolderId::new();
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);

        let available = ledger.balance_of(alice, at(86_400)).unwrap();
        assert!(available > 100 * UNIT);
        execute(
            &mut ledger,
            LedgerCommand::Burn(Burn {
                from: alice,
                amount: available,
                at: at(86_400),
            }),
        )
        .unwrap();
        assert_eq!(ledger.balance_of(alice, at(86_400)).unwrap(), 0);
    }

    #[test]
    fn burn_all_resolves_to_the_effective_balance() {
        let mut ledger = initialized(five_percent());
        let alice = HolderId::new();
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);
        let available = ledger.balance_of(alice, at(1_000)).unwrap();

        let events = execute(
            &mut ledger,
            LedgerCommand::Burn(Burn {
                from: alice,
                amount: BURN_ALL,
                at: at(1_000),
            }),
        )
        .unwrap();

        assert!(events.contains(&LedgerEvent::Burned(Burned {
            from: alice,
            amount: available,
            occurred_at: at(1_000),
        })));
        assert_eq!(ledger.principal_balance_of(alice), 0);
    }

    #[test]
    fn transfer_all_moves_exactly_the_effective_balance() {
        let mut ledger = initialized(five_percent());
        let (alice, bob) = (HolderId::new(), HolderId::new());
        mint(&mut ledger, alice, 500 * UNIT, five_percent(), 0);

        let available = ledger.balance_of(alice, at(7_200)).unwrap();
        execute(&mut ledger, transfer(alice, bob, TRANSFER_ALL, 7_200)).unwrap();

        assert_eq!(ledger.balance_of(alice, at(7_200)).unwrap(), 0);
        assert_eq!(ledger.balance_of(bob, at(7_200)).unwrap(), available);
        // Nothing left to accrue on.
        assert_eq!(ledger.balance_of(alice, at(90_000)).unwrap(), 0);
    }

    #[test]
    fn transfer_beyond_balance_is_rejected() {
        let mut ledger = initialized(five_percent());
        let (alice, bob) = (HolderId::new(), HolderId::new());
        mint(&mut ledger, alice, 10, five_percent(), 0);

        let err = ledger.handle(&transfer(alice, bob, 11, 0)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                holder: alice,
                available: 10,
                requested: 11
            }
        );
    }

    #[test]
    fn fresh_recipient_inherits_the_sender_rate() {
        let mut ledger = initialized(five_percent());
        let (alice, bob) = (HolderId::new(), HolderId::new());
        mint(&mut ledger, alice, 1_000 * UNIT, five_percent(), 0);

        // Later depositors only get the lowered global rate...
        execute(
            &mut ledger,
            LedgerCommand::SetGlobalRate(SetGlobalRate {
                rate: Rate::from_annual_bps(100),
                at: at(10),
            }),
        )
        .unwrap();

        // ...but a transfer carries the sender's locked-in rate to an empty holder.
        execute(&mut ledger, transfer(alice, bob, 400 * UNIT, 10)).unwrap();
        assert_eq!(ledger.holder_rate(bob), Some(five_percent()));
        assert_eq!(ledger.holder_rate(alice), Some(five_percent()));

        let alice_principal = ledger.principal_balance_of(alice);
        let bob_principal = ledger.principal_balance_of(bob);
        assert_eq!(
            ledger.balance_of(alice, at(10 + 86_400)).unwrap(),
            expected_after(alice_principal, five_percent(), 86_400)
        );
        assert_eq!(
            ledger.balance_of(bob, at(10 + 86_400)).unwrap(),
            expected_after(bob_principal, five_percent(), 86_400)
        );
    }

    #[test]
    fn funded_recipient_keeps_its_own_rate() {
        let mut ledger = initialized(five_percent());
        let (alice, bob) = (HolderId::new(), HolderId::new());
        let bob_rate = Rate::from_annual_bps(200);
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);
        mint(&mut ledger, bob, 100 * UNIT, bob_rate, 0);

        let events = execute(&mut ledger, transfer(alice, bob, 50 * UNIT, 100)).unwrap();

        assert!(!events.iter().any(|e| matches!(e, LedgerEvent::RateInherited(_))));
        assert_eq!(ledger.holder_rate(bob), Some(bob_rate));
    }

    #[test]
    fn drained_holder_inherits_again() {
        let mut ledger = initialized(five_percent());
        let (alice, bob, carol) = (HolderId::new(), HolderId::new(), HolderId::new());
        let carol_rate = Rate::from_annual_bps(900);
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);
        mint(&mut ledger, carol, 100 * UNIT, carol_rate, 0);

        execute(&mut ledger, transfer(alice, bob, TRANSFER_ALL, 0)).unwrap();
        assert_eq!(ledger.principal_balance_of(alice), 0);
        // Drained accounts keep their rate until they receive funds again.
        assert_eq!(ledger.holder_rate(alice), Some(five_percent()));

        execute(&mut ledger, transfer(carol, alice, UNIT, 100)).unwrap();
        assert_eq!(ledger.holder_rate(alice), Some(carol_rate));
    }

    #[test]
    fn self_transfer_changes_nothing_but_the_reconciliation() {
        let mut ledger = initialized(five_percent());
        let alice = HolderId::new();
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);
        let available = ledger.balance_of(alice, at(60)).unwrap();

        execute(&mut ledger, transfer(alice, alice, 10 * UNIT, 60)).unwrap();

        assert_eq!(ledger.principal_balance_of(alice), available);
        assert_eq!(ledger.holder_rate(alice), Some(five_percent()));
    }

    #[test]
    fn finite_allowance_decreases_exactly_and_then_runs_out() {
        let mut ledger = initialized(five_percent());
        let (alice, spender, bob) = (HolderId::new(), HolderId::new(), HolderId::new());
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);
        approve(&mut ledger, alice, spender, 30 * UNIT);

        execute(&mut ledger, on_behalf(spender, alice, bob, 20 * UNIT, 0)).unwrap();
        assert_eq!(ledger.allowance(alice, spender), 10 * UNIT);
        assert_eq!(ledger.principal_balance_of(bob), 20 * UNIT);

        let err = execute(&mut ledger, on_behalf(spender, alice, bob, 11 * UNIT, 0)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientAllowance {
                owner: alice,
                spender,
                allowance: 10 * UNIT,
                requested: 11 * UNIT
            }
        );
        assert_eq!(ledger.allowance(alice, spender), 10 * UNIT);
    }

    #[test]
    fn unlimited_allowance_is_never_decremented() {
        let mut ledger = initialized(five_percent());
        let (alice, spender, bob) = (HolderId::new(), HolderId::new(), HolderId::new());
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);
        approve(&mut ledger, alice, spender, UNLIMITED_ALLOWANCE);

        execute(&mut ledger, on_behalf(spender, alice, bob, 60 * UNIT, 0)).unwrap();
        execute(&mut ledger, on_behalf(spender, alice, bob, TRANSFER_ALL, 3_600)).unwrap();

        assert_eq!(ledger.allowance(alice, spender), UNLIMITED_ALLOWANCE);
        assert_eq!(ledger.balance_of(alice, at(3_600)).unwrap(), 0);
    }

    #[test]
    fn on_behalf_without_approval_fails() {
        let mut ledger = initialized(five_percent());
        let (alice, spender) = (HolderId::new(), HolderId::new());
        mint(&mut ledger, alice, 100, five_percent(), 0);

        let err = ledger.handle(&on_behalf(spender, alice, spender, 1, 0)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAllowance { allowance: 0, .. }));
    }

    #[test]
    fn supply_views_track_principal_and_interest() {
        let mut ledger = initialized(five_percent());
        let (alice, bob) = (HolderId::new(), HolderId::new());
        mint(&mut ledger, alice, 100 * UNIT, five_percent(), 0);
        mint(&mut ledger, bob, 50 * UNIT, five_percent(), 0);

        assert_eq!(ledger.total_principal_supply(), 150 * UNIT);
        assert!(ledger.total_supply(at(1_000)).unwrap() > 150 * UNIT);
        assert_eq!(ledger.holder_count(), 2);
    }

    #[test]
    fn only_privileged_commands_need_permissions() {
        let mint = LedgerCommand::Mint(Mint {
            to: HolderId::new(),
            amount: 1,
            rate: Rate::ZERO,
            at: t0(),
        });
        assert_eq!(mint.required_permissions(), &[permissions::MINT.clone()]);
        assert!(transfer(HolderId::new(), HolderId::new(), 1, 0)
            .required_permissions()
            .is_empty());
    }

    #[test]
    fn events_survive_a_json_round_trip() {
        let event = LedgerEvent::AllowanceChanged(AllowanceChanged {
            owner: HolderId::new(),
            spender: HolderId::new(),
            allowance: UNLIMITED_ALLOWANCE,
            occurred_at: t0(),
        });
        let value = serde_json::to_value(&event).unwrap();
        let back: LedgerEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: across any sequence of rate updates the global rate never
        /// rises, and an update succeeds exactly when it lowers the rate.
        #[test]
        fn global_rate_is_non_increasing(
            updates in prop::collection::vec(0u128..10_000_000_000u128, 1..20)
        ) {
            let mut ledger = initialized(Rate::per_second(5_000_000_000));

            for raw in updates {
                let before = ledger.global_rate();
                let requested = Rate::per_second(raw);
                let result = execute(
                    &mut ledger,
                    LedgerCommand::SetGlobalRate(SetGlobalRate { rate: requested, at: t0() }),
                );

                prop_assert_eq!(result.is_ok(), requested < before);
                prop_assert!(ledger.global_rate() <= before);
            }
        }

        /// Property: transfers conserve the sum of effective balances at the
        /// instant they execute.
        #[test]
        fn transfers_conserve_supply(
            minted in 1u128..1_000_000_000_000_000_000_000u128,
            share in 0u128..=100u128,
            secs in 0i64..10_000_000,
        ) {
            let mut ledger = initialized(five_percent());
            let (alice, bob) = (HolderId::new(), HolderId::new());
            mint(&mut ledger, alice, minted, five_percent(), 0);

            let before = ledger.total_supply(at(secs)).unwrap();
            let amount = ledger.balance_of(alice, at(secs)).unwrap() / 100 * share;
            execute(&mut ledger, transfer(alice, bob, amount, secs)).unwrap();

            prop_assert_eq!(ledger.total_supply(at(secs)).unwrap(), before);
        }
    }
}
