//! Lazy interest accrual.
//!
//! A holder's stored principal only changes when something reconciles it. In
//! between, the reported (effective) balance is derived on the fly:
//!
//! ```text
//! factor    = SCALE + rate * (now - last_reconciled_at)
//! effective = principal * factor / SCALE
//! ```
//!
//! Growth is linear within one reconciliation interval; reconciling folds the
//! interest into principal and restarts the interval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::rate::{Rate, SCALE};

/// Stored state of one holder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HolderAccount {
    /// Units issued to this holder, excluding interest not yet reconciled.
    #[serde(with = "crate::serde_u128")]
    pub principal: u128,
    /// Personal rate, set by mint or inherited on first receipt.
    pub rate: Rate,
    /// `None` until the first reconciliation.
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

impl HolderAccount {
    /// Whole seconds since the last reconciliation. A clock that went
    /// backwards counts as zero elapsed time.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u128 {
        match self.last_reconciled_at {
            Some(since) => u128::try_from((now - since).num_seconds()).unwrap_or(0),
            None => 0,
        }
    }

    pub fn accrual_factor(&self, now: DateTime<Utc>) -> Result<u128, LedgerError> {
        SCALE
            .checked_add(self.growth(now)?)
            .ok_or(LedgerError::ArithmeticOverflow("accrual factor"))
    }

    /// Interest accrued since the last reconciliation (floored).
    pub fn accrued_interest(&self, now: DateTime<Utc>) -> Result<u128, LedgerError> {
        mul_scaled(self.principal, self.growth(now)?)
    }

    /// The externally reported balance. Never below `principal`.
    pub fn effective_balance(&self, now: DateTime<Utc>) -> Result<u128, LedgerError> {
        self.principal
            .checked_add(self.accrued_interest(now)?)
            .ok_or(LedgerError::ArithmeticOverflow("effective balance"))
    }

    /// The account after folding interest into principal at `now`, plus the
    /// interest folded in. Reconciling twice at one instant folds zero, and an
    /// instant earlier than the last reconciliation never moves it back.
    pub fn reconciled(&self, now: DateTime<Utc>) -> Result<(HolderAccount, u128), LedgerError> {
        let interest = self.accrued_interest(now)?;
        let principal = self
            .principal
            .checked_add(interest)
            .ok_or(LedgerError::ArithmeticOverflow("reconciled principal"))?;

        Ok((
            HolderAccount {
                principal,
                rate: self.rate,
                last_reconciled_at: self.last_reconciled_at.max(Some(now)),
            },
            interest,
        ))
    }

    fn growth(&self, now: DateTime<Utc>) -> Result<u128, LedgerError> {
        self.rate
            .raw()
            .checked_mul(self.elapsed_secs(now))
            .ok_or(LedgerError::ArithmeticOverflow("rate growth"))
    }
}

/// `floor(value * factor / SCALE)` without a 256-bit intermediate.
///
/// Splitting `value` into whole and fractional `SCALE` parts keeps the result
/// exact: only the fractional term is floored.
pub(crate) fn mul_scaled(value: u128, factor: u128) -> Result<u128, LedgerError> {
    let whole = value / SCALE;
    let frac = value % SCALE;

    let high = whole
        .checked_mul(factor)
        .ok_or(LedgerError::ArithmeticOverflow("scaled product"))?;
    let low = frac
        .checked_mul(factor)
        .ok_or(LedgerError::ArithmeticOverflow("scaled product"))?
        / SCALE;

    high.checked_add(low)
        .ok_or(LedgerError::ArithmeticOverflow("scaled product"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn account(principal: u128, rate: u128) -> HolderAccount {
        HolderAccount {
            principal,
            rate: Rate::per_second(rate),
            last_reconciled_at: Some(t0()),
        }
    }

    #[test]
    fn factor_starts_at_one() {
        let acct = account(1_000, 7);
        assert_eq!(acct.accrual_factor(t0()).unwrap(), SCALE);
        assert_eq!(acct.accrual_factor(at(10)).unwrap(), SCALE + 70);
    }

    #[test]
    fn never_reconciled_account_has_no_elapsed_time() {
        let acct = HolderAccount {
            principal: 0,
            rate: Rate::per_second(1),
            last_reconciled_at: None,
        };
        assert_eq!(acct.elapsed_secs(at(1_000)), 0);
    }

    #[test]
    fn clock_regression_clamps_to_zero() {
        let acct = account(1_000, 1_000_000);
        assert_eq!(acct.elapsed_secs(at(-60)), 0);
        assert_eq!(acct.effective_balance(at(-60)).unwrap(), 1_000);
    }

    #[test]
    fn reconciling_in_the_past_keeps_the_interval_start() {
        let (later, _) = account(1_000_000, 1_000).reconciled(at(600)).unwrap();
        let (back, interest) = later.reconciled(at(0)).unwrap();
        assert_eq!(interest, 0);
        assert_eq!(back.last_reconciled_at, Some(at(600)));
        assert_eq!(
            back.effective_balance(at(1_200)).unwrap(),
            later.effective_balance(at(1_200)).unwrap()
        );
    }

    #[test]
    fn linear_growth_within_an_interval() {
        // 1e-6 per second on 1e12 units: +1e6 per second.
        let acct = account(1_000_000_000_000, 1_000_000_000_000);
        assert_eq!(acct.effective_balance(at(1)).unwrap(), 1_000_001_000_000);
        assert_eq!(acct.effective_balance(at(100)).unwrap(), 1_000_100_000_000);
    }

    #[test]
    fn reconcile_is_idempotent_at_one_instant() {
        let acct = account(5_000_000, 3 * SCALE / 1_000);
        let (once, interest) = acct.reconciled(at(50)).unwrap();
        assert!(interest > 0);
        let (twice, again) = once.reconciled(at(50)).unwrap();
        assert_eq!(again, 0);
        assert_eq!(twice, once);
    }

    #[test]
    fn reconcile_moves_the_interval_start() {
        let (acct, _) = account(10, 1).reconciled(at(30)).unwrap();
        assert_eq!(acct.last_reconciled_at, Some(at(30)));
        assert_eq!(acct.rate, Rate::per_second(1));
    }

    #[test]
    fn mul_scaled_handles_values_above_scale() {
        let value = 3 * SCALE + SCALE / 2;
        assert_eq!(mul_scaled(value, SCALE).unwrap(), value);
        assert_eq!(mul_scaled(value, 2 * SCALE).unwrap(), 2 * value);
        assert_eq!(mul_scaled(value, SCALE / 10).unwrap(), value / 10);
    }

    #[test]
    fn overflow_is_reported() {
        let acct = account(u128::MAX, u128::MAX / 2);
        assert!(matches!(
            acct.effective_balance(at(10)),
            Err(LedgerError::ArithmeticOverflow(_))
        ));
    }

    proptest! {
        #[test]
        fn mul_scaled_matches_naive_product_for_small_inputs(
            value in 0u128..u64::MAX as u128,
            factor in 0u128..(u64::MAX as u128),
        ) {
            prop_assert_eq!(mul_scaled(value, factor).unwrap(), value * factor / SCALE);
        }

        /// Property: with no intervening mutation the balance never shrinks over time.
        #[test]
        fn balance_never_decreases_with_time(
            principal in 0u128..1_000_000_000_000_000_000_000_000u128,
            rate in 0u128..100_000_000_000u128,
            t1 in 0i64..400_000_000,
            dt in 0i64..400_000_000,
        ) {
            let acct = account(principal, rate);
            let b1 = acct.effective_balance(at(t1)).unwrap();
            let b2 = acct.effective_balance(at(t1 + dt)).unwrap();
            prop_assert!(b1 >= principal);
            prop_assert!(b2 >= b1);
        }

        /// Property: an intermediate reconciliation never costs the holder more
        /// than the single unit lost to flooring the folded interest.
        #[test]
        fn intermediate_reconciliation_is_loss_neutral(
            principal in 0u128..1_000_000_000_000_000_000_000_000u128,
            rate in 0u128..100_000_000_000u128,
            t1 in 0i64..100_000_000,
            dt in 0i64..100_000_000,
        ) {
            let acct = account(principal, rate);
            let direct = acct.effective_balance(at(t1 + dt)).unwrap();

            let (mid, _) = acct.reconciled(at(t1)).unwrap();
            let via_mid = mid.effective_balance(at(t1 + dt)).unwrap();

            prop_assert!(via_mid + 1 >= direct);
        }
    }
}
