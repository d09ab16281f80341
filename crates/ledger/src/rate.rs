//! Fixed-point interest rates and the global-rate authority rule.

use serde::{Deserialize, Serialize};

use accrual_core::ValueObject;

use crate::error::LedgerError;

/// Fixed-point unit: `SCALE` represents 1.0.
pub const SCALE: u128 = 1_000_000_000_000_000_000;

pub const SECONDS_PER_YEAR: u128 = 31_536_000;

const BPS_DENOMINATOR: u128 = 10_000;

/// Simple interest rate in `SCALE` units per second.
///
/// A rate of `r` grows a balance by `r / SCALE` of its principal for every
/// second since the holder's last reconciliation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(#[serde(with = "crate::serde_u128")] u128);

impl ValueObject for Rate {}

impl Rate {
    pub const ZERO: Rate = Rate(0);

    pub const fn per_second(raw: u128) -> Self {
        Self(raw)
    }

    /// Convert an annual simple rate in basis points (500 = 5%/year).
    pub fn from_annual_bps(bps: u32) -> Self {
        Self(u128::from(bps) * SCALE / BPS_DENOMINATOR / SECONDS_PER_YEAR)
    }

    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Display for Rate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/s", self.0)
    }
}

/// The only admissible global-rate transition: strictly downward.
pub fn ensure_decrease(current: Rate, requested: Rate) -> Result<(), LedgerError> {
    if requested >= current {
        return Err(LedgerError::RateIncreaseRejected { current, requested });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_percent_per_year() {
        let rate = Rate::from_annual_bps(500);
        // 0.05 * 1e18 / 31_536_000, floored
        assert_eq!(rate.raw(), 1_585_489_599);
    }

    #[test]
    fn only_strict_decreases_pass() {
        let current = Rate::per_second(100);
        assert!(ensure_decrease(current, Rate::per_second(99)).is_ok());
        assert!(ensure_decrease(current, Rate::ZERO).is_ok());
        assert_eq!(
            ensure_decrease(current, current),
            Err(LedgerError::RateIncreaseRejected {
                current,
                requested: current
            })
        );
        assert!(ensure_decrease(current, Rate::per_second(101)).is_err());
    }

    #[test]
    fn zero_cannot_go_lower() {
        assert!(ensure_decrease(Rate::ZERO, Rate::ZERO).is_err());
    }

    #[test]
    fn serializes_as_decimal_string() {
        let json = serde_json::to_string(&Rate::per_second(u128::MAX)).unwrap();
        assert_eq!(json, format!("\"{}\"", u128::MAX));
        let back: Rate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Rate::per_second(u128::MAX));
    }
}
