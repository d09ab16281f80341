//! Ledger configuration read from the environment.

use anyhow::{Context, Result};

use accrual_ledger::{Rate, TokenMetadata};

const DEFAULT_NAME: &str = "Accrual Token";
const DEFAULT_SYMBOL: &str = "ACR";
const DEFAULT_DECIMALS: u8 = 18;
const DEFAULT_INITIAL_RATE_BPS: u32 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub metadata: TokenMetadata,
    /// Annual simple rate, in basis points, offered to the first depositors.
    pub initial_rate_bps: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            metadata: TokenMetadata {
                name: DEFAULT_NAME.to_string(),
                symbol: DEFAULT_SYMBOL.to_string(),
                decimals: DEFAULT_DECIMALS,
            },
            initial_rate_bps: DEFAULT_INITIAL_RATE_BPS,
        }
    }
}

impl LedgerConfig {
    /// Read `ACCRUAL_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let name = lookup("ACCRUAL_TOKEN_NAME").unwrap_or(defaults.metadata.name);
        let symbol = lookup("ACCRUAL_TOKEN_SYMBOL").unwrap_or(defaults.metadata.symbol);

        let decimals = match lookup("ACCRUAL_TOKEN_DECIMALS") {
            Some(raw) => raw
                .trim()
                .parse::<u8>()
                .with_context(|| format!("ACCRUAL_TOKEN_DECIMALS must be an integer 0-255, got '{raw}'"))?,
            None => defaults.metadata.decimals,
        };

        let initial_rate_bps = match lookup("ACCRUAL_INITIAL_RATE_BPS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("ACCRUAL_INITIAL_RATE_BPS must be a non-negative integer, got '{raw}'"))?,
            None => {
                tracing::warn!(
                    bps = DEFAULT_INITIAL_RATE_BPS,
                    "ACCRUAL_INITIAL_RATE_BPS not set; using default initial rate"
                );
                defaults.initial_rate_bps
            }
        };

        if symbol.trim().is_empty() {
            anyhow::bail!("ACCRUAL_TOKEN_SYMBOL cannot be empty");
        }

        Ok(Self {
            metadata: TokenMetadata {
                name,
                symbol,
                decimals,
            },
            initial_rate_bps,
        })
    }

    pub fn initial_rate(&self) -> Rate {
        Rate::from_annual_bps(self.initial_rate_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_variables_use_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.initial_rate(), Rate::from_annual_bps(500));
    }

    #[test]
    fn variables_override_defaults() {
        let config = LedgerConfig::from_lookup(lookup(&[
            ("ACCRUAL_TOKEN_NAME", "Savings"),
            ("ACCRUAL_TOKEN_SYMBOL", "SAV"),
            ("ACCRUAL_TOKEN_DECIMALS", "6"),
            ("ACCRUAL_INITIAL_RATE_BPS", " 250 "),
        ]))
        .unwrap();

        assert_eq!(config.metadata.name, "Savings");
        assert_eq!(config.metadata.symbol, "SAV");
        assert_eq!(config.metadata.decimals, 6);
        assert_eq!(config.initial_rate_bps, 250);
    }

    #[test]
    fn malformed_numbers_are_reported_with_the_variable_name() {
        let err = LedgerConfig::from_lookup(lookup(&[("ACCRUAL_TOKEN_DECIMALS", "300")])).unwrap_err();
        assert!(err.to_string().contains("ACCRUAL_TOKEN_DECIMALS"));

        let err = LedgerConfig::from_lookup(lookup(&[("ACCRUAL_INITIAL_RATE_BPS", "-5")])).unwrap_err();
        assert!(err.to_string().contains("ACCRUAL_INITIAL_RATE_BPS"));
    }
}
