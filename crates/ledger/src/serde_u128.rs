//! Serialize `u128` amounts as decimal strings.
//!
//! JSON numbers (and `serde_json::Value`) only carry 64-bit integers, while
//! balances and the unlimited-allowance sentinel need the full `u128` range.

use serde::{Deserialize, Deserializer, Serializer, de::Error};

pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    encoded.parse::<u128>().map_err(D::Error::custom)
}
