//! Numeric wire formats
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Prices cross the wire as decimal strings with exactly 18 fractional
//! digits; integer amounts cross the wire as plain decimal strings so that
//! JSON number precision loss is impossible.

use rust_decimal::Decimal;

/// Render a decimal with exactly 18 fractional digits.
///
/// Values whose integral part is too large to carry 18 fractional digits
/// keep the largest scale that still fits the 96-bit mantissa.
pub fn dec_18(value: &Decimal) -> String {
    let mut v = *value;
    v.rescale(18);
    v.to_string()
}

/// Serde adapter: `Decimal` as an 18-fractional-digit decimal string.
pub mod serde_dec {
    use std::str::FromStr;

    use rust_decimal::Decimal;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::dec_18(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        let s = String::deserialize(deserializer)?;
        Decimal::from_str(&s).map_err(de::Error::custom)
    }
}

/// Serde adapter: `i128` amounts as decimal strings.
pub mod serde_int {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
