//! Coin amounts as the chain serializes them
//!
//! Two wire forms appear in upstream payloads: structured coins
//! (`{"denom":"cet","amount":"5000"}`) and compact strings (`"5000cet"`).

use serde::{Deserialize, Serialize};

use crate::numeric::serde_int;

/// A single-denomination amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    #[serde(with = "serde_int")]
    pub amount: i128,
}

/// A coin amount locked until a release time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedCoin {
    pub coin: Coin,
    pub unlock_time: i64,
}

/// Extract the denom from a compact amount string (`"1cet"` → `"cet"`).
///
/// Returns `None` when the string carries no denom suffix.
pub fn denom_of(compact: &str) -> Option<&str> {
    let denom = compact.trim_start_matches(|c: char| c.is_ascii_digit());
    if denom.is_empty() {
        None
    } else {
        Some(denom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_wire_format() {
        let coin = Coin {
            denom: "cet".to_string(),
            amount: 5000,
        };
        let json = serde_json::to_string(&coin).unwrap();
        assert_eq!(json, r#"{"denom":"cet","amount":"5000"}"#);

        let back: Coin = serde_json::from_str(&json).unwrap();
        assert_eq!(back, coin);
    }

    #[test]
    fn test_locked_coin_wire_format() {
        let locked = LockedCoin {
            coin: Coin {
                denom: "cet".to_string(),
                amount: 5000,
            },
            unlock_time: 1563178690,
        };
        let json = serde_json::to_string(&locked).unwrap();
        assert_eq!(
            json,
            r#"{"coin":{"denom":"cet","amount":"5000"},"unlock_time":1563178690}"#
        );
    }

    #[test]
    fn test_denom_of() {
        assert_eq!(denom_of("1cet"), Some("cet"));
        assert_eq!(denom_of("200000000cet"), Some("cet"));
        assert_eq!(denom_of("15888xyz"), Some("xyz"));
        assert_eq!(denom_of("12345"), None);
        assert_eq!(denom_of(""), None);
    }
}
