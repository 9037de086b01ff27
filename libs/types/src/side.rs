//! Order side with the upstream chain's numeric wire encoding

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid side value: {0}")]
pub struct InvalidSide(u8);

/// Buy or sell side of an order or trade.
///
/// Serialized as the chain's numeric encoding: `1` = buy, `2` = sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Side {
    Buy = 1,
    Sell = 2,
}

impl From<Side> for u8 {
    fn from(side: Side) -> u8 {
        side as u8
    }
}

impl TryFrom<u8> for Side {
    type Error = InvalidSide;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Side::Buy),
            2 => Ok(Side::Sell),
            other => Err(InvalidSide(other)),
        }
    }
}

impl Side {
    /// The opposite side.
    pub fn flip(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_wire_encoding() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "1");
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "2");

        let side: Side = serde_json::from_str("2").unwrap();
        assert_eq!(side, Side::Sell);
    }

    #[test]
    fn test_invalid_value_rejected() {
        let result: Result<Side, _> = serde_json::from_str("3");
        assert!(result.is_err());
    }

    #[test]
    fn test_flip() {
        assert_eq!(Side::Buy.flip(), Side::Sell);
        assert_eq!(Side::Sell.flip(), Side::Buy);
    }
}
