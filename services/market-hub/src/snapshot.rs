//! Hub snapshot dump/restore
//!
//! A plain JSON document carrying every in-memory aggregate: depth books
//! (including uncommitted deltas), open candle buckets, ticker rings,
//! cursors, the sid counter, and the buffers that survive across a block
//! (slashes, pending unbonding/redelegation payloads). The indexed log is
//! not part of the document; it persists independently in the store.
//!
//! The document carries a SHA-256 checksum over its own body so a
//! truncated or hand-edited snapshot is rejected at load.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::candles::{CandleStick, MarketCandles};
use crate::depth::PricePoint;
use crate::ticker::{Ticker, TickerRing};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("snapshot checksum mismatch")]
    ChecksumMismatch,
}

/// Serialized form of one depth book.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthDump {
    pub bids: Vec<PricePoint>,
    pub asks: Vec<PricePoint>,
    pub delta_bids: Vec<PricePoint>,
    pub delta_asks: Vec<PricePoint>,
}

/// The full dump document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubSnapshot {
    pub sid: i64,
    pub height: i64,
    pub block_time: i64,
    pub last_block_time: i64,
    pub last_block_hash: String,
    pub depths: BTreeMap<String, DepthDump>,
    pub candles: BTreeMap<String, MarketCandles>,
    pub tickers: BTreeMap<String, TickerRing>,
    pub latest_tickers: BTreeMap<String, Ticker>,
    pub pending_candles: Vec<CandleStick>,
    pub pending_ticker_markets: BTreeSet<String>,
    pub pending_slash: Vec<String>,
    pub pending_unbondings: BTreeMap<String, String>,
    pub pending_redelegations: BTreeMap<String, String>,
    #[serde(default)]
    pub checksum: String,
}

impl HubSnapshot {
    /// Fill in the checksum field.
    pub fn seal(mut self) -> Result<Self, SnapshotError> {
        self.checksum = self.body_checksum()?;
        Ok(self)
    }

    /// Verify the stored checksum against the document body.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        if self.body_checksum()? == self.checksum {
            Ok(())
        } else {
            Err(SnapshotError::ChecksumMismatch)
        }
    }

    fn body_checksum(&self) -> Result<String, SnapshotError> {
        let mut body = self.clone();
        body.checksum = String::new();
        let bytes = serde_json::to_vec(&body)?;
        let digest = Sha256::digest(&bytes);
        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn sample() -> HubSnapshot {
        let mut snapshot = HubSnapshot {
            sid: 9,
            height: 1001,
            block_time: 1563178030,
            ..HubSnapshot::default()
        };
        snapshot.depths.insert(
            "abc/cet".to_string(),
            DepthDump {
                bids: vec![PricePoint {
                    price: Decimal::from(15),
                    amount: 400,
                }],
                ..DepthDump::default()
            },
        );
        snapshot
    }

    #[test]
    fn test_seal_and_verify() {
        let sealed = sample().seal().unwrap();
        assert!(!sealed.checksum.is_empty());
        sealed.verify().unwrap();
    }

    #[test]
    fn test_tampered_snapshot_rejected() {
        let mut sealed = sample().seal().unwrap();
        sealed.sid = 10;
        assert!(matches!(
            sealed.verify(),
            Err(SnapshotError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_json_roundtrip_preserves_checksum() {
        let sealed = sample().seal().unwrap();
        let json = serde_json::to_string(&sealed).unwrap();
        let back: HubSnapshot = serde_json::from_str(&json).unwrap();
        back.verify().unwrap();
        assert_eq!(back.sid, sealed.sid);
        assert_eq!(back.depths.len(), 1);
    }
}
