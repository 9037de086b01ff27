//! Time-addressed key layout
//!
//! Every indexed record lives under
//! `tag (1) || scope (64, NUL-padded) || block_time_be (8) || sid_be (8)`.
//! Big-endian integers make byte order equal (time, sid) order, so a
//! reverse scan from an upper bound walks records newest-first.
//!
//! Token sub-indexes reuse the same layout with scope `"{token}|{account}"`
//! under their own tags. The block-time index and the singleton keys
//! (latest height, sid watermark, snapshot) sit outside the record layout.

/// Fixed scope width. Bech32 addresses, trading pairs, and
/// `"{token}|{account}"` composites all fit; longer scopes are truncated.
pub const SCOPE_LEN: usize = 64;

/// Full record key length.
pub const RECORD_KEY_LEN: usize = 1 + SCOPE_LEN + 8 + 8;

/// Singleton key: latest committed height (8-byte BE).
pub const LATEST_HEIGHT_KEY: [u8; 1] = [0x00];
/// Singleton key: sid watermark (8-byte BE), committed with each batch.
pub const SID_KEY: [u8; 1] = [0x02];
/// Singleton key: persisted hub snapshot document.
pub const SNAPSHOT_KEY: [u8; 1] = [0x03];

/// Prefix of the block-time index: `0x01 || height_be` → time_be.
pub const BLOCK_TIME_TAG: u8 = 0x01;

/// Record kind tags. One byte, first position of every record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordTag {
    CandleMinute = 0x10,
    CandleHour = 0x20,
    CandleDay = 0x30,

    OrderCreate = 0x41,
    OrderFill = 0x42,
    OrderCancel = 0x43,
    Deal = 0x44,
    BancorInfo = 0x45,
    BancorTrade = 0x46,
    Income = 0x47,
    Tx = 0x48,
    Lock = 0x49,
    Unlock = 0x4a,
    Unbonding = 0x4b,
    Redelegation = 0x4c,
    Comment = 0x4d,
    Slash = 0x4e,
    Donation = 0x4f,

    OrderCreateToken = 0x61,
    OrderFillToken = 0x62,
    OrderCancelToken = 0x63,
    BancorTradeToken = 0x66,
    IncomeToken = 0x67,
    TxToken = 0x68,
    LockToken = 0x69,
    UnlockToken = 0x6a,
}

/// Per-record subtype bytes returned by composite order queries.
pub const TAG_CREATE: u8 = b'c';
pub const TAG_FILL: u8 = b'f';
pub const TAG_CANCEL: u8 = b'd';

/// NUL-pad (or truncate) a scope string to `SCOPE_LEN` bytes.
pub fn scope_bytes(scope: &str) -> [u8; SCOPE_LEN] {
    let mut out = [0u8; SCOPE_LEN];
    let raw = scope.as_bytes();
    let n = raw.len().min(SCOPE_LEN);
    out[..n].copy_from_slice(&raw[..n]);
    out
}

/// Composite scope for token sub-indexes.
pub fn token_scope(token: &str, account: &str) -> String {
    format!("{token}|{account}")
}

/// `tag || scope` — the shared prefix of one index.
pub fn index_prefix(tag: RecordTag, scope: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + SCOPE_LEN);
    key.push(tag as u8);
    key.extend_from_slice(&scope_bytes(scope));
    key
}

/// Full record key for (tag, scope, time, sid).
pub fn record_key(tag: RecordTag, scope: &str, time: i64, sid: i64) -> Vec<u8> {
    let mut key = index_prefix(tag, scope);
    key.extend_from_slice(&(time as u64).to_be_bytes());
    key.extend_from_slice(&(sid as u64).to_be_bytes());
    key
}

/// Exclusive upper bound for a reverse scan at cursor (time, sid).
///
/// `sid == 0` means "everything at or before `time`": the bound is placed
/// above every sid of that second.
pub fn upper_bound(tag: RecordTag, scope: &str, time: i64, sid: i64) -> Vec<u8> {
    let mut key = index_prefix(tag, scope);
    key.extend_from_slice(&(time as u64).to_be_bytes());
    if sid == 0 {
        key.extend_from_slice(&u64::MAX.to_be_bytes());
    } else {
        key.extend_from_slice(&(sid as u64).to_be_bytes());
    }
    key
}

/// Recover (time, sid) from the trailing 16 bytes of a record key.
pub fn time_sid_of(key: &[u8]) -> Option<(i64, i64)> {
    if key.len() != RECORD_KEY_LEN {
        return None;
    }
    let time = u64::from_be_bytes(key[key.len() - 16..key.len() - 8].try_into().ok()?);
    let sid = u64::from_be_bytes(key[key.len() - 8..].try_into().ok()?);
    Some((time as i64, sid as i64))
}

/// Block-time index key: `0x01 || height_be`.
pub fn block_time_key(height: i64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(BLOCK_TIME_TAG);
    key.extend_from_slice(&(height as u64).to_be_bytes());
    key
}

/// 8-byte big-endian value encoding shared by the singleton keys and the
/// block-time index.
pub fn encode_i64(value: i64) -> [u8; 8] {
    (value as u64).to_be_bytes()
}

pub fn decode_i64(bytes: &[u8]) -> Option<i64> {
    Some(u64::from_be_bytes(bytes.try_into().ok()?) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_padding_and_truncation() {
        let s = scope_bytes("abc/cet");
        assert_eq!(&s[..7], b"abc/cet");
        assert!(s[7..].iter().all(|&b| b == 0));

        let long = "x".repeat(100);
        let s = scope_bytes(&long);
        assert!(s.iter().all(|&b| b == b'x'));
    }

    #[test]
    fn test_record_key_layout() {
        let key = record_key(RecordTag::Deal, "abc/cet", 1563178750, 12);
        assert_eq!(key.len(), RECORD_KEY_LEN);
        assert_eq!(key[0], RecordTag::Deal as u8);
        assert_eq!(time_sid_of(&key), Some((1563178750, 12)));
    }

    #[test]
    fn test_key_order_matches_time_sid_order() {
        let a = record_key(RecordTag::Deal, "abc/cet", 100, 7);
        let b = record_key(RecordTag::Deal, "abc/cet", 100, 8);
        let c = record_key(RecordTag::Deal, "abc/cet", 101, 1);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_upper_bound_sid_zero_covers_whole_second() {
        let hi = upper_bound(RecordTag::Deal, "abc/cet", 100, 0);
        let record = record_key(RecordTag::Deal, "abc/cet", 100, i64::MAX - 1);
        assert!(record < hi);
    }

    #[test]
    fn test_upper_bound_exclusive_cursor() {
        let cursor = upper_bound(RecordTag::Deal, "abc/cet", 100, 8);
        let at_cursor = record_key(RecordTag::Deal, "abc/cet", 100, 8);
        let before = record_key(RecordTag::Deal, "abc/cet", 100, 7);
        // [lower, upper) excludes the cursor itself
        assert_eq!(cursor, at_cursor);
        assert!(before < cursor);
    }

    #[test]
    fn test_block_time_key_orders_by_height() {
        assert!(block_time_key(1000) < block_time_key(1001));
    }

    #[test]
    fn test_i64_encoding_roundtrip() {
        for v in [0i64, 1, 1563178030, i64::MAX] {
            assert_eq!(decode_i64(&encode_i64(v)), Some(v));
        }
    }

    #[test]
    fn test_token_scope_shape() {
        assert_eq!(token_scope("cet", "addr1"), "cet|addr1");
    }
}
