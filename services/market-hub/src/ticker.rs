//! 24-hour ticker tracking
//!
//! Each market keeps a ring of 1440 prices indexed by a slot derived from
//! the block clock. Every trade writes the market's current slot; slots
//! between two writes are filled forward with the earlier price, so any
//! slot read one lap later answers "the price here one day ago". The
//! first write seeds every slot, which makes the first day comparable.
//!
//! Diffs are evaluated at commit. A slot that the block clock still sits
//! in is in progress — its trades may not be over — so evaluation of that
//! market is deferred to a later commit, and a diff is emitted only when
//! the newest price differs from the day-old slot value.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::numeric::serde_dec;

/// Slots in one day.
pub const MINUTES_PER_DAY: usize = 1440;

/// A 24-hour price-change snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub market: String,
    #[serde(rename = "new", with = "serde_dec")]
    pub new_price: Decimal,
    #[serde(rename = "old", with = "serde_dec")]
    pub old_price: Decimal,
    pub minute_in_day: usize,
}

/// Ring slot for a block timestamp: hour-of-day × minute-of-hour.
///
/// This is the slot numbering downstream ticker consumers index by; it
/// tops out at 23 × 59 = 1357, inside the ring's 1440 slots.
pub fn minute_in_day(block_time: i64) -> usize {
    let hour = (block_time / 3600) % 24;
    let minute = (block_time / 60) % 60;
    (hour * minute) as usize
}

/// Per-market ring of slot prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerRing {
    prices: Vec<Decimal>,
    newest_price: Decimal,
    newest_minute: usize,
    prev_price: Decimal,
    prev_minute: usize,
    initialized: bool,
}

impl Default for TickerRing {
    fn default() -> Self {
        Self {
            prices: Vec::new(),
            newest_price: Decimal::ZERO,
            newest_minute: 0,
            prev_price: Decimal::ZERO,
            prev_minute: 0,
            initialized: false,
        }
    }
}

impl TickerRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a trade price into the slot for `minute`.
    ///
    /// A price equal to the newest one changes nothing. A different price
    /// in the same slot replaces the newest value in place. A different
    /// price in a new slot shifts the window: the update before the
    /// previous one fills the ring from its own slot up to (excluding)
    /// the previous slot, so ring writes lag one update and day-old
    /// values stay readable until the clock actually passes them.
    pub fn update(&mut self, price: Decimal, minute: usize) {
        if !self.initialized {
            self.initialized = true;
            self.prices = vec![price; MINUTES_PER_DAY];
            self.newest_price = price;
            self.newest_minute = minute;
            self.prev_price = price;
            self.prev_minute = minute;
            return;
        }
        if price == self.newest_price {
            return;
        }
        if minute == self.newest_minute {
            self.newest_price = price;
            return;
        }
        self.prices[self.prev_minute] = self.prev_price;
        loop {
            self.prev_minute = (self.prev_minute + 1) % MINUTES_PER_DAY;
            if self.prev_minute == self.newest_minute {
                break;
            }
            self.prices[self.prev_minute] = self.prev_price;
        }
        self.prev_price = self.newest_price;
        self.prev_minute = self.newest_minute;
        self.newest_price = price;
        self.newest_minute = minute;
    }

    /// Whether the newest write still sits in `minute`'s slot, i.e. that
    /// slot's trades may not be over yet.
    pub fn minute_in_progress(&self, minute: usize) -> bool {
        self.initialized && self.newest_minute == minute
    }

    /// The diff at `minute`, or `None` when the price is unchanged from a
    /// day ago (or the ring has never been written).
    pub fn ticker(&self, minute: usize, market: &str) -> Option<Ticker> {
        if !self.initialized {
            return None;
        }
        let old = if self.newest_minute == minute {
            self.prev_price
        } else {
            self.prices[minute]
        };
        if old == self.newest_price {
            return None;
        }
        Some(Ticker {
            market: market.to_string(),
            new_price: self.newest_price,
            old_price: old,
            minute_in_day: minute,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    /// 2019-07-15 00:00:00 UTC.
    const DAY0: i64 = 1_563_148_800;

    fn at(hour: i64, minute: i64, second: i64) -> i64 {
        DAY0 + hour * 3600 + minute * 60 + second
    }

    #[test]
    fn test_minute_in_day_slots() {
        // 00:01:10 → 0 × 1 = 0
        assert_eq!(minute_in_day(DAY0 + 86400 + 70), 0);
        // 08:40:10 → 8 × 40 = 320
        assert_eq!(minute_in_day(at(8, 40, 10)), 320);
        // 08:39:10 → 8 × 39 = 312
        assert_eq!(minute_in_day(at(8, 39, 10)), 312);
        // midnight sharp
        assert_eq!(minute_in_day(DAY0), 0);
    }

    #[test]
    fn test_unwritten_ring_emits_nothing() {
        let ring = TickerRing::new();
        assert!(ring.ticker(0, "abc/cet").is_none());
        assert!(!ring.minute_in_progress(0));
    }

    #[test]
    fn test_first_write_seeds_whole_ring() {
        let mut ring = TickerRing::new();
        ring.update(dec("0.1"), 152);
        // Unchanged price → no diff, at any slot
        assert!(ring.ticker(152, "abc/cet").is_none());
        assert!(ring.ticker(0, "abc/cet").is_none());
        assert!(ring.minute_in_progress(152));
    }

    #[test]
    fn test_price_change_emits_diff_against_seeded_day() {
        let mut ring = TickerRing::new();
        ring.update(dec("0.1"), 152);
        ring.update(dec("0.125"), 248);

        let ticker = ring.ticker(0, "abc/cet").unwrap();
        assert_eq!(ticker.new_price, dec("0.125"));
        assert_eq!(ticker.old_price, dec("0.1"));
        assert_eq!(ticker.minute_in_day, 0);
    }

    #[test]
    fn test_unchanged_price_does_not_move_the_window() {
        let mut ring = TickerRing::new();
        ring.update(dec("0.1"), 152);
        ring.update(dec("0.125"), 248);
        ring.update(dec("0.125"), 0);

        // The newest slot is still 248; slot 0 holds the seeded day-old
        // value and evaluation there sees the full diff.
        assert!(!ring.minute_in_progress(0));
        assert!(ring.minute_in_progress(248));
        let ticker = ring.ticker(0, "abc/cet").unwrap();
        assert_eq!(ticker.old_price, dec("0.1"));
    }

    #[test]
    fn test_same_slot_rewrite_replaces_newest_in_place() {
        let mut ring = TickerRing::new();
        ring.update(dec("1"), 10);
        ring.update(dec("2"), 10);

        assert!(ring.minute_in_progress(10));
        let ticker = ring.ticker(5, "m").unwrap();
        assert_eq!(ticker.new_price, dec("2"));
        assert_eq!(ticker.old_price, dec("1"));
    }

    #[test]
    fn test_fill_forward_lags_one_update() {
        let mut ring = TickerRing::new();
        ring.update(dec("1"), 10);
        ring.update(dec("2"), 20);
        ring.update(dec("3"), 30);

        // Slots [10, 20) were filled with 1 when 3 arrived; slot 20 still
        // holds the seed until a newer update passes it.
        let ticker = ring.ticker(15, "m").unwrap();
        assert_eq!(ticker.old_price, dec("1"));
        assert_eq!(ticker.new_price, dec("3"));

        // At the newest slot the day-old value is the previous update
        let ticker = ring.ticker(30, "m").unwrap();
        assert_eq!(ticker.old_price, dec("2"));
    }

    #[test]
    fn test_ticker_wire_format() {
        let ticker = Ticker {
            market: "abc/cet".to_string(),
            new_price: dec("0.125"),
            old_price: dec("0.1"),
            minute_in_day: 0,
        };
        assert_eq!(
            serde_json::to_string(&vec![&ticker]).unwrap(),
            r#"[{"market":"abc/cet","new":"0.125000000000000000","old":"0.100000000000000000","minute_in_day":0}]"#
        );
    }

    #[test]
    fn test_ring_serde_roundtrip() {
        let mut ring = TickerRing::new();
        ring.update(dec("1"), 10);
        ring.update(dec("2"), 20);

        let json = serde_json::to_string(&ring).unwrap();
        let back: TickerRing = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ring);
    }
}
