//! Per-pair order-book depth with per-block delta accumulation
//!
//! Maintains bid/ask price-level totals mirrored from externally matched
//! order events. Uses `BTreeMap` for deterministic sorted iteration.
//!
//! The book processes:
//! - create → add quantity to the side's price level
//! - fill → subtract `curr_stock` from the level
//! - cancel → subtract `left_stock` from the level
//!
//! Alongside the book, a per-block delta map records every level that
//! changed since the last commit, keyed by price with the level's new
//! amount. Zero means the level drained; a negative amount records an
//! out-of-sequence subtraction against a missing level and is preserved
//! for downstream reconciliation, never clamped.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::numeric::{serde_dec, serde_int};
use types::side::Side;

/// One price level: price plus aggregate amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    #[serde(rename = "p", with = "serde_dec")]
    pub price: Decimal,
    #[serde(rename = "a", with = "serde_int")]
    pub amount: i128,
}

/// The per-side delta message published at commit.
///
/// Exactly one of `bids` / `asks` is set per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthUpdate {
    pub trading_pair: String,
    pub bids: Option<Vec<PricePoint>>,
    pub asks: Option<Vec<PricePoint>>,
}

/// Depth book for a single trading pair.
#[derive(Debug, Clone, Default)]
pub struct DepthBook {
    bids: BTreeMap<Decimal, i128>,
    asks: BTreeMap<Decimal, i128>,
    delta_bids: BTreeMap<Decimal, i128>,
    delta_asks: BTreeMap<Decimal, i128>,
}

impl DepthBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a newly created order.
    pub fn on_create(&mut self, side: Side, price: Decimal, quantity: i128) {
        let levels = self.levels_mut(side);
        let amount = levels.entry(price).or_insert(0);
        *amount += quantity;
        let new_amount = *amount;
        self.deltas_mut(side).insert(price, new_amount);
    }

    /// Absorb a fill: `curr_stock` leaves the maker's level.
    pub fn on_fill(&mut self, side: Side, price: Decimal, curr_stock: i128) {
        self.subtract(side, price, curr_stock);
    }

    /// Absorb a cancel: the order's remaining stock leaves the level.
    pub fn on_cancel(&mut self, side: Side, price: Decimal, left_stock: i128) {
        self.subtract(side, price, left_stock);
    }

    fn subtract(&mut self, side: Side, price: Decimal, quantity: i128) {
        let levels = self.levels_mut(side);
        let new_amount = match levels.get(&price) {
            Some(&amount) => amount - quantity,
            None => -quantity,
        };
        if new_amount > 0 {
            levels.insert(price, new_amount);
        } else {
            // The book itself never holds non-positive levels; the delta
            // keeps the signed value.
            levels.remove(&price);
        }
        self.deltas_mut(side).insert(price, new_amount);
    }

    fn levels_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, i128> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    fn deltas_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, i128> {
        match side {
            Side::Buy => &mut self.delta_bids,
            Side::Sell => &mut self.delta_asks,
        }
    }

    /// Best levels per side: asks price-ascending, bids price-descending.
    pub fn snapshot(&self, count: usize) -> (Vec<PricePoint>, Vec<PricePoint>) {
        let asks = self
            .asks
            .iter()
            .take(count)
            .map(|(&price, &amount)| PricePoint { price, amount })
            .collect();
        let bids = self
            .bids
            .iter()
            .rev()
            .take(count)
            .map(|(&price, &amount)| PricePoint { price, amount })
            .collect();
        (asks, bids)
    }

    /// Drain the per-block deltas, bids high→low and asks low→high.
    ///
    /// Empty sides come back as `None`; after this call both delta maps
    /// are empty.
    pub fn take_deltas(&mut self) -> (Option<Vec<PricePoint>>, Option<Vec<PricePoint>>) {
        let bids = std::mem::take(&mut self.delta_bids);
        let asks = std::mem::take(&mut self.delta_asks);

        let to_points = |map: BTreeMap<Decimal, i128>, descending: bool| {
            if map.is_empty() {
                return None;
            }
            let mut points: Vec<PricePoint> = map
                .into_iter()
                .map(|(price, amount)| PricePoint { price, amount })
                .collect();
            if descending {
                points.reverse();
            }
            Some(points)
        };

        (to_points(bids, true), to_points(asks, false))
    }

    /// Whether any level mutated since the last commit.
    pub fn has_deltas(&self) -> bool {
        !self.delta_bids.is_empty() || !self.delta_asks.is_empty()
    }

    /// All bid levels, for snapshot serialization (price-descending).
    pub fn bid_points(&self) -> Vec<PricePoint> {
        self.bids
            .iter()
            .rev()
            .map(|(&price, &amount)| PricePoint { price, amount })
            .collect()
    }

    /// All ask levels, for snapshot serialization (price-ascending).
    pub fn ask_points(&self) -> Vec<PricePoint> {
        self.asks
            .iter()
            .map(|(&price, &amount)| PricePoint { price, amount })
            .collect()
    }

    /// Pending delta levels per side, for snapshot serialization.
    pub fn delta_points(&self) -> (Vec<PricePoint>, Vec<PricePoint>) {
        let bids = self
            .delta_bids
            .iter()
            .map(|(&price, &amount)| PricePoint { price, amount })
            .collect();
        let asks = self
            .delta_asks
            .iter()
            .map(|(&price, &amount)| PricePoint { price, amount })
            .collect();
        (bids, asks)
    }

    /// Rebuild a book from serialized points.
    pub fn from_points(
        bids: Vec<PricePoint>,
        asks: Vec<PricePoint>,
        delta_bids: Vec<PricePoint>,
        delta_asks: Vec<PricePoint>,
    ) -> Self {
        let collect = |points: Vec<PricePoint>| {
            points
                .into_iter()
                .map(|p| (p.price, p.amount))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            bids: collect(bids),
            asks: collect(asks),
            delta_bids: collect(delta_bids),
            delta_asks: collect(delta_asks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn test_create_accumulates_same_level() {
        let mut book = DepthBook::new();
        book.on_create(Side::Buy, dec(10), 300);
        book.on_create(Side::Buy, dec(10), 100);

        let (_, bids) = book.snapshot(20);
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].amount, 400);
    }

    #[test]
    fn test_snapshot_ordering() {
        let mut book = DepthBook::new();
        book.on_create(Side::Buy, dec(15), 400);
        book.on_create(Side::Buy, dec(3), 300);
        book.on_create(Side::Sell, dec(12), 300);
        book.on_create(Side::Sell, dec(20), 100);

        let (asks, bids) = book.snapshot(20);
        // asks ascending, bids descending
        assert_eq!(asks[0].price, dec(12));
        assert_eq!(asks[1].price, dec(20));
        assert_eq!(bids[0].price, dec(15));
        assert_eq!(bids[1].price, dec(3));
    }

    #[test]
    fn test_fill_reduces_level() {
        let mut book = DepthBook::new();
        book.on_create(Side::Sell, dec(100), 300);
        book.on_fill(Side::Sell, dec(100), 100);

        let (asks, _) = book.snapshot(20);
        assert_eq!(asks[0].amount, 200);
    }

    #[test]
    fn test_cancel_drains_level() {
        let mut book = DepthBook::new();
        book.on_create(Side::Buy, dec(3), 300);
        book.on_cancel(Side::Buy, dec(3), 300);

        let (_, bids) = book.snapshot(20);
        assert!(bids.is_empty());

        // Delta records the drained level as zero
        let (delta_bids, _) = book.take_deltas();
        let points = delta_bids.unwrap();
        assert_eq!(points.last().unwrap().amount, 0);
    }

    #[test]
    fn test_subtract_missing_level_keeps_negative_delta() {
        let mut book = DepthBook::new();
        book.on_fill(Side::Sell, dec(110), 200);

        let (asks, _) = book.snapshot(20);
        assert!(asks.is_empty(), "book never holds negative levels");

        let (_, delta_asks) = book.take_deltas();
        assert_eq!(delta_asks.unwrap()[0].amount, -200);
    }

    #[test]
    fn test_take_deltas_clears_state() {
        let mut book = DepthBook::new();
        book.on_create(Side::Buy, dec(15), 400);
        assert!(book.has_deltas());

        let (bids, asks) = book.take_deltas();
        assert!(bids.is_some());
        assert!(asks.is_none());
        assert!(!book.has_deltas());

        let (bids, asks) = book.take_deltas();
        assert!(bids.is_none());
        assert!(asks.is_none());
    }

    #[test]
    fn test_delta_ordering_bids_descending() {
        let mut book = DepthBook::new();
        book.on_create(Side::Buy, dec(3), 300);
        book.on_create(Side::Buy, dec(15), 400);

        let (bids, _) = book.take_deltas();
        let points = bids.unwrap();
        assert_eq!(points[0].price, dec(15));
        assert_eq!(points[1].price, dec(3));
    }

    #[test]
    fn test_depth_update_wire_format() {
        let update = DepthUpdate {
            trading_pair: "abc/cet".to_string(),
            bids: Some(vec![PricePoint {
                price: dec(15),
                amount: 400,
            }]),
            asks: None,
        };
        assert_eq!(
            serde_json::to_string(&update).unwrap(),
            r#"{"trading_pair":"abc/cet","bids":[{"p":"15.000000000000000000","a":"400"}],"asks":null}"#
        );
    }

    #[test]
    fn test_points_roundtrip() {
        let mut book = DepthBook::new();
        book.on_create(Side::Buy, dec(15), 400);
        book.on_create(Side::Sell, dec(12), 300);

        let (delta_bids, delta_asks) = book.delta_points();
        let rebuilt = DepthBook::from_points(
            book.bid_points(),
            book.ask_points(),
            delta_bids,
            delta_asks,
        );
        assert_eq!(rebuilt.snapshot(20), book.snapshot(20));
        assert!(rebuilt.has_deltas());
    }
}
