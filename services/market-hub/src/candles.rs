//! OHLC candle aggregation
//!
//! Builds open/high/low/close + total-traded buckets per market across
//! three spans (minute, hour, day) simultaneously. Bucket boundaries are
//! aligned to the epoch: `end_time = floor(ts / span) * span + span`.
//!
//! A bucket closes the first time a block timestamp reaches its end time.
//! When several boundaries pass without activity, one flat bucket per
//! crossed boundary is emitted (open = high = low = close = prior close,
//! total = 0) so consumers see a gapless series.
//!
//! Markets that trade only through bancor pools are tracked under their
//! `B:`-prefixed name and never collide with the spot book of the same
//! pair.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::numeric::{serde_dec, serde_int};

/// Candle resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeSpan {
    #[serde(rename = "1min")]
    Minute,
    #[serde(rename = "1hour")]
    Hour,
    #[serde(rename = "1day")]
    Day,
}

impl TimeSpan {
    /// Span length in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            TimeSpan::Minute => 60,
            TimeSpan::Hour => 3600,
            TimeSpan::Day => 86400,
        }
    }

    /// Wire label, as serialized into candle payloads.
    pub fn label(&self) -> &'static str {
        match self {
            TimeSpan::Minute => "1min",
            TimeSpan::Hour => "1hour",
            TimeSpan::Day => "1day",
        }
    }

    /// All spans, in the order candles are fed and emitted.
    pub fn all() -> [TimeSpan; 3] {
        [TimeSpan::Minute, TimeSpan::Hour, TimeSpan::Day]
    }

    /// Align a timestamp to this span's boundary (floor).
    pub fn align(&self, ts: i64) -> i64 {
        let span = self.seconds();
        (ts / span) * span
    }
}

/// A closed candle, as pushed to subscribers and persisted in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleStick {
    #[serde(rename = "open", with = "serde_dec")]
    pub open_price: Decimal,
    #[serde(rename = "close", with = "serde_dec")]
    pub close_price: Decimal,
    #[serde(rename = "high", with = "serde_dec")]
    pub high_price: Decimal,
    #[serde(rename = "low", with = "serde_dec")]
    pub low_price: Decimal,
    #[serde(rename = "total", with = "serde_int")]
    pub total_deal: i128,
    #[serde(rename = "unix_time")]
    pub end_time: i64,
    pub time_span: TimeSpan,
    pub market: String,
}

/// The bucket currently being built for one (market, span).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Bucket {
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    #[serde(with = "serde_int")]
    total: i128,
    end_time: i64,
}

/// Builds candles for a single span on a single market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleBuilder {
    span: TimeSpan,
    market: String,
    current: Option<Bucket>,
}

impl CandleBuilder {
    pub fn new(span: TimeSpan, market: impl Into<String>) -> Self {
        Self {
            span,
            market: market.into(),
            current: None,
        }
    }

    /// Close every bucket whose end time has passed.
    ///
    /// Returns the closed candles oldest-first, one per crossed boundary.
    /// Idle boundaries yield flat candles carrying the prior close. A
    /// timestamp earlier than the open bucket never rolls.
    pub fn roll(&mut self, now: i64) -> Vec<CandleStick> {
        let mut closed = Vec::new();
        let Some(bucket) = self.current.as_mut() else {
            return closed;
        };
        let span_secs = self.span.seconds();
        while bucket.end_time <= now {
            closed.push(CandleStick {
                open_price: bucket.open,
                close_price: bucket.close,
                high_price: bucket.high,
                low_price: bucket.low,
                total_deal: bucket.total,
                end_time: bucket.end_time,
                time_span: self.span,
                market: self.market.clone(),
            });
            let close = bucket.close;
            *bucket = Bucket {
                open: close,
                high: close,
                low: close,
                close,
                total: 0,
                end_time: bucket.end_time + span_secs,
            };
        }
        closed
    }

    /// Absorb a trade at `ts`, rolling first when the trade crosses the
    /// bucket boundary. The first trade of a market opens its bucket.
    pub fn update(&mut self, price: Decimal, amount: i128, ts: i64) -> Vec<CandleStick> {
        let closed = self.roll(ts);
        match self.current.as_mut() {
            Some(bucket) => {
                if price > bucket.high {
                    bucket.high = price;
                }
                if price < bucket.low {
                    bucket.low = price;
                }
                bucket.close = price;
                bucket.total += amount;
            }
            None => {
                self.current = Some(Bucket {
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    total: amount,
                    end_time: self.span.align(ts) + self.span.seconds(),
                });
            }
        }
        closed
    }

    /// Whether this builder has seen any trade yet.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }
}

/// The three builders of one market, fed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCandles {
    market: String,
    minute: CandleBuilder,
    hour: CandleBuilder,
    day: CandleBuilder,
}

impl MarketCandles {
    pub fn new(market: impl Into<String>) -> Self {
        let market = market.into();
        Self {
            minute: CandleBuilder::new(TimeSpan::Minute, market.clone()),
            hour: CandleBuilder::new(TimeSpan::Hour, market.clone()),
            day: CandleBuilder::new(TimeSpan::Day, market.clone()),
            market,
        }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    /// Roll all spans against a block timestamp; minute closings first.
    pub fn roll(&mut self, now: i64) -> Vec<CandleStick> {
        let mut closed = self.minute.roll(now);
        closed.extend(self.hour.roll(now));
        closed.extend(self.day.roll(now));
        closed
    }

    /// Feed a trade to all spans.
    pub fn update(&mut self, price: Decimal, amount: i128, ts: i64) -> Vec<CandleStick> {
        let mut closed = self.minute.update(price, amount, ts);
        closed.extend(self.hour.update(price, amount, ts));
        closed.extend(self.day.update(price, amount, ts));
        closed
    }
}
