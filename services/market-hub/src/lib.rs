//! Market-Data Hub
//!
//! Ingests the chain's typed domain events and produces:
//! - Per-market order-book depth with per-block delta publication
//! - OHLC candle aggregation (minute / hour / day)
//! - 24-hour ticker diffs
//! - A time-addressed record index in an ordered key-value store
//! - Topic-routed fan-out to subscribers
//!
//! # Architecture
//!
//! ```text
//! Chain Events (JSON)
//!        │
//!    ┌───▼───┐
//!    │  Hub  │  ← demux by kind, sid allocation, block cursor
//!    └───┬───┘
//!        │
//!   ┌────┴─────┬──────────┬───────────┐
//!   │          │          │           │
//! ┌─▼───┐  ┌───▼───┐  ┌───▼────┐  ┌───▼────┐
//! │Depth│  │Candles│  │Tickers │  │Indexed │
//! └─┬───┘  └───┬───┘  └───┬────┘  │Records │
//!   │          │          │       └───┬────┘
//! ┌─▼──────────▼──────────▼──┐    ┌───▼────┐
//! │  Subscription Dispatch   │    │ Store  │
//! └──────────────────────────┘    └────────┘
//! ```
//!
//! Commit (block boundary) atomically writes the block's batch, then emits
//! depth deltas, rolled candles, and ticker diffs, in that order.

pub mod candles;
pub mod depth;
pub mod events;
pub mod hub;
pub mod keys;
pub mod query;
pub mod snapshot;
pub mod subscribe;
pub mod ticker;

pub use hub::{Hub, HubConfig, HubError};
