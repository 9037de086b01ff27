//! Hub controller
//!
//! Owns the block cursor, demultiplexes incoming messages by kind, feeds
//! the aggregate trackers, allocates serial ids for every indexed record,
//! and drives the block-boundary commit: flush depth deltas, roll candles,
//! compute tickers, write the store batch atomically, and emit commit-time
//! pushes in a fixed order (depth → candles → tickers).
//!
//! Ingestion is single-writer: `consume_message` takes the write guard.
//! Queries take the read guard and are safe for concurrent callers.
//! Decode and ordering errors are logged and the message is dropped; a
//! store failure at commit halts the hub.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use storage::{Store, StoreError, WriteBatch};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use types::coin::denom_of;

use crate::candles::{CandleStick, MarketCandles, TimeSpan};
use crate::depth::{DepthBook, DepthUpdate, PricePoint};
use crate::events::{
    account_of_order_id, pair_tokens, BancorInfo, BancorTrade, CancelOrderInfo, CreateOrderInfo,
    Donation, FillOrderInfo, LockedSendMsg, MessageKind, NewHeightInfo,
    NotificationBeginRedelegation, NotificationBeginUnbonding, NotificationCompleteRedelegation,
    NotificationCompleteUnbonding, NotificationSlash, NotificationTx, NotificationUnlock,
    TokenComment,
};
use crate::keys::{self, RecordTag};
use crate::query::{self, QueryPage, TaggedPage};
use crate::snapshot::{DepthDump, HubSnapshot, SnapshotError};
use crate::subscribe::{SubscribeCenter, Topic};
use crate::ticker::{minute_in_day, Ticker, TickerRing};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum HubError {
    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    #[error("decode error for {kind}: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("height {incoming} does not advance the cursor at {current}")]
    HeightNotAdvanced { incoming: i64, current: i64 },

    #[error("order id {0} carries no account")]
    MalformedOrderId(String),

    #[error("trading pair {0} is malformed")]
    MalformedTradingPair(String),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("hub is halted after a store failure")]
    Halted,

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Per-subscriber outbound queue capacity; overflow closes the
    /// subscription.
    pub queue_capacity: usize,
    /// Upper bound on levels returned per side by depth queries.
    pub max_depth_levels: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            max_depth_levels: 1_000,
        }
    }
}

// ── Hub State ───────────────────────────────────────────────────────

#[derive(Default)]
struct HubState {
    sid: i64,
    height: i64,
    block_time: i64,
    last_block_time: i64,
    last_block_hash: String,
    depths: BTreeMap<String, DepthBook>,
    candles: BTreeMap<String, MarketCandles>,
    tickers: BTreeMap<String, TickerRing>,
    latest_tickers: BTreeMap<String, Ticker>,
    /// Candles rolled since the last commit, awaiting push.
    pending_candles: Vec<CandleStick>,
    /// Markets whose ticker slot was written and not yet evaluated.
    pending_ticker_markets: BTreeSet<String>,
    /// Slash payloads buffered until commit.
    pending_slash: Vec<String>,
    /// Begin-unbonding payloads keyed by delegator, pushed at completion.
    pending_unbondings: BTreeMap<String, String>,
    pending_redelegations: BTreeMap<String, String>,
    /// The block's uncommitted store writes.
    batch: Vec<(Vec<u8>, Vec<u8>)>,
    halted: bool,
}

impl HubState {
    fn fresh() -> Self {
        Self {
            height: -1,
            ..Self::default()
        }
    }

    fn next_sid(&mut self) -> i64 {
        self.sid += 1;
        self.sid
    }

    /// Queue a record write under the current block's timestamp.
    fn append(&mut self, tag: RecordTag, scope: &str, sid: i64, payload: &[u8]) {
        let key = keys::record_key(tag, scope, self.block_time, sid);
        self.batch.push((key, payload.to_vec()));
    }

    fn depth(&mut self, market: &str) -> &mut DepthBook {
        self.depths.entry(market.to_string()).or_default()
    }

    fn market_candles(&mut self, market: &str) -> &mut MarketCandles {
        self.candles
            .entry(market.to_string())
            .or_insert_with(|| MarketCandles::new(market))
    }

    /// Write a trade price into the market's current ticker slot and mark
    /// the market for evaluation at commit.
    fn feed_ticker(&mut self, market: &str, price: Decimal) {
        let minute = minute_in_day(self.block_time);
        self.tickers
            .entry(market.to_string())
            .or_default()
            .update(price, minute);
        self.pending_ticker_markets.insert(market.to_string());
    }

    /// Index freshly closed candles and queue them for the commit push.
    fn absorb_closed(&mut self, closed: Vec<CandleStick>) -> Result<(), HubError> {
        for candle in closed {
            let sid = self.next_sid();
            let key = keys::record_key(span_tag(candle.time_span), &candle.market, candle.end_time, sid);
            let value = serde_json::to_vec(&candle).map_err(HubError::Encode)?;
            self.batch.push((key, value));
            self.pending_candles.push(candle);
        }
        Ok(())
    }
}

fn span_tag(span: TimeSpan) -> RecordTag {
    match span {
        TimeSpan::Minute => RecordTag::CandleMinute,
        TimeSpan::Hour => RecordTag::CandleHour,
        TimeSpan::Day => RecordTag::CandleDay,
    }
}

fn decode<T: DeserializeOwned>(kind: MessageKind, payload: &[u8]) -> Result<T, HubError> {
    serde_json::from_slice(payload).map_err(|source| HubError::Decode {
        kind: kind.as_str(),
        source,
    })
}

// ── Hub ─────────────────────────────────────────────────────────────

/// The market-data aggregation hub.
pub struct Hub {
    store: Arc<dyn Store>,
    subs: Arc<SubscribeCenter>,
    config: HubConfig,
    state: RwLock<HubState>,
}

impl Hub {
    pub fn new(store: Arc<dyn Store>, config: HubConfig) -> Self {
        let subs = Arc::new(SubscribeCenter::new(config.queue_capacity));
        Self {
            store,
            subs,
            config,
            state: RwLock::new(HubState::fresh()),
        }
    }

    pub fn with_defaults(store: Arc<dyn Store>) -> Self {
        Self::new(store, HubConfig::default())
    }

    /// The subscription routing table, shared with transports.
    pub fn subscriptions(&self) -> &Arc<SubscribeCenter> {
        &self.subs
    }

    // ── Ingestion ───────────────────────────────────────────────────

    /// Absorb one upstream message.
    ///
    /// Decode and ordering failures leave all state untouched; the error
    /// is logged and also returned for callers that track drop counts.
    pub fn consume_message(&self, kind: &str, payload: &[u8]) -> Result<(), HubError> {
        let Some(parsed) = MessageKind::parse(kind) else {
            warn!(kind, "dropping message of unknown kind");
            return Err(HubError::UnknownKind(kind.to_string()));
        };

        let mut state = self.state.write();
        if state.halted {
            return Err(HubError::Halted);
        }

        let result = self.dispatch(&mut state, parsed, payload);
        if let Err(err) = &result {
            match err {
                HubError::Store(_) => {
                    state.halted = true;
                    error!(kind = parsed.as_str(), %err, "commit failed; hub halted");
                }
                _ => {
                    warn!(kind = parsed.as_str(), %err, "message dropped");
                }
            }
        }
        result
    }

    fn dispatch(
        &self,
        st: &mut HubState,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<(), HubError> {
        match kind {
            MessageKind::HeightInfo => self.handle_height(st, decode(kind, payload)?, payload),
            MessageKind::Commit => self.handle_commit(st),
            MessageKind::CreateOrder => {
                self.handle_create_order(st, decode(kind, payload)?, payload)
            }
            MessageKind::FillOrder => self.handle_fill_order(st, decode(kind, payload)?, payload),
            MessageKind::CancelOrder => {
                self.handle_cancel_order(st, decode(kind, payload)?, payload)
            }
            MessageKind::BancorInfo => self.handle_bancor_info(st, decode(kind, payload)?, payload),
            MessageKind::BancorTrade => {
                self.handle_bancor_trade(st, decode(kind, payload)?, payload)
            }
            MessageKind::SendLockCoins => {
                self.handle_send_lock(st, decode(kind, payload)?, payload)
            }
            MessageKind::NotifyUnlock => self.handle_unlock(st, decode(kind, payload)?, payload),
            MessageKind::NotifyTx => self.handle_tx(st, decode(kind, payload)?, payload),
            MessageKind::NotifySlash => {
                let _: NotificationSlash = decode(kind, payload)?;
                st.pending_slash
                    .push(String::from_utf8_lossy(payload).into_owned());
                Ok(())
            }
            MessageKind::BeginUnbonding => {
                let info: NotificationBeginUnbonding = decode(kind, payload)?;
                let sid = st.next_sid();
                st.append(RecordTag::Unbonding, &info.delegator, sid, payload);
                st.pending_unbondings
                    .insert(info.delegator, String::from_utf8_lossy(payload).into_owned());
                Ok(())
            }
            MessageKind::CompleteUnbonding => {
                let info: NotificationCompleteUnbonding = decode(kind, payload)?;
                match st.pending_unbondings.remove(&info.delegator) {
                    Some(begin) => {
                        self.subs
                            .publish(Topic::Unbonding, Some(&info.delegator), begin.as_bytes());
                    }
                    None => debug!(delegator = %info.delegator, "completion without pending unbonding"),
                }
                Ok(())
            }
            MessageKind::BeginRedelegation => {
                let info: NotificationBeginRedelegation = decode(kind, payload)?;
                let sid = st.next_sid();
                st.append(RecordTag::Redelegation, &info.delegator, sid, payload);
                st.pending_redelegations
                    .insert(info.delegator, String::from_utf8_lossy(payload).into_owned());
                Ok(())
            }
            MessageKind::CompleteRedelegation => {
                let info: NotificationCompleteRedelegation = decode(kind, payload)?;
                match st.pending_redelegations.remove(&info.delegator) {
                    Some(begin) => {
                        self.subs.publish(
                            Topic::Redelegation,
                            Some(&info.delegator),
                            begin.as_bytes(),
                        );
                    }
                    None => debug!(delegator = %info.delegator, "completion without pending redelegation"),
                }
                Ok(())
            }
            MessageKind::TokenComment => {
                let info: TokenComment = decode(kind, payload)?;
                let sid = st.next_sid();
                st.append(RecordTag::Comment, &info.token, sid, payload);
                self.subs.publish(Topic::Comment, Some(&info.token), payload);
                Ok(())
            }
        }
    }

    // ── Handlers ────────────────────────────────────────────────────

    fn handle_height(
        &self,
        st: &mut HubState,
        info: NewHeightInfo,
        raw: &[u8],
    ) -> Result<(), HubError> {
        if st.height >= 0 && info.height <= st.height {
            return Err(HubError::HeightNotAdvanced {
                incoming: info.height,
                current: st.height,
            });
        }
        if st.block_time > 0 && info.timestamp < st.block_time {
            warn!(
                height = info.height,
                timestamp = info.timestamp,
                "block timestamp moved backwards; candles will not roll"
            );
        }

        // Close candle windows ended by the new timestamp before the
        // cursor moves.
        let mut closed = Vec::new();
        for candles in st.candles.values_mut() {
            closed.extend(candles.roll(info.timestamp));
        }
        st.absorb_closed(closed)?;

        st.batch.push((
            keys::block_time_key(info.height),
            keys::encode_i64(info.timestamp).to_vec(),
        ));
        st.last_block_time = st.block_time;
        st.height = info.height;
        st.block_time = info.timestamp;
        st.last_block_hash = info.last_block_hash;

        debug!(height = st.height, time = st.block_time, "block opened");
        self.subs.publish(Topic::Height, None, raw);
        Ok(())
    }

    fn handle_create_order(
        &self,
        st: &mut HubState,
        info: CreateOrderInfo,
        raw: &[u8],
    ) -> Result<(), HubError> {
        let (stock, money) = pair_tokens(&info.trading_pair)
            .ok_or_else(|| HubError::MalformedTradingPair(info.trading_pair.clone()))?;

        st.depth(&info.trading_pair)
            .on_create(info.side, info.price, info.quantity as i128);

        let sid = st.next_sid();
        st.append(RecordTag::OrderCreate, &info.sender, sid, raw);
        st.append(
            RecordTag::OrderCreateToken,
            &keys::token_scope(stock, &info.sender),
            sid,
            raw,
        );
        if stock != money {
            st.append(
                RecordTag::OrderCreateToken,
                &keys::token_scope(money, &info.sender),
                sid,
                raw,
            );
        }
        self.subs.publish(Topic::Order, Some(&info.sender), raw);
        Ok(())
    }

    fn handle_fill_order(
        &self,
        st: &mut HubState,
        info: FillOrderInfo,
        raw: &[u8],
    ) -> Result<(), HubError> {
        let sender = account_of_order_id(&info.order_id)
            .ok_or_else(|| HubError::MalformedOrderId(info.order_id.clone()))?
            .to_string();
        let (stock, money) = pair_tokens(&info.trading_pair)
            .ok_or_else(|| HubError::MalformedTradingPair(info.trading_pair.clone()))?;

        st.depth(&info.trading_pair)
            .on_fill(info.side, info.price, info.curr_stock as i128);

        // The traded price is money-per-stock of this fill; zero-stock
        // fills touch the book only.
        if info.curr_stock > 0 {
            let price = Decimal::from(info.curr_money) / Decimal::from(info.curr_stock);
            let ts = st.block_time;
            let closed = st
                .market_candles(&info.trading_pair)
                .update(price, info.curr_stock as i128, ts);
            st.absorb_closed(closed)?;
            st.feed_ticker(&info.trading_pair, price);
        }

        let sid = st.next_sid();
        st.append(RecordTag::OrderFill, &sender, sid, raw);
        st.append(
            RecordTag::OrderFillToken,
            &keys::token_scope(stock, &sender),
            sid,
            raw,
        );
        if stock != money {
            st.append(
                RecordTag::OrderFillToken,
                &keys::token_scope(money, &sender),
                sid,
                raw,
            );
        }

        let deal_sid = st.next_sid();
        st.append(RecordTag::Deal, &info.trading_pair, deal_sid, raw);

        self.subs.publish(Topic::Order, Some(&sender), raw);
        self.subs
            .publish(Topic::Deal, Some(&info.trading_pair), raw);
        Ok(())
    }

    fn handle_cancel_order(
        &self,
        st: &mut HubState,
        info: CancelOrderInfo,
        raw: &[u8],
    ) -> Result<(), HubError> {
        let sender = account_of_order_id(&info.order_id)
            .ok_or_else(|| HubError::MalformedOrderId(info.order_id.clone()))?
            .to_string();
        let (stock, money) = pair_tokens(&info.trading_pair)
            .ok_or_else(|| HubError::MalformedTradingPair(info.trading_pair.clone()))?;

        st.depth(&info.trading_pair)
            .on_cancel(info.side, info.price, info.left_stock as i128);

        let sid = st.next_sid();
        st.append(RecordTag::OrderCancel, &sender, sid, raw);
        st.append(
            RecordTag::OrderCancelToken,
            &keys::token_scope(stock, &sender),
            sid,
            raw,
        );
        if stock != money {
            st.append(
                RecordTag::OrderCancelToken,
                &keys::token_scope(money, &sender),
                sid,
                raw,
            );
        }
        self.subs.publish(Topic::Order, Some(&sender), raw);
        Ok(())
    }

    fn handle_bancor_info(
        &self,
        st: &mut HubState,
        info: BancorInfo,
        raw: &[u8],
    ) -> Result<(), HubError> {
        let market = format!("{}/{}", info.stock, info.money);
        let sid = st.next_sid();
        st.append(RecordTag::BancorInfo, &market, sid, raw);
        self.subs.publish(Topic::BancorInfo, Some(&market), raw);
        Ok(())
    }

    fn handle_bancor_trade(
        &self,
        st: &mut HubState,
        info: BancorTrade,
        raw: &[u8],
    ) -> Result<(), HubError> {
        let market = format!("B:{}/{}", info.stock, info.money);
        let ts = st.block_time;
        let closed = st
            .market_candles(&market)
            .update(info.tx_price, info.amount as i128, ts);
        st.absorb_closed(closed)?;
        st.feed_ticker(&market, info.tx_price);

        let sid = st.next_sid();
        st.append(RecordTag::BancorTrade, &info.sender, sid, raw);
        st.append(
            RecordTag::BancorTradeToken,
            &keys::token_scope(&info.stock, &info.sender),
            sid,
            raw,
        );
        if info.stock != info.money {
            st.append(
                RecordTag::BancorTradeToken,
                &keys::token_scope(&info.money, &info.sender),
                sid,
                raw,
            );
        }
        self.subs.publish(Topic::BancorTrade, Some(&info.sender), raw);
        Ok(())
    }

    fn handle_send_lock(
        &self,
        st: &mut HubState,
        info: LockedSendMsg,
        raw: &[u8],
    ) -> Result<(), HubError> {
        let sid = st.next_sid();
        st.append(RecordTag::Lock, &info.to_address, sid, raw);
        if info.from_address != info.to_address {
            st.append(RecordTag::Lock, &info.from_address, sid, raw);
        }
        let denoms: BTreeSet<&str> = info.amount.iter().map(|c| c.denom.as_str()).collect();
        for denom in denoms {
            st.append(
                RecordTag::LockToken,
                &keys::token_scope(denom, &info.to_address),
                sid,
                raw,
            );
            if info.from_address != info.to_address {
                st.append(
                    RecordTag::LockToken,
                    &keys::token_scope(denom, &info.from_address),
                    sid,
                    raw,
                );
            }
        }
        self.subs.publish(Topic::SendLock, Some(&info.to_address), raw);
        Ok(())
    }

    fn handle_unlock(
        &self,
        st: &mut HubState,
        info: NotificationUnlock,
        raw: &[u8],
    ) -> Result<(), HubError> {
        let sid = st.next_sid();
        st.append(RecordTag::Unlock, &info.address, sid, raw);
        let denoms: BTreeSet<&str> = info.unlocked.iter().map(|c| c.denom.as_str()).collect();
        for denom in denoms {
            st.append(
                RecordTag::UnlockToken,
                &keys::token_scope(denom, &info.address),
                sid,
                raw,
            );
        }
        self.subs.publish(Topic::Unlock, Some(&info.address), raw);
        Ok(())
    }

    fn handle_tx(
        &self,
        st: &mut HubState,
        info: NotificationTx,
        raw: &[u8],
    ) -> Result<(), HubError> {
        for transfer in &info.transfers {
            let sid = st.next_sid();
            st.append(RecordTag::Income, &transfer.recipient, sid, raw);
            if let Some(denom) = denom_of(&transfer.amount) {
                st.append(
                    RecordTag::IncomeToken,
                    &keys::token_scope(denom, &transfer.recipient),
                    sid,
                    raw,
                );
            }
            self.subs
                .publish(Topic::Income, Some(&transfer.recipient), raw);
        }

        let denoms: BTreeSet<&str> = info
            .transfers
            .iter()
            .filter_map(|t| denom_of(&t.amount))
            .collect();
        for signer in &info.signers {
            let sid = st.next_sid();
            st.append(RecordTag::Tx, signer, sid, raw);
            for denom in &denoms {
                st.append(
                    RecordTag::TxToken,
                    &keys::token_scope(denom, signer),
                    sid,
                    raw,
                );
            }
            self.subs.publish(Topic::Tx, Some(signer), raw);
        }

        self.extract_donations(st, &info)
    }

    /// Pull community-pool donations out of the transaction body.
    fn extract_donations(&self, st: &mut HubState, info: &NotificationTx) -> Result<(), HubError> {
        let interesting = info
            .msg_types
            .iter()
            .any(|t| t == "MsgDonateToCommunityPool" || t == "MsgCommentToken");
        if !interesting || info.tx_json.is_empty() {
            return Ok(());
        }
        let parsed: serde_json::Value = match serde_json::from_str(&info.tx_json) {
            Ok(value) => value,
            Err(err) => {
                debug!(%err, "tx_json not parseable; skipping donation extraction");
                return Ok(());
            }
        };
        let Some(msgs) = parsed.get("msg").and_then(|m| m.as_array()) else {
            return Ok(());
        };

        for (msg_type, msg) in info.msg_types.iter().zip(msgs) {
            let donation = match msg_type.as_str() {
                "MsgDonateToCommunityPool" => {
                    let amount: i128 = msg
                        .get("amount")
                        .and_then(|a| a.as_array())
                        .map(|coins| {
                            coins
                                .iter()
                                .filter_map(|c| c.get("amount")?.as_str()?.parse::<i128>().ok())
                                .sum()
                        })
                        .unwrap_or(0);
                    msg.get("from_addr")
                        .and_then(|v| v.as_str())
                        .map(|sender| Donation {
                            sender: sender.to_string(),
                            amount,
                        })
                }
                "MsgCommentToken" => {
                    let amount = msg.get("donation").and_then(|v| v.as_i64()).unwrap_or(0);
                    if amount > 0 {
                        msg.get("sender")
                            .and_then(|v| v.as_str())
                            .map(|sender| Donation {
                                sender: sender.to_string(),
                                amount: amount as i128,
                            })
                    } else {
                        None
                    }
                }
                _ => None,
            };
            if let Some(donation) = donation {
                let value = serde_json::to_vec(&donation).map_err(HubError::Encode)?;
                let sid = st.next_sid();
                st.append(RecordTag::Donation, "", sid, &value);
            }
        }
        Ok(())
    }

    // ── Commit ──────────────────────────────────────────────────────

    fn handle_commit(&self, st: &mut HubState) -> Result<(), HubError> {
        // Slash records enter the index at the block boundary, after every
        // in-block record.
        let pending_slash = std::mem::take(&mut st.pending_slash);
        for payload in &pending_slash {
            let sid = st.next_sid();
            st.append(RecordTag::Slash, "", sid, payload.as_bytes());
        }

        // Depth: one message per mutated side per market.
        let mut depth_pushes = Vec::new();
        for (market, book) in st.depths.iter_mut() {
            if !book.has_deltas() {
                continue;
            }
            let (bids, asks) = book.take_deltas();
            if let Some(points) = bids {
                let update = DepthUpdate {
                    trading_pair: market.clone(),
                    bids: Some(points),
                    asks: None,
                };
                depth_pushes
                    .push((market.clone(), serde_json::to_vec(&update).map_err(HubError::Encode)?));
            }
            if let Some(points) = asks {
                let update = DepthUpdate {
                    trading_pair: market.clone(),
                    bids: None,
                    asks: Some(points),
                };
                depth_pushes
                    .push((market.clone(), serde_json::to_vec(&update).map_err(HubError::Encode)?));
            }
        }

        // Candles rolled since the previous commit.
        let pending_candles = std::mem::take(&mut st.pending_candles);
        let mut candle_pushes = Vec::with_capacity(pending_candles.len());
        for candle in &pending_candles {
            candle_pushes.push((
                candle.time_span,
                candle.market.clone(),
                serde_json::to_vec(candle).map_err(HubError::Encode)?,
            ));
        }

        // Tickers: evaluate markets whose slot was written. A market whose
        // written slot the block clock still sits in is deferred — that
        // slot's trades may not be over. Push only markets whose
        // new-minus-old difference changed since the prior commit.
        let minute = minute_in_day(st.block_time);
        let mut ticker_pushes = Vec::new();
        let touched = std::mem::take(&mut st.pending_ticker_markets);
        for market in touched {
            let Some(ring) = st.tickers.get(&market) else {
                continue;
            };
            if ring.minute_in_progress(minute) {
                st.pending_ticker_markets.insert(market);
                continue;
            }
            if let Some(ticker) = ring.ticker(minute, &market) {
                let same_diff = st.latest_tickers.get(&market).is_some_and(|prev| {
                    prev.new_price - prev.old_price == ticker.new_price - ticker.old_price
                });
                if !same_diff {
                    let payload =
                        serde_json::to_vec(&vec![&ticker]).map_err(HubError::Encode)?;
                    ticker_pushes.push((market.clone(), payload));
                }
                st.latest_tickers.insert(market, ticker);
            }
        }

        // Persist the block atomically: records, sid watermark, height.
        let mut batch = WriteBatch::new();
        for (key, value) in st.batch.drain(..) {
            batch.set(key, value);
        }
        batch.set(keys::SID_KEY.to_vec(), keys::encode_i64(st.sid).to_vec());
        if st.height >= 0 {
            batch.set(
                keys::LATEST_HEIGHT_KEY.to_vec(),
                keys::encode_i64(st.height).to_vec(),
            );
        }
        let writes = batch.len();
        self.store.write_batch(batch)?;

        // Emission order: slash → depth → candles → tickers.
        for payload in &pending_slash {
            self.subs.publish(Topic::Slash, None, payload.as_bytes());
        }
        for (market, payload) in depth_pushes {
            self.subs.publish(Topic::Depth, Some(&market), &payload);
        }
        for (span, market, payload) in candle_pushes {
            self.subs.publish(Topic::Candle(span), Some(&market), &payload);
        }
        for (market, payload) in ticker_pushes {
            self.subs.publish(Topic::Ticker, Some(&market), &payload);
        }

        info!(height = st.height, sid = st.sid, writes, "block committed");
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Latest committed height; −1 before the first commit.
    pub fn query_latest_height(&self) -> i64 {
        self.store
            .get(&keys::LATEST_HEIGHT_KEY)
            .and_then(|v| keys::decode_i64(&v))
            .unwrap_or(-1)
    }

    /// Best depth levels: asks price-ascending, bids price-descending.
    pub fn query_depth(&self, market: &str, count: usize) -> (Vec<PricePoint>, Vec<PricePoint>) {
        let state = self.state.read();
        state
            .depths
            .get(market)
            .map(|book| book.snapshot(count.min(self.config.max_depth_levels)))
            .unwrap_or_default()
    }

    /// Closed candles of one market and span, newest first.
    pub fn query_candles(
        &self,
        market: &str,
        span: TimeSpan,
        time: i64,
        sid: i64,
        count: usize,
    ) -> Vec<Vec<u8>> {
        query::query_index(self.store.as_ref(), span_tag(span), market, time, sid, count).payloads
    }

    /// Order history of one account, create/fill/cancel merged newest
    /// first with kind tags `c`/`f`/`d`.
    pub fn query_order(&self, account: &str, time: i64, sid: i64, count: usize) -> TaggedPage {
        query::query_merged(
            self.store.as_ref(),
            &[
                (RecordTag::OrderCreate, keys::TAG_CREATE),
                (RecordTag::OrderFill, keys::TAG_FILL),
                (RecordTag::OrderCancel, keys::TAG_CANCEL),
            ],
            account,
            time,
            sid,
            count,
        )
    }

    /// Order history filtered to orders whose market involves `token`.
    pub fn query_order_about_token(
        &self,
        token: &str,
        account: &str,
        time: i64,
        sid: i64,
        count: usize,
    ) -> TaggedPage {
        query::query_merged(
            self.store.as_ref(),
            &[
                (RecordTag::OrderCreateToken, keys::TAG_CREATE),
                (RecordTag::OrderFillToken, keys::TAG_FILL),
                (RecordTag::OrderCancelToken, keys::TAG_CANCEL),
            ],
            &keys::token_scope(token, account),
            time,
            sid,
            count,
        )
    }

    pub fn query_deal(&self, market: &str, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::Deal, market, time, sid, count)
    }

    pub fn query_bancor_info(&self, market: &str, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::BancorInfo, market, time, sid, count)
    }

    pub fn query_bancor_trade(&self, account: &str, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::BancorTrade, account, time, sid, count)
    }

    pub fn query_bancor_trade_about_token(
        &self,
        token: &str,
        account: &str,
        time: i64,
        sid: i64,
        count: usize,
    ) -> QueryPage {
        self.scan(
            RecordTag::BancorTradeToken,
            &keys::token_scope(token, account),
            time,
            sid,
            count,
        )
    }

    pub fn query_locked(&self, account: &str, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::Lock, account, time, sid, count)
    }

    pub fn query_locked_about_token(
        &self,
        token: &str,
        account: &str,
        time: i64,
        sid: i64,
        count: usize,
    ) -> QueryPage {
        self.scan(
            RecordTag::LockToken,
            &keys::token_scope(token, account),
            time,
            sid,
            count,
        )
    }

    pub fn query_unlock(&self, account: &str, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::Unlock, account, time, sid, count)
    }

    pub fn query_unlock_about_token(
        &self,
        token: &str,
        account: &str,
        time: i64,
        sid: i64,
        count: usize,
    ) -> QueryPage {
        self.scan(
            RecordTag::UnlockToken,
            &keys::token_scope(token, account),
            time,
            sid,
            count,
        )
    }

    pub fn query_income(&self, account: &str, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::Income, account, time, sid, count)
    }

    pub fn query_income_about_token(
        &self,
        token: &str,
        account: &str,
        time: i64,
        sid: i64,
        count: usize,
    ) -> QueryPage {
        self.scan(
            RecordTag::IncomeToken,
            &keys::token_scope(token, account),
            time,
            sid,
            count,
        )
    }

    pub fn query_tx(&self, account: &str, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::Tx, account, time, sid, count)
    }

    pub fn query_tx_about_token(
        &self,
        token: &str,
        account: &str,
        time: i64,
        sid: i64,
        count: usize,
    ) -> QueryPage {
        self.scan(
            RecordTag::TxToken,
            &keys::token_scope(token, account),
            time,
            sid,
            count,
        )
    }

    pub fn query_unbonding(&self, delegator: &str, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::Unbonding, delegator, time, sid, count)
    }

    pub fn query_redelegation(
        &self,
        delegator: &str,
        time: i64,
        sid: i64,
        count: usize,
    ) -> QueryPage {
        self.scan(RecordTag::Redelegation, delegator, time, sid, count)
    }

    pub fn query_comment(&self, token: &str, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::Comment, token, time, sid, count)
    }

    pub fn query_slash(&self, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::Slash, "", time, sid, count)
    }

    pub fn query_donation(&self, time: i64, sid: i64, count: usize) -> QueryPage {
        self.scan(RecordTag::Donation, "", time, sid, count)
    }

    fn scan(&self, tag: RecordTag, scope: &str, time: i64, sid: i64, count: usize) -> QueryPage {
        query::query_index(self.store.as_ref(), tag, scope, time, sid, count)
    }

    /// Block times for heights ≤ `end_height`, height-descending.
    pub fn query_block_time(&self, end_height: i64, count: usize) -> Vec<i64> {
        if end_height < 0 || count == 0 {
            return Vec::new();
        }
        let lower = vec![keys::BLOCK_TIME_TAG];
        let upper = keys::block_time_key(end_height.saturating_add(1));
        self.store
            .scan_rev(&lower, &upper, count)
            .into_iter()
            .filter_map(|(_, value)| keys::decode_i64(&value))
            .collect()
    }

    /// Latest emitted ticker per requested market.
    pub fn query_tickers(&self, markets: &[&str]) -> Vec<Ticker> {
        let state = self.state.read();
        markets
            .iter()
            .filter_map(|market| state.latest_tickers.get(*market).cloned())
            .collect()
    }

    // ── Snapshot ────────────────────────────────────────────────────

    /// Serialize every in-memory aggregate into a checksummed document.
    pub fn dump(&self) -> Result<HubSnapshot, HubError> {
        let state = self.state.read();
        let depths = state
            .depths
            .iter()
            .map(|(market, book)| {
                let (delta_bids, delta_asks) = book.delta_points();
                (
                    market.clone(),
                    DepthDump {
                        bids: book.bid_points(),
                        asks: book.ask_points(),
                        delta_bids,
                        delta_asks,
                    },
                )
            })
            .collect();
        let snapshot = HubSnapshot {
            sid: state.sid,
            height: state.height,
            block_time: state.block_time,
            last_block_time: state.last_block_time,
            last_block_hash: state.last_block_hash.clone(),
            depths,
            candles: state.candles.clone(),
            tickers: state.tickers.clone(),
            latest_tickers: state.latest_tickers.clone(),
            pending_candles: state.pending_candles.clone(),
            pending_ticker_markets: state.pending_ticker_markets.clone(),
            pending_slash: state.pending_slash.clone(),
            pending_unbondings: state.pending_unbondings.clone(),
            pending_redelegations: state.pending_redelegations.clone(),
            checksum: String::new(),
        };
        Ok(snapshot.seal()?)
    }

    /// Replace all in-memory state from a snapshot. The uncommitted
    /// store batch of a mid-block dump is not representable and starts
    /// empty; the indexed log lives in the store independently.
    pub fn load(&self, snapshot: HubSnapshot) -> Result<(), HubError> {
        snapshot.verify()?;
        let mut state = self.state.write();
        *state = HubState {
            sid: snapshot.sid,
            height: snapshot.height,
            block_time: snapshot.block_time,
            last_block_time: snapshot.last_block_time,
            last_block_hash: snapshot.last_block_hash,
            depths: snapshot
                .depths
                .into_iter()
                .map(|(market, dump)| {
                    (
                        market,
                        DepthBook::from_points(
                            dump.bids,
                            dump.asks,
                            dump.delta_bids,
                            dump.delta_asks,
                        ),
                    )
                })
                .collect(),
            candles: snapshot.candles,
            tickers: snapshot.tickers,
            latest_tickers: snapshot.latest_tickers,
            pending_candles: snapshot.pending_candles,
            pending_ticker_markets: snapshot.pending_ticker_markets,
            pending_slash: snapshot.pending_slash,
            pending_unbondings: snapshot.pending_unbondings,
            pending_redelegations: snapshot.pending_redelegations,
            batch: Vec::new(),
            halted: false,
        };
        info!(height = state.height, sid = state.sid, "hub state restored");
        Ok(())
    }

    /// Persist the current dump under the snapshot key.
    pub fn save_snapshot(&self) -> Result<(), HubError> {
        let snapshot = self.dump()?;
        let bytes = serde_json::to_vec(&snapshot).map_err(SnapshotError::Serialize)?;
        self.store.set(&keys::SNAPSHOT_KEY, &bytes)?;
        Ok(())
    }

    /// Graceful shutdown: flush the pending block batch, persist a final
    /// snapshot, and stop accepting messages.
    pub fn close(&self) -> Result<(), HubError> {
        {
            let mut state = self.state.write();
            if state.halted {
                return Ok(());
            }
            self.handle_commit(&mut state)?;
            state.halted = true;
        }
        self.save_snapshot()
    }

    /// Restore from the persisted snapshot, if one exists.
    pub fn restore_from_store(&self) -> Result<bool, HubError> {
        let Some(bytes) = self.store.get(&keys::SNAPSHOT_KEY) else {
            info!("no persisted snapshot; starting fresh");
            return Ok(false);
        };
        let snapshot: HubSnapshot =
            serde_json::from_slice(&bytes).map_err(SnapshotError::Serialize)?;
        self.load(snapshot)?;
        Ok(true)
    }
}
