//! Upstream message kinds and their typed JSON payloads
//!
//! The chain publishes a closed set of message kinds; each carries a JSON
//! payload whose field names are fixed by existing consumers. Prices are
//! 18-digit decimal strings, integer amounts are plain JSON numbers where
//! the chain emits them as numbers and strings where it emits strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::coin::{Coin, LockedCoin};
use types::numeric::{serde_dec, serde_int};
use types::side::Side;

/// The closed set of consumable message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    HeightInfo,
    Commit,
    CreateOrder,
    FillOrder,
    CancelOrder,
    BancorInfo,
    BancorTrade,
    SendLockCoins,
    NotifyUnlock,
    NotifyTx,
    NotifySlash,
    BeginUnbonding,
    CompleteUnbonding,
    BeginRedelegation,
    CompleteRedelegation,
    TokenComment,
}

impl MessageKind {
    /// Parse the wire kind string. Unknown kinds return `None`.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "height_info" => Some(Self::HeightInfo),
            "commit" => Some(Self::Commit),
            "create_order_info" => Some(Self::CreateOrder),
            "fill_order_info" => Some(Self::FillOrder),
            "del_order_info" => Some(Self::CancelOrder),
            "bancor_info" => Some(Self::BancorInfo),
            "bancor_trade" => Some(Self::BancorTrade),
            "send_lock_coins" => Some(Self::SendLockCoins),
            "notify_unlock" => Some(Self::NotifyUnlock),
            "notify_tx" => Some(Self::NotifyTx),
            "notify_slash" => Some(Self::NotifySlash),
            "begin_unbonding" => Some(Self::BeginUnbonding),
            "complete_unbonding" => Some(Self::CompleteUnbonding),
            "begin_redelegation" => Some(Self::BeginRedelegation),
            "complete_redelegation" => Some(Self::CompleteRedelegation),
            "token_comment" => Some(Self::TokenComment),
            _ => None,
        }
    }

    /// The wire kind string, for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeightInfo => "height_info",
            Self::Commit => "commit",
            Self::CreateOrder => "create_order_info",
            Self::FillOrder => "fill_order_info",
            Self::CancelOrder => "del_order_info",
            Self::BancorInfo => "bancor_info",
            Self::BancorTrade => "bancor_trade",
            Self::SendLockCoins => "send_lock_coins",
            Self::NotifyUnlock => "notify_unlock",
            Self::NotifyTx => "notify_tx",
            Self::NotifySlash => "notify_slash",
            Self::BeginUnbonding => "begin_unbonding",
            Self::CompleteUnbonding => "complete_unbonding",
            Self::BeginRedelegation => "begin_redelegation",
            Self::CompleteRedelegation => "complete_redelegation",
            Self::TokenComment => "token_comment",
        }
    }
}

/// Block progress announcement. Opens block `height` at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHeightInfo {
    pub height: i64,
    /// Unix seconds.
    pub timestamp: i64,
    /// Hex-encoded hash of the previous block.
    pub last_block_hash: String,
}

/// A new order was placed on the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderInfo {
    pub order_id: String,
    pub sender: String,
    pub trading_pair: String,
    pub order_type: u8,
    #[serde(with = "serde_dec")]
    pub price: Decimal,
    pub quantity: i64,
    pub side: Side,
    pub time_in_force: u8,
    pub feature_fee: i64,
    pub height: i64,
    pub frozen_fee: i64,
    pub freeze: i64,
}

/// A resting order was (partially) filled.
///
/// The traded price is `curr_money / curr_stock`; the `price` field is the
/// order's limit price, not the execution price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillOrderInfo {
    pub order_id: String,
    pub trading_pair: String,
    pub height: i64,
    pub side: Side,
    #[serde(with = "serde_dec")]
    pub price: Decimal,
    pub left_stock: i64,
    pub freeze: i64,
    pub deal_stock: i64,
    pub deal_money: i64,
    pub curr_stock: i64,
    pub curr_money: i64,
}

/// A resting order was removed from the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrderInfo {
    pub order_id: String,
    pub trading_pair: String,
    pub height: i64,
    pub side: Side,
    #[serde(with = "serde_dec")]
    pub price: Decimal,
    pub del_reason: String,
    pub used_commission: i64,
    pub left_stock: i64,
    pub remain_amount: i64,
    pub deal_stock: i64,
    pub deal_money: i64,
}

/// Bancor pool parameter update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BancorInfo {
    pub sender: String,
    pub stock: String,
    pub money: String,
    #[serde(with = "serde_dec")]
    pub init_price: Decimal,
    #[serde(with = "serde_int")]
    pub max_supply: i128,
    #[serde(with = "serde_dec")]
    pub max_price: Decimal,
    #[serde(with = "serde_dec")]
    pub price: Decimal,
    #[serde(with = "serde_int")]
    pub stock_in_pool: i128,
    #[serde(with = "serde_int")]
    pub money_in_pool: i128,
    pub earliest_cancel_time: i64,
    pub block_height: i64,
}

/// A trade against a bancor pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BancorTrade {
    pub sender: String,
    pub stock: String,
    pub money: String,
    pub amount: i64,
    pub side: Side,
    pub money_limit: i64,
    #[serde(rename = "transaction_price", with = "serde_dec")]
    pub tx_price: Decimal,
    pub block_height: i64,
}

/// Coins sent with a time lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedSendMsg {
    pub from_address: String,
    pub to_address: String,
    pub amount: Vec<Coin>,
    pub unlock_time: i64,
}

/// Previously locked coins became spendable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationUnlock {
    pub address: String,
    pub unlocked: Vec<Coin>,
    pub locked_coins: Vec<LockedCoin>,
    pub frozen_coins: Vec<Coin>,
    pub coins: Vec<Coin>,
    pub height: i64,
}

/// One transfer leg inside a transaction notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub sender: String,
    pub recipient: String,
    /// Compact amount string, e.g. `"1cet"`.
    pub amount: String,
}

/// A transaction touched accounts we index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTx {
    pub signers: Vec<String>,
    pub transfers: Vec<TransferRecord>,
    pub serial_number: i64,
    pub msg_types: Vec<String>,
    pub tx_json: String,
    pub height: i64,
    #[serde(default)]
    pub hash: String,
}

/// A validator was slashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSlash {
    pub validator: String,
    pub power: String,
    pub reason: String,
    pub jailed: bool,
}

/// A delegator started unbonding from a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBeginUnbonding {
    pub delegator: String,
    pub validator: String,
    pub amount: String,
    pub completion_time: String,
}

/// An unbonding completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCompleteUnbonding {
    pub delegator: String,
    pub validator: String,
}

/// A delegator started redelegating between validators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationBeginRedelegation {
    pub delegator: String,
    pub src: String,
    pub dst: String,
    pub amount: String,
    pub completion_time: String,
}

/// A redelegation completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCompleteRedelegation {
    pub delegator: String,
    pub src: String,
    pub dst: String,
}

/// A reference from one token comment to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRef {
    pub id: i64,
    pub reward_target: String,
    pub reward_token: String,
    pub reward_amount: i64,
    pub attitudes: Vec<i32>,
}

/// A comment posted in a token's discussion area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenComment {
    pub id: i64,
    pub height: i64,
    pub sender: String,
    pub token: String,
    pub donation: i64,
    pub title: String,
    pub content: String,
    pub content_type: i32,
    pub references: Vec<CommentRef>,
}

/// A donation to the community pool, derived from `notify_tx` payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donation {
    pub sender: String,
    #[serde(with = "serde_int")]
    pub amount: i128,
}

/// The account that placed an order, recovered from its id.
///
/// Order ids are `{address}-{sequence}`; addresses never contain `-`.
pub fn account_of_order_id(order_id: &str) -> Option<&str> {
    order_id.rsplit_once('-').map(|(account, _)| account)
}

/// Split a trading pair into (stock, money) tokens.
pub fn pair_tokens(trading_pair: &str) -> Option<(&str, &str)> {
    trading_pair.split_once('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_roundtrip() {
        for kind in [
            "height_info",
            "commit",
            "create_order_info",
            "fill_order_info",
            "del_order_info",
            "bancor_info",
            "bancor_trade",
            "send_lock_coins",
            "notify_unlock",
            "notify_tx",
            "notify_slash",
            "begin_unbonding",
            "complete_unbonding",
            "begin_redelegation",
            "complete_redelegation",
            "token_comment",
        ] {
            let parsed = MessageKind::parse(kind).unwrap();
            assert_eq!(parsed.as_str(), kind);
        }
        assert!(MessageKind::parse("bogus_kind").is_none());
    }

    #[test]
    fn test_create_order_wire_format() {
        let json = r#"{"order_id":"addr1-1","sender":"addr1","trading_pair":"abc/cet","order_type":2,"price":"12.000000000000000000","quantity":300,"side":2,"time_in_force":3,"feature_fee":1,"height":1001,"frozen_fee":1,"freeze":10}"#;
        let info: CreateOrderInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.side, Side::Sell);
        assert_eq!(info.price, Decimal::from(12));
        assert_eq!(serde_json::to_string(&info).unwrap(), json);
    }

    #[test]
    fn test_fill_order_wire_format() {
        let json = r#"{"order_id":"addr1-1","trading_pair":"abc/cet","height":1001,"side":2,"price":"100.000000000000000000","left_stock":0,"freeze":0,"deal_stock":100,"deal_money":10,"curr_stock":100,"curr_money":10}"#;
        let info: FillOrderInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.curr_stock, 100);
        assert_eq!(serde_json::to_string(&info).unwrap(), json);
    }

    #[test]
    fn test_bancor_trade_renames_tx_price() {
        let json = r#"{"sender":"addr2","stock":"xyz","money":"cet","amount":1,"side":2,"money_limit":10,"transaction_price":"2.000000000000000000","block_height":1001}"#;
        let trade: BancorTrade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.tx_price, Decimal::from(2));
        assert_eq!(serde_json::to_string(&trade).unwrap(), json);
    }

    #[test]
    fn test_notify_tx_hash_defaults_empty() {
        let json = r#"{"signers":["a"],"transfers":[],"serial_number":1,"msg_types":[],"tx_json":"","height":5}"#;
        let tx: NotificationTx = serde_json::from_str(json).unwrap();
        assert_eq!(tx.hash, "");
    }

    #[test]
    fn test_account_of_order_id() {
        assert_eq!(account_of_order_id("cosmos1qy352-17"), Some("cosmos1qy352"));
        assert_eq!(account_of_order_id("no_separator"), None);
    }

    #[test]
    fn test_pair_tokens() {
        assert_eq!(pair_tokens("abc/cet"), Some(("abc", "cet")));
        assert_eq!(pair_tokens("abc"), None);
    }

    #[test]
    fn test_donation_amount_as_string() {
        let d = Donation {
            sender: "addr".to_string(),
            amount: 200000000,
        };
        assert_eq!(
            serde_json::to_string(&d).unwrap(),
            r#"{"sender":"addr","amount":"200000000"}"#
        );
    }
}
