//! Subscription dispatch
//!
//! Routing is a table keyed by (topic, scope): global topics carry no
//! scope, market/account/token topics carry one. A subscriber is a single
//! push sink — it receives `(topic, payload bytes)` and nothing else, so
//! transports stay trivial.
//!
//! Every subscriber owns a bounded outbound queue. A push that would
//! overflow the queue closes the subscription instead of blocking the
//! hub; closed subscriptions are pruned on the next publish to their
//! route. The transport drains queues at its own pace.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::candles::TimeSpan;

/// Message channels, with their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Validator slashing, global.
    Slash,
    /// Block progress, global.
    Height,
    /// Closed candles, per market and span.
    Candle(TimeSpan),
    /// Depth deltas, per market.
    Depth,
    /// Bancor pool updates, per market.
    BancorInfo,
    /// Token comments, per token.
    Comment,
    /// Order lifecycle, per account.
    Order,
    /// Bancor trades, per account.
    BancorTrade,
    /// Executed deals, per market.
    Deal,
    /// Transactions, per signer.
    Tx,
    /// Unbonding completions, per delegator.
    Unbonding,
    /// Redelegation completions, per delegator.
    Redelegation,
    /// Coin unlocks, per account.
    Unlock,
    /// Transfer income, per recipient.
    Income,
    /// Locked transfers, per recipient.
    SendLock,
    /// 24-hour ticker diffs, per market.
    Ticker,
}

impl Topic {
    /// Numeric topic code, stable for wire use.
    pub fn code(&self) -> u16 {
        match self {
            Topic::Slash => 0,
            Topic::Height => 3,
            Topic::Candle(TimeSpan::Day) => 5,
            Topic::Candle(TimeSpan::Minute) => 6,
            Topic::Candle(TimeSpan::Hour) => 7,
            Topic::Depth => 8,
            Topic::BancorInfo => 11,
            Topic::Comment => 13,
            Topic::Order => 15,
            Topic::BancorTrade => 17,
            Topic::Deal => 19,
            Topic::Tx => 20,
            Topic::Unbonding => 21,
            Topic::Redelegation => 22,
            Topic::Unlock => 23,
            Topic::Income => 25,
            Topic::SendLock => 26,
            Topic::Ticker => 27,
        }
    }
}

/// A payload queued for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub topic: Topic,
    pub payload: Vec<u8>,
}

/// One subscriber: an id plus a bounded outbound queue.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    queue: Mutex<VecDeque<PushMessage>>,
    capacity: usize,
    closed: AtomicBool,
}

impl Subscription {
    fn new(id: u64, capacity: usize) -> Self {
        Self {
            id,
            queue: Mutex::new(VecDeque::new()),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the subscription was closed (queue overflow or unsubscribe).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the subscription; pending messages stay drainable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Drain every queued message, oldest first.
    pub fn drain(&self) -> Vec<PushMessage> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of queued messages.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Enqueue one message. Returns false (and closes the subscription)
    /// when the queue is full.
    fn offer(&self, message: PushMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            drop(queue);
            self.close();
            return false;
        }
        queue.push_back(message);
        true
    }
}

type RouteKey = (Topic, Option<String>);

/// The routing table. Shared between the hub's ingest path (publish) and
/// transport threads (subscribe / unsubscribe).
pub struct SubscribeCenter {
    routes: DashMap<RouteKey, Vec<Arc<Subscription>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl SubscribeCenter {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            routes: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_capacity,
        }
    }

    /// Register a new subscriber on one route.
    pub fn subscribe(&self, topic: Topic, scope: Option<&str>) -> Arc<Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let sub = Arc::new(Subscription::new(id, self.queue_capacity));
        self.attach(&sub, topic, scope);
        sub
    }

    /// Attach an existing subscriber to an additional route.
    pub fn attach(&self, sub: &Arc<Subscription>, topic: Topic, scope: Option<&str>) {
        self.routes
            .entry((topic, scope.map(str::to_string)))
            .or_default()
            .push(Arc::clone(sub));
    }

    /// Remove a subscriber from one route and close it if it no longer
    /// appears anywhere.
    pub fn unsubscribe(&self, sub: &Subscription, topic: Topic, scope: Option<&str>) {
        if let Some(mut entry) = self.routes.get_mut(&(topic, scope.map(str::to_string))) {
            entry.retain(|s| s.id() != sub.id());
        }
    }

    /// Push a payload to every live subscriber of the route.
    ///
    /// Subscribers whose queue overflows are detached; nothing here can
    /// block the caller.
    pub fn publish(&self, topic: Topic, scope: Option<&str>, payload: &[u8]) {
        let key = (topic, scope.map(str::to_string));
        let Some(mut entry) = self.routes.get_mut(&key) else {
            return;
        };
        let mut overflowed = false;
        for sub in entry.iter() {
            let delivered = sub.offer(PushMessage {
                topic,
                payload: payload.to_vec(),
            });
            if !delivered {
                overflowed = true;
                warn!(
                    subscriber = sub.id(),
                    code = topic.code(),
                    "subscriber queue overflow, closing subscription"
                );
            }
        }
        if overflowed {
            entry.retain(|s| !s.is_closed());
        }
        debug!(code = topic.code(), scope, "published");
    }

    /// Number of live subscribers on a route.
    pub fn route_len(&self, topic: Topic, scope: Option<&str>) -> usize {
        self.routes
            .get(&(topic, scope.map(str::to_string)))
            .map(|subs| subs.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_scoped_subscriber() {
        let center = SubscribeCenter::new(16);
        let sub = center.subscribe(Topic::Depth, Some("abc/cet"));

        center.publish(Topic::Depth, Some("abc/cet"), b"payload");
        center.publish(Topic::Depth, Some("xyz/cet"), b"other market");

        let messages = sub.drain();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload, b"payload");
    }

    #[test]
    fn test_global_route_has_no_scope() {
        let center = SubscribeCenter::new(16);
        let sub = center.subscribe(Topic::Slash, None);

        center.publish(Topic::Slash, None, b"slashed");
        assert_eq!(sub.drain().len(), 1);
    }

    #[test]
    fn test_attach_multiple_routes() {
        let center = SubscribeCenter::new(16);
        let sub = center.subscribe(Topic::Depth, Some("abc/cet"));
        center.attach(&sub, Topic::Deal, Some("abc/cet"));

        center.publish(Topic::Depth, Some("abc/cet"), b"d1");
        center.publish(Topic::Deal, Some("abc/cet"), b"d2");

        let messages = sub.drain();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].topic, Topic::Depth);
        assert_eq!(messages[1].topic, Topic::Deal);
    }

    #[test]
    fn test_overflow_closes_subscription() {
        let center = SubscribeCenter::new(2);
        let sub = center.subscribe(Topic::Height, None);

        center.publish(Topic::Height, None, b"1");
        center.publish(Topic::Height, None, b"2");
        assert!(!sub.is_closed());

        center.publish(Topic::Height, None, b"3");
        assert!(sub.is_closed());
        assert_eq!(center.route_len(Topic::Height, None), 0);

        // Queued messages stay drainable after close
        assert_eq!(sub.drain().len(), 2);
    }

    #[test]
    fn test_unsubscribe_detaches_route() {
        let center = SubscribeCenter::new(16);
        let sub = center.subscribe(Topic::Order, Some("addr1"));
        assert_eq!(center.route_len(Topic::Order, Some("addr1")), 1);

        center.unsubscribe(&sub, Topic::Order, Some("addr1"));
        assert_eq!(center.route_len(Topic::Order, Some("addr1")), 0);

        center.publish(Topic::Order, Some("addr1"), b"x");
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_ordering_preserved_per_subscriber() {
        let center = SubscribeCenter::new(16);
        let sub = center.subscribe(Topic::Order, Some("addr1"));

        for i in 0..5u8 {
            center.publish(Topic::Order, Some("addr1"), &[i]);
        }
        let payloads: Vec<u8> = sub.drain().into_iter().map(|m| m.payload[0]).collect();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_candle_topic_codes() {
        assert_eq!(Topic::Candle(TimeSpan::Day).code(), 5);
        assert_eq!(Topic::Candle(TimeSpan::Minute).code(), 6);
        assert_eq!(Topic::Candle(TimeSpan::Hour).code(), 7);
    }
}
