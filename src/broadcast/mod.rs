//! Status fan-out to order subscribers.
//!
//! The registry is an explicit, shared map owned by the broadcaster rather
//! than ambient global state. At most one subscriber channel exists per
//! order id; attaching again replaces the previous channel
//! (last-attached-wins), so a reconnecting client always displaces its own
//! stale socket. Delivery is best-effort: an event reaches whoever is
//! attached with an open channel at that moment, and a late subscriber gets
//! a current-status snapshot on attach rather than the missed events.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Order, OrderStatus, VenueId};

/// One state-machine transition, as delivered to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Transition-specific payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    None,
    Routing {
        venue: VenueId,
        price_venue_a: Decimal,
        price_venue_b: Decimal,
        justification: String,
    },
    Confirmed {
        settlement_ref: String,
        executed_price: Decimal,
        actual_output: Decimal,
    },
    Failed {
        error: String,
        retry_count: u32,
    },
    RetryScheduled {
        error: String,
        retry_count: u32,
    },
}

impl OrderEvent {
    pub fn new(order_id: Uuid, status: OrderStatus, payload: EventPayload) -> Self {
        Self {
            order_id,
            status,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Current-status snapshot for a late-attaching subscriber. Terminal
    /// orders carry their terminal payload so the client can resynchronize
    /// without replaying intermediate events.
    ///
    /// `selected_fee` is the winning venue's fee from the order's latest
    /// routing decision; it reconstructs the actual output of a confirmed
    /// order.
    pub fn snapshot(order: &Order, selected_fee: Option<Decimal>) -> Self {
        let payload = match order.status {
            OrderStatus::Confirmed => EventPayload::Confirmed {
                settlement_ref: order.settlement_ref.clone().unwrap_or_default(),
                executed_price: order.executed_price.unwrap_or_default(),
                actual_output: order
                    .executed_price
                    .map(|price| {
                        let fee = selected_fee.unwrap_or_default();
                        order.amount * price * (Decimal::ONE - fee)
                    })
                    .unwrap_or_default(),
            },
            OrderStatus::Failed => EventPayload::Failed {
                error: order.last_error.clone().unwrap_or_default(),
                retry_count: order.retry_count,
            },
            _ => EventPayload::None,
        };
        Self::new(order.id, order.status, payload)
    }
}

struct Subscriber {
    token: u64,
    tx: mpsc::UnboundedSender<OrderEvent>,
}

/// Receiving end of one attach. The token ties the subscription to its
/// registry entry so a detach can never evict a newer subscriber that has
/// since replaced it.
pub struct Subscription {
    order_id: Uuid,
    token: u64,
    pub events: mpsc::UnboundedReceiver<OrderEvent>,
}

impl Subscription {
    pub fn order_id(&self) -> Uuid {
        self.order_id
    }
}

/// Per-order subscriber registry.
pub struct StatusBroadcaster {
    subscribers: DashMap<Uuid, Subscriber>,
    next_token: AtomicU64,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_token: AtomicU64::new(0),
        }
    }

    /// Attach a subscriber to an order, replacing any previous one. The
    /// displaced channel closes, which ends its forwarding task.
    pub fn attach(&self, order_id: Uuid) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        if self
            .subscribers
            .insert(order_id, Subscriber { token, tx })
            .is_some()
        {
            debug!(%order_id, "replaced existing subscriber");
        }
        Subscription {
            order_id,
            token,
            events: rx,
        }
    }

    /// Remove a subscription's own registry entry. A subscription that was
    /// already displaced by a newer attach leaves the newer channel alone.
    pub fn detach(&self, subscription: &Subscription) {
        self.subscribers
            .remove_if(&subscription.order_id, |_, subscriber| {
                subscriber.token == subscription.token
            });
    }

    /// Deliver an event to the attached subscriber, if its channel is still
    /// open. Closed channels are pruned; execution never blocks on delivery.
    pub fn publish(&self, event: OrderEvent) {
        let order_id = event.order_id;
        let delivered = match self.subscribers.get(&order_id) {
            Some(entry) => entry.value().tx.send(event).is_ok(),
            None => return,
        };
        if !delivered {
            self.subscribers.remove(&order_id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::domain::SwapRequest;

    fn event(order_id: Uuid, status: OrderStatus) -> OrderEvent {
        OrderEvent::new(order_id, status, EventPayload::None)
    }

    #[tokio::test]
    async fn test_publish_reaches_attached_subscriber() {
        let broadcaster = StatusBroadcaster::new();
        let order_id = Uuid::new_v4();
        let mut subscription = broadcaster.attach(order_id);
        assert_eq!(subscription.order_id(), order_id);

        broadcaster.publish(event(order_id, OrderStatus::Routing));
        let received = subscription.events.recv().await.unwrap();
        assert_eq!(received.order_id, order_id);
        assert_eq!(received.status, OrderStatus::Routing);
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_noop() {
        let broadcaster = StatusBroadcaster::new();
        broadcaster.publish(event(Uuid::new_v4(), OrderStatus::Building));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_second_attach_replaces_first() {
        let broadcaster = StatusBroadcaster::new();
        let order_id = Uuid::new_v4();

        let mut first = broadcaster.attach(order_id);
        let mut second = broadcaster.attach(order_id);

        broadcaster.publish(event(order_id, OrderStatus::Submitted));

        // Only the latest subscriber receives; the first channel is closed
        assert_eq!(
            second.events.recv().await.unwrap().status,
            OrderStatus::Submitted
        );
        assert!(first.events.recv().await.is_none());
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_detach_of_displaced_subscription_keeps_newer_one() {
        let broadcaster = StatusBroadcaster::new();
        let order_id = Uuid::new_v4();

        let stale = broadcaster.attach(order_id);
        let mut current = broadcaster.attach(order_id);

        // The displaced socket detaching must not evict its replacement
        broadcaster.detach(&stale);
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.publish(event(order_id, OrderStatus::Routing));
        assert_eq!(
            current.events.recv().await.unwrap().status,
            OrderStatus::Routing
        );

        // Detaching the live subscription does remove it
        broadcaster.detach(&current);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_channel_is_pruned() {
        let broadcaster = StatusBroadcaster::new();
        let order_id = Uuid::new_v4();

        let subscription = broadcaster.attach(order_id);
        drop(subscription);

        broadcaster.publish(event(order_id, OrderStatus::Routing));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_snapshot_carries_terminal_payload() {
        let mut order = Order::from_request(&SwapRequest {
            asset_in: "SOL".into(),
            asset_out: "USDC".into(),
            amount: dec!(1.5),
            slippage: None,
        });
        order.status = OrderStatus::Failed;
        order.last_error = Some("Venue B settlement failed".into());
        order.retry_count = 3;

        let snapshot = OrderEvent::snapshot(&order, None);
        assert_eq!(snapshot.status, OrderStatus::Failed);
        match snapshot.payload {
            EventPayload::Failed { error, retry_count } => {
                assert_eq!(error, "Venue B settlement failed");
                assert_eq!(retry_count, 3);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
