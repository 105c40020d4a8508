//! Order record store.
//!
//! The store is the only shared mutable resource; every write is scoped to
//! a single order id. The state machine holds a transient working copy of
//! an order during an attempt and persists each transition through this
//! trait.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Order, OrderStatus, RoutingDecision};
use crate::error::Result;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a freshly submitted order.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;

    /// Page of orders, newest-first by creation time.
    async fn list_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>>;

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<()>;

    /// Append a routing decision and stamp the order with the selected
    /// venue and both quoted prices.
    async fn record_routing(&self, decision: &RoutingDecision) -> Result<()>;

    /// Terminal success: status confirmed, executed price and settlement
    /// reference set.
    async fn mark_confirmed(
        &self,
        id: Uuid,
        executed_price: Decimal,
        settlement_ref: &str,
    ) -> Result<()>;

    /// Terminal failure: status failed with the last error and the retry
    /// count that exhausted.
    async fn mark_failed(&self, id: Uuid, error: &str, retry_count: u32) -> Result<()>;

    /// Retryable failure: back to pending with the error and incremented
    /// retry count recorded.
    async fn mark_retry(&self, id: Uuid, error: &str, retry_count: u32) -> Result<()>;

    /// Routing-decision history for one order, oldest first.
    async fn routing_history(&self, order_id: Uuid) -> Result<Vec<RoutingDecision>>;
}
