//! In-memory order store.
//!
//! Backs tests and database-less serving. Semantics mirror the Postgres
//! adapter: orders keyed by id, routing decisions append-only, listing
//! newest-first.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Order, OrderStatus, RoutingDecision};
use crate::error::{Result, SwapError};
use crate::store::OrderStore;

#[derive(Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<Uuid, Order>>,
    /// Submission order, oldest first
    insertion: RwLock<Vec<Uuid>>,
    decisions: RwLock<HashMap<Uuid, Vec<RoutingDecision>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn mutate<F>(&self, id: Uuid, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Order),
    {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&id).ok_or_else(|| SwapError::NotFound {
            order_id: id.to_string(),
        })?;
        apply(order);
        order.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.orders.write().await.insert(order.id, order.clone());
        self.insertion.write().await.push(order.id);
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn list_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>> {
        let insertion = self.insertion.read().await;
        let orders = self.orders.read().await;
        let page = insertion
            .iter()
            .rev()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|id| orders.get(id).cloned())
            .collect();
        Ok(page)
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<()> {
        self.mutate(id, |order| order.status = status).await
    }

    async fn record_routing(&self, decision: &RoutingDecision) -> Result<()> {
        self.mutate(decision.order_id, |order| {
            order.selected_venue = Some(decision.selected_venue);
            order.quote_venue_a = Some(decision.quote_a.price);
            order.quote_venue_b = Some(decision.quote_b.price);
        })
        .await?;

        self.decisions
            .write()
            .await
            .entry(decision.order_id)
            .or_default()
            .push(decision.clone());
        Ok(())
    }

    async fn mark_confirmed(
        &self,
        id: Uuid,
        executed_price: Decimal,
        settlement_ref: &str,
    ) -> Result<()> {
        self.mutate(id, |order| {
            order.status = OrderStatus::Confirmed;
            order.executed_price = Some(executed_price);
            order.settlement_ref = Some(settlement_ref.to_string());
            order.last_error = None;
        })
        .await
    }

    async fn mark_failed(&self, id: Uuid, error: &str, retry_count: u32) -> Result<()> {
        self.mutate(id, |order| {
            order.status = OrderStatus::Failed;
            order.last_error = Some(error.to_string());
            order.retry_count = retry_count;
        })
        .await
    }

    async fn mark_retry(&self, id: Uuid, error: &str, retry_count: u32) -> Result<()> {
        self.mutate(id, |order| {
            order.status = OrderStatus::Pending;
            order.last_error = Some(error.to_string());
            order.retry_count = retry_count;
        })
        .await
    }

    async fn routing_history(&self, order_id: Uuid) -> Result<Vec<RoutingDecision>> {
        Ok(self
            .decisions
            .read()
            .await
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }
}
