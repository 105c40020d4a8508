//! Execution state machine.
//!
//! One call to [`ExecutionEngine::run_attempt`] drives a single order from
//! its admitted state to a terminal state or a retry-pending outcome:
//! pending → routing → building → submitted → confirmed, with `failed`
//! reachable from anywhere. Each transition is persisted before the next
//! phase starts and emitted to the status broadcaster. Failures inside an
//! attempt never escape: they are converted into the retry-or-fail
//! decision and handed back to the scheduler.

pub mod scheduler;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broadcast::{EventPayload, OrderEvent, StatusBroadcaster};
use crate::config::EngineConfig;
use crate::domain::{Order, OrderStatus, Quote, VenueId};
use crate::error::{Result, SwapError};
use crate::routing::{self, VenueChoice};
use crate::store::OrderStore;
use crate::venues::VenueAdapter;

/// How one execution attempt ended, from the scheduler's point of view.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Terminal success
    Confirmed,
    /// Retryable failure; the order is back in `pending` with the error
    /// and incremented retry count persisted
    Retry { error: String, retry_count: u32 },
    /// Terminal failure, retries exhausted
    Failed { error: String, retry_count: u32 },
    /// Nothing to do (unknown id or already terminal)
    Skipped,
}

/// Seam between the scheduler and the state machine, so scheduler tests
/// can run against a controllable fake.
#[async_trait]
pub trait OrderRunner: Send + Sync {
    async fn run_attempt(&self, order_id: Uuid) -> AttemptOutcome;
}

pub struct ExecutionEngine {
    store: Arc<dyn OrderStore>,
    broadcaster: Arc<StatusBroadcaster>,
    venue_a: VenueAdapter,
    venue_b: VenueAdapter,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn OrderStore>,
        broadcaster: Arc<StatusBroadcaster>,
        venue_a: VenueAdapter,
        venue_b: VenueAdapter,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            broadcaster,
            venue_a,
            venue_b,
            config,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    fn emit(&self, order_id: Uuid, status: OrderStatus, payload: EventPayload) {
        self.broadcaster
            .publish(OrderEvent::new(order_id, status, payload));
    }

    /// Fetch both venue quotes concurrently, each bounded by the configured
    /// timeout. Either venue failing fails the attempt.
    async fn fetch_quotes(&self, order: &Order) -> Result<(Quote, Quote)> {
        let quote_call = |venue: &VenueAdapter| {
            let quotes = venue.quotes.clone();
            let asset_in = order.asset_in.clone();
            let asset_out = order.asset_out.clone();
            let amount = order.amount;
            async move { quotes.quote(&asset_in, &asset_out, amount).await }
        };

        let (result_a, result_b) = tokio::join!(
            timeout(self.config.quote_timeout(), quote_call(&self.venue_a)),
            timeout(self.config.quote_timeout(), quote_call(&self.venue_b)),
        );

        let unavailable = |venue: VenueId| SwapError::VenueUnavailable {
            venue,
            reason: format!("no quote within {}ms", self.config.quote_timeout_ms),
        };

        let quote_a = result_a.map_err(|_| unavailable(self.venue_a.id))??;
        let quote_b = result_b.map_err(|_| unavailable(self.venue_b.id))??;
        Ok((quote_a, quote_b))
    }

    fn venue(&self, id: VenueId) -> &VenueAdapter {
        if self.venue_a.id == id {
            &self.venue_a
        } else {
            &self.venue_b
        }
    }

    /// One pass of the state machine. Every error is mapped into a
    /// retry-or-fail outcome here; nothing propagates to the worker.
    async fn try_execute(&self, order: &Order) -> Result<()> {
        let order_id = order.id;

        // pending → routing
        self.store
            .update_status(order_id, OrderStatus::Routing)
            .await?;
        let (quote_a, quote_b) = self.fetch_quotes(order).await?;
        let choice = routing::select_venue(&quote_a, &quote_b);
        let decision = routing::routing_decision(
            order_id,
            order.amount,
            quote_a.clone(),
            quote_b.clone(),
            &choice,
        );
        self.store.record_routing(&decision).await?;
        info!(
            %order_id,
            venue = %choice.venue,
            justification = %choice.justification,
            "order routed"
        );
        self.emit(
            order_id,
            OrderStatus::Routing,
            EventPayload::Routing {
                venue: choice.venue,
                price_venue_a: quote_a.price,
                price_venue_b: quote_b.price,
                justification: choice.justification.clone(),
            },
        );

        // routing → building: simulated transaction construction
        self.store
            .update_status(order_id, OrderStatus::Building)
            .await?;
        self.emit(order_id, OrderStatus::Building, EventPayload::None);
        sleep(self.config.build_delay()).await;

        // building → submitted
        self.store
            .update_status(order_id, OrderStatus::Submitted)
            .await?;
        self.emit(order_id, OrderStatus::Submitted, EventPayload::None);

        let winning_quote = self.winning_quote(&choice, &quote_a, &quote_b);
        let receipt = self
            .venue(choice.venue)
            .settlement
            .settle(order, winning_quote)
            .await?;

        self.store
            .mark_confirmed(order_id, receipt.executed_price, &receipt.settlement_ref)
            .await?;
        info!(
            %order_id,
            venue = %choice.venue,
            executed_price = %receipt.executed_price,
            settlement_ref = %receipt.settlement_ref,
            "order confirmed"
        );
        self.emit(
            order_id,
            OrderStatus::Confirmed,
            EventPayload::Confirmed {
                settlement_ref: receipt.settlement_ref,
                executed_price: receipt.executed_price,
                actual_output: receipt.actual_output,
            },
        );
        Ok(())
    }

    fn winning_quote<'a>(
        &self,
        choice: &VenueChoice,
        quote_a: &'a Quote,
        quote_b: &'a Quote,
    ) -> &'a Quote {
        if choice.venue == quote_a.venue {
            quote_a
        } else {
            quote_b
        }
    }

    /// Convert an attempt failure into retry-or-fail, persisting the
    /// decision. Store errors here are logged rather than propagated — the
    /// outcome still reaches the scheduler.
    async fn fail_or_retry(&self, order: &Order, err: SwapError) -> AttemptOutcome {
        let retry_count = order.retry_count + 1;
        let message = err.to_string();

        if !err.is_retryable() || retry_count >= self.config.max_retries {
            error!(
                order_id = %order.id,
                retry_count,
                error = %message,
                "retries exhausted, order failed"
            );
            if let Err(persist_err) = self
                .store
                .mark_failed(order.id, &message, retry_count)
                .await
            {
                error!(order_id = %order.id, error = %persist_err, "failed to persist terminal failure");
            }
            self.emit(
                order.id,
                OrderStatus::Failed,
                EventPayload::Failed {
                    error: message.clone(),
                    retry_count,
                },
            );
            AttemptOutcome::Failed {
                error: message,
                retry_count,
            }
        } else {
            warn!(
                order_id = %order.id,
                retry_count,
                error = %message,
                "attempt failed, scheduling retry"
            );
            if let Err(persist_err) = self.store.mark_retry(order.id, &message, retry_count).await
            {
                error!(order_id = %order.id, error = %persist_err, "failed to persist retry state");
            }
            self.emit(
                order.id,
                OrderStatus::Pending,
                EventPayload::RetryScheduled {
                    error: message.clone(),
                    retry_count,
                },
            );
            AttemptOutcome::Retry {
                error: message,
                retry_count,
            }
        }
    }
}

#[async_trait]
impl OrderRunner for ExecutionEngine {
    async fn run_attempt(&self, order_id: Uuid) -> AttemptOutcome {
        let order = match self.store.get_order(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(%order_id, "attempt for unknown order, skipping");
                return AttemptOutcome::Skipped;
            }
            Err(err) => {
                // Can't even load the working copy. The scheduler retries
                // these under its per-order attempt ceiling.
                error!(%order_id, error = %err, "failed to load order for attempt");
                return AttemptOutcome::Retry {
                    error: err.to_string(),
                    retry_count: 0,
                };
            }
        };

        // Terminal states are idempotent: repeated scheduler ticks must not
        // mutate a finished order.
        if order.status.is_terminal() {
            debug!(%order_id, status = %order.status, "order already terminal, skipping");
            return AttemptOutcome::Skipped;
        }

        match self.try_execute(&order).await {
            Ok(()) => AttemptOutcome::Confirmed,
            Err(err) => self.fail_or_retry(&order, err).await,
        }
    }
}
