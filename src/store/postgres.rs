//! PostgreSQL order store.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{Order, OrderStatus, Quote, RoutingDecision, VenueId};
use crate::error::{Result, SwapError};
use crate::store::OrderStore;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.get("status");
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| SwapError::Internal(format!("bad status in orders row: {e}")))?;
        let selected_venue = row
            .get::<Option<String>, _>("selected_venue")
            .and_then(|s| s.parse::<VenueId>().ok());

        Ok(Order {
            id: row.get("id"),
            asset_in: row.get("asset_in"),
            asset_out: row.get("asset_out"),
            amount: row.get("amount"),
            slippage_tolerance: row.get("slippage_tolerance"),
            kind: row.get("kind"),
            status,
            selected_venue,
            quote_venue_a: row.get("quote_venue_a"),
            quote_venue_b: row.get("quote_venue_b"),
            executed_price: row.get("executed_price"),
            settlement_ref: row.get("settlement_ref"),
            last_error: row.get("last_error"),
            retry_count: row.get::<i32, _>("retry_count").max(0) as u32,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_decision(row: &PgRow) -> Result<RoutingDecision> {
        let order_id: Uuid = row.get("order_id");
        let amount: Decimal = row.get("amount");
        let selected: String = row.get("selected_venue");
        let selected = selected
            .parse::<VenueId>()
            .map_err(|e| SwapError::Internal(format!("bad venue in routing row: {e}")))?;

        let quote = |venue: VenueId, prefix: &str| -> Quote {
            Quote {
                venue,
                price: row.get::<Decimal, _>(format!("{prefix}_price").as_str()),
                fee: row.get::<Decimal, _>(format!("{prefix}_fee").as_str()),
                estimated_output: row.get::<Decimal, _>(format!("{prefix}_output").as_str()),
                liquidity: row.get::<Decimal, _>(format!("{prefix}_liquidity").as_str()),
            }
        };

        Ok(RoutingDecision {
            order_id,
            amount,
            quote_a: quote(VenueId::VenueA, "venue_a"),
            quote_b: quote(VenueId::VenueB, "venue_b"),
            selected_venue: selected,
            justification: row.get("justification"),
            decided_at: row.get("decided_at"),
        })
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, asset_in, asset_out, amount, slippage_tolerance, kind,
                status, retry_count, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id)
        .bind(&order.asset_in)
        .bind(&order.asset_out)
        .bind(order.amount)
        .bind(order.slippage_tolerance)
        .bind(&order.kind)
        .bind(order.status.as_str())
        .bind(order.retry_count as i32)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn list_orders(&self, limit: i64, offset: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT * FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_order).collect()
    }

    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<()> {
        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, decision), fields(order_id = %decision.order_id))]
    async fn record_routing(&self, decision: &RoutingDecision) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO routing_decisions (
                order_id, amount,
                venue_a_price, venue_a_fee, venue_a_output, venue_a_liquidity,
                venue_b_price, venue_b_fee, venue_b_output, venue_b_liquidity,
                selected_venue, justification, decided_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(decision.order_id)
        .bind(decision.amount)
        .bind(decision.quote_a.price)
        .bind(decision.quote_a.fee)
        .bind(decision.quote_a.estimated_output)
        .bind(decision.quote_a.liquidity)
        .bind(decision.quote_b.price)
        .bind(decision.quote_b.fee)
        .bind(decision.quote_b.estimated_output)
        .bind(decision.quote_b.liquidity)
        .bind(decision.selected_venue.as_str())
        .bind(&decision.justification)
        .bind(decision.decided_at)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE orders
            SET selected_venue = $2, quote_venue_a = $3, quote_venue_b = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(decision.order_id)
        .bind(decision.selected_venue.as_str())
        .bind(decision.quote_a.price)
        .bind(decision.quote_b.price)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_confirmed(
        &self,
        id: Uuid,
        executed_price: Decimal,
        settlement_ref: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = 'confirmed', executed_price = $2, settlement_ref = $3,
                last_error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(executed_price)
        .bind(settlement_ref)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str, retry_count: u32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = 'failed', last_error = $2, retry_count = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry_count as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_retry(&self, id: Uuid, error: &str, retry_count: u32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = 'pending', last_error = $2, retry_count = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry_count as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn routing_history(&self, order_id: Uuid) -> Result<Vec<RoutingDecision>> {
        let rows = sqlx::query(
            "SELECT * FROM routing_decisions WHERE order_id = $1 ORDER BY decided_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_decision).collect()
    }
}
