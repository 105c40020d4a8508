use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::OrderStatus;
use crate::engine::scheduler::JobRecord;
use crate::services::MetricsSnapshot;

/// Response for an accepted order submission
#[derive(Debug, Serialize)]
pub struct SubmitAccepted {
    pub order_id: Uuid,
    pub status: OrderStatus,
    /// Websocket path streaming this order's status transitions
    pub events_url: String,
}

/// Pagination for order listing
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
    pub active_subscribers: usize,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    /// Most recent finished attempts, newest first
    pub recent_jobs: Vec<JobRecord>,
}
