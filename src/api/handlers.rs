use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::api::{state::AppState, types::*};
use crate::domain::{Order, RoutingDecision, SwapRequest};
use crate::error::SwapError;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

fn error_response(err: SwapError) -> (StatusCode, String) {
    let status = match &err {
        SwapError::Validation(_) => StatusCode::BAD_REQUEST,
        SwapError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

/// POST /api/orders
///
/// Validates, persists, and queues the order, then returns immediately.
/// Execution is asynchronous; clients follow progress over the order's
/// websocket or by polling.
pub async fn submit_order(
    State(state): State<AppState>,
    Json(request): Json<SwapRequest>,
) -> std::result::Result<(StatusCode, Json<SubmitAccepted>), (StatusCode, String)> {
    request.validate().map_err(error_response)?;

    let order = Order::from_request(&request);
    state.store.insert_order(&order).await.map_err(error_response)?;
    state.metrics.record_submitted();
    state.scheduler.enqueue(order.id).map_err(error_response)?;

    info!(
        order_id = %order.id,
        pair = %order.pair(),
        amount = %order.amount,
        "order accepted"
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitAccepted {
            order_id: order.id,
            status: order.status,
            events_url: format!("/ws/orders/{}", order.id),
        }),
    ))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> std::result::Result<Json<Order>, (StatusCode, String)> {
    let order = state
        .store
        .get_order(id)
        .await
        .map_err(error_response)?
        .ok_or((StatusCode::NOT_FOUND, format!("order {id} not found")))?;
    Ok(Json(order))
}

/// GET /api/orders?limit=50&offset=0
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> std::result::Result<Json<Vec<Order>>, (StatusCode, String)> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let orders = state
        .store
        .list_orders(limit, offset)
        .await
        .map_err(error_response)?;
    Ok(Json(orders))
}

/// GET /api/orders/:id/routing
pub async fn get_routing_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> std::result::Result<Json<Vec<RoutingDecision>>, (StatusCode, String)> {
    // Distinguish "no decisions yet" from "no such order"
    state
        .store
        .get_order(id)
        .await
        .map_err(error_response)?
        .ok_or((StatusCode::NOT_FOUND, format!("order {id} not found")))?;

    let history = state
        .store
        .routing_history(id)
        .await
        .map_err(error_response)?;
    Ok(Json(history))
}

/// GET /api/metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        counters: state.metrics.snapshot(),
        recent_jobs: state.scheduler.recent_jobs(50).await,
    })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        active_subscribers: state.broadcaster.subscriber_count(),
        metrics: state.metrics.snapshot(),
    })
}
