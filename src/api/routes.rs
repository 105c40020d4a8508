use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState, websocket::order_events_handler};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Order endpoints
        .route("/api/orders", post(handlers::submit_order))
        .route("/api/orders", get(handlers::list_orders))
        .route("/api/orders/:id", get(handlers::get_order))
        .route("/api/orders/:id/routing", get(handlers::get_routing_history))
        // System endpoints
        .route("/api/metrics", get(handlers::get_metrics))
        .route("/health", get(handlers::health))
        // Per-order status stream
        .route("/ws/orders/:id", get(order_events_handler))
        .with_state(state)
        .layer(cors)
}
