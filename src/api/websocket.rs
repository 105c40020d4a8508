//! Per-order status stream.
//!
//! Each socket serves exactly one order. On connect the client receives a
//! snapshot of the order's current state, then live transition events until
//! the order reaches a terminal state. Connecting to an already-terminal
//! order yields the snapshot and an immediate close. A second connection
//! for the same order displaces the first.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use rust_decimal::Decimal;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::api::state::AppState;
use crate::broadcast::OrderEvent;
use crate::domain::Order;

/// GET /ws/orders/:id
pub async fn order_events_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> std::result::Result<impl IntoResponse, StatusCode> {
    // Reject unknown orders before upgrading
    match state.store.get_order(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(err) => {
            error!(order_id = %id, error = %err, "failed to load order for websocket");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, order_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    // Attach before reading the order: transitions published during the
    // upgrade round-trip are then either in the snapshot read or queued on
    // the channel, so the client never resumes from a stale state.
    let mut subscription = state.broadcaster.attach(order_id);
    let order = match state.store.get_order(order_id).await {
        Ok(Some(order)) => order,
        Ok(None) | Err(_) => {
            error!(%order_id, "failed to reload order after attach");
            state.broadcaster.detach(&subscription);
            return;
        }
    };
    let snapshot = OrderEvent::snapshot(&order, selected_fee(&state, &order).await);
    let terminal_at_attach = order.status.is_terminal();

    if send_event(&mut sender, &snapshot).await.is_err() {
        state.broadcaster.detach(&subscription);
        return;
    }
    if terminal_at_attach {
        debug!(%order_id, "order already terminal, closing stream after snapshot");
        state.broadcaster.detach(&subscription);
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            event = subscription.events.recv() => {
                let Some(event) = event else {
                    // Replaced by a newer subscriber for this order
                    debug!(%order_id, "subscriber displaced");
                    break;
                };
                let terminal = event.status.is_terminal();
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
                if terminal {
                    // No further events will be published for this order
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(%order_id, error = %err, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.detach(&subscription);
    debug!(%order_id, "websocket connection closed");
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &OrderEvent,
) -> std::result::Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            error!(order_id = %event.order_id, error = %err, "failed to serialize order event");
            return Err(());
        }
    };
    sender.send(Message::Text(json)).await.map_err(|_| ())
}

/// Winning venue's fee from the latest routing decision, used to
/// reconstruct actual output in a confirmed-order snapshot.
async fn selected_fee(state: &AppState, order: &Order) -> Option<Decimal> {
    if order.selected_venue.is_none() {
        return None;
    }
    let history = state.store.routing_history(order.id).await.ok()?;
    history.last().map(|decision| {
        if decision.selected_venue == decision.quote_a.venue {
            decision.quote_a.fee
        } else {
            decision.quote_b.fee
        }
    })
}
