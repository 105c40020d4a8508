//! End-to-end pipeline tests: submission through scheduler, engine, mock
//! venues, and broadcaster, on the in-memory store.

use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

use swapr::broadcast::{EventPayload, OrderEvent, StatusBroadcaster};
use swapr::config::{EngineConfig, SchedulerConfig, SettlementConfig, VenueConfig};
use swapr::domain::{Order, OrderStatus, SwapRequest, VenueId};
use swapr::engine::scheduler::Scheduler;
use swapr::engine::ExecutionEngine;
use swapr::services::Metrics;
use swapr::store::{MemoryStore, OrderStore};
use swapr::venues::{MockVenue, VenueAdapter};

struct Stack {
    store: Arc<MemoryStore>,
    broadcaster: Arc<StatusBroadcaster>,
    scheduler: Arc<Scheduler>,
    metrics: Arc<Metrics>,
}

fn venue_config(fee: rust_decimal::Decimal) -> VenueConfig {
    VenueConfig {
        fee,
        variance_min: 0.0,
        variance_max: 0.01,
        liquidity_min: 1_000_000.0,
        liquidity_max: 2_000_000.0,
        latency_ms: 0,
    }
}

/// Full pipeline on deterministic mock venues. `failure_rate` drives the
/// settlement simulation for both venues.
fn stack(failure_rate: f64) -> Stack {
    let store = Arc::new(MemoryStore::new());
    let broadcaster = Arc::new(StatusBroadcaster::new());
    let metrics = Arc::new(Metrics::new());
    let settlement = SettlementConfig { failure_rate };

    let venue_a = Arc::new(MockVenue::with_seed(
        VenueId::VenueA,
        venue_config(dec!(0.003)),
        settlement.clone(),
        7,
    ));
    let venue_b = Arc::new(MockVenue::with_seed(
        VenueId::VenueB,
        venue_config(dec!(0.002)),
        settlement,
        11,
    ));

    let engine = Arc::new(ExecutionEngine::new(
        store.clone() as Arc<dyn OrderStore>,
        broadcaster.clone(),
        VenueAdapter::new(VenueId::VenueA, venue_a.clone(), venue_a),
        VenueAdapter::new(VenueId::VenueB, venue_b.clone(), venue_b),
        EngineConfig {
            quote_timeout_ms: 1000,
            build_delay_ms: 1,
            max_retries: 3,
        },
    ));
    let scheduler = Arc::new(Scheduler::start(
        engine,
        metrics.clone(),
        SchedulerConfig {
            max_concurrent: 4,
            rate_limit: 1000,
            rate_window_secs: 60,
            retry_base_ms: 5,
            history_limit: 64,
            max_attempts: 10,
        },
    ));

    Stack {
        store,
        broadcaster,
        scheduler,
        metrics,
    }
}

async fn submit(stack: &Stack, amount: rust_decimal::Decimal) -> Order {
    let request = SwapRequest {
        asset_in: "SOL".into(),
        asset_out: "USDC".into(),
        amount,
        slippage: Some(dec!(0.01)),
    };
    request.validate().unwrap();
    let order = Order::from_request(&request);
    stack.store.insert_order(&order).await.unwrap();
    order
}

/// Collect events for one order until a terminal status arrives.
async fn events_until_terminal(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<OrderEvent>,
) -> Vec<OrderEvent> {
    timeout(Duration::from_secs(10), async {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let terminal = event.status.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    })
    .await
    .expect("order did not reach a terminal state in time")
}

#[tokio::test]
async fn test_happy_path_walks_full_lifecycle() {
    let stack = stack(0.0);
    let order = submit(&stack, dec!(1.5)).await;
    let mut subscription = stack.broadcaster.attach(order.id);

    stack.metrics.record_submitted();
    stack.scheduler.enqueue(order.id).unwrap();

    let events = events_until_terminal(&mut subscription.events).await;
    let statuses: Vec<OrderStatus> = events.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::Routing,
            OrderStatus::Building,
            OrderStatus::Submitted,
            OrderStatus::Confirmed,
        ]
    );

    // Routing event carries both prices and the justification
    match &events[0].payload {
        EventPayload::Routing {
            price_venue_a,
            price_venue_b,
            justification,
            ..
        } => {
            assert!(*price_venue_a > dec!(0));
            assert!(*price_venue_b > dec!(0));
            assert!(
                justification.contains("better output")
                    || justification.contains("higher liquidity")
            );
        }
        other => panic!("unexpected routing payload: {other:?}"),
    }

    match &events[3].payload {
        EventPayload::Confirmed {
            settlement_ref,
            executed_price,
            actual_output,
        } => {
            assert!(settlement_ref.starts_with("0x"));
            assert!(*executed_price > dec!(0));
            assert!(*actual_output > dec!(0));
        }
        other => panic!("unexpected confirmed payload: {other:?}"),
    }

    let stored = stack.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert!(stored.selected_venue.is_some());
    assert!(stored.quote_venue_a.is_some());
    assert!(stored.quote_venue_b.is_some());
    assert_eq!(stored.retry_count, 0);

    // Executed price stays within the order's slippage tolerance of the quote
    let quoted = match stored.selected_venue.unwrap() {
        VenueId::VenueA => stored.quote_venue_a.unwrap(),
        VenueId::VenueB => stored.quote_venue_b.unwrap(),
    };
    let deviation = (stored.executed_price.unwrap() - quoted).abs() / quoted;
    assert!(deviation <= stored.slippage_tolerance + dec!(0.0000001));

    let snapshot = stack.metrics.snapshot();
    assert_eq!(snapshot.submitted, 1);
    assert_eq!(snapshot.completed, 1);
    assert_eq!(snapshot.failed, 0);
}

#[tokio::test]
async fn test_settlement_failures_retry_then_fail_terminally() {
    let stack = stack(1.0);
    let order = submit(&stack, dec!(2)).await;
    let mut subscription = stack.broadcaster.attach(order.id);

    stack.metrics.record_submitted();
    stack.scheduler.enqueue(order.id).unwrap();

    let events = events_until_terminal(&mut subscription.events).await;

    // Three attempts: two retry-scheduled events, then terminal failure
    let retries = events
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::RetryScheduled { .. }))
        .count();
    assert_eq!(retries, 2);

    let last = events.last().unwrap();
    assert_eq!(last.status, OrderStatus::Failed);
    match &last.payload {
        EventPayload::Failed { error, retry_count } => {
            assert_eq!(*retry_count, 3);
            assert!(error.contains("settlement failed"));
        }
        other => panic!("unexpected failure payload: {other:?}"),
    }

    let stored = stack.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    assert_eq!(stored.retry_count, 3);
    assert!(stored.last_error.is_some());
    assert!(stored.executed_price.is_none());

    // Quotes were re-fetched for every attempt
    let history = stack.store.routing_history(order.id).await.unwrap();
    assert_eq!(history.len(), 3);

    let snapshot = stack.metrics.snapshot();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.retries, 2);
    assert_eq!(snapshot.completed, 0);
}

#[tokio::test]
async fn test_concurrent_orders_all_finish() {
    let stack = stack(0.0);
    let mut ids = Vec::new();
    for _ in 0..8 {
        let order = submit(&stack, dec!(1)).await;
        ids.push(order.id);
        stack.metrics.record_submitted();
        stack.scheduler.enqueue(order.id).unwrap();
    }

    timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = stack.metrics.snapshot();
            if snapshot.completed + snapshot.failed == 8 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("orders did not finish in time");

    for id in ids {
        let stored = stack.store.get_order(id).await.unwrap().unwrap();
        assert!(stored.status.is_terminal());
    }

    // Listing pages newest-first across everything submitted
    let page = stack.store.list_orders(5, 0).await.unwrap();
    assert_eq!(page.len(), 5);
    assert!(page[0].created_at >= page[4].created_at);
}
