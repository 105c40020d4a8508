//! Service counters.
//!
//! Lock-free atomics updated from the scheduler and API paths. `queued`
//! and `in_flight` are gauges; the rest are monotonic counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct Metrics {
    started_at: Instant,
    submitted: AtomicU64,
    queued: AtomicU64,
    in_flight: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub submitted: u64,
    pub queued: u64,
    pub in_flight: u64,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            submitted: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    /// A queued job moved into execution.
    pub fn record_started(&self) {
        decrement(&self.queued);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        decrement(&self.in_flight);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        decrement(&self.in_flight);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// The attempt ended but the order goes back to the queue.
    pub fn record_retry(&self) {
        decrement(&self.in_flight);
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// An attempt ended without touching the order (already terminal).
    pub fn record_skipped(&self) {
        decrement(&self.in_flight);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            submitted: self.submitted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

fn decrement(gauge: &AtomicU64) {
    let _ = gauge.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
