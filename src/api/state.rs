use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::broadcast::StatusBroadcaster;
use crate::engine::scheduler::Scheduler;
use crate::services::Metrics;
use crate::store::OrderStore;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub scheduler: Arc<Scheduler>,
    pub broadcaster: Arc<StatusBroadcaster>,
    pub metrics: Arc<Metrics>,
    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn OrderStore>,
        scheduler: Arc<Scheduler>,
        broadcaster: Arc<StatusBroadcaster>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            scheduler,
            broadcaster,
            metrics,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
