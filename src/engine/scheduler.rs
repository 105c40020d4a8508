//! Order scheduler.
//!
//! A single dispatch loop drains the job queue in submission order. Each
//! job first passes the rolling-window admission limiter (waiting, never
//! rejecting), then takes a concurrency permit, then runs on its own task.
//! Retry outcomes re-enter the queue after their backoff delay and compete
//! for slots like fresh submissions.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::engine::{AttemptOutcome, OrderRunner};
use crate::error::{Result, SwapError};
use crate::services::Metrics;

/// A finished attempt, kept for observability.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub order_id: Uuid,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub finished_at: DateTime<Utc>,
}

/// Rolling-window admission limiter. At most `limit` admissions per
/// trailing `window`; callers past the cap wait until the oldest admission
/// ages out. Single-consumer, so waiters are served in arrival order.
struct RateWindow {
    limit: usize,
    window: Duration,
    admissions: VecDeque<Instant>,
}

impl RateWindow {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            admissions: VecDeque::with_capacity(limit),
        }
    }

    async fn admit(&mut self) {
        loop {
            let now = Instant::now();
            while let Some(&oldest) = self.admissions.front() {
                if now.duration_since(oldest) >= self.window {
                    self.admissions.pop_front();
                } else {
                    break;
                }
            }
            if self.admissions.len() < self.limit {
                self.admissions.push_back(now);
                return;
            }
            // Window is full; sleep until the oldest admission expires
            if let Some(&oldest) = self.admissions.front() {
                sleep_until(oldest + self.window).await;
            }
        }
    }
}

pub struct Scheduler {
    jobs_tx: mpsc::UnboundedSender<Uuid>,
    history: Arc<Mutex<VecDeque<JobRecord>>>,
    metrics: Arc<Metrics>,
}

impl Scheduler {
    /// Spawn the dispatch loop and return the enqueue handle. The loop runs
    /// until every handle (including pending retry re-enqueues) is dropped.
    pub fn start(
        runner: Arc<dyn OrderRunner>,
        metrics: Arc<Metrics>,
        config: SchedulerConfig,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let history = Arc::new(Mutex::new(VecDeque::with_capacity(config.history_limit)));

        tokio::spawn(dispatch_loop(
            jobs_rx,
            jobs_tx.clone(),
            runner,
            metrics.clone(),
            history.clone(),
            config,
        ));

        Self {
            jobs_tx,
            history,
            metrics,
        }
    }

    /// Queue an order for execution.
    pub fn enqueue(&self, order_id: Uuid) -> Result<()> {
        self.metrics.record_queued();
        self.jobs_tx
            .send(order_id)
            .map_err(|_| SwapError::Internal("scheduler is not running".to_string()))
    }

    /// Most recent finished attempts, newest first.
    pub async fn recent_jobs(&self, limit: usize) -> Vec<JobRecord> {
        let history = self.history.lock().await;
        history.iter().rev().take(limit).cloned().collect()
    }
}

async fn dispatch_loop(
    mut jobs_rx: mpsc::UnboundedReceiver<Uuid>,
    jobs_tx: mpsc::UnboundedSender<Uuid>,
    runner: Arc<dyn OrderRunner>,
    metrics: Arc<Metrics>,
    history: Arc<Mutex<VecDeque<JobRecord>>>,
    config: SchedulerConfig,
) {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
    let mut rate = RateWindow::new(config.rate_limit, config.rate_window());
    // Attempts seen per live order; cleared on any non-retry outcome
    let attempts: Arc<DashMap<Uuid, u32>> = Arc::new(DashMap::new());
    info!(
        max_concurrent = config.max_concurrent,
        rate_limit = config.rate_limit,
        rate_window_secs = config.rate_window_secs,
        "scheduler started"
    );

    while let Some(order_id) = jobs_rx.recv().await {
        rate.admit().await;
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        metrics.record_started();

        let runner = runner.clone();
        let jobs_tx = jobs_tx.clone();
        let metrics = metrics.clone();
        let history = history.clone();
        let config = config.clone();
        let attempts = attempts.clone();

        tokio::spawn(async move {
            let outcome = runner.run_attempt(order_id).await;
            drop(permit);

            let total_attempts = {
                let mut entry = attempts.entry(order_id).or_insert(0);
                *entry += 1;
                *entry
            };

            let recorded = match outcome {
                AttemptOutcome::Confirmed => {
                    attempts.remove(&order_id);
                    metrics.record_completed();
                    AttemptOutcome::Confirmed
                }
                AttemptOutcome::Failed { error, retry_count } => {
                    attempts.remove(&order_id);
                    metrics.record_failed();
                    AttemptOutcome::Failed { error, retry_count }
                }
                AttemptOutcome::Skipped => {
                    attempts.remove(&order_id);
                    metrics.record_skipped();
                    AttemptOutcome::Skipped
                }
                AttemptOutcome::Retry { error, retry_count } => {
                    // The engine bounds its own retries, but an attempt that
                    // cannot even load the order reports retry_count 0 every
                    // time. The attempt ceiling keeps such orders bounded too.
                    if total_attempts >= config.max_attempts {
                        error!(
                            %order_id,
                            total_attempts,
                            error = %error,
                            "attempt ceiling reached, abandoning order"
                        );
                        attempts.remove(&order_id);
                        metrics.record_failed();
                        AttemptOutcome::Failed { error, retry_count }
                    } else {
                        metrics.record_retry();
                        let delay = config.retry_delay(retry_count);
                        debug!(%order_id, retry_count, ?delay, "re-queueing after backoff");
                        let requeue_metrics = metrics.clone();
                        tokio::spawn(async move {
                            sleep(delay).await;
                            requeue_metrics.record_queued();
                            if jobs_tx.send(order_id).is_err() {
                                warn!(%order_id, "scheduler stopped, dropping retry");
                            }
                        });
                        AttemptOutcome::Retry { error, retry_count }
                    }
                }
            };

            let mut history = history.lock().await;
            if history.len() >= config.history_limit {
                history.pop_front();
            }
            history.push_back(JobRecord {
                order_id,
                outcome: recorded,
                finished_at: Utc::now(),
            });
        });
    }

    error!("scheduler dispatch loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    /// Runner that tracks how many attempts overlap.
    struct OverlapTracker {
        current: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicU32,
    }

    impl OverlapTracker {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl OrderRunner for OverlapTracker {
        async fn run_attempt(&self, _order_id: Uuid) -> AttemptOutcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            AttemptOutcome::Confirmed
        }
    }

    /// Runner that fails a fixed number of times before confirming.
    struct FlakyRunner {
        failures: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl OrderRunner for FlakyRunner {
        async fn run_attempt(&self, _order_id: Uuid) -> AttemptOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures.load(Ordering::SeqCst) {
                AttemptOutcome::Retry {
                    error: "transient".to_string(),
                    retry_count: call,
                }
            } else {
                AttemptOutcome::Confirmed
            }
        }
    }

    fn test_config() -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent: 2,
            rate_limit: 1000,
            rate_window_secs: 60,
            retry_base_ms: 5,
            history_limit: 16,
            max_attempts: 10,
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_enforced() {
        let tracker = Arc::new(OverlapTracker::new());
        let metrics = Arc::new(Metrics::new());
        let scheduler = Scheduler::start(tracker.clone(), metrics.clone(), test_config());

        for _ in 0..6 {
            scheduler.enqueue(Uuid::new_v4()).unwrap();
        }

        wait_for(|| tracker.calls.load(Ordering::SeqCst) == 6).await;
        assert!(tracker.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(metrics.snapshot().completed, 6);
        assert_eq!(metrics.snapshot().in_flight, 0);
    }

    #[tokio::test]
    async fn test_retry_outcome_is_requeued_with_backoff() {
        let runner = Arc::new(FlakyRunner {
            failures: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        let metrics = Arc::new(Metrics::new());
        let scheduler = Scheduler::start(runner.clone(), metrics.clone(), test_config());

        let order_id = Uuid::new_v4();
        scheduler.enqueue(order_id).unwrap();

        wait_for(|| runner.calls.load(Ordering::SeqCst) == 3).await;
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.retries, 2);
        assert_eq!(snapshot.completed, 1);

        let jobs = scheduler.recent_jobs(10).await;
        assert_eq!(jobs.len(), 3);
        assert!(jobs.iter().all(|job| job.order_id == order_id));
        // Newest first
        assert_eq!(jobs[0].outcome, AttemptOutcome::Confirmed);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let tracker = Arc::new(OverlapTracker::new());
        let metrics = Arc::new(Metrics::new());
        let mut config = test_config();
        config.history_limit = 4;
        let scheduler = Scheduler::start(tracker.clone(), metrics, config);

        for _ in 0..10 {
            scheduler.enqueue(Uuid::new_v4()).unwrap();
        }
        wait_for(|| tracker.calls.load(Ordering::SeqCst) == 10).await;

        assert_eq!(scheduler.recent_jobs(100).await.len(), 4);
    }

    /// Runner stuck before it can even load the order: every attempt reports
    /// a retry with no usable count.
    struct StuckRunner {
        calls: AtomicU32,
    }

    #[async_trait]
    impl OrderRunner for StuckRunner {
        async fn run_attempt(&self, _order_id: Uuid) -> AttemptOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AttemptOutcome::Retry {
                error: "store unavailable".to_string(),
                retry_count: 0,
            }
        }
    }

    #[tokio::test]
    async fn test_attempt_ceiling_abandons_unloadable_order() {
        let runner = Arc::new(StuckRunner {
            calls: AtomicU32::new(0),
        });
        let metrics = Arc::new(Metrics::new());
        let mut config = test_config();
        config.max_attempts = 3;
        let scheduler = Scheduler::start(runner.clone(), metrics.clone(), config);

        let order_id = Uuid::new_v4();
        scheduler.enqueue(order_id).unwrap();

        wait_for(|| metrics.snapshot().failed == 1).await;
        // No further re-queues after abandonment
        sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().retries, 2);

        let jobs = scheduler.recent_jobs(10).await;
        assert!(matches!(
            jobs[0].outcome,
            AttemptOutcome::Failed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_window_delays_excess_admissions() {
        let mut rate = RateWindow::new(2, Duration::from_secs(60));

        let start = Instant::now();
        rate.admit().await;
        rate.admit().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        // Third admission must wait out the rolling window
        rate.admit().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }
}
