// src/scheduler.rs
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{ConfigError, TickError};

/// One-time metrics registration (so series show up on an exporter, if any).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_ticks_total", "Completed poller ticks.");
        describe_counter!("poll_errors_total", "Poller ticks that ended in an error.");
        describe_counter!("notify_sent_total", "Notifications accepted by a transport.");
        describe_counter!("notify_errors_total", "Notification delivery failures.");
        describe_counter!("dedup_hits_total", "Items skipped as already announced.");
        describe_gauge!("poll_last_tick_ts", "Unix ts of the most recent tick.");
    });
}

/// One poller's tick body. Implementations contain the whole
/// fetch -> diff -> dispatch -> persist sequence for their feed.
#[async_trait::async_trait]
pub trait PollTask: Send + Sync {
    async fn tick(&self) -> Result<(), TickError>;
    fn feed_id(&self) -> &str;
}

/// One-shot gate the host flips once its transport is connected. Every
/// poller's first tick waits behind it.
#[derive(Clone)]
pub struct ReadyGate {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadyGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_ready(&self) {
        // send_replace: the flip must stick even when no poller has
        // subscribed yet (the gate may open before `run`).
        self.tx.send_replace(true);
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

struct Registered {
    interval: Duration,
    task: Arc<dyn PollTask>,
}

/// Runs every registered poller on its own fixed-interval tokio task.
/// Failures are contained per tick; no feed can stall or kill another.
pub struct Scheduler {
    pollers: Vec<Registered>,
    ids: HashSet<String>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            pollers: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn register(
        &mut self,
        interval: Duration,
        task: Arc<dyn PollTask>,
    ) -> Result<(), ConfigError> {
        let feed_id = task.feed_id().to_string();
        if interval.is_zero() {
            return Err(ConfigError::BadInterval(feed_id));
        }
        if !self.ids.insert(feed_id.clone()) {
            return Err(ConfigError::DuplicateFeed(feed_id));
        }
        self.pollers.push(Registered { interval, task });
        Ok(())
    }

    /// Spawn all pollers. Each waits for `ready` before its first tick, then
    /// ticks on its own interval anchored to its own start time.
    pub fn run(self, ready: &ReadyGate) -> SchedulerHandle {
        ensure_metrics_described();
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut joins = Vec::with_capacity(self.pollers.len());

        for reg in self.pollers {
            let mut ready_rx = ready.subscribe();
            let mut shutdown_rx = shutdown_tx.subscribe();
            joins.push(tokio::spawn(async move {
                // Gate the first tick on host readiness. If the gate sender
                // goes away before firing, the host never came up.
                while !*ready_rx.borrow() {
                    tokio::select! {
                        changed = ready_rx.changed() => {
                            if changed.is_err() {
                                warn!(feed = reg.task.feed_id(), "ready gate dropped, poller exiting");
                                return;
                            }
                        }
                        _ = shutdown_rx.recv() => return,
                    }
                }

                let mut ticker = tokio::time::interval(reg.interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                info!(
                    feed = reg.task.feed_id(),
                    interval_secs = reg.interval.as_secs_f64(),
                    "poller started"
                );

                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!(feed = reg.task.feed_id(), "poller shutdown requested");
                            break;
                        }
                        // The tick body runs inside the branch handler, so a
                        // shutdown signal never aborts an in-flight tick.
                        _ = ticker.tick() => {
                            run_tick(reg.task.as_ref()).await;
                        }
                    }
                }
            }));
        }

        SchedulerHandle {
            shutdown_tx,
            joins,
        }
    }

    pub fn len(&self) -> usize {
        self.pollers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pollers.is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_tick(task: &dyn PollTask) {
    let feed = task.feed_id();
    match task.tick().await {
        Ok(()) => {
            counter!("poll_ticks_total").increment(1);
            gauge!("poll_last_tick_ts").set(chrono::Utc::now().timestamp().max(0) as f64);
        }
        Err(e) => {
            counter!("poll_errors_total").increment(1);
            match &e {
                // Send succeeded but record-keeping failed: next run may
                // duplicate this item. Loud, but never fatal.
                TickError::Persistence(_) => {
                    error!(feed, error = ?e, "tick persisted nothing after a successful send")
                }
                TickError::Fetch(_) | TickError::Delivery(_) => {
                    warn!(feed, error = ?e, "tick failed, retrying next interval")
                }
            }
        }
    }
}

/// Running scheduler. Dropping it without `shutdown` detaches the pollers.
pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    joins: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop scheduling future ticks and wait for in-flight ticks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for join in self.joins {
            if let Err(e) = join.await {
                warn!(error = ?e, "poller task join failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopTask {
        id: String,
        ticks: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PollTask for NoopTask {
        async fn tick(&self) -> Result<(), TickError> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn feed_id(&self) -> &str {
            &self.id
        }
    }

    fn noop(id: &str) -> Arc<NoopTask> {
        Arc::new(NoopTask {
            id: id.to_string(),
            ticks: AtomicUsize::new(0),
        })
    }

    #[test]
    fn duplicate_feed_id_is_rejected() {
        let mut s = Scheduler::new();
        s.register(Duration::from_secs(1), noop("a")).unwrap();
        let err = s.register(Duration::from_secs(5), noop("a")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateFeed(id) if id == "a"));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut s = Scheduler::new();
        let err = s.register(Duration::ZERO, noop("a")).unwrap_err();
        assert!(matches!(err, ConfigError::BadInterval(id) if id == "a"));
        assert!(s.is_empty());
    }

    #[tokio::test]
    async fn first_tick_waits_for_ready_gate() {
        let task = noop("gated");
        let mut s = Scheduler::new();
        s.register(Duration::from_millis(10), task.clone()).unwrap();
        let gate = ReadyGate::new();
        let handle = s.run(&gate);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(task.ticks.load(Ordering::SeqCst), 0);

        gate.set_ready();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(task.ticks.load(Ordering::SeqCst) >= 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn gate_opened_before_run_still_releases_pollers() {
        // No receiver exists yet when the gate flips; the value must stick.
        let gate = ReadyGate::new();
        gate.set_ready();

        let task = noop("early-gate");
        let mut s = Scheduler::new();
        s.register(Duration::from_millis(10), task.clone()).unwrap();
        let handle = s.run(&gate);

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.shutdown().await;
        assert!(task.ticks.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn shutdown_stops_future_ticks() {
        let task = noop("stoppable");
        let mut s = Scheduler::new();
        s.register(Duration::from_millis(10), task.clone()).unwrap();
        let gate = ReadyGate::new();
        gate.set_ready();
        let handle = s.run(&gate);

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;
        let after = task.ticks.load(Ordering::SeqCst);
        assert!(after >= 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(task.ticks.load(Ordering::SeqCst), after);
    }
}
