//! Periodic diff-and-broadcast loop

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use tokenagg_core::FeedConfig;
use tokenagg_sources::{spawn_periodic, AssetAggregator, TaskHandle};

use crate::broadcaster::Broadcaster;
use crate::changes::{ChangeDetector, ChangeThresholds};

/// Handle to the running update monitor
pub type MonitorHandle = TaskHandle;

/// Where the monitor is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Fetching,
    Comparing,
    Broadcasting,
}

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub update_interval: Duration,
    pub thresholds: ChangeThresholds,
}

impl MonitorConfig {
    pub fn from_feed(config: &FeedConfig) -> Self {
        Self {
            update_interval: config.update_interval(),
            thresholds: ChangeThresholds::from_feed(config),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_feed(&FeedConfig::default())
    }
}

/// Drives change detection against the cached aggregate
pub struct UpdateMonitor {
    config: MonitorConfig,
    aggregator: Arc<AssetAggregator>,
    broadcaster: Arc<Broadcaster>,
    detector: Mutex<ChangeDetector>,
    state: RwLock<CycleState>,
    cycles: AtomicU64,
    failed_cycles: AtomicU64,
    events_emitted: AtomicU64,
}

impl UpdateMonitor {
    pub fn new(
        config: MonitorConfig,
        aggregator: Arc<AssetAggregator>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        let detector = ChangeDetector::new(config.thresholds);

        Self {
            config,
            aggregator,
            broadcaster,
            detector: Mutex::new(detector),
            state: RwLock::new(CycleState::Idle),
            cycles: AtomicU64::new(0),
            failed_cycles: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
        }
    }

    /// Start the periodic loop
    pub fn start(self: &Arc<Self>) -> MonitorHandle {
        let monitor = Arc::clone(self);

        spawn_periodic("update monitor", self.config.update_interval, move || {
            let monitor = Arc::clone(&monitor);
            async move {
                monitor.run_cycle().await;
            }
        })
    }

    /// One fetch, compare, broadcast pass, returns the number of events
    pub async fn run_cycle(&self) -> usize {
        let start = Instant::now();
        self.cycles.fetch_add(1, Ordering::Relaxed);

        self.set_state(CycleState::Fetching);
        let aggregator = Arc::clone(&self.aggregator);
        let current = match tokio::spawn(async move { aggregator.get_aggregate().await }).await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                self.failed_cycles.fetch_add(1, Ordering::Relaxed);
                error!("Update fetch failed: {}", e);
                self.set_state(CycleState::Idle);
                return 0;
            }
        };

        self.set_state(CycleState::Comparing);
        let events = self.detector.lock().detect(current);

        if events.is_empty() {
            debug!("Update cycle completed in {:?}, no changes", start.elapsed());
            self.set_state(CycleState::Idle);
            return 0;
        }

        self.set_state(CycleState::Broadcasting);
        let count = events.len();
        let delivered = self.broadcaster.broadcast(events);
        self.events_emitted
            .fetch_add(count as u64, Ordering::Relaxed);
        info!(
            "Broadcast {} changes to {} subscribers in {:?}",
            count,
            delivered,
            start.elapsed()
        );

        self.set_state(CycleState::Idle);
        count
    }

    pub fn state(&self) -> CycleState {
        *self.state.read()
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            subscribers: self.broadcaster.subscriber_count(),
        }
    }

    fn set_state(&self, state: CycleState) {
        *self.state.write() = state;
    }
}

/// Monitor statistics
#[derive(Debug, Clone)]
pub struct MonitorStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub events_emitted: u64,
    pub subscribers: usize,
}
