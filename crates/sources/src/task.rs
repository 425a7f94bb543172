//! Periodic background tasks with cooperative shutdown

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Shortest period a task will run at
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Run `tick` every `period` until the returned handle is stopped
///
/// The first tick fires immediately. Each tick runs in its own task, so a
/// panicking tick is logged and the loop keeps going. Periods under a
/// millisecond are raised to one.
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if period < MIN_PERIOD {
        warn!("{} period {:?} is too short, using {:?}", name, period, MIN_PERIOD);
    }
    let period = period.max(MIN_PERIOD);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    let handle = tokio::spawn(async move {
        info!("Starting {} task every {:?}", name, period);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = tokio::spawn(tick()).await {
                        error!("{} tick failed: {}", name, e);
                    }
                }
                _ = &mut shutdown_rx => {
                    info!("{} task stopped", name);
                    break;
                }
            }
        }
    });

    TaskHandle {
        name,
        shutdown: Some(shutdown_tx),
        handle,
    }
}

/// Cancellable handle to a periodic task
pub struct TaskHandle {
    name: &'static str,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stop after the in-flight tick, if any, completes
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.handle.await {
            error!("{} task ended abnormally: {}", self.name, e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
