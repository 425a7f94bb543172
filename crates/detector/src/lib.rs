//! Query and live-update engine over the aggregate
//!
//! Features:
//! - Filter, sort and cursor pagination of token listings
//! - Per-token change classification between consecutive snapshots
//! - Non-blocking fan-out of update batches to subscribed listeners
//! - Periodic diff-and-broadcast monitor

pub mod query;
pub mod changes;
pub mod broadcaster;
pub mod monitor;

pub use query::query;
pub use changes::{ChangeDetector, ChangeThresholds};
pub use broadcaster::{BroadcastStats, Broadcaster, Listener, ListenerId};
pub use monitor::{CycleState, MonitorConfig, MonitorHandle, MonitorStats, UpdateMonitor};
