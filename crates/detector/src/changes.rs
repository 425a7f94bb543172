//! Snapshot diffing
//!
//! Compares each aggregate against the one seen on the previous cycle and
//! classifies what changed per token.

use rayon::prelude::*;
use std::sync::Arc;

use tokenagg_core::{now_ms, Aggregate, AggregatedRecord, ChangeEvent, ChangeKind, FeedConfig};

/// Change detection thresholds, in percent
#[derive(Debug, Clone, Copy)]
pub struct ChangeThresholds {
    /// Absolute price move that counts as an update
    pub price_change_pct: f64,
    /// Volume increase that counts as a spike
    pub volume_spike_pct: f64,
}

impl ChangeThresholds {
    pub fn from_feed(config: &FeedConfig) -> Self {
        Self {
            price_change_pct: config.price_change_threshold_pct,
            volume_spike_pct: config.volume_spike_threshold_pct,
        }
    }
}

impl Default for ChangeThresholds {
    fn default() -> Self {
        Self {
            price_change_pct: 1.0,
            volume_spike_pct: 50.0,
        }
    }
}

/// Stateful differ holding the previous snapshot
#[derive(Debug, Default)]
pub struct ChangeDetector {
    thresholds: ChangeThresholds,
    previous: Option<Arc<Aggregate>>,
}

impl ChangeDetector {
    pub fn new(thresholds: ChangeThresholds) -> Self {
        Self {
            thresholds,
            previous: None,
        }
    }

    pub fn thresholds(&self) -> ChangeThresholds {
        self.thresholds
    }

    /// Whether a snapshot has been retained yet
    pub fn has_baseline(&self) -> bool {
        self.previous.is_some()
    }

    pub fn detect(&mut self, current: Arc<Aggregate>) -> Vec<ChangeEvent> {
        self.detect_at(current, now_ms())
    }

    /// Diff against the previous snapshot, then retain `current`
    ///
    /// Empty snapshots are skipped so a failed refresh does not turn every
    /// token into a new one on the following cycle.
    pub fn detect_at(&mut self, current: Arc<Aggregate>, timestamp: u64) -> Vec<ChangeEvent> {
        if current.is_empty() {
            return Vec::new();
        }

        let previous = self.previous.as_deref();
        let thresholds = self.thresholds;
        let events: Vec<ChangeEvent> = current
            .records()
            .par_iter()
            .flat_map_iter(|record| {
                classify(&thresholds, previous, record)
                    .into_iter()
                    .map(move |kind| ChangeEvent::new(kind, record.clone(), timestamp))
            })
            .collect();

        self.previous = Some(current);
        events
    }
}

fn classify(
    thresholds: &ChangeThresholds,
    previous: Option<&Aggregate>,
    current: &AggregatedRecord,
) -> Vec<ChangeKind> {
    let Some(prev) = previous.and_then(|p| p.get(current.address())) else {
        return vec![ChangeKind::NewAsset];
    };

    let mut kinds = Vec::new();

    if let Some(change) = percent_change(prev.token.price_sol, current.token.price_sol) {
        if change.abs() > thresholds.price_change_pct {
            kinds.push(ChangeKind::PriceUpdate);
        }
    }
    if let Some(change) = percent_change(prev.token.volume_sol, current.token.volume_sol) {
        if change > thresholds.volume_spike_pct {
            kinds.push(ChangeKind::VolumeSpike);
        }
    }

    kinds
}

/// Relative change in percent, undefined from a zero base
fn percent_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous * 100.0)
}
