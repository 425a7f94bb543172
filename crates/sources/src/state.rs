//! In-memory index over the latest aggregate
//!
//! Readers take an `Arc` snapshot; a refresh swaps the whole snapshot at once
//! so nobody observes a half-updated aggregate.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokenagg_core::{Aggregate, AggregatedRecord};

/// Single-owner holder of the current aggregate
#[derive(Debug)]
pub struct AssetIndex {
    current: RwLock<Arc<Aggregate>>,
    replace_count: AtomicU64,
    last_replaced: RwLock<Option<Instant>>,
}

impl AssetIndex {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Aggregate::new())),
            replace_count: AtomicU64::new(0),
            last_replaced: RwLock::new(None),
        }
    }

    /// Swap in a new aggregate wholesale
    pub fn replace(&self, aggregate: Arc<Aggregate>) {
        *self.current.write() = aggregate;
        self.replace_count.fetch_add(1, Ordering::Relaxed);
        *self.last_replaced.write() = Some(Instant::now());
    }

    pub fn snapshot(&self) -> Arc<Aggregate> {
        self.current.read().clone()
    }

    pub fn get(&self, address: &str) -> Option<AggregatedRecord> {
        self.current.read().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Identities in aggregate order
    pub fn identities(&self) -> Vec<String> {
        self.current
            .read()
            .addresses()
            .map(str::to_string)
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            token_count: self.len(),
            replace_count: self.replace_count.load(Ordering::Relaxed),
            last_replaced_age: self.last_replaced.read().map(|at| at.elapsed()),
        }
    }
}

impl Default for AssetIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the index
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub token_count: usize,
    pub replace_count: u64,
    pub last_replaced_age: Option<Duration>,
}
