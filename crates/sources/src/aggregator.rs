//! Cached aggregation across all sources
//!
//! Read-through over the durable cache: a hit is served as-is, a miss fans
//! out to every source concurrently, merges, writes back and swaps the
//! in-memory index.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use tokenagg_core::{Aggregate, AggregatedRecord, AssetRecord, ServiceConfig, AGGREGATE_CACHE_KEY};

use crate::cache::DurableCache;
use crate::merge::merge;
use crate::sources::{FetchScope, SourceAdapter};
use crate::state::AssetIndex;
use crate::task::{spawn_periodic, TaskHandle};

/// Handle to the scheduled refresh loop
pub type RefreshHandle = TaskHandle;

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub cache_key: String,
    pub cache_ttl: Duration,
    pub chain: String,
    pub search_query: String,
    pub page: u32,
}

impl AggregatorConfig {
    pub fn from_service(config: &ServiceConfig) -> Self {
        Self {
            cache_key: config.cache.key.clone(),
            cache_ttl: config.cache.ttl(),
            chain: config.sources.chain.clone(),
            search_query: config.sources.search_query.clone(),
            page: config.sources.gecko_page,
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            cache_key: AGGREGATE_CACHE_KEY.to_string(),
            cache_ttl: Duration::from_secs(30),
            chain: "solana".to_string(),
            search_query: "SOL".to_string(),
            page: 1,
        }
    }
}

/// Cache layer in front of the sources
pub struct AssetAggregator {
    config: AggregatorConfig,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    cache: Option<Arc<dyn DurableCache>>,
    index: Arc<AssetIndex>,
    cache_hits: AtomicU64,
    recomputes: AtomicU64,
}

impl AssetAggregator {
    /// `cache: None` disables the durable cache, every call recomputes
    pub fn new(
        config: AggregatorConfig,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        cache: Option<Arc<dyn DurableCache>>,
    ) -> Self {
        Self {
            config,
            adapters,
            cache,
            index: Arc::new(AssetIndex::new()),
            cache_hits: AtomicU64::new(0),
            recomputes: AtomicU64::new(0),
        }
    }

    /// Get shared index reference
    pub fn index(&self) -> Arc<AssetIndex> {
        Arc::clone(&self.index)
    }

    /// Current aggregate, from cache when possible
    pub async fn get_aggregate(&self) -> Arc<Aggregate> {
        if let Some(cached) = self.read_cache().await {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Returning cached aggregate ({} tokens)", cached.len());
            self.index.replace(Arc::clone(&cached));
            return cached;
        }

        self.recompute().await
    }

    /// Drop the cached aggregate so the next read recomputes
    pub async fn invalidate(&self) {
        let Some(cache) = &self.cache else { return };

        if let Err(e) = cache.delete(&self.config.cache_key).await {
            warn!("Cache invalidation failed: {}", e);
        }
    }

    /// Invalidate and recompute, returns the number of tokens
    pub async fn refresh(&self) -> usize {
        self.invalidate().await;
        self.get_aggregate().await.len()
    }

    /// Point lookup against the in-memory index, never triggers a fetch
    pub fn get_by_identity(&self, address: &str) -> Option<AggregatedRecord> {
        self.index.get(address)
    }

    pub fn cached_tokens(&self) -> Vec<AggregatedRecord> {
        self.index.snapshot().records().to_vec()
    }

    /// Spawn the periodic refresh loop, the first tick fires immediately
    pub fn start_refresh(self: &Arc<Self>, period: Duration) -> RefreshHandle {
        let aggregator = Arc::clone(self);

        spawn_periodic("refresh", period, move || {
            let aggregator = Arc::clone(&aggregator);
            async move {
                let aggregate = aggregator.get_aggregate().await;
                debug!("Scheduled refresh: {} tokens", aggregate.len());
            }
        })
    }

    pub fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            source_count: self.adapters.len(),
            cache_enabled: self.cache.is_some(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            recomputes: self.recomputes.load(Ordering::Relaxed),
            token_count: self.index.len(),
        }
    }

    async fn read_cache(&self) -> Option<Arc<Aggregate>> {
        let cache = self.cache.as_ref()?;

        match cache.get(&self.config.cache_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Aggregate>(&raw) {
                Ok(aggregate) if !aggregate.is_empty() => Some(Arc::new(aggregate)),
                Ok(_) => None,
                Err(e) => {
                    warn!("Discarding undecodable cached aggregate: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("{} cache read failed, recomputing: {}", cache.name(), e);
                None
            }
        }
    }

    async fn recompute(&self) -> Arc<Aggregate> {
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        let scope = FetchScope {
            chain: self.config.chain.clone(),
            search_query: self.config.search_query.clone(),
            page: self.config.page,
            identities: self.index.identities(),
        };

        info!("Fetching tokens from {} sources", self.adapters.len());
        let batches = join_all(self.adapters.iter().map(|a| a.fetch_assets(&scope))).await;

        for (adapter, batch) in self.adapters.iter().zip(&batches) {
            info!("Fetched {} tokens from {}", batch.len(), adapter.source());
        }

        let aggregate = Arc::new(merge(self.listed_records(batches)));
        if aggregate.is_empty() {
            warn!("Every source came back empty, keeping the previous index");
            return aggregate;
        }

        self.write_cache(&aggregate).await;
        self.index.replace(Arc::clone(&aggregate));
        info!("Aggregation complete: {} tokens", aggregate.len());

        aggregate
    }

    /// Flatten batches in adapter order, dropping enrichment records for
    /// tokens no listing source reported this refresh
    fn listed_records(&self, batches: Vec<Vec<AssetRecord>>) -> Vec<AssetRecord> {
        let listed: HashSet<String> = self
            .adapters
            .iter()
            .zip(&batches)
            .filter(|(adapter, _)| !adapter.enriches_only())
            .flat_map(|(_, batch)| batch.iter().map(|r| r.token_address.clone()))
            .collect();

        let mut dropped = 0;
        let records: Vec<AssetRecord> = self
            .adapters
            .iter()
            .zip(batches)
            .flat_map(|(adapter, batch)| {
                let enriches_only = adapter.enriches_only();
                batch.into_iter().map(move |r| (enriches_only, r))
            })
            .filter_map(|(enriches_only, record)| {
                if enriches_only && !listed.contains(&record.token_address) {
                    dropped += 1;
                    None
                } else {
                    Some(record)
                }
            })
            .collect();

        if dropped > 0 {
            debug!("Dropped {} enrichment records without a listing", dropped);
        }
        records
    }

    async fn write_cache(&self, aggregate: &Aggregate) {
        let Some(cache) = &self.cache else { return };

        let raw = match serde_json::to_string(aggregate) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to serialize aggregate: {}", e);
                return;
            }
        };

        if let Err(e) = cache
            .set(&self.config.cache_key, raw, self.config.cache_ttl)
            .await
        {
            warn!("{} cache write failed: {}", cache.name(), e);
        }
    }
}

/// Aggregator statistics
#[derive(Debug, Clone)]
pub struct AggregatorStats {
    pub source_count: usize,
    pub cache_enabled: bool,
    pub cache_hits: u64,
    pub recomputes: u64,
    pub token_count: usize,
}
