//! Token service: composition root and external operations

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use tokenagg_core::{
    now_ms, AggregatedRecord, CacheBackend, CacheConfig, FilterSpec, Page, ServiceConfig,
};
use tokenagg_detector::{query, Broadcaster, Listener, ListenerId, MonitorConfig, UpdateMonitor};
use tokenagg_sources::{
    AggregatorConfig, AssetAggregator, DexScreenerAdapter, DurableCache, Fetch,
    GeckoTerminalAdapter, JupiterAdapter, MemoryCache, RedisCache, RetryingFetcher,
    SourceAdapter, TaskHandle,
};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Health snapshot for liveness checks
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: u64,
    pub uptime_secs: u64,
    pub cached_tokens: usize,
    /// Time since the index was last replaced, if ever
    pub last_refresh_age_ms: Option<u64>,
    pub listeners: usize,
    pub subscribers: usize,
    pub cache_enabled: bool,
}

/// Owns every component and the two background tasks
pub struct TokenService {
    config: ServiceConfig,
    aggregator: Arc<AssetAggregator>,
    broadcaster: Arc<Broadcaster>,
    monitor: Arc<UpdateMonitor>,
    tasks: Mutex<Vec<TaskHandle>>,
    start_time: Instant,
}

impl TokenService {
    /// Wire up the production sources and cache
    ///
    /// An unreachable cache is not fatal, the service then recomputes on
    /// every read.
    pub async fn from_config(config: ServiceConfig) -> anyhow::Result<Self> {
        let sources = &config.sources;

        let dexscreener: Arc<dyn Fetch> = Arc::new(RetryingFetcher::new(
            sources.dexscreener_url.as_str(),
            config.retry.clone(),
        )?);
        let geckoterminal: Arc<dyn Fetch> = Arc::new(RetryingFetcher::new(
            sources.geckoterminal_url.as_str(),
            config.retry.clone(),
        )?);
        let jupiter: Arc<dyn Fetch> = Arc::new(RetryingFetcher::new(
            sources.jupiter_url.as_str(),
            config.retry.clone(),
        )?);

        // Pair search first so its venue labels win on first sight
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(DexScreenerAdapter::new(dexscreener)),
            Arc::new(GeckoTerminalAdapter::new(geckoterminal, sources.sol_price_usd)),
            Arc::new(JupiterAdapter::new(
                jupiter,
                sources.reference_symbol.as_str(),
                sources.max_oracle_ids,
            )),
        ];

        let cache = build_cache(&config.cache).await;

        Ok(Self::new(config, adapters, cache))
    }

    pub fn new(
        config: ServiceConfig,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        cache: Option<Arc<dyn DurableCache>>,
    ) -> Self {
        let aggregator = Arc::new(AssetAggregator::new(
            AggregatorConfig::from_service(&config),
            adapters,
            cache,
        ));
        let broadcaster = Arc::new(Broadcaster::from_feed(&config.feed));
        let monitor = Arc::new(UpdateMonitor::new(
            MonitorConfig::from_feed(&config.feed),
            Arc::clone(&aggregator),
            Arc::clone(&broadcaster),
        ));

        Self {
            config,
            aggregator,
            broadcaster,
            monitor,
            tasks: Mutex::new(Vec::new()),
            start_time: Instant::now(),
        }
    }

    /// Filtered, sorted page of the current aggregate
    pub async fn list_tokens(&self, spec: &FilterSpec) -> Page {
        let aggregate = self.aggregator.get_aggregate().await;
        query(&aggregate, spec)
    }

    pub fn get_token(&self, address: &str) -> Option<AggregatedRecord> {
        self.aggregator.get_by_identity(address)
    }

    /// Force a recompute, returns the number of tokens
    pub async fn refresh(&self) -> usize {
        let count = self.aggregator.refresh().await;
        info!("Manual refresh produced {} tokens", count);
        count
    }

    /// Register a feed listener, it receives the initial snapshot right away
    pub async fn connect(&self) -> Listener {
        let aggregate = self.aggregator.get_aggregate().await;
        self.broadcaster.connect(&aggregate)
    }

    pub fn subscribe(&self, id: &ListenerId) -> bool {
        self.broadcaster.subscribe(id)
    }

    pub fn unsubscribe(&self, id: &ListenerId) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    pub fn disconnect(&self, id: &ListenerId) -> bool {
        self.broadcaster.disconnect(id)
    }

    pub fn health(&self) -> HealthStatus {
        let stats = self.aggregator.stats();
        let index = self.aggregator.index().stats();

        HealthStatus {
            status: "ok",
            timestamp: now_ms(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            cached_tokens: stats.token_count,
            last_refresh_age_ms: index.last_replaced_age.map(|age| age.as_millis() as u64),
            listeners: self.broadcaster.listener_count(),
            subscribers: self.broadcaster.subscriber_count(),
            cache_enabled: stats.cache_enabled,
        }
    }

    /// Start the scheduled refresh and the update monitor
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("Background tasks already running");
            return;
        }

        tasks.push(self.aggregator.start_refresh(self.config.refresh_interval()));
        tasks.push(self.monitor.start());
        info!("Background tasks started");
    }

    pub async fn stop(&self) {
        let tasks: Vec<TaskHandle> = std::mem::take(&mut *self.tasks.lock());

        for task in tasks {
            task.stop().await;
        }

        info!("All services stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }
}

async fn build_cache(config: &CacheConfig) -> Option<Arc<dyn DurableCache>> {
    if !config.enabled {
        info!("Cache disabled, every read recomputes");
        return None;
    }

    match config.backend {
        CacheBackend::Memory => {
            info!("Using in-memory cache (ttl {}s)", config.ttl_secs);
            let cache: Arc<dyn DurableCache> = Arc::new(MemoryCache::new());
            Some(cache)
        }
        CacheBackend::Redis => {
            let connect = RedisCache::connect(&config.redis_url);
            match tokio::time::timeout(REDIS_CONNECT_TIMEOUT, connect).await {
                Ok(Ok(cache)) => {
                    let cache: Arc<dyn DurableCache> = Arc::new(cache);
                    Some(cache)
                }
                Ok(Err(e)) => {
                    warn!("Redis unavailable, continuing without cache: {}", e);
                    None
                }
                Err(_) => {
                    warn!(
                        "Redis connect timed out after {:?}, continuing without cache",
                        REDIS_CONNECT_TIMEOUT
                    );
                    None
                }
            }
        }
    }
}
