//! Upstream ingestion and the cached aggregate
//!
//! Features:
//! - Retrying HTTP fetch layer with backoff, jitter and rate-limit signaling
//! - One adapter per upstream provider, normalizing into canonical records
//! - Deterministic merge of duplicate records across sources
//! - Read-through durable cache (Redis or in-memory) with TTL
//! - Wholesale-replaced in-memory index for point lookups
//! - Cancellable periodic background tasks

pub mod http;
pub mod sources;
pub mod merge;
pub mod cache;
pub mod state;
pub mod aggregator;
pub mod task;

pub use aggregator::{AggregatorConfig, AggregatorStats, AssetAggregator, RefreshHandle};
pub use cache::{DurableCache, MemoryCache, RedisCache};
pub use http::{Fetch, RetryingFetcher};
pub use merge::{absorb, merge, merge_at};
pub use sources::{DexScreenerAdapter, FetchScope, GeckoTerminalAdapter, JupiterAdapter, SourceAdapter};
pub use state::{AssetIndex, IndexStats};
pub use task::{spawn_periodic, TaskHandle};
