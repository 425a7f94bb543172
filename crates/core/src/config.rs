//! Configuration types
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file by the binary). Unset variables fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{CoreError, CoreResult, SourceTag};

/// Fixed durable cache key holding the current aggregate
pub const AGGREGATE_CACHE_KEY: &str = "tokens:aggregated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

/// Durable cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub ttl_secs: u64,
    pub redis_url: String,
    pub key: String,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Redis,
            ttl_secs: 30,
            redis_url: "redis://localhost:6379".to_string(),
            key: AGGREGATE_CACHE_KEY.to_string(),
        }
    }
}

/// Retry policy for upstream requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
    pub timeout_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_jitter_ms: 1000,
            timeout_ms: 10_000,
        }
    }
}

/// Upstream source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub chain: String,
    pub search_query: String,
    pub gecko_page: u32,
    /// SOL price used to convert the pool index's USD figures
    pub sol_price_usd: f64,
    pub reference_symbol: String,
    /// Jupiter accepts a bounded id list per request
    pub max_oracle_ids: usize,
    pub dexscreener_url: String,
    pub geckoterminal_url: String,
    pub jupiter_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            chain: "solana".to_string(),
            search_query: "SOL".to_string(),
            gecko_page: 1,
            sol_price_usd: 100.0,
            reference_symbol: "SOL".to_string(),
            max_oracle_ids: 100,
            dexscreener_url: SourceTag::DexScreener.default_base_url().to_string(),
            geckoterminal_url: SourceTag::GeckoTerminal.default_base_url().to_string(),
            jupiter_url: SourceTag::Jupiter.default_base_url().to_string(),
        }
    }
}

/// Live feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub update_interval_ms: u64,
    pub snapshot_size: usize,
    pub price_change_threshold_pct: f64,
    pub volume_spike_threshold_pct: f64,
    pub listener_buffer: usize,
}

impl FeedConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 5000,
            snapshot_size: crate::INITIAL_SNAPSHOT_SIZE,
            price_change_threshold_pct: 1.0,
            volume_spike_threshold_pct: 50.0,
            listener_buffer: 256,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub sources: SourcesConfig,
    pub feed: FeedConfig,
    pub refresh_interval_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            sources: SourcesConfig::default(),
            feed: FeedConfig::default(),
            refresh_interval_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Load from the process environment
    pub fn from_env() -> CoreResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .map_err(|e| CoreError::InvalidConfig(e.to_string()))?;

        Self::from_settings(settings)
    }

    /// Load from already collected settings, keys are lowercase env names
    pub fn from_settings(settings: config::Config) -> CoreResult<Self> {
        let env: EnvSettings = settings
            .try_deserialize()
            .map_err(|e| CoreError::InvalidConfig(e.to_string()))?;

        env.into_config()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Flat view of the environment variables we read
#[derive(Debug, Deserialize)]
#[serde(default)]
struct EnvSettings {
    cache_ttl: u64,
    cache_enabled: bool,
    cache_backend: String,
    redis_url: String,
    redis_host: String,
    redis_port: u16,
    redis_password: String,
    retry_max_attempts: u32,
    retry_base_delay: u64,
    retry_max_jitter: u64,
    request_timeout: u64,
    ws_update_interval: u64,
    refresh_interval: u64,
    source_chain: String,
    search_query: String,
    sol_price_usd: f64,
}

impl Default for EnvSettings {
    fn default() -> Self {
        let cache = CacheConfig::default();
        let retry = RetryConfig::default();
        let sources = SourcesConfig::default();

        Self {
            cache_ttl: cache.ttl_secs,
            cache_enabled: cache.enabled,
            cache_backend: "redis".to_string(),
            redis_url: String::new(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: String::new(),
            retry_max_attempts: retry.max_attempts,
            retry_base_delay: retry.base_delay_ms,
            retry_max_jitter: retry.max_jitter_ms,
            request_timeout: retry.timeout_ms,
            ws_update_interval: FeedConfig::default().update_interval_ms,
            refresh_interval: ServiceConfig::default().refresh_interval_secs,
            source_chain: sources.chain,
            search_query: sources.search_query,
            sol_price_usd: sources.sol_price_usd,
        }
    }
}

impl EnvSettings {
    fn into_config(self) -> CoreResult<ServiceConfig> {
        if self.retry_max_attempts == 0 {
            return Err(CoreError::InvalidConfig(
                "RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.ws_update_interval == 0 || self.refresh_interval == 0 {
            return Err(CoreError::InvalidConfig(
                "update intervals must be non-zero".to_string(),
            ));
        }
        if !self.sol_price_usd.is_finite() || self.sol_price_usd < 0.0 {
            return Err(CoreError::InvalidConfig(format!(
                "SOL_PRICE_USD must be a non-negative number, got {}",
                self.sol_price_usd
            )));
        }

        let backend = match self.cache_backend.to_lowercase().as_str() {
            "redis" => CacheBackend::Redis,
            "memory" => CacheBackend::Memory,
            other => {
                return Err(CoreError::InvalidConfig(format!(
                    "unknown CACHE_BACKEND {other:?}"
                )))
            }
        };

        let redis_url = match self.redis_url.trim() {
            "" if self.redis_password.is_empty() => {
                format!("redis://{}:{}", self.redis_host, self.redis_port)
            }
            "" => format!(
                "redis://:{}@{}:{}",
                self.redis_password, self.redis_host, self.redis_port
            ),
            url => url.to_string(),
        };

        Ok(ServiceConfig {
            cache: CacheConfig {
                enabled: self.cache_enabled,
                backend,
                ttl_secs: self.cache_ttl,
                redis_url,
                key: AGGREGATE_CACHE_KEY.to_string(),
            },
            retry: RetryConfig {
                max_attempts: self.retry_max_attempts,
                base_delay_ms: self.retry_base_delay,
                max_jitter_ms: self.retry_max_jitter,
                timeout_ms: self.request_timeout,
            },
            sources: SourcesConfig {
                chain: self.source_chain,
                search_query: self.search_query,
                sol_price_usd: self.sol_price_usd,
                ..SourcesConfig::default()
            },
            feed: FeedConfig {
                update_interval_ms: self.ws_update_interval,
                ..FeedConfig::default()
            },
            refresh_interval_secs: self.refresh_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(overrides: &[(&str, &str)]) -> config::Config {
        let mut builder = config::Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_settings(settings(&[])).unwrap();

        assert_eq!(config.cache.ttl_secs, 30);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.key, AGGREGATE_CACHE_KEY);
        assert_eq!(config.cache.redis_url, "redis://localhost:6379");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(1000));
        assert_eq!(config.retry.timeout(), Duration::from_secs(10));
        assert_eq!(config.feed.update_interval(), Duration::from_millis(5000));
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.sources.chain, "solana");
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_settings(settings(&[
            ("cache_ttl", "60"),
            ("cache_enabled", "false"),
            ("cache_backend", "memory"),
            ("retry_max_attempts", "5"),
            ("retry_base_delay", "250"),
            ("ws_update_interval", "2000"),
            ("redis_url", "rediss://cache.internal:6380"),
        ]))
        .unwrap();

        assert_eq!(config.cache.ttl_secs, 60);
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.redis_url, "rediss://cache.internal:6380");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.feed.update_interval_ms, 2000);
    }

    #[test]
    fn test_redis_credentials_fallback() {
        let config = ServiceConfig::from_settings(settings(&[
            ("redis_host", "cache"),
            ("redis_port", "6390"),
            ("redis_password", "s3cret"),
        ]))
        .unwrap();

        assert_eq!(config.cache.redis_url, "redis://:s3cret@cache:6390");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(ServiceConfig::from_settings(settings(&[("retry_max_attempts", "0")])).is_err());
        assert!(ServiceConfig::from_settings(settings(&[("cache_backend", "sled")])).is_err());
        assert!(ServiceConfig::from_settings(settings(&[("cache_ttl", "soon")])).is_err());
    }
}
