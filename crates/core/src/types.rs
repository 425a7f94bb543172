//! Core type definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream data providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    DexScreener,
    GeckoTerminal,
    Jupiter,
}

impl SourceTag {
    pub fn name(&self) -> &'static str {
        match self {
            SourceTag::DexScreener => "dexscreener",
            SourceTag::GeckoTerminal => "geckoterminal",
            SourceTag::Jupiter => "jupiter",
        }
    }

    /// Base URL of the public API behind this source
    pub fn default_base_url(&self) -> &'static str {
        match self {
            SourceTag::DexScreener => "https://api.dexscreener.com",
            SourceTag::GeckoTerminal => "https://api.geckoterminal.com/api/v2",
            SourceTag::Jupiter => "https://price.jup.ag",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Venue label used when a source does not report one
pub const UNKNOWN_PROTOCOL: &str = "Unknown";

/// Canonical per-source token record
///
/// Amounts are denominated in SOL. Everything except the change
/// percentages is non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub token_address: String,
    pub token_name: String,
    pub token_ticker: String,
    pub price_sol: f64,
    pub market_cap_sol: f64,
    pub volume_sol: f64,
    pub liquidity_sol: f64,
    pub transaction_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_1h_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_24h_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_7d_change: Option<f64>,
    pub protocol: String,
    pub source: SourceTag,
    pub last_updated_ms: u64,
}

impl AssetRecord {
    /// Empty record for `token_address`, stamped with `source` and the current time
    pub fn new(token_address: impl Into<String>, source: SourceTag) -> Self {
        Self {
            token_address: token_address.into(),
            token_name: String::new(),
            token_ticker: String::new(),
            price_sol: 0.0,
            market_cap_sol: 0.0,
            volume_sol: 0.0,
            liquidity_sol: 0.0,
            transaction_count: 0,
            price_1h_change: None,
            price_24h_change: None,
            price_7d_change: None,
            protocol: UNKNOWN_PROTOCOL.to_string(),
            source,
            last_updated_ms: now_ms(),
        }
    }
}

/// A token reconciled across every source that reported it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    #[serde(flatten)]
    pub token: AssetRecord,
    /// Contributing sources in first-seen order, never empty, no duplicates
    pub sources: Vec<SourceTag>,
    pub aggregated_at_ms: u64,
}

impl AggregatedRecord {
    pub fn from_record(token: AssetRecord, aggregated_at_ms: u64) -> Self {
        let sources = vec![token.source];
        Self {
            token,
            sources,
            aggregated_at_ms,
        }
    }

    pub fn address(&self) -> &str {
        &self.token.token_address
    }

    pub fn has_source(&self, source: SourceTag) -> bool {
        self.sources.contains(&source)
    }
}

/// Current unix time in milliseconds
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
