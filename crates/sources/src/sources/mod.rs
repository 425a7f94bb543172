//! Upstream source adapters
//!
//! Each adapter decodes its provider's payload into a typed intermediate
//! schema and normalizes it into [`AssetRecord`]s denominated in SOL.
//! Adapters never fail: errors are logged and yield no records, so one bad
//! source cannot abort an aggregation.

pub mod dexscreener;
pub mod geckoterminal;
pub mod jupiter;

use async_trait::async_trait;

use tokenagg_core::{AssetRecord, SourceTag, UNKNOWN_PROTOCOL};

pub use dexscreener::DexScreenerAdapter;
pub use geckoterminal::GeckoTerminalAdapter;
pub use jupiter::JupiterAdapter;

/// What a refresh asks the sources for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchScope {
    /// Target chain, records from other chains are dropped
    pub chain: String,
    pub search_query: String,
    pub page: u32,
    /// Tokens already known from the previous aggregate, priced by the oracle
    pub identities: Vec<String>,
}

impl FetchScope {
    pub fn new(chain: impl Into<String>, search_query: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            search_query: search_query.into(),
            page: 1,
            identities: Vec::new(),
        }
    }

    pub fn with_identities(mut self, identities: Vec<String>) -> Self {
        self.identities = identities;
        self
    }
}

/// Base trait for upstream sources
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceTag;

    /// Only prices tokens a listing source reported in the same refresh
    fn enriches_only(&self) -> bool {
        false
    }

    /// Fetch and normalize, empty on any failure
    async fn fetch_assets(&self, scope: &FetchScope) -> Vec<AssetRecord>;
}

/// Divide a SOL-quoted amount, substituting 1 for a missing reference price
pub(crate) fn per_reference(amount: f64, reference_price: f64) -> f64 {
    let divisor = if reference_price > 0.0 { reference_price } else { 1.0 };
    amount / divisor
}

pub(crate) fn amount(value: Option<f64>) -> f64 {
    value.unwrap_or(0.0).max(0.0)
}

pub(crate) fn protocol_label(label: Option<String>) -> String {
    match label {
        Some(label) if !label.trim().is_empty() => label,
        _ => UNKNOWN_PROTOCOL.to_string(),
    }
}

/// Serde helpers for upstream numbers sent as JSON numbers or numeric strings
pub(crate) mod lenient {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Float(f64),
        Text(String),
        Other(IgnoredAny),
    }

    pub fn f64_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let parsed = Option::<Number>::deserialize(d)?.and_then(|n| match n {
            Number::Float(v) => Some(v),
            Number::Text(s) => s.trim().parse::<f64>().ok(),
            Number::Other(_) => None,
        });

        Ok(parsed.filter(|v| v.is_finite()))
    }

    pub fn u64_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Ok(f64_opt(d)?.filter(|v| *v >= 0.0).map(|v| v as u64))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "lenient::f64_opt")]
        value: Option<f64>,
        #[serde(default, deserialize_with = "lenient::u64_opt")]
        count: Option<u64>,
    }

    fn parse(json: &str) -> Sample {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(parse(r#"{"value": "1.25"}"#).value, Some(1.25));
        assert_eq!(parse(r#"{"value": 3}"#).value, Some(3.0));
        assert_eq!(parse(r#"{"value": null}"#).value, None);
        assert_eq!(parse(r#"{"value": "n/a"}"#).value, None);
        assert_eq!(parse(r#"{"value": {"nested": 1}}"#).value, None);
        assert_eq!(parse(r#"{}"#).value, None);
        assert_eq!(parse(r#"{"count": "12"}"#).count, Some(12));
        assert_eq!(parse(r#"{"count": -4}"#).count, None);
    }

    #[test]
    fn test_per_reference_guards_zero() {
        assert_eq!(per_reference(50.0, 0.0), 50.0);
        assert_eq!(per_reference(50.0, 25.0), 2.0);
    }

    #[test]
    fn test_protocol_label() {
        assert_eq!(protocol_label(Some("raydium".into())), "raydium");
        assert_eq!(protocol_label(Some("  ".into())), UNKNOWN_PROTOCOL);
        assert_eq!(protocol_label(None), UNKNOWN_PROTOCOL);
    }
}
