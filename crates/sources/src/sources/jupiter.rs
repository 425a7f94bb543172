//! Jupiter price oracle adapter
//!
//! Only prices tokens it is asked about. Quotes are requested directly in the
//! reference unit, so no conversion is needed.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use tokenagg_core::{now_ms, AssetRecord, FetchError, FetchResult, SourceTag};

use super::{amount, lenient, FetchScope, SourceAdapter};
use crate::http::Fetch;

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: Option<HashMap<String, Option<Quote>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Quote {
    mint_symbol: Option<String>,
    vs_token_symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    price: Option<f64>,
}

/// Price-oracle source
pub struct JupiterAdapter {
    fetcher: Arc<dyn Fetch>,
    reference_symbol: String,
    max_ids: usize,
}

impl JupiterAdapter {
    pub fn new(fetcher: Arc<dyn Fetch>, reference_symbol: impl Into<String>, max_ids: usize) -> Self {
        Self {
            fetcher,
            reference_symbol: reference_symbol.into(),
            max_ids: max_ids.max(1),
        }
    }

    async fn try_fetch(&self, scope: &FetchScope) -> FetchResult<Vec<AssetRecord>> {
        let ids: Vec<&str> = scope
            .identities
            .iter()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
            .take(self.max_ids)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let raw = self
            .fetcher
            .get_json(
                "/v4/price",
                &[
                    ("ids", ids.join(",")),
                    ("vsToken", self.reference_symbol.clone()),
                ],
            )
            .await?;

        let response: PriceResponse = serde_json::from_value(raw)
            .map_err(|e| FetchError::Permanent(format!("malformed jupiter payload: {e}")))?;
        let mut quotes = response.data.unwrap_or_default();

        // Walk the request order, the response map is unordered
        let now = now_ms();
        let records = ids
            .into_iter()
            .filter_map(|id| {
                let quote = quotes.remove(id).flatten()?;
                self.normalize_quote(id, quote, now)
            })
            .collect();

        Ok(records)
    }

    fn normalize_quote(&self, id: &str, quote: Quote, now: u64) -> Option<AssetRecord> {
        let quoted_in_reference = quote
            .vs_token_symbol
            .as_deref()
            .map_or(true, |s| s.eq_ignore_ascii_case(&self.reference_symbol));
        if !quoted_in_reference {
            return None;
        }

        let mut record = AssetRecord::new(id, SourceTag::Jupiter);
        record.token_ticker = quote.mint_symbol.unwrap_or_default();
        record.price_sol = amount(quote.price);
        record.last_updated_ms = now;
        Some(record)
    }
}

#[async_trait]
impl SourceAdapter for JupiterAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::Jupiter
    }

    fn enriches_only(&self) -> bool {
        true
    }

    async fn fetch_assets(&self, scope: &FetchScope) -> Vec<AssetRecord> {
        match self.try_fetch(scope).await {
            Ok(records) => {
                debug!(
                    "Jupiter priced {} of {} requested tokens",
                    records.len(),
                    scope.identities.len().min(self.max_ids)
                );
                records
            }
            Err(e) => {
                error!("Jupiter price fetch failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::StubFetcher;
    use serde_json::json;
    use tokenagg_core::UNKNOWN_PROTOCOL;

    fn scope(ids: &[&str]) -> FetchScope {
        FetchScope::new("solana", "SOL").with_identities(ids.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_prices_in_request_order() {
        let fetcher = Arc::new(StubFetcher::ok(json!({
            "data": {
                "b": {"id": "b", "mintSymbol": "BBB", "vsTokenSymbol": "SOL", "price": 0.2},
                "a": {"id": "a", "mintSymbol": "AAA", "vsTokenSymbol": "SOL", "price": "1.5"},
                "c": null
            },
            "timeTaken": 0.01
        })));
        let adapter = JupiterAdapter::new(fetcher.clone(), "SOL", 100);
        let records = adapter.fetch_assets(&scope(&["a", "b", "c"])).await;

        let addresses: Vec<_> = records.iter().map(|r| r.token_address.as_str()).collect();
        assert_eq!(addresses, vec!["a", "b"]);
        assert_eq!(records[0].price_sol, 1.5);
        assert_eq!(records[0].token_ticker, "AAA");
        assert_eq!(records[0].volume_sol, 0.0);
        assert_eq!(records[0].protocol, UNKNOWN_PROTOCOL);
        assert_eq!(records[0].source, SourceTag::Jupiter);

        assert_eq!(fetcher.param(0, "ids").as_deref(), Some("a,b,c"));
        assert_eq!(fetcher.param(0, "vsToken").as_deref(), Some("SOL"));
    }

    #[tokio::test]
    async fn test_drops_quotes_in_other_units() {
        let adapter = JupiterAdapter::new(
            Arc::new(StubFetcher::ok(json!({
                "data": {"a": {"mintSymbol": "AAA", "vsTokenSymbol": "USDC", "price": 3.0}}
            }))),
            "SOL",
            100,
        );
        assert!(adapter.fetch_assets(&scope(&["a"])).await.is_empty());
    }

    #[test]
    fn test_is_enrichment_source() {
        let adapter = JupiterAdapter::new(Arc::new(StubFetcher::ok(json!({}))), "SOL", 100);
        assert!(adapter.enriches_only());
    }

    #[tokio::test]
    async fn test_skips_request_without_identities() {
        let fetcher = Arc::new(StubFetcher::ok(json!({"data": {}})));
        let adapter = JupiterAdapter::new(fetcher.clone(), "SOL", 100);

        assert!(adapter.fetch_assets(&scope(&[])).await.is_empty());
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_caps_identities() {
        let fetcher = Arc::new(StubFetcher::ok(json!({"data": {}})));
        let adapter = JupiterAdapter::new(fetcher.clone(), "SOL", 2);
        adapter.fetch_assets(&scope(&["a", "b", "c"])).await;

        assert_eq!(fetcher.param(0, "ids").as_deref(), Some("a,b"));
    }

    #[tokio::test]
    async fn test_failures_yield_no_records() {
        let adapter = JupiterAdapter::new(
            Arc::new(StubFetcher::failing(FetchError::Permanent("400".into()))),
            "SOL",
            100,
        );
        assert!(adapter.fetch_assets(&scope(&["a"])).await.is_empty());
    }
}
