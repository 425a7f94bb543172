//! GeckoTerminal network token index adapter

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

use tokenagg_core::{now_ms, AssetRecord, FetchError, FetchResult, SourceTag};

use super::{amount, lenient, per_reference, FetchScope, SourceAdapter};
use crate::http::Fetch;

const PROTOCOL: &str = "GeckoTerminal";

#[derive(Debug, Deserialize)]
struct TokensResponse {
    data: Option<Vec<GeckoToken>>,
}

/// JSON:API resource, `id` is `<network>_<address>`
#[derive(Debug, Deserialize)]
struct GeckoToken {
    id: Option<String>,
    attributes: Option<Attributes>,
}

#[derive(Debug, Deserialize)]
struct Attributes {
    address: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    price_usd: Option<f64>,
    volume_usd: Option<Windows>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    market_cap_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    reserve_in_usd: Option<f64>,
    price_change_percentage: Option<Windows>,
}

#[derive(Debug, Deserialize)]
struct Windows {
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    h1: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    h24: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    d7: Option<f64>,
}

/// Pool-index source, USD figures converted with a configured SOL price
pub struct GeckoTerminalAdapter {
    fetcher: Arc<dyn Fetch>,
    sol_price_usd: f64,
}

impl GeckoTerminalAdapter {
    pub fn new(fetcher: Arc<dyn Fetch>, sol_price_usd: f64) -> Self {
        Self {
            fetcher,
            sol_price_usd,
        }
    }

    async fn try_fetch(&self, scope: &FetchScope) -> FetchResult<Vec<AssetRecord>> {
        let path = format!("/networks/{}/tokens", scope.chain);
        let raw = self
            .fetcher
            .get_json(&path, &[("page", scope.page.to_string())])
            .await?;

        let response: TokensResponse = serde_json::from_value(raw)
            .map_err(|e| FetchError::Permanent(format!("malformed geckoterminal payload: {e}")))?;

        let now = now_ms();
        let records = response
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|token| self.normalize_token(token, &scope.chain, now))
            .collect();

        Ok(records)
    }

    fn normalize_token(&self, token: GeckoToken, chain: &str, now: u64) -> Option<AssetRecord> {
        let (network, id_address) = match token.id.as_deref().and_then(|id| id.split_once('_')) {
            Some((network, address)) => (Some(network), Some(address.to_string())),
            None => (None, token.id.clone()),
        };
        if network.is_some_and(|n| n != chain) {
            return None;
        }

        let attributes = token.attributes?;
        let address = attributes
            .address
            .filter(|a| !a.is_empty())
            .or(id_address)
            .filter(|a| !a.is_empty())?;

        let price_sol = match attributes.price_usd {
            Some(usd) if self.sol_price_usd > 0.0 => amount(Some(usd)) / self.sol_price_usd,
            _ => 0.0,
        };
        let volume_usd = amount(attributes.volume_usd.and_then(|v| v.h24));
        let changes = attributes.price_change_percentage;

        Some(AssetRecord {
            token_address: address,
            token_name: attributes.name.unwrap_or_default(),
            token_ticker: attributes.symbol.unwrap_or_default(),
            price_sol,
            market_cap_sol: per_reference(amount(attributes.market_cap_usd), self.sol_price_usd),
            volume_sol: per_reference(volume_usd, self.sol_price_usd),
            liquidity_sol: per_reference(amount(attributes.reserve_in_usd), self.sol_price_usd),
            transaction_count: 0,
            price_1h_change: Some(changes.as_ref().and_then(|c| c.h1).unwrap_or(0.0)),
            price_24h_change: Some(changes.as_ref().and_then(|c| c.h24).unwrap_or(0.0)),
            price_7d_change: Some(changes.as_ref().and_then(|c| c.d7).unwrap_or(0.0)),
            protocol: PROTOCOL.to_string(),
            source: SourceTag::GeckoTerminal,
            last_updated_ms: now,
        })
    }
}

#[async_trait]
impl SourceAdapter for GeckoTerminalAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::GeckoTerminal
    }

    async fn fetch_assets(&self, scope: &FetchScope) -> Vec<AssetRecord> {
        match self.try_fetch(scope).await {
            Ok(records) => {
                debug!("GeckoTerminal returned {} {} tokens", records.len(), scope.chain);
                records
            }
            Err(e) => {
                error!("GeckoTerminal fetch for page {} failed: {}", scope.page, e);
                Vec::new()
            }
        }
    }
}
