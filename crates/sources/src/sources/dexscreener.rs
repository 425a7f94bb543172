//! DexScreener pair search adapter
//!
//! Responses list trading pairs across every chain; prices come in both the
//! pair's native quote unit and USD, so the SOL reference price is derived
//! per pair and used to convert USD figures.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

use tokenagg_core::{now_ms, AssetRecord, FetchError, FetchResult, SourceTag};

use super::{amount, lenient, per_reference, protocol_label, FetchScope, SourceAdapter};
use crate::http::Fetch;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    pairs: Option<Vec<Pair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    chain_id: Option<String>,
    dex_id: Option<String>,
    base_token: Option<PairToken>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    price_native: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    price_usd: Option<f64>,
    volume: Option<Windows>,
    liquidity: Option<Liquidity>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    fdv: Option<f64>,
    txns: Option<TxnWindows>,
    price_change: Option<Windows>,
}

#[derive(Debug, Deserialize)]
struct PairToken {
    address: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Windows {
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    h1: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    h24: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Liquidity {
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TxnWindows {
    h24: Option<TxnCounts>,
}

#[derive(Debug, Deserialize)]
struct TxnCounts {
    #[serde(default, deserialize_with = "lenient::u64_opt")]
    buys: Option<u64>,
    #[serde(default, deserialize_with = "lenient::u64_opt")]
    sells: Option<u64>,
}

/// DEX-pair source
pub struct DexScreenerAdapter {
    fetcher: Arc<dyn Fetch>,
}

impl DexScreenerAdapter {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self { fetcher }
    }

    async fn try_fetch(&self, scope: &FetchScope) -> FetchResult<Vec<AssetRecord>> {
        let raw = self
            .fetcher
            .get_json("/latest/dex/search", &[("q", scope.search_query.clone())])
            .await?;

        let response: SearchResponse = serde_json::from_value(raw)
            .map_err(|e| FetchError::Permanent(format!("malformed dexscreener payload: {e}")))?;

        let now = now_ms();
        let records = response
            .pairs
            .unwrap_or_default()
            .into_iter()
            .filter(|pair| pair.chain_id.as_deref() == Some(scope.chain.as_str()))
            .filter_map(|pair| normalize_pair(pair, now))
            .collect();

        Ok(records)
    }
}

fn normalize_pair(pair: Pair, now: u64) -> Option<AssetRecord> {
    let token = pair.base_token?;
    let address = token.address.filter(|a| !a.is_empty())?;

    let price_native = amount(pair.price_native);
    let price_usd = amount(pair.price_usd);
    let sol_price_usd = if price_native > 0.0 {
        price_usd / price_native
    } else {
        0.0
    };

    let volume_usd = amount(pair.volume.and_then(|v| v.h24));
    let liquidity_usd = amount(pair.liquidity.and_then(|l| l.usd));
    let (buys, sells) = pair
        .txns
        .and_then(|t| t.h24)
        .map(|c| (c.buys.unwrap_or(0), c.sells.unwrap_or(0)))
        .unwrap_or((0, 0));
    let (change_1h, change_24h) = pair
        .price_change
        .map(|c| (c.h1, c.h24))
        .unwrap_or((None, None));

    Some(AssetRecord {
        token_address: address,
        token_name: token.name.unwrap_or_default(),
        token_ticker: token.symbol.unwrap_or_default(),
        price_sol: price_native,
        market_cap_sol: per_reference(amount(pair.fdv), sol_price_usd),
        volume_sol: per_reference(volume_usd, sol_price_usd),
        liquidity_sol: per_reference(liquidity_usd, sol_price_usd),
        transaction_count: buys.saturating_add(sells),
        price_1h_change: Some(change_1h.unwrap_or(0.0)),
        price_24h_change: Some(change_24h.unwrap_or(0.0)),
        price_7d_change: None,
        protocol: protocol_label(pair.dex_id),
        source: SourceTag::DexScreener,
        last_updated_ms: now,
    })
}

#[async_trait]
impl SourceAdapter for DexScreenerAdapter {
    fn source(&self) -> SourceTag {
        SourceTag::DexScreener
    }

    async fn fetch_assets(&self, scope: &FetchScope) -> Vec<AssetRecord> {
        match self.try_fetch(scope).await {
            Ok(records) => {
                debug!("DexScreener returned {} {} tokens", records.len(), scope.chain);
                records
            }
            Err(e) => {
                error!("DexScreener search for {:?} failed: {}", scope.search_query, e);
                Vec::new()
            }
        }
    }
}
