//! Cross-source record reconciliation
//!
//! Sources are noisy and partial, so cumulative metrics keep the best known
//! value rather than the latest one. The venue label is pinned to the first
//! record seen for an identity.

use tokenagg_core::{now_ms, Aggregate, AggregatedRecord, AssetRecord};

/// Merge records from every source into one aggregate, stamped with the current time
pub fn merge(records: impl IntoIterator<Item = AssetRecord>) -> Aggregate {
    merge_at(records, now_ms())
}

/// Merge with an explicit aggregation timestamp
pub fn merge_at(records: impl IntoIterator<Item = AssetRecord>, now_ms: u64) -> Aggregate {
    let mut aggregate = Aggregate::new();

    for record in records {
        match aggregate.get_mut(&record.token_address) {
            Some(existing) => absorb(existing, record, now_ms),
            None => aggregate.upsert(AggregatedRecord::from_record(record, now_ms)),
        }
    }

    aggregate
}

/// Fold one more record for the same identity into `existing`
pub fn absorb(existing: &mut AggregatedRecord, record: AssetRecord, now_ms: u64) {
    let token = &mut existing.token;

    if !record.token_name.is_empty() {
        token.token_name = record.token_name;
    }
    if !record.token_ticker.is_empty() {
        token.token_ticker = record.token_ticker;
    }
    if record.price_sol > 0.0 {
        token.price_sol = record.price_sol;
    }

    token.market_cap_sol = token.market_cap_sol.max(record.market_cap_sol);
    token.volume_sol = token.volume_sol.max(record.volume_sol);
    token.liquidity_sol = token.liquidity_sol.max(record.liquidity_sol);
    token.transaction_count = token.transaction_count.max(record.transaction_count);

    if let Some(change) = record.price_1h_change.filter(|c| *c != 0.0) {
        token.price_1h_change = Some(change);
    }
    if record.price_24h_change.is_some() {
        token.price_24h_change = record.price_24h_change;
    }
    if record.price_7d_change.is_some() {
        token.price_7d_change = record.price_7d_change;
    }
    token.last_updated_ms = token.last_updated_ms.max(record.last_updated_ms);

    if !existing.sources.contains(&record.source) {
        existing.sources.push(record.source);
    }
    existing.aggregated_at_ms = now_ms;
}
