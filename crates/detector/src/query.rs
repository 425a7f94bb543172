//! Filter, sort and paginate an aggregate

use std::cmp::Ordering;

use tokenagg_core::{Aggregate, AggregatedRecord, FilterSpec, Page, SortKey, SortOrder, Timeframe};

/// Run a listing query against a snapshot
pub fn query(aggregate: &Aggregate, spec: &FilterSpec) -> Page {
    let mut matched: Vec<&AggregatedRecord> =
        aggregate.iter().filter(|r| spec.matches(r)).collect();

    let key = spec.sort_by.unwrap_or_default();
    let order = spec.sort_order.unwrap_or_default();
    let timeframe = spec.timeframe.unwrap_or_default();
    sort_records(&mut matched, key, order, timeframe);

    let total = matched.len();
    let offset = spec.offset();
    let limit = spec.effective_limit();

    let data: Vec<AggregatedRecord> = matched
        .into_iter()
        .skip(offset)
        .take(limit)
        .cloned()
        .collect();

    let end = offset.saturating_add(limit);
    let next_cursor = (end < total).then(|| end.to_string());

    Page {
        data,
        next_cursor,
        total,
    }
}

/// Stable sort, unranked keys keep the incoming order
fn sort_records(
    records: &mut [&AggregatedRecord],
    key: SortKey,
    order: SortOrder,
    timeframe: Timeframe,
) {
    if key == SortKey::Unranked {
        return;
    }

    records.sort_by(|a, b| {
        let ord = sort_metric(a, key, timeframe)
            .partial_cmp(&sort_metric(b, key, timeframe))
            .unwrap_or(Ordering::Equal);
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

fn sort_metric(record: &AggregatedRecord, key: SortKey, timeframe: Timeframe) -> f64 {
    match key {
        SortKey::Volume => record.token.volume_sol,
        SortKey::MarketCap => record.token.market_cap_sol,
        SortKey::Liquidity => record.token.liquidity_sol,
        SortKey::PriceChange => timeframe.change_of(record),
        SortKey::Unranked => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokenagg_core::{AssetRecord, SourceTag, DEFAULT_PAGE_LIMIT};

    fn token(address: &str, volume: f64, liquidity: f64) -> AggregatedRecord {
        let mut record = AssetRecord::new(address, SourceTag::DexScreener);
        record.volume_sol = volume;
        record.liquidity_sol = liquidity;
        AggregatedRecord::from_record(record, 0)
    }

    fn addresses(page: &Page) -> Vec<&str> {
        page.data.iter().map(|r| r.address()).collect()
    }

    fn sample() -> Aggregate {
        vec![
            token("a", 10.0, 5.0),
            token("b", 30.0, 1.0),
            token("c", 20.0, 9.0),
        ]
        .into()
    }

    #[test]
    fn test_default_sorts_by_volume_desc() {
        let page = query(&sample(), &FilterSpec::default());

        assert_eq!(addresses(&page), vec!["b", "c", "a"]);
        assert_eq!(page.total, 3);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_min_volume_filter() {
        let page = query(&sample(), &FilterSpec::default().with_min_volume(20.0));

        assert_eq!(addresses(&page), vec!["b", "c"]);
        assert_eq!(page.total, 2);
        assert!(page.data.iter().all(|r| r.token.volume_sol >= 20.0));
    }

    #[test]
    fn test_min_liquidity_filter() {
        let spec = FilterSpec::default()
            .with_min_liquidity(5.0)
            .sorted(SortKey::Liquidity, SortOrder::Asc);
        let page = query(&sample(), &spec);

        assert_eq!(addresses(&page), vec!["a", "c"]);
    }

    #[test]
    fn test_price_change_uses_timeframe() {
        let mut a = token("a", 0.0, 0.0);
        a.token.price_1h_change = Some(5.0);
        a.token.price_24h_change = Some(-1.0);
        let mut b = token("b", 0.0, 0.0);
        b.token.price_1h_change = Some(1.0);
        b.token.price_24h_change = Some(8.0);
        let c = token("c", 0.0, 0.0);
        let aggregate: Aggregate = vec![a, b, c].into();

        let spec = FilterSpec::default().sorted(SortKey::PriceChange, SortOrder::Desc);
        assert_eq!(addresses(&query(&aggregate, &spec)), vec!["a", "b", "c"]);

        let mut spec = spec;
        spec.timeframe = Some(Timeframe::OneDay);
        assert_eq!(addresses(&query(&aggregate, &spec)), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_unranked_keeps_aggregate_order() {
        let spec = FilterSpec::default().sorted(SortKey::Unranked, SortOrder::Desc);
        assert_eq!(addresses(&query(&sample(), &spec)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sort_tolerates_nan() {
        let aggregate: Aggregate = vec![
            token("a", 5.0, 0.0),
            token("b", f64::NAN, 0.0),
            token("c", 5.0, 0.0),
        ]
        .into();
        let spec = FilterSpec::default().sorted(SortKey::Volume, SortOrder::Asc);
        let page = query(&aggregate, &spec);

        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 3);
    }

    #[test]
    fn test_equal_keys_keep_aggregate_order() {
        let aggregate: Aggregate = vec![
            token("a", 5.0, 0.0),
            token("b", 9.0, 0.0),
            token("c", 5.0, 0.0),
        ]
        .into();
        let page = query(&aggregate, &FilterSpec::default());

        assert_eq!(addresses(&page), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_pagination() {
        let aggregate: Aggregate = (0..5)
            .map(|i| token(&format!("t{i}"), (10 - i) as f64, 0.0))
            .collect();

        let first = query(&aggregate, &FilterSpec::default().with_limit(2));
        assert_eq!(addresses(&first), vec!["t0", "t1"]);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));
        assert_eq!(first.total, 5);

        let last = query(
            &aggregate,
            &FilterSpec::default().with_limit(2).with_cursor("4"),
        );
        assert_eq!(addresses(&last), vec!["t4"]);
        assert_eq!(last.next_cursor, None);
    }

    #[test]
    fn test_bad_cursor_and_zero_limit() {
        let aggregate: Aggregate = (0..25)
            .map(|i| token(&format!("t{i}"), i as f64, 0.0))
            .collect();
        let spec = FilterSpec::default().with_limit(0).with_cursor("abc");
        let page = query(&aggregate, &spec);

        assert_eq!(page.data.len(), DEFAULT_PAGE_LIMIT);
        assert_eq!(page.next_cursor.as_deref(), Some("20"));
    }

    #[test]
    fn test_cursor_past_end() {
        let page = query(&sample(), &FilterSpec::default().with_cursor("10"));
        assert!(page.data.is_empty());
        assert_eq!(page.total, 3);
        assert_eq!(page.next_cursor, None);
    }

    proptest! {
        #[test]
        fn prop_pages_cover_filtered_set(
            volumes in prop::collection::vec(0.0f64..1e6, 0..60),
            limit in 1usize..15,
            min_volume in 0.0f64..1e6,
        ) {
            let aggregate: Aggregate = volumes
                .iter()
                .enumerate()
                .map(|(i, v)| token(&format!("t{i}"), *v, 0.0))
                .collect();
            let base = FilterSpec::default().with_min_volume(min_volume).with_limit(limit);
            let expected = aggregate.iter().filter(|r| r.token.volume_sol >= min_volume).count();

            let mut seen = Vec::new();
            let mut spec = base.clone();
            loop {
                let page = query(&aggregate, &spec);
                prop_assert!(page.data.len() <= limit);
                prop_assert_eq!(page.total, expected);
                seen.extend(page.data.iter().map(|r| r.address().to_string()));
                match page.next_cursor {
                    Some(cursor) => spec = base.clone().with_cursor(cursor),
                    None => break,
                }
            }

            prop_assert_eq!(seen.len(), expected);
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), expected);
        }
    }
}
