//! Benchmarks for listing queries over large aggregates

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use tokenagg_core::{
    Aggregate, AggregatedRecord, AssetRecord, FilterSpec, SortKey, SortOrder, SourceTag,
};
use tokenagg_detector::query;

fn random_aggregate(rng: &mut StdRng, size: usize) -> Aggregate {
    (0..size)
        .map(|i| {
            let mut record = AssetRecord::new(format!("mint{i}"), SourceTag::DexScreener);
            record.price_sol = rng.gen_range(0.000001..10.0);
            record.volume_sol = rng.gen_range(0.0..1_000_000.0);
            record.liquidity_sol = rng.gen_range(0.0..500_000.0);
            record.market_cap_sol = rng.gen_range(0.0..10_000_000.0);
            record.price_1h_change = Some(rng.gen_range(-50.0..50.0));
            AggregatedRecord::from_record(record, 0)
        })
        .collect()
}

fn benchmark_default_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_default");
    let mut rng = StdRng::seed_from_u64(42);

    for size in &[100, 1_000, 10_000] {
        let aggregate = random_aggregate(&mut rng, *size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &aggregate, |b, aggregate| {
            let spec = FilterSpec::default();
            b.iter(|| black_box(query(aggregate, &spec)));
        });
    }

    group.finish();
}

fn benchmark_filtered_listing(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_filtered");
    let mut rng = StdRng::seed_from_u64(7);
    let aggregate = random_aggregate(&mut rng, 10_000);

    group.bench_function("min_volume_price_change", |b| {
        let spec = FilterSpec::default()
            .with_min_volume(250_000.0)
            .sorted(SortKey::PriceChange, SortOrder::Desc)
            .with_limit(50);
        b.iter(|| black_box(query(&aggregate, &spec)));
    });

    group.bench_function("deep_cursor", |b| {
        let spec = FilterSpec::default().with_limit(20).with_cursor("9000");
        b.iter(|| black_box(query(&aggregate, &spec)));
    });

    group.finish();
}

criterion_group!(benches, benchmark_default_listing, benchmark_filtered_listing);
criterion_main!(benches);
