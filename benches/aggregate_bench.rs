//! Benchmarks for the record aggregator
//!
//! Run with: cargo bench

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use healthsync::{aggregate, MetricFamily, TaggedMeasurement};

/// One reading per tag per measurement, as the API returns them
fn create_window(readings: usize) -> Vec<TaggedMeasurement> {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(7, 0, 0)
        .unwrap();
    let family = MetricFamily::Innerscan;

    (0..readings)
        .rev()
        .flat_map(|i| {
            let ts = start + Duration::hours(i as i64 * 12);
            family
                .tags()
                .iter()
                .map(move |t| TaggedMeasurement::new(ts, t.tag, "01000117", format!("{}.5", i % 90)))
        })
        .collect()
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");

    // 180 readings ≈ a full three-month window at two weigh-ins per day
    for size in [10, 180, 1000] {
        let window = create_window(size);

        group.throughput(Throughput::Elements(window.len() as u64));

        group.bench_function(format!("innerscan_{}", size), |b| {
            b.iter(|| aggregate(MetricFamily::Innerscan, black_box(&window)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_aggregate);
criterion_main!(benches);
