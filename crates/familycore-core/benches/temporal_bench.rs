//! Temporal index benchmarks.
//!
//! Run with: cargo bench -p familycore-core --bench temporal_bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use familycore_core::TemporalIndex;

fn populated_index(n: usize) -> (TemporalIndex, chrono::DateTime<Utc>) {
    let index = TemporalIndex::new("America/New_York", 72.0).unwrap();
    let now = Utc::now();
    for i in 0..n {
        let ts = now - chrono::Duration::hours(i as i64);
        index.ingest(&format!("ep-{i}"), ts);
    }
    (index, now)
}

fn bench_ingest(c: &mut Criterion) {
    let index = TemporalIndex::new("UTC", 72.0).unwrap();
    let now = Utc::now();
    let mut i = 0u64;

    c.bench_function("temporal_ingest", |b| {
        b.iter(|| {
            index.ingest(&format!("ep-{i}"), now - chrono::Duration::hours(i as i64));
            i += 1;
        })
    });
}

fn bench_slice(c: &mut Criterion) {
    let (index, now) = populated_index(5_000);

    c.bench_function("temporal_slice_5000_entries", |b| {
        b.iter(|| {
            black_box(index.slice(now - chrono::Duration::days(7), now));
        })
    });
}

fn bench_features(c: &mut Criterion) {
    let (index, now) = populated_index(5_000);

    c.bench_function("temporal_features_lookup", |b| {
        b.iter(|| {
            black_box(index.features("ep-42", now));
        })
    });
}

fn bench_phrase_to_range(c: &mut Criterion) {
    let (index, now) = populated_index(100);

    c.bench_function("temporal_phrase_to_range", |b| {
        b.iter(|| {
            black_box(index.phrase_to_range("last week", now));
        })
    });
}

criterion_group!(benches, bench_ingest, bench_slice, bench_features, bench_phrase_to_range);
criterion_main!(benches);
