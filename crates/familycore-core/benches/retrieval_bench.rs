//! Hybrid retrieval benchmarks.
//!
//! Run with: cargo bench -p familycore-core --bench retrieval_bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use familycore_core::{Calibration, IndexedDocument, RetrievalConfig, Retriever, SearchRequest, TemporalIndex};

fn corpus(n: usize) -> Vec<IndexedDocument> {
    let now = Utc::now();
    (0..n)
        .map(|i| IndexedDocument {
            episode_id: format!("ep-{i}"),
            content: format!("family event number {i} about school pickup and dinner plans"),
            ts: now - chrono::Duration::hours(i as i64),
            source_prior: 0.5,
            personalization: 0.5,
            affect_compat: 0.5,
            tom_alignment: 0.5,
        })
        .collect()
}

fn bench_index_documents(c: &mut Criterion) {
    let config = RetrievalConfig::default();
    let docs = corpus(500);

    c.bench_function("retriever_index_500_documents", |b| {
        b.iter(|| {
            let mut retriever = Retriever::new(&config);
            for doc in &docs {
                retriever.index_document(doc.clone());
            }
            black_box(&retriever);
        })
    });
}

fn bench_search(c: &mut Criterion) {
    let config = RetrievalConfig::default();
    let docs = corpus(500);
    let mut retriever = Retriever::new(&config);
    for doc in &docs {
        retriever.index_document(doc.clone());
    }
    let temporal = TemporalIndex::new("UTC", 72.0).unwrap();
    let now = Utc::now();
    let request = SearchRequest::new("school pickup".to_string());

    c.bench_function("retriever_search_500_documents", |b| {
        b.iter(|| {
            black_box(retriever.search(&request, &temporal, now).unwrap());
        })
    });
}

fn bench_calibration_update(c: &mut Criterion) {
    let config = RetrievalConfig::default();
    let mut retriever = Retriever::new(&config);

    c.bench_function("retriever_update_calibration", |b| {
        b.iter(|| {
            retriever.update_calibration(black_box(0.7), black_box(1.0));
        })
    });
}

fn bench_calibration_apply(c: &mut Criterion) {
    let calibration = Calibration::default();
    c.bench_function("calibration_apply", |b| {
        b.iter(|| {
            black_box(calibration.apply(black_box(0.62)));
        })
    });
}

criterion_group!(benches, bench_index_documents, bench_search, bench_calibration_update, bench_calibration_apply);
criterion_main!(benches);
