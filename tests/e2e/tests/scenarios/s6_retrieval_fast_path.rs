//! S6: a search under a tight latency budget takes the fast path — lexical
//! candidates only, no vector source — while a generous budget also pulls
//! vector candidates.

use chrono::Utc;
use familycore_core::{IndexedDocument, RetrievalConfig, Retriever, SearchRequest, TemporalIndex};

fn seeded_retriever(config: &RetrievalConfig) -> (Retriever<'_>, TemporalIndex) {
    let mut retriever = Retriever::new(config);
    let temporal = TemporalIndex::new("UTC", 72.0).unwrap();
    let now = Utc::now();

    for (id, content) in [
        ("ep-1", "picked up groceries and cooked dinner with dad"),
        ("ep-2", "soccer practice after school with the team"),
        ("ep-3", "dad helped with math homework before dinner"),
    ] {
        retriever.index_document(IndexedDocument {
            episode_id: id.to_string(),
            content: content.to_string(),
            ts: now,
            source_prior: 0.0,
            personalization: 0.0,
            affect_compat: 0.0,
            tom_alignment: 0.0,
        });
        temporal.ingest(id, now);
    }
    (retriever, temporal)
}

#[test]
fn tight_budget_takes_the_fast_path_and_skips_vector_search() {
    let config = RetrievalConfig::default();
    let (retriever, temporal) = seeded_retriever(&config);

    let mut request = SearchRequest::new(Some("dad dinner".to_string()));
    request.time_budget_ms = config.fast_path_budget_ms;

    let response = retriever.search(&request, &temporal, Utc::now()).unwrap();
    assert!(response.source_used.contains(&"fts"));
    assert!(!response.source_used.contains(&"vector"));
    assert!(!response.results.is_empty());
}

#[test]
fn generous_budget_also_uses_the_vector_source() {
    let config = RetrievalConfig::default();
    let (retriever, temporal) = seeded_retriever(&config);

    let mut request = SearchRequest::new(Some("dad dinner".to_string()));
    request.time_budget_ms = config.fast_path_budget_ms * 100;

    let response = retriever.search(&request, &temporal, Utc::now()).unwrap();
    assert!(response.source_used.contains(&"vector"));
}

#[test]
fn empty_query_returns_no_lexical_candidates() {
    let config = RetrievalConfig::default();
    let (retriever, temporal) = seeded_retriever(&config);

    let request = SearchRequest::new(None);
    let response = retriever.search(&request, &temporal, Utc::now()).unwrap();
    assert!(!response.source_used.contains(&"fts"));
}
