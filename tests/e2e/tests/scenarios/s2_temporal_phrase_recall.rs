//! S2: a natural-language time phrase ("today"/"yesterday") resolves to a
//! range that slices back exactly the episodes ingested within it.

use chrono::{Duration, Utc};
use familycore_core::TemporalIndex;

#[test]
fn today_and_yesterday_partition_ingested_episodes() {
    let index = TemporalIndex::new("America/Los_Angeles", 72.0).expect("valid timezone");
    let now = Utc::now();

    index.ingest("ep-today", now);
    index.ingest("ep-yesterday", now - Duration::days(1));
    index.ingest("ep-last-week", now - Duration::days(8));

    let today_range = index.phrase_to_range("today", now).expect("today resolves");
    assert_eq!(today_range.confidence, 1.0);
    let today_hits = index.slice(today_range.from, today_range.to);
    assert!(today_hits.contains(&"ep-today".to_string()));
    assert!(!today_hits.contains(&"ep-yesterday".to_string()));
    assert!(!today_hits.contains(&"ep-last-week".to_string()));

    let yesterday_range = index.phrase_to_range("yesterday", now).expect("yesterday resolves");
    let yesterday_hits = index.slice(yesterday_range.from, yesterday_range.to);
    assert!(yesterday_hits.contains(&"ep-yesterday".to_string()));
    assert!(!yesterday_hits.contains(&"ep-today".to_string()));
}

#[test]
fn unrecognized_phrase_returns_none() {
    let index = TemporalIndex::new("UTC", 72.0).unwrap();
    assert!(index.phrase_to_range("whenever that thing happened", Utc::now()).is_none());
}

#[test]
fn features_for_ingested_episode_decay_with_age() {
    let index = TemporalIndex::new("UTC", 24.0).unwrap();
    let now = Utc::now();
    index.ingest("fresh", now);
    index.ingest("stale", now - Duration::hours(48));

    let fresh = index.features("fresh", now).expect("fresh episode indexed");
    let stale = index.features("stale", now).expect("stale episode indexed");

    assert!(
        fresh.recency > stale.recency,
        "a 48h-old episode should have decayed further below a half-life of 24h: fresh={}, stale={}",
        fresh.recency,
        stale.recency
    );
}
