//! Cross-cutting properties the substrate, bus, and cognitive components
//! must hold regardless of scenario (spec §8, properties 1-10). The
//! scenario tests under `tests/scenarios` exercise the same machinery
//! end-to-end; these focus on one property in isolation.

use chrono::{Duration, Utc};
use familycore_core::{
    Arbiter, ArbiterConfig, Band, BusConfig, CandidateAction, CoreConfig, DecisionContext, Envelope, EnvelopeBuilder, HandlerOutcome, IndexedDocument,
    RetrievalConfig, Retriever, TemporalIndex,
};
use familycore_e2e_tests::fixtures;
use familycore_e2e_tests::harness::TestSpace;

/// Property 1: a successful `publish` always leaves a WAL record on disk,
/// and every subscribed group eventually either acks it or DLQs it.
#[test]
fn publish_never_returns_success_without_a_durable_wal_record() {
    let space = TestSpace::new("shared:family");
    let topic = "hippo.encode";
    let envelope = fixtures::hippo_encode(&space.space_id, "no record, no success", Utc::now());

    let offset = space.bus.publish(&envelope).unwrap();
    let log = space.storage.wal_log(topic).unwrap();
    assert!(log.read_at(offset).unwrap().is_some(), "a successful publish must be immediately readable from the WAL");
}

/// Property 2: acknowledged offsets for a (group, topic) are strictly
/// monotone.
#[test]
fn committed_offsets_are_strictly_monotone() {
    let space = TestSpace::new("shared:family");
    let topic = "hippo.encode";
    for i in 0..5 {
        let envelope = fixtures::hippo_encode(&space.space_id, &format!("episode {i}"), Utc::now());
        space.bus.publish(&envelope).unwrap();
    }

    let mut last_committed = 0;
    for _ in 0..5 {
        let delivery = space.bus.poll("group-a", topic, Utc::now()).unwrap().unwrap();
        space.bus.complete("group-a", topic, &delivery, HandlerOutcome::Ack, Utc::now()).unwrap();
        let committed = space.bus.committed_offset("group-a", topic).unwrap();
        assert!(committed > last_committed);
        last_committed = committed;
    }
}

/// Property 4: every envelope that makes it onto the bus satisfies the
/// band/obligation/hash invariants; an AMBER envelope missing its
/// `mls_group` is rejected by `publish` before it ever reaches the WAL.
#[test]
fn amber_envelope_without_mls_group_is_rejected_at_publish() {
    let space = TestSpace::new("shared:family");
    let bad: Envelope = EnvelopeBuilder::new(
        "hippo.encode",
        "episode.created",
        fixtures::alice(),
        "phone-1",
        space.space_id.clone(),
        serde_json::json!({ "content": "sensitive without a group" }),
    )
    .band(Band::Amber)
    .build(Utc::now());

    let result = space.bus.publish(&bad);
    assert!(result.is_err());
    assert!(space.storage.wal_log("hippo.encode").unwrap().is_empty());
}

/// Property 5: raising a candidate's term frequency for the query strictly
/// increases its BM25-driven rank relative to an otherwise-identical
/// candidate.
#[test]
fn higher_term_frequency_ranks_higher() {
    let config = RetrievalConfig::default();
    let mut retriever = Retriever::new(&config);
    let temporal = TemporalIndex::new("UTC", 72.0).unwrap();
    let now = Utc::now();

    retriever.index_document(IndexedDocument {
        episode_id: "weak".to_string(),
        content: "dinner with the family".to_string(),
        ts: now,
        source_prior: 0.0,
        personalization: 0.0,
        affect_compat: 0.0,
        tom_alignment: 0.0,
    });
    retriever.index_document(IndexedDocument {
        episode_id: "strong".to_string(),
        content: "dinner dinner dinner with the family, talking about dinner all night".to_string(),
        ts: now,
        source_prior: 0.0,
        personalization: 0.0,
        affect_compat: 0.0,
        tom_alignment: 0.0,
    });
    temporal.ingest("weak", now);
    temporal.ingest("strong", now);

    let mut request = familycore_core::SearchRequest::new(Some("dinner".to_string()));
    request.time_budget_ms = 1_000;
    let response = retriever.search(&request, &temporal, now).unwrap();

    let strong = response.results.iter().find(|r| r.episode_id == "strong").expect("strong candidate ranked");
    let weak = response.results.iter().find(|r| r.episode_id == "weak").expect("weak candidate ranked");
    assert!(strong.features.bm25 > weak.features.bm25);
    assert!(strong.score >= weak.score);
}

/// Property 6: `recency = 2^(-Δt_h / half_life_hours)` exactly.
#[test]
fn recency_matches_the_exponential_decay_formula() {
    let half_life_hours = 72.0;
    let index = TemporalIndex::new("UTC", half_life_hours).unwrap();
    let now = Utc::now();
    let ts = now - Duration::hours(36);
    index.ingest("ep", ts);

    let features = index.features("ep", now).unwrap();
    let delta_hours = (now - ts).num_milliseconds() as f64 / 3_600_000.0;
    let expected = 2f64.powf(-delta_hours / half_life_hours);
    assert!((features.recency - expected).abs() < 1e-9);
}

/// Property 7: the arbiter is a pure function of its inputs — identical
/// context and candidates produce an identical decision and identical
/// reasons ordering.
#[test]
fn arbiter_decisions_are_deterministic() {
    let config = ArbiterConfig::default();
    let arbiter = Arbiter::new(&config);
    let ctx = DecisionContext { band: Band::Green, minor_present: false, conflict_hint: false, arousal: 0.2, valence: 0.1, urgent: false, policy_permits: true };
    let candidates = vec![CandidateAction {
        name: "log_reminder".to_string(),
        args: serde_json::json!({}),
        relevance: 0.7,
        goal_alignment: 0.6,
        expected_reward: 0.5,
        habitability: 0.5,
        prosocial: 0.5,
        cost: 0.2,
        wm_load: 0.1,
        friction: 0.1,
        window_score: 0.8,
        risk: 0.2,
        prior: 0.3,
        sharing_class: false,
        preconditions: Vec::new(),
        effects: Vec::new(),
    }];

    let first = arbiter.decide(&ctx, &candidates);
    let second = arbiter.decide(&ctx, &candidates);
    assert_eq!(first.chosen, second.chosen);
    assert_eq!(first.reasons, second.reasons);
    assert_eq!(first.score, second.score);
}

/// Property 8: backoff for attempt n lands in
/// `[B0·2^n·(1-δ), min(Bmax, B0·2^n)·(1+δ)]`; with δ=0 this collapses to a
/// single deterministic instant the bus honors exactly.
#[test]
fn nacked_delivery_is_not_redelivered_before_its_backoff_elapses() {
    let mut config = CoreConfig::default();
    config.bus = BusConfig { max_attempts: 5, backoff_base_ms: 100, backoff_max_ms: 1_000, backoff_jitter: 0.0, ..config.bus };
    let space = TestSpace::with_config("shared:family", config);
    let topic = "hippo.encode";
    let t0 = Utc::now();
    let envelope = fixtures::hippo_encode(&space.space_id, "nack once", t0);
    space.bus.publish(&envelope).unwrap();

    let delivery = space.bus.poll("group-a", topic, t0).unwrap().unwrap();
    assert_eq!(delivery.attempt, 0);
    space.bus.complete("group-a", topic, &delivery, HandlerOutcome::Nack { reason: "not yet".to_string(), retry_after: None }, t0).unwrap();

    // attempt 1's backoff is B0 · 2^1 = 200ms with zero jitter.
    assert!(space.bus.poll("group-a", topic, t0 + Duration::milliseconds(100)).unwrap().is_none());
    let redelivered = space.bus.poll("group-a", topic, t0 + Duration::milliseconds(250)).unwrap().unwrap();
    assert_eq!(redelivered.attempt, 1);
}

/// Property 9: a published envelope read back from the WAL is byte-
/// identical, including its content hash.
#[test]
fn replayed_envelope_is_byte_identical_to_the_published_one() {
    let space = TestSpace::new("shared:family");
    let topic = "hippo.encode";
    let envelope = fixtures::hippo_encode(&space.space_id, "round trip me", Utc::now());
    let offset = space.bus.publish(&envelope).unwrap();

    let log = space.storage.wal_log(topic).unwrap();
    let record = log.read_at(offset).unwrap().unwrap();
    let replayed: Envelope = serde_json::from_slice(&record.payload).unwrap();

    assert_eq!(replayed.id, envelope.id);
    assert_eq!(replayed.hashes.payload_sha256, envelope.hashes.payload_sha256);
    assert_eq!(replayed.payload, envelope.payload);
}

/// Property 10: a policy denial blocks the arbiter outright, with no
/// candidate selected and nothing for a downstream handler to act on.
#[test]
fn policy_denial_selects_nothing() {
    let config = ArbiterConfig::default();
    let arbiter = Arbiter::new(&config);
    let ctx = DecisionContext { band: Band::Green, minor_present: false, conflict_hint: false, arousal: 0.0, valence: 0.0, urgent: false, policy_permits: false };
    let candidates = vec![CandidateAction {
        name: "share_photo".to_string(),
        args: serde_json::json!({}),
        relevance: 1.0,
        goal_alignment: 1.0,
        expected_reward: 1.0,
        habitability: 1.0,
        prosocial: 1.0,
        cost: 0.0,
        wm_load: 0.0,
        friction: 0.0,
        window_score: 1.0,
        risk: 0.0,
        prior: 1.0,
        sharing_class: true,
        preconditions: Vec::new(),
        effects: Vec::new(),
    }];

    let frame = arbiter.decide(&ctx, &candidates);
    assert!(frame.chosen.is_none());
    assert!(frame.alternates.is_empty());
}
