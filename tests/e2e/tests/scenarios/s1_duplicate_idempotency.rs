//! S1: a duplicate commit under the same idempotency key returns the
//! original receipt untouched rather than writing a second episode.

use chrono::Utc;
use familycore_e2e_tests::harness::TestSpace;
use familycore_core::{derive_idem_key, EpisodeDraft, UnitOfWork};

fn draft(id: &str) -> EpisodeDraft {
    EpisodeDraft {
        id: id.to_string(),
        band: Default::default(),
        payload: serde_json::json!({ "content": "bumped into sara at the park" }),
        derived_from: Vec::new(),
    }
}

#[test]
fn duplicate_commit_is_a_no_op() {
    let space = TestSpace::new("shared:family");
    let uow = UnitOfWork::new(space.storage.clone());
    let actor = familycore_e2e_tests::fixtures::alice();
    let idem_key = derive_idem_key(&actor, "ep-1");
    let now = Utc::now();

    let mut first = uow.begin(space.space_id.clone(), Some(idem_key.clone())).unwrap();
    first.stage_episode(draft("ep-1"), now);
    let receipt_1 = first.commit(now).unwrap();
    assert!(!receipt_1.duplicate);
    assert!(receipt_1.bytes_written > 0);

    let mut second = uow.begin(space.space_id.clone(), Some(idem_key.clone())).unwrap();
    second.stage_episode(draft("ep-1-retry"), now);
    let receipt_2 = second.commit(now).unwrap();

    assert!(receipt_2.duplicate, "replaying the same idem_key must short-circuit to the existing receipt");
    assert_eq!(receipt_1.receipt_id, receipt_2.receipt_id);
    assert_eq!(receipt_2.bytes_written, 0, "a duplicate commit must not perform any new writes");
}

#[test]
fn distinct_idem_keys_each_commit_independently() {
    let space = TestSpace::new("shared:family");
    let uow = UnitOfWork::new(space.storage.clone());
    let actor = familycore_e2e_tests::fixtures::alice();
    let now = Utc::now();

    let key_a = derive_idem_key(&actor, "ep-a");
    let key_b = derive_idem_key(&actor, "ep-b");
    assert_ne!(key_a, key_b);

    let mut handle_a = uow.begin(space.space_id.clone(), Some(key_a)).unwrap();
    handle_a.stage_episode(draft("ep-a"), now);
    let receipt_a = handle_a.commit(now).unwrap();

    let mut handle_b = uow.begin(space.space_id.clone(), Some(key_b)).unwrap();
    handle_b.stage_episode(draft("ep-b"), now);
    let receipt_b = handle_b.commit(now).unwrap();

    assert_ne!(receipt_a.receipt_id, receipt_b.receipt_id);
    assert!(!receipt_a.duplicate);
    assert!(!receipt_b.duplicate);
}
