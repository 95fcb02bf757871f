//! S5: a handler that keeps NACKing a delivery exhausts the bus's retry
//! budget and the record lands in the dead-letter queue; replaying it
//! re-publishes at a new offset.

use chrono::Utc;
use familycore_core::{BusConfig, CoreConfig, HandlerOutcome};
use familycore_e2e_tests::fixtures;
use familycore_e2e_tests::harness::TestSpace;

fn fast_retry_config() -> CoreConfig {
    let mut config = CoreConfig::default();
    config.bus = BusConfig { max_attempts: 3, backoff_base_ms: 1, backoff_max_ms: 5, backoff_jitter: 0.0, ..config.bus };
    config
}

#[test]
fn exhausted_retries_move_the_record_to_the_dlq() {
    let space = TestSpace::with_config("shared:family", fast_retry_config());
    let topic = "hippo.encode";
    let now = Utc::now();
    let envelope = fixtures::hippo_encode(&space.space_id, "retry me until you give up", now);
    space.bus.publish(&envelope).unwrap();

    let group = "test-consumer";
    let mut original_offset = None;
    for attempt in 0..space.config.bus.max_attempts {
        let delivery = space
            .bus
            .poll(group, topic, Utc::now())
            .unwrap()
            .unwrap_or_else(|| panic!("expected a delivery on attempt {attempt}"));
        original_offset.get_or_insert(delivery.offset);
        space
            .bus
            .complete(group, topic, &delivery, HandlerOutcome::Nack { reason: "handler rejected".to_string(), retry_after: None }, Utc::now())
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    // The retry budget is now exhausted: nothing left to poll, and exactly
    // one record sits in the DLQ for this group/topic.
    assert!(space.bus.poll(group, topic, Utc::now()).unwrap().is_none());
    let dlq = space.bus.list_dlq(Some(topic), Some(group)).unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].attempts, space.config.bus.max_attempts);

    let new_offset = space.bus.replay_dlq(&dlq[0].dlq_id).unwrap();
    assert!(new_offset > original_offset.unwrap(), "a replayed record must land at a fresh offset, not overwrite the original");
    assert!(space.bus.list_dlq(Some(topic), Some(group)).unwrap().is_empty());
}

#[test]
fn a_single_ack_commits_the_offset_and_never_touches_the_dlq() {
    let space = TestSpace::new("shared:family");
    let topic = "hippo.encode";
    let now = Utc::now();
    let envelope = fixtures::hippo_encode(&space.space_id, "remember this the first time", now);
    space.bus.publish(&envelope).unwrap();

    let delivery = space.bus.poll("test-consumer", topic, now).unwrap().unwrap();
    space.bus.complete("test-consumer", topic, &delivery, HandlerOutcome::Ack, now).unwrap();

    assert_eq!(space.bus.committed_offset("test-consumer", topic).unwrap(), delivery.offset + 1);
    assert!(space.bus.list_dlq(Some(topic), Some("test-consumer")).unwrap().is_empty());
}
