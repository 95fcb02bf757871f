//! Envelope and actor fixtures shared by the scenario tests.

use chrono::Utc;
use familycore_core::{ActorRef, Band, Envelope, EnvelopeBuilder, SpaceId, Timestamp};
use serde_json::Value;

pub fn alice() -> ActorRef {
    ActorRef::new("alice", "phone-1")
}

pub fn bob() -> ActorRef {
    ActorRef::new("bob", "tablet-1")
}

pub fn now() -> Timestamp {
    Utc::now()
}

/// Build a well-formed envelope on `topic`, defaulting to `Band::Green` with
/// no obligations. Callers needing a higher band or an obligation chain the
/// returned builder before `.build(now)`.
pub fn envelope_builder(topic: &str, kind: &str, actor: ActorRef, space: &SpaceId, payload: Value) -> EnvelopeBuilder {
    let device = actor.device_id.clone();
    EnvelopeBuilder::new(topic, kind, actor, device, space.clone(), payload)
}

pub fn hippo_encode(space: &SpaceId, content: &str, ts: Timestamp) -> Envelope {
    envelope_builder(
        familycore_core::HIPPO_ENCODE,
        "episode.created",
        alice(),
        space,
        serde_json::json!({ "content": content }),
    )
    .build(ts)
}

pub fn amber_envelope(space: &SpaceId, topic: &str, mls_group: &str, ts: Timestamp) -> Envelope {
    envelope_builder(topic, "episode.created", alice(), space, serde_json::json!({ "content": "sensitive" }))
        .band(Band::Amber)
        .mls_group(mls_group)
        .build(ts)
}
