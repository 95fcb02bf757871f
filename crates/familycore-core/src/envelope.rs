//! The Event envelope — the normalized record that flows over the bus.
//!
//! Bit-exact with the wire-normative shape in spec §6: every field required
//! there is represented here; `Envelope::validate` enforces the invariants
//! spelled out in §3 and §8 (property 4).

use serde::{Deserialize, Serialize};

use crate::ids::{ActorRef, Band, EventId, SpaceId, Timestamp, TraceId};

/// Quality-of-service hints carried by every envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Qos {
    /// Higher priority values are serviced first by the attention gate and
    /// the pipeline orchestrator's handler scheduling.
    pub priority: u8,
    /// Deadline budget in milliseconds; propagated to every subsystem a
    /// handler calls (retrieval, cortex, arbiter).
    pub latency_budget_ms: u32,
}

impl Default for Qos {
    fn default() -> Self {
        Self {
            priority: 5,
            latency_budget_ms: 200,
        }
    }
}

/// Content hashes carried by the envelope for integrity and idempotency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashes {
    pub payload_sha256: String,
}

impl Hashes {
    pub fn of(payload: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(payload);
        Self {
            payload_sha256: hex_encode(&hasher.finalize()),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Required markers that compel downstream handling, e.g. a tombstone-topic
/// event must carry `TOMBSTONE_ON_DELETE`; audited topics must carry
/// `AUDIT_ACCESS`.
pub const OBLIGATION_TOMBSTONE_ON_DELETE: &str = "TOMBSTONE_ON_DELETE";
pub const OBLIGATION_AUDIT_ACCESS: &str = "AUDIT_ACCESS";

/// The normalized event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EventId,
    pub ts: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest_ts: Option<Timestamp>,
    pub topic: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actor: ActorRef,
    pub device: String,
    pub space_id: SpaceId,
    pub band: Band,
    pub policy_version: String,
    pub qos: Qos,
    pub hashes: Hashes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mls_group: Option<String>,
    pub obligations: Vec<String>,
    pub trace_id: TraceId,
    /// Set by [`crate::bus::Bus::replay_dlq`] on re-publication; breaks
    /// replay cycles and lets handlers tell a DLQ replay apart from a fresh
    /// delivery while still deduping on the original `id`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replayed_from: Option<String>,
    pub payload: serde_json::Value,
}

/// Why an envelope failed validation; maps onto the §7 "Invariant violation"
/// error kind (non-retriable, DLQ immediately).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeInvalid {
    #[error("mls_group required for band {0}")]
    MissingMlsGroup(Band),
    #[error("ingest_ts {ingest_ts} precedes ts {ts}")]
    IngestBeforeTs { ts: String, ingest_ts: String },
    #[error("missing required obligation: {0}")]
    MissingObligation(&'static str),
    #[error("payload_sha256 does not match payload")]
    HashMismatch,
    #[error("payload exceeds per-topic quota of {quota} bytes ({actual} bytes)")]
    PayloadTooLarge { quota: usize, actual: usize },
}

impl Envelope {
    /// Validate the cross-field invariants from spec §3 / §8 property 4.
    /// Per-topic obligation requirements and size quotas are supplied by the
    /// caller (the topic catalogue in [`crate::topics`]).
    pub fn validate(
        &self,
        required_obligations: &[&'static str],
        max_payload_bytes: usize,
    ) -> Result<(), EnvelopeInvalid> {
        if self.band.requires_mls_group() && self.mls_group.is_none() {
            return Err(EnvelopeInvalid::MissingMlsGroup(self.band));
        }
        if let Some(ingest_ts) = self.ingest_ts {
            if ingest_ts < self.ts {
                return Err(EnvelopeInvalid::IngestBeforeTs {
                    ts: self.ts.to_rfc3339(),
                    ingest_ts: ingest_ts.to_rfc3339(),
                });
            }
        }
        for required in required_obligations {
            if !self.obligations.iter().any(|o| o == required) {
                return Err(EnvelopeInvalid::MissingObligation(required));
            }
        }
        let payload_bytes = serde_json::to_vec(&self.payload).unwrap_or_default();
        if payload_bytes.len() > max_payload_bytes {
            return Err(EnvelopeInvalid::PayloadTooLarge {
                quota: max_payload_bytes,
                actual: payload_bytes.len(),
            });
        }
        let expected = Hashes::of(&payload_bytes);
        if expected.payload_sha256 != self.hashes.payload_sha256 {
            return Err(EnvelopeInvalid::HashMismatch);
        }
        Ok(())
    }
}

/// Builder used by producers (pipeline handlers, the attention gate) to
/// construct a well-formed envelope without re-deriving the hash by hand.
pub struct EnvelopeBuilder {
    topic: String,
    kind: String,
    actor: ActorRef,
    device: String,
    space_id: SpaceId,
    band: Band,
    policy_version: String,
    qos: Qos,
    mls_group: Option<String>,
    obligations: Vec<String>,
    trace_id: TraceId,
    payload: serde_json::Value,
}

impl EnvelopeBuilder {
    pub fn new(
        topic: impl Into<String>,
        kind: impl Into<String>,
        actor: ActorRef,
        device: impl Into<String>,
        space_id: SpaceId,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            topic: topic.into(),
            kind: kind.into(),
            actor,
            device: device.into(),
            space_id,
            band: Band::default(),
            policy_version: "0".to_string(),
            qos: Qos::default(),
            mls_group: None,
            obligations: Vec::new(),
            trace_id: TraceId::new(),
            payload,
        }
    }

    pub fn band(mut self, band: Band) -> Self {
        self.band = band;
        self
    }

    pub fn policy_version(mut self, v: impl Into<String>) -> Self {
        self.policy_version = v.into();
        self
    }

    pub fn qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    pub fn mls_group(mut self, group: impl Into<String>) -> Self {
        self.mls_group = Some(group.into());
        self
    }

    pub fn obligation(mut self, ob: impl Into<String>) -> Self {
        self.obligations.push(ob.into());
        self
    }

    pub fn trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn build(self, now: Timestamp) -> Envelope {
        let payload_bytes = serde_json::to_vec(&self.payload).unwrap_or_default();
        Envelope {
            id: EventId::new(),
            ts: now,
            ingest_ts: None,
            topic: self.topic,
            kind: self.kind,
            actor: self.actor,
            device: self.device,
            space_id: self.space_id,
            band: self.band,
            policy_version: self.policy_version,
            qos: self.qos,
            hashes: Hashes::of(&payload_bytes),
            signature: None,
            mls_group: self.mls_group,
            obligations: self.obligations,
            trace_id: self.trace_id,
            replayed_from: None,
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(band: Band, mls_group: Option<&str>) -> Envelope {
        let mut b = EnvelopeBuilder::new(
            "hippo.encode",
            "episode.created",
            ActorRef::new("alice", "phone-1"),
            "phone-1",
            SpaceId::new("shared:family"),
            serde_json::json!({"content": "hello"}),
        )
        .band(band);
        if let Some(g) = mls_group {
            b = b.mls_group(g);
        }
        b.build(chrono::Utc::now())
    }

    #[test]
    fn amber_without_mls_group_is_invalid() {
        let env = sample(Band::Amber, None);
        assert_eq!(
            env.validate(&[], 1 << 20),
            Err(EnvelopeInvalid::MissingMlsGroup(Band::Amber))
        );
    }

    #[test]
    fn amber_with_mls_group_is_valid() {
        let env = sample(Band::Amber, Some("grp-1"));
        assert!(env.validate(&[], 1 << 20).is_ok());
    }

    #[test]
    fn green_without_mls_group_is_valid() {
        let env = sample(Band::Green, None);
        assert!(env.validate(&[], 1 << 20).is_ok());
    }

    #[test]
    fn missing_required_obligation_is_rejected() {
        let env = sample(Band::Green, None);
        let err = env
            .validate(&[OBLIGATION_AUDIT_ACCESS], 1 << 20)
            .unwrap_err();
        assert_eq!(err, EnvelopeInvalid::MissingObligation(OBLIGATION_AUDIT_ACCESS));
    }

    #[test]
    fn tampered_hash_is_rejected() {
        let mut env = sample(Band::Green, None);
        env.hashes.payload_sha256 = "deadbeef".to_string();
        assert_eq!(env.validate(&[], 1 << 20), Err(EnvelopeInvalid::HashMismatch));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let env = sample(Band::Green, None);
        let err = env.validate(&[], 4).unwrap_err();
        assert!(matches!(err, EnvelopeInvalid::PayloadTooLarge { .. }));
    }
}
