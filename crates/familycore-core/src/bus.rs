//! Event Bus (C3, spec §4.3): per-topic durable log, subscription routing,
//! backoff retries, and DLQ, built directly on [`crate::storage`]'s WAL and
//! KV tables — the bus owns no storage of its own.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;

use crate::config::BusConfig;
use crate::envelope::Envelope;
use crate::error::{Classify, ErrorKind};
use crate::ids::{EventId, Timestamp};
use crate::storage::{DlqRow, SpaceStorage, Write};
use crate::topics;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("envelope invalid: {0}")]
    EnvelopeInvalid(#[from] crate::envelope::EnvelopeInvalid),
    #[error("publish queue exceeds high-watermark for topic {0}")]
    Busy(String),
    #[error("handler deadline exceeded")]
    Deadline,
    #[error("handler error: {0}")]
    HandlerError(String),
    #[error("dlq entry not found: {0}")]
    DlqNotFound(String),
}

impl Classify for BusError {
    fn kind(&self) -> ErrorKind {
        match self {
            BusError::Storage(e) => e.kind(),
            BusError::EnvelopeInvalid(_) => ErrorKind::InvariantViolation,
            BusError::Busy(_) => ErrorKind::Busy,
            BusError::Deadline => ErrorKind::Deadline,
            BusError::HandlerError(_) => ErrorKind::SubstrateFailure,
            BusError::DlqNotFound(_) => ErrorKind::InvariantViolation,
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;

/// Outcome a handler returns from one delivery (spec §4.3 "handler returns
/// `Ack` or `Nack`").
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    Ack,
    Nack { reason: String, retry_after: Option<std::time::Duration> },
}

/// One record pulled off the log for delivery, annotated with its retry
/// state.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub offset: u64,
    pub envelope: Envelope,
    pub attempt: u32,
    pub deadline: Timestamp,
}

#[derive(Debug, Clone, Default)]
struct InFlightEntry {
    attempt: u32,
    next_visible_ts: Option<Timestamp>,
}

/// Durable per-(group, topic) consumer cursor plus the in-memory retry
/// schedule for records past the committed offset but not yet acked.
struct ConsumerState {
    in_flight: HashMap<u64, InFlightEntry>,
}

/// Bus handle for one space. Holds no durable state of its own beyond what
/// [`SpaceStorage`] already persists (offsets, DLQ); `in_flight` retry
/// bookkeeping is process-local and rebuilt from the committed offset on
/// restart (anything not yet acked is simply redelivered).
pub struct Bus {
    storage: Arc<SpaceStorage>,
    config: BusConfig,
    consumers: Mutex<HashMap<(String, String), ConsumerState>>,
}

impl Bus {
    pub fn new(storage: Arc<SpaceStorage>, config: BusConfig) -> Self {
        Self { storage, config, consumers: Mutex::new(HashMap::new()) }
    }

    /// `publish()` — spec §4.3. Validates, hashes (already done by the
    /// envelope builder), appends to the topic's WAL, and returns the
    /// assigned offset.
    pub fn publish(&self, envelope: &Envelope) -> Result<u64> {
        let spec = topics::lookup(&envelope.topic);
        let required = topics::required_obligations_for(&envelope.topic);
        envelope.validate(&required, spec.max_envelope_bytes)?;

        let log = self.storage.wal_log(&envelope.topic)?;
        if log.len() as usize >= self.config.publish_high_watermark {
            return Err(BusError::Busy(envelope.topic.clone()));
        }
        let bytes = serde_json::to_vec(envelope).map_err(|e| BusError::HandlerError(e.to_string()))?;
        let offset = log.append(&bytes)?;
        Ok(offset)
    }

    /// Batch publish sharing one trailing fsync (spec §4.3 "groups multiple
    /// into a flush tick with max latency 5ms").
    pub fn publish_batch(&self, topic: &str, envelopes: &[Envelope]) -> Result<Vec<u64>> {
        let spec = topics::lookup(topic);
        let required = topics::required_obligations_for(topic);
        for envelope in envelopes {
            envelope.validate(&required, spec.max_envelope_bytes)?;
        }
        let log = self.storage.wal_log(topic)?;
        if log.len() as usize >= self.config.publish_high_watermark {
            return Err(BusError::Busy(topic.to_string()));
        }
        let payloads: Vec<Vec<u8>> = envelopes
            .iter()
            .map(|e| serde_json::to_vec(e).map_err(|e| BusError::HandlerError(e.to_string())))
            .collect::<Result<_>>()?;
        Ok(log.append_batch(&payloads)?)
    }

    /// Pull the next due delivery for `(group, topic)`: either the first
    /// record past the committed offset, or an in-flight record whose retry
    /// backoff has elapsed. Returns `None` when nothing is due.
    pub fn poll(&self, group: &str, topic: &str, now: Timestamp) -> Result<Option<Delivery>> {
        let committed = self.storage.committed_offset(group, topic)?;
        let log = self.storage.wal_log(topic)?;

        let mut consumers = self.consumers.lock();
        let state = consumers
            .entry((group.to_string(), topic.to_string()))
            .or_insert_with(|| ConsumerState { in_flight: HashMap::new() });

        // A single logical reader per group means at most one record is
        // in-flight at a time; if it exists but isn't due yet, nothing can
        // be delivered (ordering within a group forbids skipping ahead).
        if let Some((&offset, entry)) = state.in_flight.iter().next() {
            if let Some(next_visible) = entry.next_visible_ts {
                if next_visible > now {
                    return Ok(None);
                }
            }
            let _ = offset;
        }

        let next_offset = state.in_flight.keys().next().copied().unwrap_or(committed);

        let Some(record) = log.read_at(next_offset)? else {
            return Ok(None);
        };
        let envelope: Envelope = serde_json::from_slice(&record.payload).map_err(|e| BusError::HandlerError(e.to_string()))?;
        let attempt = state.in_flight.get(&next_offset).map(|e| e.attempt).unwrap_or(0);
        let deadline = now + chrono::Duration::milliseconds(envelope.qos.latency_budget_ms as i64);
        state.in_flight.entry(next_offset).or_default();

        Ok(Some(Delivery { offset: next_offset, envelope, attempt, deadline }))
    }

    /// Apply a handler's outcome: `Ack` commits the offset; `Nack`
    /// reschedules with jittered backoff, or moves to DLQ past
    /// `max_attempts` (spec §4.3 "Backoff with jitter", "DLQ").
    pub fn complete(&self, group: &str, topic: &str, delivery: &Delivery, outcome: HandlerOutcome, now: Timestamp) -> Result<()> {
        match outcome {
            HandlerOutcome::Ack => {
                self.storage.atomic_batch(&[Write::OffsetCommit {
                    group: group.to_string(),
                    topic: topic.to_string(),
                    offset: delivery.offset + 1,
                }])?;
                let mut consumers = self.consumers.lock();
                if let Some(state) = consumers.get_mut(&(group.to_string(), topic.to_string())) {
                    state.in_flight.remove(&delivery.offset);
                }
                Ok(())
            }
            HandlerOutcome::Nack { reason, retry_after } => {
                let next_attempt = delivery.attempt + 1;
                if next_attempt >= self.config.max_attempts {
                    self.move_to_dlq(group, topic, delivery, &reason, now)?;
                    return Ok(());
                }
                let delay = retry_after.unwrap_or_else(|| self.backoff_delay(next_attempt));
                let mut consumers = self.consumers.lock();
                let state = consumers.entry((group.to_string(), topic.to_string())).or_insert_with(|| ConsumerState { in_flight: HashMap::new() });
                state.in_flight.insert(
                    delivery.offset,
                    InFlightEntry {
                        attempt: next_attempt,
                        next_visible_ts: Some(now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero())),
                    },
                );
                Ok(())
            }
        }
    }

    /// `clamp(B0 · 2^n, 0, Bmax) · (1 + U(-δ, +δ))` (spec §4.3).
    fn backoff_delay(&self, attempt: u32) -> std::time::Duration {
        let base = (self.config.backoff_base_ms as f64) * 2f64.powi(attempt as i32);
        let clamped = base.clamp(0.0, self.config.backoff_max_ms as f64);
        let delta = self.config.backoff_jitter;
        let jitter = rand::thread_rng().gen_range(-delta..=delta);
        let jittered = (clamped * (1.0 + jitter)).max(0.0);
        std::time::Duration::from_millis(jittered as u64)
    }

    fn move_to_dlq(&self, group: &str, topic: &str, delivery: &Delivery, reason: &str, now: Timestamp) -> Result<()> {
        let payload = serde_json::to_vec(&delivery.envelope).map_err(|e| BusError::HandlerError(e.to_string()))?;
        self.storage.atomic_batch(&[
            Write::DlqInsert(DlqRow {
                dlq_id: uuid::Uuid::new_v4().to_string(),
                group: group.to_string(),
                topic: topic.to_string(),
                event_id: delivery.envelope.id,
                last_error: reason.to_string(),
                attempts: delivery.attempt + 1,
                last_attempt_ts: now.to_rfc3339(),
                payload,
            }),
            Write::OffsetCommit { group: group.to_string(), topic: topic.to_string(), offset: delivery.offset + 1 },
        ])?;
        let mut consumers = self.consumers.lock();
        if let Some(state) = consumers.get_mut(&(group.to_string(), topic.to_string())) {
            state.in_flight.remove(&delivery.offset);
        }
        Ok(())
    }

    pub fn list_dlq(&self, topic: Option<&str>, group: Option<&str>) -> Result<Vec<DlqRow>> {
        Ok(self.storage.list_dlq(topic, group)?)
    }

    /// Re-publish a DLQ entry under a new offset with `replayed_from` set to
    /// break replay cycles while preserving the original `event_id` for
    /// handler-side dedup (spec §4.3 "DLQ").
    pub fn replay_dlq(&self, dlq_id: &str) -> Result<u64> {
        let rows = self.storage.list_dlq(None, None)?;
        let row = rows.into_iter().find(|r| r.dlq_id == dlq_id).ok_or_else(|| BusError::DlqNotFound(dlq_id.to_string()))?;
        let mut envelope: Envelope = serde_json::from_slice(&row.payload).map_err(|e| BusError::HandlerError(e.to_string()))?;
        envelope.replayed_from = Some(dlq_id.to_string());
        let offset = self.publish(&envelope)?;
        self.storage.atomic_batch(&[Write::DlqDelete { dlq_id: dlq_id.to_string() }])?;
        Ok(offset)
    }

    pub fn committed_offset(&self, group: &str, topic: &str) -> Result<u64> {
        Ok(self.storage.committed_offset(group, topic)?)
    }

    /// Drain events a [`crate::uow::UowHandle`] staged into the outbox table
    /// during its atomic commit and publish each onto its topic's WAL (spec
    /// §4.10 step 4: "commit triggers outbox publication of any new
    /// events"). A staged event's payload must already be a serialized
    /// [`Envelope`] — the outbox only guarantees atomicity with the episode
    /// write, not envelope construction. Malformed rows are marked published
    /// and skipped rather than retried forever.
    pub fn drain_outbox(&self, limit: usize) -> Result<usize> {
        let pending = self.storage.pending_outbox(limit)?;
        let mut published = 0;
        for (seq, _topic, envelope_json) in &pending {
            if let Ok(envelope) = serde_json::from_str::<Envelope>(envelope_json) {
                self.publish(&envelope)?;
            }
            self.storage.mark_outbox_published(*seq)?;
            published += 1;
        }
        Ok(published)
    }
}
