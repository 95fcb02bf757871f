//! Unit of Work (C2, spec §4.2).
//!
//! Groups writes across the episode store, receipt ledger, and outbox into
//! one atomic substrate commit, with an idempotency ledger keyed by
//! `idem_key` so a duplicate commit returns the prior receipt instead of
//! writing again. Staged secondary-index updates run only after the
//! substrate commit succeeds — they're rebuildable from the WAL, so their
//! failure does not roll back the commit, only degrades the derived index
//! until the next rebuild.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::{Classify, ErrorKind};
use crate::ids::{ActorRef, Band, SpaceId, Timestamp};
use crate::storage::{self, EpisodeRow, OutboxRow, SpaceStorage};

#[derive(Debug, thiserror::Error)]
pub enum UowError {
    #[error("substrate error: {0}")]
    Substrate(#[from] storage::StorageError),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("policy denied: {0}")]
    PolicyDenied(String),
}

impl Classify for UowError {
    fn kind(&self) -> ErrorKind {
        match self {
            UowError::Substrate(e) => e.kind(),
            UowError::Conflict(_) => ErrorKind::InvariantViolation,
            UowError::PolicyDenied(_) => ErrorKind::PolicyDenial,
        }
    }
}

pub type Result<T> = std::result::Result<T, UowError>;

/// One episode to be written atomically with its receipt (spec §3 `Episode`).
#[derive(Debug, Clone)]
pub struct EpisodeDraft {
    pub id: String,
    pub band: Band,
    pub payload: serde_json::Value,
    pub derived_from: Vec<String>,
}

/// Receipt returned by `commit`, matching spec §3's `Receipt` shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub receipt_id: String,
    pub event_id: Option<String>,
    pub uow_id: String,
    pub ts: String,
    pub stores_touched: Vec<String>,
    pub bytes_written: usize,
    pub reasons: Vec<String>,
    /// True if this receipt was returned from the idempotency ledger rather
    /// than produced by a fresh commit (spec §4.2: "returns the existing
    /// receipt without side effects").
    pub duplicate: bool,
}

/// Compute the idempotency key `sha256(actor.id | device.id | payload_sha256)`
/// described in spec §3's Idempotency record, generalized to any caller-
/// supplied discriminator (pipeline name, event id, ...).
pub fn derive_idem_key(actor: &ActorRef, discriminator: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(actor.person_id.as_bytes());
    hasher.update(b"|");
    hasher.update(actor.device_id.as_bytes());
    hasher.update(b"|");
    hasher.update(discriminator.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// An open, uncommitted unit of work. Stage writes with `stage_*`, then call
/// `commit`.
pub struct UowHandle {
    storage: Arc<SpaceStorage>,
    space_id: SpaceId,
    uow_id: String,
    idem_key: Option<String>,
    existing_receipt: Option<String>,
    writes: Vec<storage::Write>,
    stores_touched: Vec<String>,
    post_commit: Vec<Box<dyn FnOnce() + Send>>,
    staged_events: Vec<(String, serde_json::Value)>,
}

impl UowHandle {
    /// Stage a new episode write.
    pub fn stage_episode(&mut self, ep: EpisodeDraft, now: Timestamp) {
        self.writes.push(storage::Write::Episode(EpisodeRow {
            id: ep.id,
            space_id: self.space_id.clone(),
            created_at: now.to_rfc3339(),
            band: ep.band,
            payload: ep.payload.to_string(),
            derived_from: ep.derived_from,
        }));
        push_unique(&mut self.stores_touched, "episodes");
    }

    /// Stage a secondary-index update (temporal bitmap insert, lexical
    /// posting, sparse vector row). Runs only after a successful commit;
    /// these indices are rebuildable from the WAL so they are not part of
    /// the atomic batch.
    pub fn stage_index<F>(&mut self, update: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_commit.push(Box::new(update));
        push_unique(&mut self.stores_touched, "index");
    }

    /// Stage an outbox event to be published to the Bus after commit.
    pub fn stage_event(&mut self, topic: impl Into<String>, payload: serde_json::Value) {
        self.staged_events.push((topic.into(), payload));
        push_unique(&mut self.stores_touched, "outbox");
    }

    /// Record an additional store touched by this unit of work, folded into
    /// the receipt's `stores_touched`. Used by handlers that write through a
    /// store this UoW doesn't model directly (e.g. a rollup annotation).
    pub fn stage_receipt(&mut self, store: impl Into<String>) {
        push_unique(&mut self.stores_touched, &store.into());
    }

    /// Commit every staged write as a single atomic transaction, then run
    /// post-commit index updates and return the resulting receipt.
    pub fn commit(mut self, now: Timestamp) -> Result<Receipt> {
        if let Some(receipt_id) = self.existing_receipt.take() {
            return Ok(Receipt {
                receipt_id,
                event_id: None,
                uow_id: self.uow_id,
                ts: now.to_rfc3339(),
                stores_touched: Vec::new(),
                bytes_written: 0,
                reasons: vec!["idempotency ledger hit".to_string()],
                duplicate: true,
            });
        }

        let receipt_id = crate::ids::EventId::new().to_string();
        let bytes_written: usize = self
            .writes
            .iter()
            .map(|w| match w {
                storage::Write::Episode(e) => e.payload.len(),
                storage::Write::Outbox(o) => o.envelope_json.len(),
                _ => 0,
            })
            .sum();

        let mut writes = std::mem::take(&mut self.writes);
        for (topic, payload) in &self.staged_events {
            writes.push(storage::Write::Outbox(OutboxRow {
                topic: topic.clone(),
                envelope_json: payload.to_string(),
                created_at: now.to_rfc3339(),
            }));
        }
        writes.push(storage::Write::Receipt(storage::ReceiptRow {
            receipt_id: receipt_id.clone(),
            idem_key: self.idem_key.clone(),
            stores_touched: self.stores_touched.clone(),
            created_at: now.to_rfc3339(),
        }));
        if let Some(idem_key) = &self.idem_key {
            writes.push(storage::Write::Idem {
                idem_key: idem_key.clone(),
                receipt_id: receipt_id.clone(),
                created_at: now.to_rfc3339(),
            });
        }

        self.storage.atomic_batch(&writes)?;

        for update in std::mem::take(&mut self.post_commit) {
            update();
        }

        Ok(Receipt {
            receipt_id,
            event_id: None,
            uow_id: self.uow_id,
            ts: now.to_rfc3339(),
            stores_touched: self.stores_touched.clone(),
            bytes_written,
            reasons: Vec::new(),
            duplicate: false,
        })
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|s| s == item) {
        list.push(item.to_string());
    }
}

/// Entry point for opening units of work against one space.
pub struct UnitOfWork {
    storage: Arc<SpaceStorage>,
}

impl UnitOfWork {
    pub fn new(storage: Arc<SpaceStorage>) -> Self {
        Self { storage }
    }

    /// Begin a unit of work. If `idem_key` hits the ledger, the returned
    /// handle's `commit` short-circuits to the existing receipt with zero
    /// new writes (spec §4.2).
    pub fn begin(&self, space_id: SpaceId, idem_key: Option<String>) -> Result<UowHandle> {
        let existing_receipt = match &idem_key {
            Some(key) => self.storage.lookup_idem(key)?,
            None => None,
        };
        Ok(UowHandle {
            storage: self.storage.clone(),
            space_id,
            uow_id: crate::ids::EventId::new().to_string(),
            idem_key,
            existing_receipt,
            writes: Vec::new(),
            stores_touched: Vec::new(),
            post_commit: Vec::new(),
            staged_events: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn test_space() -> Arc<SpaceStorage> {
        let dir = tempdir().unwrap();
        // Leak the tempdir so its files outlive this function; tests are
        // short-lived processes so this is acceptable here.
        let path = dir.into_path();
        let storage = Storage::new(path);
        storage.open_space(&SpaceId::new("s1")).unwrap()
    }

    #[test]
    fn commit_is_atomic_and_returns_a_receipt() {
        let space = test_space();
        let uow = UnitOfWork::new(space.clone());
        let mut handle = uow.begin(SpaceId::new("s1"), None).unwrap();
        handle.stage_episode(
            EpisodeDraft {
                id: "ep1".into(),
                band: Band::Green,
                payload: serde_json::json!({"text": "hi"}),
                derived_from: vec![],
            },
            chrono::Utc::now(),
        );
        handle.stage_event("hippo.encode", serde_json::json!({"episode_id": "ep1"}));
        let receipt = handle.commit(chrono::Utc::now()).unwrap();
        assert!(!receipt.duplicate);
        assert!(receipt.stores_touched.contains(&"episodes".to_string()));
        assert!(receipt.stores_touched.contains(&"outbox".to_string()));

        let pending = space.pending_outbox(10).unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn duplicate_idem_key_returns_same_receipt_with_zero_new_writes() {
        let space = test_space();
        let uow = UnitOfWork::new(space.clone());
        let key = derive_idem_key(&ActorRef::new("alice", "phone-1"), "p01|evt-1");

        let mut first = uow.begin(SpaceId::new("s1"), Some(key.clone())).unwrap();
        first.stage_episode(
            EpisodeDraft { id: "ep1".into(), band: Band::Green, payload: serde_json::json!({}), derived_from: vec![] },
            chrono::Utc::now(),
        );
        let receipt_a = first.commit(chrono::Utc::now()).unwrap();

        let second = uow.begin(SpaceId::new("s1"), Some(key)).unwrap();
        let receipt_b = second.commit(chrono::Utc::now()).unwrap();

        assert_eq!(receipt_a.receipt_id, receipt_b.receipt_id);
        assert!(receipt_b.duplicate);
    }

    #[test]
    fn post_commit_index_updates_run_only_after_commit() {
        let space = test_space();
        let uow = UnitOfWork::new(space.clone());
        let mut handle = uow.begin(SpaceId::new("s1"), None).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        handle.stage_index(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        handle.commit(chrono::Utc::now()).unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
