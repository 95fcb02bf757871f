//! Storage Substrate (C1, spec §4.1).
//!
//! A durable single-writer local store per space: a SQLite-backed set of KV
//! tables (episodes, receipts, idempotency, offsets, DLQ — see [`kv`]) plus
//! one append-only, checksummed WAL log per topic (see [`wal`]). Writes to
//! the KV tables are committed as a single atomic transaction
//! ([`SpaceStorage::atomic_batch`]); WAL appends are independent per topic,
//! matching the spec's "ordering within a topic, no order across topics".

pub mod kv;
pub mod snapshot;
pub mod wal;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::{Classify, ErrorKind};
use crate::ids::SpaceId;

pub use kv::{DlqRow, EpisodeRow, OutboxRow, ReceiptRow, Write};
pub use snapshot::SnapshotHandle;
pub use wal::{WalLog, WalRecord};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal error: {0}")]
    Wal(#[from] wal::WalError),
    #[error("space not found: {0}")]
    SpaceNotFound(String),
    #[error("disk full")]
    DiskFull,
    #[error("storage busy: per-topic write queue exceeds high-watermark")]
    Busy,
}

impl Classify for StorageError {
    fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Busy => ErrorKind::Busy,
            StorageError::SpaceNotFound(_) => ErrorKind::InvariantViolation,
            StorageError::Database(_) | StorageError::Io(_) | StorageError::Wal(_) | StorageError::DiskFull => {
                ErrorKind::SubstrateFailure
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Handles and connections scoped to a single space. Open via
/// [`Storage::open_space`]; never constructed directly.
pub struct SpaceStorage {
    space_id: SpaceId,
    root: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    wal_logs: Mutex<HashMap<String, Arc<WalLog>>>,
}

impl SpaceStorage {
    fn open(root: PathBuf, space_id: SpaceId) -> Result<Self> {
        let kv_dir = root.join("kv");
        let writer = kv::open(&kv_dir)?;
        let reader = kv::open(&kv_dir)?;
        Ok(Self {
            space_id,
            root,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            wal_logs: Mutex::new(HashMap::new()),
        })
    }

    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    /// The append-only log for one topic, opened and cached on first use.
    pub fn wal_log(&self, topic: &str) -> Result<Arc<WalLog>> {
        let mut logs = self.wal_logs.lock();
        if let Some(log) = logs.get(topic) {
            return Ok(log.clone());
        }
        let safe_topic: String = topic
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        let log = Arc::new(WalLog::open(self.root.join("wal").join(format!("{safe_topic}.log")))?);
        logs.insert(topic.to_string(), log.clone());
        Ok(log)
    }

    /// Commit `writes` as a single atomic transaction across the five
    /// attached KV files (spec §4.1 `atomic_batch`).
    pub fn atomic_batch(&self, writes: &[Write]) -> Result<()> {
        let mut conn = self.writer.lock();
        kv::atomic_batch(&mut conn, writes)
    }

    pub fn lookup_idem(&self, idem_key: &str) -> Result<Option<String>> {
        kv::lookup_idem(&self.reader.lock(), idem_key)
    }

    pub fn lookup_receipt(&self, receipt_id: &str) -> Result<Option<ReceiptRow>> {
        kv::lookup_receipt(&self.reader.lock(), receipt_id)
    }

    pub fn committed_offset(&self, group: &str, topic: &str) -> Result<u64> {
        kv::committed_offset(&self.reader.lock(), group, topic)
    }

    pub fn pending_outbox(&self, limit: usize) -> Result<Vec<(i64, String, String)>> {
        kv::pending_outbox(&self.reader.lock(), limit)
    }

    pub fn mark_outbox_published(&self, seq: i64) -> Result<()> {
        kv::mark_outbox_published(&self.writer.lock(), seq)
    }

    pub fn list_dlq(&self, topic: Option<&str>, group: Option<&str>) -> Result<Vec<DlqRow>> {
        kv::list_dlq(&self.reader.lock(), topic, group)
    }

    /// Point-in-time consistent snapshot of this space's KV tables and WAL
    /// logs, suitable for backup or index-rebuild (spec §4.1).
    pub fn snapshot(&self, dest: &std::path::Path, now: crate::ids::Timestamp) -> Result<SnapshotHandle> {
        let _guard = self.writer.lock();
        for log in self.wal_logs.lock().values() {
            log.byte_len()?;
        }
        snapshot::take(&self.root, dest, self.space_id.clone(), now)
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

/// Top-level handle to the storage substrate: opens and caches one
/// [`SpaceStorage`] per space under a common data directory.
pub struct Storage {
    root: PathBuf,
    spaces: Mutex<HashMap<SpaceId, Arc<SpaceStorage>>>,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            spaces: Mutex::new(HashMap::new()),
        }
    }

    /// Open (creating on first use) the handle for `space_id`.
    pub fn open_space(&self, space_id: &SpaceId) -> Result<Arc<SpaceStorage>> {
        let mut spaces = self.spaces.lock();
        if let Some(space) = spaces.get(space_id) {
            return Ok(space.clone());
        }
        let space_root = self.root.join("spaces").join(space_id.path_safe());
        std::fs::create_dir_all(&space_root)?;
        let space = Arc::new(SpaceStorage::open(space_root, space_id.clone())?);
        spaces.insert(space_id.clone(), space.clone());
        Ok(space)
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}
