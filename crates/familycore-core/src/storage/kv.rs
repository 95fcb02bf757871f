//! Per-space KV tables (episodes, receipts, outbox, idempotency, consumer
//! offsets, DLQ), backed by SQLite and laid out per spec §5 as separate
//! files under `kv/` — `episodes.db`, `receipts.db`, `idem.db`,
//! `offsets.db`, `dlq.db`. They are `ATTACH`ed onto one connection so
//! `atomic_batch` can commit a single transaction that spans all five,
//! the same role the teacher's single `Connection` plays for its one-file
//! schema.

use rusqlite::{params, Connection, OptionalExtension};

use crate::ids::{Band, EventId, SpaceId};

use super::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Open the writer or reader connection for a space's five attached KV
/// files and ensure the schema exists.
pub fn open(kv_dir: &std::path::Path) -> Result<Connection> {
    std::fs::create_dir_all(kv_dir)?;
    let conn = Connection::open(kv_dir.join("episodes.db"))?;
    configure(&conn)?;
    for (schema, file) in [
        ("receipts", "receipts.db"),
        ("idem", "idem.db"),
        ("offsets", "offsets.db"),
        ("dlq", "dlq.db"),
    ] {
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS {schema}"),
            params![kv_dir.join(file).to_string_lossy()],
        )?;
    }
    apply_schema(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS main.episodes (
            id TEXT PRIMARY KEY,
            space_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            band TEXT NOT NULL,
            payload TEXT NOT NULL,
            derived_from TEXT NOT NULL DEFAULT '[]',
            tombstoned INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_episodes_created_at ON main.episodes(created_at);

        CREATE TABLE IF NOT EXISTS receipts.receipts (
            receipt_id TEXT PRIMARY KEY,
            idem_key TEXT,
            stores_touched TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS receipts.outbox (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL,
            envelope_json TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_outbox_status ON receipts.outbox(status);

        CREATE TABLE IF NOT EXISTS idem.idem (
            idem_key TEXT PRIMARY KEY,
            receipt_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS offsets.offsets (
            group_name TEXT NOT NULL,
            topic TEXT NOT NULL,
            committed_offset INTEGER NOT NULL,
            PRIMARY KEY (group_name, topic)
        );

        CREATE TABLE IF NOT EXISTS dlq.dlq (
            dlq_id TEXT PRIMARY KEY,
            group_name TEXT NOT NULL,
            topic TEXT NOT NULL,
            event_id TEXT NOT NULL,
            last_error TEXT NOT NULL,
            attempts INTEGER NOT NULL,
            last_attempt_ts TEXT NOT NULL,
            payload BLOB NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dlq_topic_group ON dlq.dlq(topic, group_name);",
    )?;
    Ok(())
}

/// One row staged by the Unit of Work (C2) before `commit`.
#[derive(Debug, Clone)]
pub struct EpisodeRow {
    pub id: String,
    pub space_id: SpaceId,
    pub created_at: String,
    pub band: Band,
    pub payload: String,
    pub derived_from: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReceiptRow {
    pub receipt_id: String,
    pub idem_key: Option<String>,
    pub stores_touched: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub topic: String,
    pub envelope_json: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct DlqRow {
    pub dlq_id: String,
    pub group: String,
    pub topic: String,
    pub event_id: EventId,
    pub last_error: String,
    pub attempts: u32,
    pub last_attempt_ts: String,
    pub payload: Vec<u8>,
}

/// One write staged into an atomic batch (spec §4.1 `atomic_batch`).
#[derive(Debug, Clone)]
pub enum Write {
    Episode(EpisodeRow),
    Receipt(ReceiptRow),
    Outbox(OutboxRow),
    Idem { idem_key: String, receipt_id: String, created_at: String },
    OffsetCommit { group: String, topic: String, offset: u64 },
    DlqInsert(DlqRow),
    DlqDelete { dlq_id: String },
}

/// Commit every write in `writes` as a single SQLite transaction spanning
/// all five attached KV files.
pub fn atomic_batch(conn: &mut Connection, writes: &[Write]) -> Result<()> {
    let tx = conn.transaction()?;
    for write in writes {
        match write {
            Write::Episode(row) => {
                tx.execute(
                    "INSERT INTO main.episodes (id, space_id, created_at, band, payload, derived_from)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
                    params![
                        row.id,
                        row.space_id.as_str(),
                        row.created_at,
                        row.band.as_str(),
                        row.payload,
                        serde_json::to_string(&row.derived_from).unwrap_or_else(|_| "[]".into()),
                    ],
                )?;
            }
            Write::Receipt(row) => {
                tx.execute(
                    "INSERT INTO receipts.receipts (receipt_id, idem_key, stores_touched, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        row.receipt_id,
                        row.idem_key,
                        serde_json::to_string(&row.stores_touched).unwrap_or_else(|_| "[]".into()),
                        row.created_at,
                    ],
                )?;
            }
            Write::Outbox(row) => {
                tx.execute(
                    "INSERT INTO receipts.outbox (topic, envelope_json, status, created_at)
                     VALUES (?1, ?2, 'pending', ?3)",
                    params![row.topic, row.envelope_json, row.created_at],
                )?;
            }
            Write::Idem { idem_key, receipt_id, created_at } => {
                tx.execute(
                    "INSERT OR IGNORE INTO idem.idem (idem_key, receipt_id, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![idem_key, receipt_id, created_at],
                )?;
            }
            Write::OffsetCommit { group, topic, offset } => {
                tx.execute(
                    "INSERT INTO offsets.offsets (group_name, topic, committed_offset)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(group_name, topic) DO UPDATE SET committed_offset = excluded.committed_offset",
                    params![group, topic, *offset as i64],
                )?;
            }
            Write::DlqInsert(row) => {
                tx.execute(
                    "INSERT INTO dlq.dlq (dlq_id, group_name, topic, event_id, last_error, attempts, last_attempt_ts, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        row.dlq_id,
                        row.group,
                        row.topic,
                        row.event_id.to_string(),
                        row.last_error,
                        row.attempts,
                        row.last_attempt_ts,
                        row.payload,
                    ],
                )?;
            }
            Write::DlqDelete { dlq_id } => {
                tx.execute("DELETE FROM dlq.dlq WHERE dlq_id = ?1", params![dlq_id])?;
            }
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn lookup_idem(conn: &Connection, idem_key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT receipt_id FROM idem.idem WHERE idem_key = ?1",
        params![idem_key],
        |row| row.get(0),
    )
    .optional()
    .map_err(StorageError::from)
}

pub fn lookup_receipt(conn: &Connection, receipt_id: &str) -> Result<Option<ReceiptRow>> {
    conn.query_row(
        "SELECT receipt_id, idem_key, stores_touched, created_at FROM receipts.receipts WHERE receipt_id = ?1",
        params![receipt_id],
        |row| {
            let stores_touched_json: String = row.get(2)?;
            Ok(ReceiptRow {
                receipt_id: row.get(0)?,
                idem_key: row.get(1)?,
                stores_touched: serde_json::from_str(&stores_touched_json).unwrap_or_default(),
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(StorageError::from)
}

pub fn committed_offset(conn: &Connection, group: &str, topic: &str) -> Result<u64> {
    conn.query_row(
        "SELECT committed_offset FROM offsets.offsets WHERE group_name = ?1 AND topic = ?2",
        params![group, topic],
        |row| row.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.unwrap_or(0) as u64)
    .map_err(StorageError::from)
}

pub fn pending_outbox(conn: &Connection, limit: usize) -> Result<Vec<(i64, String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT seq, topic, envelope_json FROM receipts.outbox WHERE status = 'pending' ORDER BY seq ASC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_outbox_published(conn: &Connection, seq: i64) -> Result<()> {
    conn.execute(
        "UPDATE receipts.outbox SET status = 'published' WHERE seq = ?1",
        params![seq],
    )?;
    Ok(())
}

pub fn list_dlq(conn: &Connection, topic: Option<&str>, group: Option<&str>) -> Result<Vec<DlqRow>> {
    let mut sql = "SELECT dlq_id, group_name, topic, event_id, last_error, attempts, last_attempt_ts, payload FROM dlq.dlq WHERE 1=1".to_string();
    if topic.is_some() {
        sql.push_str(" AND topic = ?1");
    }
    if group.is_some() {
        sql.push_str(if topic.is_some() { " AND group_name = ?2" } else { " AND group_name = ?1" });
    }
    let mut stmt = conn.prepare(&sql)?;
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = Vec::new();
    if let Some(t) = topic {
        params_vec.push(t);
    }
    if let Some(g) = group {
        params_vec.push(g);
    }
    let rows = stmt
        .query_map(params_vec.as_slice(), |row| {
            Ok(DlqRow {
                dlq_id: row.get(0)?,
                group: row.get(1)?,
                topic: row.get(2)?,
                event_id: row.get::<_, String>(3)?.parse().unwrap_or_default(),
                last_error: row.get(4)?,
                attempts: row.get(5)?,
                last_attempt_ts: row.get(6)?,
                payload: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_conn() -> (tempfile::TempDir, Connection) {
        let dir = tempdir().unwrap();
        let conn = open(dir.path()).unwrap();
        (dir, conn)
    }

    #[test]
    fn idem_insert_is_conflict_free_and_returns_same_receipt() {
        let (_dir, mut conn) = test_conn();
        atomic_batch(
            &mut conn,
            &[Write::Idem {
                idem_key: "k1".into(),
                receipt_id: "r1".into(),
                created_at: "2026-01-01T00:00:00Z".into(),
            }],
        )
        .unwrap();
        assert_eq!(lookup_idem(&conn, "k1").unwrap(), Some("r1".to_string()));

        // A second insert with the same key is a no-op (OR IGNORE).
        atomic_batch(
            &mut conn,
            &[Write::Idem {
                idem_key: "k1".into(),
                receipt_id: "r2".into(),
                created_at: "2026-01-01T00:00:01Z".into(),
            }],
        )
        .unwrap();
        assert_eq!(lookup_idem(&conn, "k1").unwrap(), Some("r1".to_string()));
    }

    #[test]
    fn offset_commit_is_monotone_upsert() {
        let (_dir, mut conn) = test_conn();
        atomic_batch(
            &mut conn,
            &[Write::OffsetCommit { group: "g".into(), topic: "t".into(), offset: 3 }],
        )
        .unwrap();
        atomic_batch(
            &mut conn,
            &[Write::OffsetCommit { group: "g".into(), topic: "t".into(), offset: 7 }],
        )
        .unwrap();
        assert_eq!(committed_offset(&conn, "g", "t").unwrap(), 7);
    }

    #[test]
    fn outbox_drains_pending_in_order() {
        let (_dir, mut conn) = test_conn();
        atomic_batch(
            &mut conn,
            &[
                Write::Outbox(OutboxRow { topic: "a".into(), envelope_json: "{}".into(), created_at: "t".into() }),
                Write::Outbox(OutboxRow { topic: "b".into(), envelope_json: "{}".into(), created_at: "t".into() }),
            ],
        )
        .unwrap();
        let pending = pending_outbox(&conn, 10).unwrap();
        assert_eq!(pending.len(), 2);
        mark_outbox_published(&conn, pending[0].0).unwrap();
        assert_eq!(pending_outbox(&conn, 10).unwrap().len(), 1);
    }
}
