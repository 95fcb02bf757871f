//! Append-only per-topic WAL log (spec §4.1, §4.3, §5 file layout).
//!
//! Records are length-prefixed and checksummed with CRC32C so a crash mid
//! write leaves a truncatable tail: `open` scans the whole file and
//! truncates it at the first incomplete or checksum-mismatched record,
//! matching the "partial writes are truncated on restart by checksum scan"
//! contract.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write as _};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

const RECORD_HEADER_LEN: usize = 8; // u32 len (LE) + u32 crc32c (LE)

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("wal record corrupted at sequence {0}")]
    Corrupted(u64),
}

pub type Result<T> = std::result::Result<T, WalError>;

/// One on-disk record, as returned by [`WalLog::replay`].
#[derive(Debug, Clone)]
pub struct WalRecord {
    pub offset: u64,
    pub payload: Vec<u8>,
}

struct Inner {
    file: File,
    next_offset: u64,
    /// Byte offset of each record's header, indexed by its sequence number.
    /// Lets [`WalLog::read_at`] seek directly instead of rescanning.
    positions: Vec<u64>,
}

/// A single topic's append-only log. One `WalLog` per `(space, topic)`,
/// living at `wal/<topic>.log` under the space's data directory.
pub struct WalLog {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl WalLog {
    /// Open (creating if absent) and recover by scanning every record from
    /// the start, truncating at the first invalid tail.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let (positions, valid_len) = Self::scan(&mut file)?;
        file.set_len(valid_len)?;
        file.seek(SeekFrom::End(0))?;
        let next_offset = positions.len() as u64;

        Ok(Self {
            path,
            inner: Mutex::new(Inner { file, next_offset, positions }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `(record_start_positions, valid_byte_len)`. Bytes past
    /// `valid_byte_len` are an incomplete or corrupt tail and are discarded
    /// by `open`.
    fn scan(file: &mut File) -> Result<(Vec<u64>, u64)> {
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut *file);
        let mut pos: u64 = 0;
        let mut positions = Vec::new();
        loop {
            let mut header = [0u8; RECORD_HEADER_LEN];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
            let want_crc = u32::from_le_bytes(header[4..8].try_into().unwrap());
            let mut payload = vec![0u8; len];
            if reader.read_exact(&mut payload).is_err() {
                break;
            }
            if crc32c::crc32c(&payload) != want_crc {
                break;
            }
            positions.push(pos);
            pos += (RECORD_HEADER_LEN + len) as u64;
        }
        Ok((positions, pos))
    }

    fn encode(buf: &mut Vec<u8>, payload: &[u8]) {
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&crc32c::crc32c(payload).to_le_bytes());
        buf.extend_from_slice(payload);
    }

    /// Append one record, fsyncing before returning. The returned offset is
    /// the record's 0-based sequence number within this topic, strictly
    /// increasing per spec §4.1.
    pub fn append(&self, payload: &[u8]) -> Result<u64> {
        let mut inner = self.inner.lock();
        let offset = inner.next_offset;
        let pos = inner.file.stream_position()?;
        let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
        Self::encode(&mut buf, payload);
        inner.file.write_all(&buf)?;
        inner.file.sync_data()?;
        inner.positions.push(pos);
        inner.next_offset += 1;
        Ok(offset)
    }

    /// Append a batch with a single trailing fsync, the group-flush tick
    /// the Bus uses to bound publish latency (spec §4.3, default 5 ms).
    pub fn append_batch(&self, payloads: &[Vec<u8>]) -> Result<Vec<u64>> {
        let mut inner = self.inner.lock();
        let mut offsets = Vec::with_capacity(payloads.len());
        let mut buf = Vec::new();
        let mut pos = inner.file.stream_position()?;
        for payload in payloads {
            offsets.push(inner.next_offset);
            inner.positions.push(pos);
            let before = buf.len();
            Self::encode(&mut buf, payload);
            pos += (buf.len() - before) as u64;
            inner.next_offset += 1;
        }
        inner.file.write_all(&buf)?;
        inner.file.sync_data()?;
        Ok(offsets)
    }

    /// Random-access read of one record by its sequence number, used by bus
    /// consumers to fetch the record at a given committed offset without
    /// rescanning the whole log.
    pub fn read_at(&self, offset: u64) -> Result<Option<WalRecord>> {
        let inner = self.inner.lock();
        let Some(&pos) = inner.positions.get(offset as usize) else {
            return Ok(None);
        };
        let mut file = inner.file.try_clone()?;
        drop(inner);
        file.seek(SeekFrom::Start(pos))?;
        let mut header = [0u8; RECORD_HEADER_LEN];
        file.read_exact(&mut header)?;
        let len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
        let want_crc = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let mut payload = vec![0u8; len];
        file.read_exact(&mut payload)?;
        if crc32c::crc32c(&payload) != want_crc {
            return Err(WalError::Corrupted(offset));
        }
        Ok(Some(WalRecord { offset, payload }))
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().next_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replay every record from the start, used by snapshot/index-rebuild
    /// and by `familycore space verify`.
    pub fn replay(&self) -> Result<Vec<WalRecord>> {
        let inner = self.inner.lock();
        let mut file = inner.file.try_clone()?;
        drop(inner);
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        let mut offset = 0u64;
        loop {
            let mut header = [0u8; RECORD_HEADER_LEN];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
            let want_crc = u32::from_le_bytes(header[4..8].try_into().unwrap());
            let mut payload = vec![0u8; len];
            reader.read_exact(&mut payload)?;
            if crc32c::crc32c(&payload) != want_crc {
                return Err(WalError::Corrupted(offset));
            }
            records.push(WalRecord { offset, payload });
            offset += 1;
        }
        Ok(records)
    }

    /// Bytes on disk, feeding the `wal_bytes` gauge and retention checks.
    pub fn byte_len(&self) -> Result<u64> {
        Ok(self.inner.lock().file.metadata()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_replay_round_trips_payload() {
        let dir = tempdir().unwrap();
        let log = WalLog::open(dir.path().join("hippo.encode.log")).unwrap();
        let off0 = log.append(b"first").unwrap();
        let off1 = log.append(b"second").unwrap();
        assert_eq!(off0, 0);
        assert_eq!(off1, 1);
        let records = log.replay().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, b"first");
        assert_eq!(records[1].payload, b"second");
    }

    #[test]
    fn reopen_recovers_offsets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.log");
        {
            let log = WalLog::open(&path).unwrap();
            log.append(b"a").unwrap();
            log.append(b"b").unwrap();
        }
        let log = WalLog::open(&path).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.append(b"c").unwrap(), 2);
    }

    #[test]
    fn truncates_corrupted_tail_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.log");
        {
            let log = WalLog::open(&path).unwrap();
            log.append(b"good").unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[1, 2, 3]).unwrap();
        }
        let log = WalLog::open(&path).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.replay().unwrap().len(), 1);
    }

    #[test]
    fn read_at_fetches_one_record_without_scanning() {
        let dir = tempdir().unwrap();
        let log = WalLog::open(dir.path().join("t.log")).unwrap();
        log.append(b"a").unwrap();
        log.append(b"bb").unwrap();
        log.append(b"ccc").unwrap();
        assert_eq!(log.read_at(1).unwrap().unwrap().payload, b"bb");
        assert_eq!(log.read_at(0).unwrap().unwrap().payload, b"a");
        assert!(log.read_at(99).unwrap().is_none());
    }

    #[test]
    fn append_batch_shares_a_single_fsync() {
        let dir = tempdir().unwrap();
        let log = WalLog::open(dir.path().join("t.log")).unwrap();
        let offsets = log
            .append_batch(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
            .unwrap();
        assert_eq!(offsets, vec![0, 1, 2]);
        assert_eq!(log.len(), 3);
    }
}
