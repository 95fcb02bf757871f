//! Point-in-time snapshots (spec §4.1 `snapshot(space_id) -> SnapshotHandle`).
//!
//! A snapshot is a consistent copy of a space's KV files and WAL logs under
//! a destination directory, suitable for backup or rebuilding the temporal
//! and retrieval indices from scratch. Callers take it while holding the
//! space's writer lock so no concurrent `atomic_batch` or WAL append is
//! mid-flight.

use std::path::{Path, PathBuf};

use crate::ids::{SpaceId, Timestamp};

use super::{Result, StorageError};

/// A completed snapshot: the directory it was written to and when it was
/// taken.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    pub space_id: SpaceId,
    pub created_at: Timestamp,
    pub dir: PathBuf,
}

/// Copy every file under `space_root` (`kv/*.db*`, `wal/*.log`) into `dest`.
pub(super) fn take(
    space_root: &Path,
    dest: &Path,
    space_id: SpaceId,
    created_at: Timestamp,
) -> Result<SnapshotHandle> {
    std::fs::create_dir_all(dest)?;
    copy_tree(space_root, dest)?;
    Ok(SnapshotHandle { space_id, created_at, dir: dest.to_path_buf() })
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let target = dest.join(entry.file_name());
        if path.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_tree(&path, &target)?;
        } else {
            std::fs::copy(&path, &target).map_err(StorageError::Io)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::{EpisodeRow, Storage, Write};
    use crate::ids::{Band, SpaceId};
    use tempfile::tempdir;

    #[test]
    fn snapshot_copies_kv_and_wal_into_destination() {
        let data_dir = tempdir().unwrap();
        let snap_dir = tempdir().unwrap();
        let storage = Storage::new(data_dir.path());
        let space_id = SpaceId::new("alice");
        let space = storage.open_space(&space_id).unwrap();

        space
            .atomic_batch(&[Write::Episode(EpisodeRow {
                id: "ep1".into(),
                space_id: space_id.clone(),
                created_at: "2026-01-01T00:00:00Z".into(),
                band: Band::Green,
                payload: "{\"text\":\"hi\"}".into(),
                derived_from: vec![],
            })])
            .unwrap();
        space.wal_log("hippo.encode").unwrap().append(b"payload").unwrap();

        let handle = space.snapshot(snap_dir.path(), chrono::Utc::now()).unwrap();
        assert!(handle.dir.join("kv").join("episodes.db").exists());
        assert!(handle.dir.join("wal").join("hippo.encode.log").exists());
    }
}
