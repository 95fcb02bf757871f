//! Isolated, on-disk test space: one temp directory per test, torn down on
//! drop. Mirrors how the operator CLI wires a space (config → `Storage` →
//! `SpaceStorage` → `Bus`) so the scenario tests exercise the real wiring.

use std::sync::Arc;

use familycore_core::{Bus, CoreConfig, SpaceId, SpaceStorage, Storage};
use tempfile::TempDir;

pub struct TestSpace {
    /// `None` for a handle returned by `reopen`, which shares the temp
    /// directory owned by the `TestSpace` it was reopened from.
    _temp_dir: Option<TempDir>,
    pub config: CoreConfig,
    pub space_id: SpaceId,
    pub storage: Arc<SpaceStorage>,
    pub bus: Bus,
}

impl TestSpace {
    pub fn new(space: &str) -> Self {
        Self::with_config(space, CoreConfig::default())
    }

    pub fn with_config(space: &str, mut config: CoreConfig) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        config.data_dir = temp_dir.path().to_path_buf();

        let space_id = SpaceId::new(space);
        let root = Storage::new(config.data_dir.clone());
        let storage = root.open_space(&space_id).expect("failed to open test space");
        let bus = Bus::new(storage.clone(), config.bus.clone());

        Self { _temp_dir: Some(temp_dir), config, space_id, storage, bus }
    }

    /// Re-open the same on-disk space under a fresh `Storage`/`Bus` pair,
    /// simulating a process restart against durable state. The returned
    /// handle borrows the original's temp directory lifetime, so `self`
    /// must outlive it.
    pub fn reopen(&self) -> Self {
        let root = Storage::new(self.config.data_dir.clone());
        let storage = root.open_space(&self.space_id).expect("failed to reopen test space");
        let bus = Bus::new(storage.clone(), self.config.bus.clone());
        Self {
            _temp_dir: None,
            config: self.config.clone(),
            space_id: self.space_id.clone(),
            storage,
            bus,
        }
    }
}
