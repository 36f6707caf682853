//! Overflow store configuration.
//!
//! ```yaml
//! store:
//!   backend:
//!     kind: redb
//!     dir: /var/lib/anagrammatic/overflow
//!   segment_capacity: 2000000
//!   compression:
//!     codec: none
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::codec::CompressionConfig;
use crate::segmented::SegmentedStore;
use crate::StoreError;

/// Default number of records per segment before rotation.
pub const DEFAULT_SEGMENT_CAPACITY: usize = 2_000_000;

/// Where overflow segments live.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Segments are in-memory maps; archived segments are discarded.
    #[default]
    InMemory,
    /// One redb file per segment under `dir`, with `dir/archive/` for
    /// archived segments and `dir/meta.json` for metadata.
    Redb { dir: PathBuf },
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<PathBuf>>(dir: P) -> Self {
        BackendConfig::Redb { dir: dir.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    /// Records per segment before a new write segment is opened.
    pub segment_capacity: usize,
    pub compression: CompressionConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            compression: CompressionConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_segment_capacity(mut self, capacity: usize) -> Self {
        self.segment_capacity = capacity;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.segment_capacity == 0 {
            return Err(StoreError::InvalidConfig(
                "segment_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Open the configured overflow store.
    pub fn open(&self) -> Result<SegmentedStore, StoreError> {
        SegmentedStore::open(self)
    }
}
