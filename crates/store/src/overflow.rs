use canonical::{CandidateRecord, Fingerprint};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::StoreError;

/// Identifier of an overflow segment, e.g. `seg-20261016T120000-0003`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persistent second tier behind the working set.
///
/// Keyed by fingerprint like a plain map, but organized in time-ordered
/// segments: reads fan out oldest segment first, writes land in the newest
/// one, and [`archive`](OverflowStore::archive) retires the oldest segment
/// from the read path.
///
/// All methods take `&self` so a store can be shared between the matcher and
/// a background evictor.
pub trait OverflowStore: Send + Sync {
    fn contains(&self, key: &Fingerprint) -> Result<bool, StoreError>;

    /// Fetch the record stored under `key`. A value that no longer decodes
    /// is reported as [`StoreError::Decode`].
    fn get(&self, key: &Fingerprint) -> Result<Option<CandidateRecord>, StoreError>;

    /// Fetch several keys at once. Results line up with `keys`.
    fn get_many(&self, keys: &[Fingerprint]) -> Vec<Result<Option<CandidateRecord>, StoreError>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    /// Upsert one record under its own fingerprint.
    fn set(&self, record: &CandidateRecord) -> Result<(), StoreError>;

    /// Upsert many records. Repeating the same batch leaves the store
    /// unchanged, so a failed batch can simply be retried.
    fn set_batch(&self, records: &[CandidateRecord]) -> Result<(), StoreError>;

    /// Remove `key` from whichever segment holds it. Returns whether it was
    /// present.
    fn delete(&self, key: &Fingerprint) -> Result<bool, StoreError>;

    /// Move the oldest segment out of the read path. Returns its id, or
    /// `None` when there was nothing to archive.
    fn archive(&self) -> Result<Option<SegmentId>, StoreError>;

    /// Number of active (searched) segments.
    fn section_count(&self) -> usize;

    /// Number of records across active segments.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every decodable record in active segments, oldest segment first.
    /// Undecodable values are skipped.
    fn scan(
        &self,
        visitor: &mut dyn FnMut(CandidateRecord) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;

    /// Drop every entry whose fingerprint decodes to fewer than `min_letters`
    /// letters. Returns the number removed.
    fn purge_short(&self, min_letters: usize) -> Result<usize, StoreError>;

    /// Persist buffered writes and metadata.
    fn flush(&self) -> Result<(), StoreError>;
}
