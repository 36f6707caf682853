//! # Anagram candidate storage
//!
//! Two tiers keyed by [`Fingerprint`](canonical::Fingerprint):
//!
//! - [`WorkingSet`]: bounded in-memory map holding the most recent unmatched
//!   candidate per fingerprint, with collision counts that drive eviction
//!   order ([`WorkingSet::least_used`]) and a snapshot file for warm restarts.
//! - [`OverflowStore`]: the larger persistent tier that receives evicted
//!   candidates. [`SegmentedStore`] implements it over rotating segments,
//!   backed either by in-memory maps or by one redb file per segment, with
//!   archival of the oldest segment to bound lookup cost.
//!
//! Records are encoded with bincode and optionally zstd-compressed
//! ([`RecordCodec`]).
//!
//! ```
//! use canonical::CandidateRecord;
//! use store::{OverflowStore, SegmentedStore, WorkingSet};
//!
//! let mut cache = WorkingSet::new();
//! cache.put(CandidateRecord::new(1, "listen"));
//!
//! let overflow = SegmentedStore::in_memory(1_000).unwrap();
//! let evicted: Vec<_> = cache
//!     .least_used(1)
//!     .iter()
//!     .filter_map(|key| cache.get(key).cloned())
//!     .collect();
//! overflow.set_batch(&evicted).unwrap();
//! assert!(overflow.contains(evicted[0].fingerprint()).unwrap());
//! ```

mod backend;
mod codec;
mod config;
mod error;
mod overflow;
mod segmented;
mod working_set;

pub use crate::backend::{MemorySegment, RedbSegment, SegmentBackend};
pub use crate::codec::{CompressionCodec, CompressionConfig, RecordCodec};
pub use crate::config::{BackendConfig, StoreConfig, DEFAULT_SEGMENT_CAPACITY};
pub use crate::error::StoreError;
pub use crate::overflow::{OverflowStore, SegmentId};
pub use crate::segmented::{SegmentedStore, ARCHIVE_DIR, META_FILE};
pub use crate::working_set::{CacheEntry, WorkingSet, SNAPSHOT_SCHEMA_VERSION};
