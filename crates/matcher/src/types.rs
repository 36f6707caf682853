use cascade::{CascadeConfig, CascadeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use store::{SegmentId, StoreError};
use thiserror::Error;

/// What happens to an Overflow Store entry after it produces a hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowMatchPolicy {
    /// Leave the entry in place; it may pair with later candidates too.
    #[default]
    Retain,
    /// Delete the entry, mirroring what happens to working set entries.
    Consume,
}

/// How evicted batches reach the Overflow Store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionMode {
    /// Write on the calling thread before `handle_input` returns.
    #[default]
    Inline,
    /// Hand the batch to a worker thread. Records stay visible to the
    /// matcher until the write is reaped.
    Background,
}

/// Coordinator tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    /// Working set size above which a trim is triggered.
    pub cache_capacity: usize,
    /// Records moved per trim. `None` means `min(10_000, cache_capacity / 10)`.
    pub trim_batch: Option<usize>,
    /// Upstream buffer depth that turns a trim into a maintenance request.
    pub buffer_threshold: usize,
    pub overflow_match: OverflowMatchPolicy,
    /// Overflow lookups to accumulate before one batched read. `0` and `1`
    /// disable pooling.
    pub fetch_pool_size: usize,
    pub eviction: EvictionMode,
    /// Emitted record-id pairs remembered for at-most-once delivery; the
    /// oldest pair is forgotten first.
    pub hit_ledger_capacity: usize,
    /// Working set snapshot, loaded on open and written on close.
    pub snapshot_path: Option<PathBuf>,
    pub cascade: CascadeConfig,
}

pub const DEFAULT_CACHE_CAPACITY: usize = 200_000;
pub const DEFAULT_BUFFER_THRESHOLD: usize = 20_000;
pub const DEFAULT_HIT_LEDGER_CAPACITY: usize = 100_000;
const MAX_TRIM_BATCH: usize = 10_000;

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            trim_batch: None,
            buffer_threshold: DEFAULT_BUFFER_THRESHOLD,
            overflow_match: OverflowMatchPolicy::default(),
            fetch_pool_size: 0,
            eviction: EvictionMode::default(),
            hit_ledger_capacity: DEFAULT_HIT_LEDGER_CAPACITY,
            snapshot_path: None,
            cascade: CascadeConfig::default(),
        }
    }
}

impl MatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_trim_batch(mut self, batch: usize) -> Self {
        self.trim_batch = Some(batch);
        self
    }

    pub fn with_buffer_threshold(mut self, threshold: usize) -> Self {
        self.buffer_threshold = threshold;
        self
    }

    pub fn with_overflow_match(mut self, policy: OverflowMatchPolicy) -> Self {
        self.overflow_match = policy;
        self
    }

    pub fn with_fetch_pool_size(mut self, size: usize) -> Self {
        self.fetch_pool_size = size;
        self
    }

    pub fn with_eviction(mut self, mode: EvictionMode) -> Self {
        self.eviction = mode;
        self
    }

    pub fn with_hit_ledger_capacity(mut self, capacity: usize) -> Self {
        self.hit_ledger_capacity = capacity;
        self
    }

    pub fn with_snapshot_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn with_cascade(mut self, cascade: CascadeConfig) -> Self {
        self.cascade = cascade;
        self
    }

    /// Effective trim batch size, never below one.
    pub fn trim_batch(&self) -> usize {
        self.trim_batch
            .unwrap_or_else(|| MAX_TRIM_BATCH.min(self.cache_capacity / 10))
            .max(1)
    }

    pub(crate) fn pools_fetches(&self) -> bool {
        self.fetch_pool_size > 1
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.cache_capacity == 0 {
            return Err(MatchError::InvalidConfig(
                "cache_capacity must be greater than zero".into(),
            ));
        }
        if self.trim_batch == Some(0) {
            return Err(MatchError::InvalidConfig(
                "trim_batch must be greater than zero".into(),
            ));
        }
        if self.buffer_threshold == 0 {
            return Err(MatchError::InvalidConfig(
                "buffer_threshold must be greater than zero".into(),
            ));
        }
        if self.hit_ledger_capacity == 0 {
            return Err(MatchError::InvalidConfig(
                "hit_ledger_capacity must be greater than zero".into(),
            ));
        }
        self.cascade.validate()?;
        Ok(())
    }
}

/// Why the coordinator asked its caller for maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MaintenanceReason {
    /// The upstream buffer grew past the threshold during a trim.
    Backlog { depth: usize, threshold: usize },
    /// A trim came due while the previous background write was unfinished.
    OverlappingEviction,
}

impl fmt::Display for MaintenanceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backlog { depth, threshold } => {
                write!(f, "buffer depth {depth} exceeds {threshold}")
            }
            Self::OverlappingEviction => f.write_str("eviction still in flight"),
        }
    }
}

/// Errors produced by the coordinator.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The caller must stop feeding input and run
    /// [`perform_maintenance`](crate::Coordinator::perform_maintenance).
    #[error("needs maintenance: {0}")]
    NeedsMaintenance(MaintenanceReason),
    #[error("invalid matcher config: {0}")]
    InvalidConfig(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("hit store error: {0}")]
    Hits(#[from] crate::hits::HitStoreError),
}

impl MatchError {
    pub fn is_needs_maintenance(&self) -> bool {
        matches!(self, MatchError::NeedsMaintenance(_))
    }
}

impl From<CascadeError> for MatchError {
    fn from(err: CascadeError) -> Self {
        MatchError::InvalidConfig(err.to_string())
    }
}

/// What `handle_input` did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// An interesting pair was emitted.
    Hit,
    /// An interesting pair was found but was already emitted or collides
    /// with a stored hit.
    Suppressed,
    /// The fingerprint was known but the pair was boring; the record now
    /// holds the slot.
    Refiled,
    /// First sighting of this fingerprint.
    Filed,
    /// Waiting in the fetch pool for a batched overflow read.
    Deferred,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Hit => "hit",
            Outcome::Suppressed => "suppressed",
            Outcome::Refiled => "refiled",
            Outcome::Filed => "filed",
            Outcome::Deferred => "deferred",
        }
    }
}

/// Summary of one [`perform_maintenance`](crate::Coordinator::perform_maintenance) pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Records confirmed written by a reaped background eviction.
    pub reaped: usize,
    /// Deferred inputs resolved from the fetch pool.
    pub drained: usize,
    /// Segment moved out of the read path, if any.
    pub archived: Option<SegmentId>,
    /// Records moved by a trim run during maintenance.
    pub evicted: usize,
}

/// Result of folding another overflow store into the active one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AbsorbReport {
    pub scanned: usize,
    /// Records written because their fingerprint was new.
    pub added: usize,
    pub hits: usize,
    /// Collisions that were boring, already emitted, or the same record.
    pub duplicates: usize,
    pub skipped_short: usize,
}
