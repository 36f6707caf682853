//! # Anagram Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` owns the streaming side of anagram detection. Candidates that
//! passed the upstream filter arrive one at a time; each is routed by its
//! [`Fingerprint`](canonical::Fingerprint) through two tiers:
//!
//! - the **working set**: a bounded in-memory map holding the most recent
//!   unmatched candidate per fingerprint
//! - the **overflow store**: a larger, segmented, persistent tier that
//!   receives batches trimmed from the working set
//!
//! When a candidate collides with a stored one, the similarity cascade
//! decides whether the pair is interesting. Interesting pairs become
//! [`Hit`]s: they are handed to the caller's callback, optionally persisted
//! in a [`HitStore`], and never emitted twice.
//!
//! ## Core Types
//!
//! - [`Coordinator`]: the single-consumer state machine
//! - [`MatcherConfig`]: capacities, thresholds and policies
//! - [`MatchError::NeedsMaintenance`]: backpressure signal; the caller runs
//!   [`Coordinator::perform_maintenance`] and resumes
//! - [`MatchStats`]: shared counters with `reset`/`snapshot`
//! - [`Hit`], [`HitStatus`], [`HitStore`], [`InMemoryHitStore`]: hits and
//!   their review workflow
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use canonical::CandidateRecord;
//! use matcher::{Coordinator, MatchStats, MatcherConfig, Outcome};
//! use store::SegmentedStore;
//!
//! let overflow = Arc::new(SegmentedStore::in_memory(1_000).unwrap());
//! let stats = Arc::new(MatchStats::new());
//! let hits = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&hits);
//!
//! let mut coordinator = Coordinator::open(MatcherConfig::default(), overflow, stats)
//!     .unwrap()
//!     .with_hit_handler(move |hit| sink.lock().unwrap().push(hit.pair_key()));
//!
//! assert_eq!(
//!     coordinator.handle_input(CandidateRecord::new(1, "listen")).unwrap(),
//!     Outcome::Filed
//! );
//! assert_eq!(
//!     coordinator.handle_input(CandidateRecord::new(2, "silent")).unwrap(),
//!     Outcome::Hit
//! );
//! coordinator.close().unwrap();
//! assert_eq!(*hits.lock().unwrap(), vec![(1, 2)]);
//! ```

pub mod engine;
pub mod hits;
pub mod stats;
pub mod types;

pub use crate::engine::{Coordinator, HitHandler};
pub use crate::hits::{Hit, HitStatus, HitStore, HitStoreError, InMemoryHitStore};
pub use crate::stats::{format_duration, MatchStats, StatsSnapshot};
pub use crate::types::{
    AbsorbReport, EvictionMode, MaintenanceReason, MaintenanceReport, MatchError, MatcherConfig,
    OverflowMatchPolicy, Outcome, DEFAULT_BUFFER_THRESHOLD, DEFAULT_CACHE_CAPACITY,
    DEFAULT_HIT_LEDGER_CAPACITY,
};
