//! Umbrella crate for the streaming anagram detector.
//!
//! Stitches the workspace crates into one entry point:
//!
//! - [`canonical`]: pre-filter, normalization and letter-multiset fingerprints
//! - [`cascade`]: the ordered checks that decide whether a pair is interesting
//! - [`store`]: bounded working set plus the segmented overflow store
//! - [`matcher`]: the [`Coordinator`], hit records, review queue and counters
//!
//! On top of those it adds the YAML [`config`] layer and the bounded
//! [`stream`] runner that feeds messages to a single coordinator.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use anagrammatic::{open_coordinator, AppConfig, InboundMessage, MatchStats, StreamRunner};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let coordinator = open_coordinator(&config, Arc::new(MatchStats::new()))?
//!     .with_hit_handler(|hit| println!("{} / {}", hit.record_one.text(), hit.record_two.text()));
//! let summary = StreamRunner::new(coordinator, config.filter.clone())
//!     .with_stream_config(&config.stream)
//!     .run(vec![
//!         InboundMessage::new(1, "Freight is so pathetic.").with_lang("en"),
//!         InboundMessage::new(2, "straight piece of shit").with_lang("en"),
//!     ])
//!     .await?;
//! assert_eq!(summary.hits, 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::info;

pub mod config;
pub mod stream;

pub use canonical;
pub use cascade;
pub use matcher;
pub use store;

pub use crate::config::{AppConfig, ConfigLoadError, LoggingConfig, StreamConfig};
pub use crate::stream::{parse_line, RunError, RunSummary, StreamRunner};
pub use canonical::{prefilter, CandidateRecord, FilterConfig, FilterRejection, InboundMessage};
pub use cascade::{Cascade, CascadeConfig, Stage, Verdict};
pub use matcher::{
    Coordinator, Hit, HitStatus, HitStore, InMemoryHitStore, MatchError, MatchStats,
    MatcherConfig, Outcome, StatsSnapshot,
};
pub use store::{BackendConfig, OverflowStore, SegmentedStore, StoreConfig};

/// Open the overflow store described by `config.store` and build a
/// coordinator over it.
pub fn open_coordinator(
    config: &AppConfig,
    stats: Arc<MatchStats>,
) -> Result<Coordinator, MatchError> {
    let overflow = config.store.open()?;
    info!(
        backend = ?config.store.backend,
        segment_capacity = config.store.segment_capacity,
        "overflow_store_opened"
    );
    Coordinator::open(config.matcher.clone(), Arc::new(overflow), stats)
}
