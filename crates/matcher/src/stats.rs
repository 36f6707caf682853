//! Run counters.
//!
//! [`MatchStats`] is created by the caller and handed to the coordinator as
//! an `Arc`, so a status reporter on another thread can read it while the
//! stream is running. Every counter is also forwarded to the `metrics`
//! facade, which is a no-op unless the embedding process installs a
//! recorder.

use metrics::{counter, gauge};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct MatchStats {
    started: Mutex<Instant>,
    inputs: AtomicU64,
    filtered: AtomicU64,
    hits: AtomicU64,
    suppressed: AtomicU64,
    cache_collisions: AtomicU64,
    overflow_collisions: AtomicU64,
    evicted: AtomicU64,
    decode_errors: AtomicU64,
    maintenance_requests: AtomicU64,
    archived_segments: AtomicU64,
    cache_size: AtomicU64,
    buffer_depth: AtomicU64,
    max_buffer_depth: AtomicU64,
    overflow_sections: AtomicU64,
}

/// Point-in-time copy of [`MatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub runtime_secs: u64,
    pub inputs: u64,
    pub filtered: u64,
    pub hits: u64,
    pub suppressed: u64,
    pub cache_collisions: u64,
    pub overflow_collisions: u64,
    pub evicted: u64,
    pub decode_errors: u64,
    pub maintenance_requests: u64,
    pub archived_segments: u64,
    pub cache_size: u64,
    pub buffer_depth: u64,
    pub max_buffer_depth: u64,
    pub overflow_sections: u64,
}

impl Default for MatchStats {
    fn default() -> Self {
        Self {
            started: Mutex::new(Instant::now()),
            inputs: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            cache_collisions: AtomicU64::new(0),
            overflow_collisions: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            maintenance_requests: AtomicU64::new(0),
            archived_segments: AtomicU64::new(0),
            cache_size: AtomicU64::new(0),
            buffer_depth: AtomicU64::new(0),
            max_buffer_depth: AtomicU64::new(0),
            overflow_sections: AtomicU64::new(0),
        }
    }
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl MatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_input(&self) {
        bump(&self.inputs, 1);
        counter!("anagram_inputs_total").increment(1);
    }

    /// A message the pre-filter turned away before it reached the matcher.
    pub fn record_filtered(&self, reason: &'static str) {
        bump(&self.filtered, 1);
        counter!("anagram_filtered_total", "reason" => reason).increment(1);
    }

    pub fn record_hit(&self) {
        bump(&self.hits, 1);
        counter!("anagram_hits_total").increment(1);
    }

    pub fn record_suppressed(&self) {
        bump(&self.suppressed, 1);
        counter!("anagram_hits_suppressed_total").increment(1);
    }

    pub fn record_cache_collision(&self) {
        bump(&self.cache_collisions, 1);
        counter!("anagram_collisions_total", "tier" => "cache").increment(1);
    }

    pub fn record_overflow_collision(&self) {
        bump(&self.overflow_collisions, 1);
        counter!("anagram_collisions_total", "tier" => "overflow").increment(1);
    }

    pub fn record_evicted(&self, records: usize) {
        bump(&self.evicted, records as u64);
        counter!("anagram_evicted_total").increment(records as u64);
    }

    pub fn record_decode_error(&self) {
        bump(&self.decode_errors, 1);
        counter!("anagram_decode_errors_total").increment(1);
    }

    pub fn record_maintenance_request(&self, reason: &'static str) {
        bump(&self.maintenance_requests, 1);
        counter!("anagram_maintenance_requests_total", "reason" => reason).increment(1);
    }

    pub fn record_archived(&self) {
        bump(&self.archived_segments, 1);
        counter!("anagram_archived_segments_total").increment(1);
    }

    pub fn set_cache_size(&self, size: usize) {
        self.cache_size.store(size as u64, Ordering::Relaxed);
        gauge!("anagram_cache_size").set(size as f64);
    }

    pub fn set_buffer_depth(&self, depth: usize) {
        let depth = depth as u64;
        self.buffer_depth.store(depth, Ordering::Relaxed);
        self.max_buffer_depth.fetch_max(depth, Ordering::Relaxed);
        gauge!("anagram_buffer_depth").set(depth as f64);
    }

    pub fn set_overflow_sections(&self, sections: usize) {
        self.overflow_sections.store(sections as u64, Ordering::Relaxed);
        gauge!("anagram_overflow_sections").set(sections as f64);
    }

    pub fn runtime(&self) -> Duration {
        self.started
            .lock()
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    /// Zero every counter and restart the runtime clock.
    pub fn reset(&self) {
        if let Ok(mut started) = self.started.lock() {
            *started = Instant::now();
        }
        for counter in [
            &self.inputs,
            &self.filtered,
            &self.hits,
            &self.suppressed,
            &self.cache_collisions,
            &self.overflow_collisions,
            &self.evicted,
            &self.decode_errors,
            &self.maintenance_requests,
            &self.archived_segments,
            &self.cache_size,
            &self.buffer_depth,
            &self.max_buffer_depth,
            &self.overflow_sections,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            runtime_secs: self.runtime().as_secs(),
            inputs: load(&self.inputs),
            filtered: load(&self.filtered),
            hits: load(&self.hits),
            suppressed: load(&self.suppressed),
            cache_collisions: load(&self.cache_collisions),
            overflow_collisions: load(&self.overflow_collisions),
            evicted: load(&self.evicted),
            decode_errors: load(&self.decode_errors),
            maintenance_requests: load(&self.maintenance_requests),
            archived_segments: load(&self.archived_segments),
            cache_size: load(&self.cache_size),
            buffer_depth: load(&self.buffer_depth),
            max_buffer_depth: load(&self.max_buffer_depth),
            overflow_sections: load(&self.overflow_sections),
        }
    }
}

impl fmt::Display for MatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot();
        write!(
            f,
            "seen {} | filtered {} | hits {} (suppressed {}) | cache {} (collisions {}) | \
             overflow {} segments (collisions {}) | buffer {} (max {}) | runtime {}",
            s.inputs,
            s.filtered,
            s.hits,
            s.suppressed,
            s.cache_size,
            s.cache_collisions,
            s.overflow_sections,
            s.overflow_collisions,
            s.buffer_depth,
            s.max_buffer_depth,
            format_duration(self.runtime()),
        )
    }
}

/// Render a duration as `[Nd ][Nh ]Nm S.SSs`.
///
/// ```
/// use std::time::Duration;
/// assert_eq!(matcher::format_duration(Duration::from_millis(61_500)), "1m 1.50s");
/// assert_eq!(matcher::format_duration(Duration::from_secs(90_061)), "1d 1h 1m 1.00s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let seconds = (total % 60) as f64 + f64::from(duration.subsec_millis()) / 1000.0;

    let mut out = format!("{minutes}m {seconds:.2}s");
    if hours > 0 || days > 0 {
        out = format!("{hours}h {out}");
    }
    if days > 0 {
        out = format!("{days}d {out}");
    }
    out
}
