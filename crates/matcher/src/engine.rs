use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use canonical::{CandidateRecord, Fingerprint};
use cascade::{Cascade, Verdict};
use chrono::Utc;
use hashbrown::{HashMap, HashSet};
use store::{OverflowStore, StoreError, WorkingSet};
use tracing::{debug, error, info, warn};

use crate::hits::{pair_key, Hit, HitStore};
use crate::stats::MatchStats;
use crate::types::{
    AbsorbReport, EvictionMode, MaintenanceReason, MaintenanceReport, MatchError, MatcherConfig,
    OverflowMatchPolicy, Outcome,
};

#[cfg(test)]
mod tests;

/// Callback invoked once per emitted hit.
pub type HitHandler = Box<dyn FnMut(&Hit) + Send>;

/// A trimmed batch being written by a worker thread.
struct InFlightEviction {
    records: Arc<HashMap<Fingerprint, CandidateRecord>>,
    handle: JoinHandle<Result<usize, StoreError>>,
    started: Instant,
}

/// Routes each candidate through the working set and the overflow store and
/// emits interesting pairs.
///
/// The coordinator is a single consumer: `handle_input` takes `&mut self`
/// and is meant to be driven by one loop reading a bounded queue. The
/// overflow store and stats are shared handles so other threads can read
/// them.
pub struct Coordinator {
    config: MatcherConfig,
    cascade: Cascade,
    cache: WorkingSet,
    overflow: Arc<dyn OverflowStore>,
    stats: Arc<MatchStats>,
    hit_store: Option<Arc<dyn HitStore>>,
    on_hit: Option<HitHandler>,
    /// Record-id pairs already emitted or suppressed this session, bounded
    /// by `hit_ledger_capacity`. `emitted_order` holds them oldest first.
    emitted: HashSet<(u64, u64)>,
    emitted_order: VecDeque<(u64, u64)>,
    in_flight: Option<InFlightEviction>,
    fetch_pool: Vec<CandidateRecord>,
    buffer_depth: usize,
    last_hit_id: u64,
    /// Set during maintenance and close; trims then skip the backpressure checks.
    maintaining: bool,
    closed: bool,
}

impl Coordinator {
    /// Build a coordinator over `overflow`, loading the working set snapshot
    /// when one is configured.
    pub fn open(
        config: MatcherConfig,
        overflow: Arc<dyn OverflowStore>,
        stats: Arc<MatchStats>,
    ) -> Result<Self, MatchError> {
        config.validate()?;
        let cascade = Cascade::new(config.cascade)?;
        let cache = match &config.snapshot_path {
            Some(path) => WorkingSet::load_or_empty(path),
            None => WorkingSet::new(),
        };
        stats.set_cache_size(cache.len());
        stats.set_overflow_sections(overflow.section_count());
        info!(
            cache_capacity = config.cache_capacity,
            cache_size = cache.len(),
            overflow_sections = overflow.section_count(),
            overflow_records = overflow.len(),
            eviction = ?config.eviction,
            "coordinator_opened"
        );
        Ok(Self {
            config,
            cascade,
            cache,
            overflow,
            stats,
            hit_store: None,
            on_hit: None,
            emitted: HashSet::new(),
            emitted_order: VecDeque::new(),
            in_flight: None,
            fetch_pool: Vec::new(),
            buffer_depth: 0,
            last_hit_id: 0,
            maintaining: false,
            closed: false,
        })
    }

    pub fn with_hit_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&Hit) + Send + 'static,
    {
        self.on_hit = Some(Box::new(handler));
        self
    }

    /// Persist emitted hits and suppress pairs that repeat a stored hit.
    pub fn with_hit_store(mut self, store: Arc<dyn HitStore>) -> Self {
        self.hit_store = Some(store);
        self
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<MatchStats> {
        &self.stats
    }

    pub fn overflow(&self) -> &Arc<dyn OverflowStore> {
        &self.overflow
    }

    pub fn cache(&self) -> &WorkingSet {
        &self.cache
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn pending_fetches(&self) -> usize {
        self.fetch_pool.len()
    }

    pub fn eviction_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn buffer_depth(&self) -> usize {
        self.buffer_depth
    }

    /// Report how far the producer is ahead of this consumer.
    pub fn set_buffer_depth(&mut self, depth: usize) {
        self.buffer_depth = depth;
        self.stats.set_buffer_depth(depth);
    }

    /// Process one candidate.
    ///
    /// `NeedsMaintenance` is returned after the record has been filed, so
    /// the caller should not resubmit it: run
    /// [`perform_maintenance`](Self::perform_maintenance) and continue with
    /// the next record.
    pub fn handle_input(&mut self, record: CandidateRecord) -> Result<Outcome, MatchError> {
        self.stats.record_input();
        let id = record.id();
        let outcome = self.route(record, None)?;
        debug!(id, outcome = outcome.as_str(), "input_routed");
        Ok(outcome)
    }

    /// `fetched` carries a pre-fetched overflow lookup from the fetch pool.
    fn route(
        &mut self,
        record: CandidateRecord,
        fetched: Option<Result<Option<CandidateRecord>, StoreError>>,
    ) -> Result<Outcome, MatchError> {
        let key = record.fingerprint().clone();

        if let Some(stored) = self.cache.get(&key).cloned() {
            return self.resolve_cached(stored, record);
        }
        if let Some(stored) = self.in_flight_get(&key) {
            return self.resolve_overflow(stored, record);
        }

        let lookup = match fetched {
            // an earlier record of the same drain may have consumed the entry
            Some(Ok(Some(stored)))
                if self.config.overflow_match == OverflowMatchPolicy::Consume =>
            {
                self.overflow
                    .contains(&key)
                    .map(|present| present.then_some(stored))
            }
            Some(result) => result,
            None => match self.overflow.contains(&key) {
                Ok(false) => Ok(None),
                Ok(true) if self.config.pools_fetches() => {
                    self.fetch_pool.push(record);
                    if self.fetch_pool.len() >= self.config.fetch_pool_size {
                        self.drain_fetch_pool()?;
                    }
                    return Ok(Outcome::Deferred);
                }
                Ok(true) => self.overflow.get(&key),
                Err(err) => Err(err),
            },
        };

        match lookup {
            Ok(Some(stored)) => self.resolve_overflow(stored, record),
            Ok(None) => {
                self.file(record)?;
                Ok(Outcome::Filed)
            }
            Err(err) => {
                if err.is_decode() {
                    self.stats.record_decode_error();
                }
                warn!(
                    id = record.id(),
                    fingerprint = %key,
                    error = %err,
                    "overflow_lookup_failed"
                );
                self.file(record)?;
                Ok(Outcome::Refiled)
            }
        }
    }

    fn resolve_cached(
        &mut self,
        stored: CandidateRecord,
        record: CandidateRecord,
    ) -> Result<Outcome, MatchError> {
        self.stats.record_cache_collision();
        if self.is_interesting(&stored, &record) {
            self.cache.delete(record.fingerprint());
            self.stats.set_cache_size(self.cache.len());
            return Ok(self.emit(stored, record));
        }
        // the newest text holds the slot
        self.cache.put(record);
        Ok(Outcome::Refiled)
    }

    fn resolve_overflow(
        &mut self,
        stored: CandidateRecord,
        record: CandidateRecord,
    ) -> Result<Outcome, MatchError> {
        self.stats.record_overflow_collision();
        if self.is_interesting(&stored, &record) {
            if self.config.overflow_match == OverflowMatchPolicy::Consume {
                self.consume_overflow(record.fingerprint());
            }
            return Ok(self.emit(stored, record));
        }
        self.file(record)?;
        Ok(Outcome::Refiled)
    }

    fn is_interesting(&self, stored: &CandidateRecord, record: &CandidateRecord) -> bool {
        match self.cascade.verdict(stored.text(), record.text()) {
            Verdict::Interesting => true,
            Verdict::Rejected(stage) => {
                debug!(
                    one = stored.id(),
                    two = record.id(),
                    stage = stage.as_str(),
                    "pair_rejected"
                );
                false
            }
        }
    }

    fn consume_overflow(&mut self, key: &Fingerprint) {
        if self.in_flight_get(key).is_some() {
            self.reap_in_flight();
        }
        if let Err(err) = self.overflow.delete(key) {
            warn!(fingerprint = %key, error = %err, "overflow_consume_failed");
        }
    }

    fn in_flight_get(&self, key: &Fingerprint) -> Option<CandidateRecord> {
        self.in_flight
            .as_ref()
            .and_then(|flight| flight.records.get(key).cloned())
    }

    /// Emit `stored`/`record` unless the pair was already emitted or repeats
    /// a stored hit.
    fn emit(&mut self, stored: CandidateRecord, record: CandidateRecord) -> Outcome {
        let pair = pair_key(stored.id(), record.id());
        if self.emitted.contains(&pair) {
            self.stats.record_suppressed();
            debug!(one = pair.0, two = pair.1, "hit_already_emitted");
            return Outcome::Suppressed;
        }
        self.remember_pair(pair);

        if self.repeats_stored_hit(&stored, &record) {
            self.stats.record_suppressed();
            info!(
                one = stored.id(),
                two = record.id(),
                fingerprint = %stored.fingerprint(),
                "hit_suppressed"
            );
            return Outcome::Suppressed;
        }

        let hit = Hit::new(self.next_hit_id(), stored, record);
        if let Some(store) = &self.hit_store {
            if let Err(err) = store.insert(hit.clone()) {
                warn!(hit_id = hit.id, error = %err, "hit_store_insert_failed");
            }
        }
        self.stats.record_hit();
        info!(
            hit_id = hit.id,
            one = hit.record_one.id(),
            two = hit.record_two.id(),
            "anagram_hit"
        );
        if let Some(handler) = self.on_hit.as_mut() {
            handler(&hit);
        }
        Outcome::Hit
    }

    fn remember_pair(&mut self, pair: (u64, u64)) {
        if self.emitted_order.len() >= self.config.hit_ledger_capacity {
            if let Some(oldest) = self.emitted_order.pop_front() {
                self.emitted.remove(&oldest);
            }
        }
        self.emitted.insert(pair);
        self.emitted_order.push_back(pair);
    }

    /// True when both texts are near-duplicates of a stored hit with the
    /// same fingerprint. Near-duplicate means identical, or a pair the
    /// cascade would reject.
    fn repeats_stored_hit(&self, one: &CandidateRecord, two: &CandidateRecord) -> bool {
        let Some(store) = &self.hit_store else {
            return false;
        };
        let existing = match store.by_fingerprint(one.fingerprint()) {
            Ok(existing) => existing,
            Err(err) => {
                warn!(fingerprint = %one.fingerprint(), error = %err, "hit_store_lookup_failed");
                return false;
            }
        };
        let similar = |text: &str, hit: &Hit| {
            hit.texts()
                .iter()
                .any(|other| text == *other || !self.cascade.is_interesting_anagram(text, other))
        };
        existing
            .iter()
            .any(|hit| similar(one.text(), hit) && similar(two.text(), hit))
    }

    fn next_hit_id(&mut self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        self.last_hit_id = now.max(self.last_hit_id + 1);
        self.last_hit_id
    }

    /// Insert a record under a fingerprint that has no live partner, then
    /// trim if the working set outgrew its capacity.
    fn file(&mut self, record: CandidateRecord) -> Result<(), MatchError> {
        self.cache.put(record);
        self.stats.set_cache_size(self.cache.len());
        if self.cache.len() > self.config.cache_capacity {
            self.trim_cache()?;
        }
        Ok(())
    }

    /// Move the least used batch to the overflow store. Returns the number
    /// of records written or handed to the worker.
    fn trim_cache(&mut self) -> Result<usize, MatchError> {
        if let Some(flight) = &self.in_flight {
            if !flight.handle.is_finished() && !self.maintaining {
                self.stats.record_maintenance_request("overlapping_eviction");
                warn!(in_flight = flight.records.len(), "eviction_overlap");
                return Err(MatchError::NeedsMaintenance(
                    MaintenanceReason::OverlappingEviction,
                ));
            }
            self.reap_in_flight();
        }

        let started = Instant::now();
        let keys = self.cache.least_used(self.config.trim_batch());
        let batch: Vec<CandidateRecord> =
            keys.iter().filter_map(|key| self.cache.delete(key)).collect();
        let batch_len = batch.len();
        let moved = match self.config.eviction {
            EvictionMode::Inline => self.write_batch(batch),
            EvictionMode::Background => self.spawn_eviction(batch),
        };
        self.stats.set_cache_size(self.cache.len());
        self.stats.set_overflow_sections(self.overflow.section_count());
        info!(
            batch = batch_len,
            moved,
            cache_size = self.cache.len(),
            elapsed_micros = started.elapsed().as_micros() as u64,
            "cache_trimmed"
        );

        if !self.maintaining && self.buffer_depth > self.config.buffer_threshold {
            self.stats.record_maintenance_request("backlog");
            warn!(
                depth = self.buffer_depth,
                threshold = self.config.buffer_threshold,
                "buffer_backlog"
            );
            return Err(MatchError::NeedsMaintenance(MaintenanceReason::Backlog {
                depth: self.buffer_depth,
                threshold: self.config.buffer_threshold,
            }));
        }
        Ok(moved)
    }

    /// Write a batch on this thread. A failed write puts the batch back into
    /// the working set.
    fn write_batch(&mut self, batch: Vec<CandidateRecord>) -> usize {
        match self.overflow.set_batch(&batch) {
            Ok(()) => {
                self.stats.record_evicted(batch.len());
                batch.len()
            }
            Err(err) => {
                error!(records = batch.len(), error = %err, "eviction_failed");
                batch.into_iter().for_each(|record| self.restore(record));
                0
            }
        }
    }

    fn spawn_eviction(&mut self, batch: Vec<CandidateRecord>) -> usize {
        let records: Arc<HashMap<Fingerprint, CandidateRecord>> = Arc::new(
            batch
                .into_iter()
                .map(|record| (record.fingerprint().clone(), record))
                .collect(),
        );
        let overflow = Arc::clone(&self.overflow);
        let pending = Arc::clone(&records);
        let spawned = thread::Builder::new()
            .name("anagram-evict".into())
            .spawn(move || {
                let batch: Vec<CandidateRecord> = pending.values().cloned().collect();
                overflow.set_batch(&batch).map(|()| batch.len())
            });
        match spawned {
            Ok(handle) => {
                let handed_off = records.len();
                self.in_flight = Some(InFlightEviction {
                    records,
                    handle,
                    started: Instant::now(),
                });
                handed_off
            }
            Err(err) => {
                warn!(error = %err, "eviction_thread_spawn_failed");
                let batch = records.values().cloned().collect();
                self.write_batch(batch)
            }
        }
    }

    /// Wait for the background write, if any. A failed write puts its
    /// records back into the working set unless a newer record took the slot.
    fn reap_in_flight(&mut self) -> usize {
        let Some(flight) = self.in_flight.take() else {
            return 0;
        };
        let result = flight.handle.join();
        let elapsed_micros = flight.started.elapsed().as_micros() as u64;
        match result {
            Ok(Ok(written)) => {
                self.stats.record_evicted(written);
                debug!(records = written, elapsed_micros, "eviction_reaped");
                written
            }
            Ok(Err(err)) => {
                error!(records = flight.records.len(), error = %err, "background_eviction_failed");
                flight.records.values().cloned().for_each(|r| self.restore(r));
                0
            }
            Err(_) => {
                error!(records = flight.records.len(), "background_eviction_panicked");
                flight.records.values().cloned().for_each(|r| self.restore(r));
                0
            }
        }
    }

    fn restore(&mut self, record: CandidateRecord) {
        if !self.cache.contains(record.fingerprint()) {
            self.cache.put(record);
        }
    }

    /// Resolve every deferred lookup with one batched read. The first
    /// maintenance request raised while resolving is returned after the
    /// whole pool has been processed.
    fn drain_fetch_pool(&mut self) -> Result<usize, MatchError> {
        if self.fetch_pool.is_empty() {
            return Ok(0);
        }
        let pending = std::mem::take(&mut self.fetch_pool);
        let keys: Vec<Fingerprint> = pending.iter().map(|r| r.fingerprint().clone()).collect();
        let fetched = self.overflow.get_many(&keys);
        let drained = pending.len();

        let mut first_err = None;
        for (record, lookup) in pending.into_iter().zip(fetched) {
            if let Err(err) = self.route(record, Some(lookup)) {
                first_err.get_or_insert(err);
            }
        }
        debug!(drained, "fetch_pool_drained");
        match first_err {
            Some(err) => Err(err),
            None => Ok(drained),
        }
    }

    /// Catch up after a `NeedsMaintenance` signal: finish the in-flight
    /// write, resolve deferred lookups, archive the oldest overflow segment
    /// and trim the working set back under capacity.
    pub fn perform_maintenance(&mut self) -> Result<MaintenanceReport, MatchError> {
        self.maintaining = true;
        let result = self.run_maintenance();
        self.maintaining = false;
        result
    }

    fn run_maintenance(&mut self) -> Result<MaintenanceReport, MatchError> {
        let started = Instant::now();
        let mut report = MaintenanceReport {
            reaped: self.reap_in_flight(),
            drained: self.drain_fetch_pool()?,
            ..MaintenanceReport::default()
        };

        report.archived = self.overflow.archive()?;
        if report.archived.is_some() {
            self.stats.record_archived();
        }

        while self.cache.len() > self.config.cache_capacity {
            let before = self.cache.len();
            let moved = self.trim_cache()?;
            report.evicted += moved;
            // a failed write puts its records back; stop instead of spinning
            if moved == 0 || self.cache.len() >= before {
                break;
            }
        }
        report.reaped += self.reap_in_flight();
        self.stats.set_overflow_sections(self.overflow.section_count());

        info!(
            reaped = report.reaped,
            drained = report.drained,
            archived = report.archived.as_ref().map(|id| id.as_str()),
            evicted = report.evicted,
            elapsed_micros = started.elapsed().as_micros() as u64,
            "maintenance_complete"
        );
        Ok(report)
    }

    /// Fold the records of `source` into the active overflow store.
    ///
    /// Records whose fingerprint encodes fewer than `min_letters` letters are
    /// skipped. A record colliding with an existing entry is compared with
    /// it and emitted as a hit when interesting; the existing entry stays.
    pub fn absorb(
        &mut self,
        source: &dyn OverflowStore,
        min_letters: usize,
    ) -> Result<AbsorbReport, MatchError> {
        let mut incoming = Vec::new();
        source.scan(&mut |record| {
            incoming.push(record);
            Ok(())
        })?;

        let mut report = AbsorbReport {
            scanned: incoming.len(),
            ..AbsorbReport::default()
        };
        let mut fresh = Vec::new();
        for record in incoming {
            if record.fingerprint().letter_count() < min_letters {
                report.skipped_short += 1;
                continue;
            }
            match self.overflow.get(record.fingerprint()) {
                Ok(Some(stored)) => {
                    if stored.id() != record.id()
                        && self.is_interesting(&stored, &record)
                        && self.emit(stored, record) == Outcome::Hit
                    {
                        report.hits += 1;
                    } else {
                        report.duplicates += 1;
                    }
                }
                Ok(None) => fresh.push(record),
                Err(err) => {
                    warn!(id = record.id(), error = %err, "absorb_lookup_failed");
                    fresh.push(record);
                }
            }
        }
        self.overflow.set_batch(&fresh)?;
        report.added = fresh.len();
        self.stats.set_overflow_sections(self.overflow.section_count());
        info!(
            scanned = report.scanned,
            added = report.added,
            hits = report.hits,
            skipped_short = report.skipped_short,
            "overflow_absorbed"
        );
        Ok(report)
    }

    /// Drop overflow entries shorter than `min_letters` letters.
    pub fn purge_short(&self, min_letters: usize) -> Result<usize, MatchError> {
        let removed = self.overflow.purge_short(min_letters)?;
        info!(min_letters, removed, "overflow_purged");
        Ok(removed)
    }

    /// Finish pending work and persist the working set.
    ///
    /// The working set goes to the snapshot file when one is configured. If
    /// there is none, or saving it fails, the records are written to the
    /// overflow store instead. Calling `close` again is a no-op.
    pub fn close(&mut self) -> Result<(), MatchError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.maintaining = true;

        self.reap_in_flight();
        if let Err(err) = self.drain_fetch_pool() {
            warn!(error = %err, "fetch_pool_drain_failed");
        }
        self.reap_in_flight();

        match self.config.snapshot_path.clone() {
            Some(path) => {
                if let Err(err) = self.cache.save(&path) {
                    error!(path = %path.display(), error = %err, "snapshot_save_failed");
                    self.flush_cache_to_overflow()?;
                }
            }
            None => self.flush_cache_to_overflow()?,
        }
        self.overflow.flush()?;
        info!(
            overflow_records = self.overflow.len(),
            hits = self.stats.snapshot().hits,
            "coordinator_closed"
        );
        Ok(())
    }

    fn flush_cache_to_overflow(&mut self) -> Result<(), MatchError> {
        if self.cache.is_empty() {
            return Ok(());
        }
        let records: Vec<CandidateRecord> =
            self.cache.iter().map(|(_, entry)| entry.record.clone()).collect();
        self.overflow.set_batch(&records)?;
        self.cache.drain_all();
        self.stats.record_evicted(records.len());
        self.stats.set_cache_size(0);
        info!(records = records.len(), "working_set_flushed");
        Ok(())
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(error = %err, "coordinator_close_failed");
        }
    }
}
