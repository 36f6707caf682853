use super::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use store::{SegmentId, SegmentedStore};
use tempfile::tempdir;

use crate::hits::{HitStatus, InMemoryHitStore};
use crate::types::MaintenanceReport;

/// Overflow store double: wraps an in-memory segmented store and can fail
/// writes, corrupt reads, or hold writes until a gate opens.
struct ScriptedStore {
    inner: SegmentedStore,
    fail_writes: AtomicBool,
    corrupt_reads: AtomicBool,
    gate: Mutex<bool>,
    opened: Condvar,
}

impl ScriptedStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SegmentedStore::in_memory(1_000).unwrap(),
            fail_writes: AtomicBool::new(false),
            corrupt_reads: AtomicBool::new(false),
            gate: Mutex::new(true),
            opened: Condvar::new(),
        })
    }

    fn close_gate(&self) {
        *self.gate.lock().unwrap() = false;
    }

    fn open_gate(&self) {
        *self.gate.lock().unwrap() = true;
        self.opened.notify_all();
    }

    fn wait_for_gate(&self) {
        let mut open = self.gate.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
    }
}

impl OverflowStore for ScriptedStore {
    fn contains(&self, key: &Fingerprint) -> Result<bool, StoreError> {
        self.inner.contains(key)
    }

    fn get(&self, key: &Fingerprint) -> Result<Option<CandidateRecord>, StoreError> {
        if self.corrupt_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Decode("truncated value".into()));
        }
        self.inner.get(key)
    }

    fn set(&self, record: &CandidateRecord) -> Result<(), StoreError> {
        self.inner.set(record)
    }

    fn set_batch(&self, records: &[CandidateRecord]) -> Result<(), StoreError> {
        self.wait_for_gate();
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("disk full"));
        }
        self.inner.set_batch(records)
    }

    fn delete(&self, key: &Fingerprint) -> Result<bool, StoreError> {
        self.inner.delete(key)
    }

    fn archive(&self) -> Result<Option<SegmentId>, StoreError> {
        self.inner.archive()
    }

    fn section_count(&self) -> usize {
        self.inner.section_count()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(CandidateRecord) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.inner.scan(visitor)
    }

    fn purge_short(&self, min_letters: usize) -> Result<usize, StoreError> {
        self.inner.purge_short(min_letters)
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.inner.flush()
    }
}

type Sink = Arc<Mutex<Vec<Hit>>>;

fn rec(id: u64, text: &str) -> CandidateRecord {
    CandidateRecord::new(id, text)
}

/// Text with a fingerprint unique to `n`.
fn filler(n: usize) -> String {
    "q".repeat(n + 1)
}

fn coordinator_with(config: MatcherConfig, overflow: Arc<dyn OverflowStore>) -> (Coordinator, Sink) {
    let sink: Sink = Arc::new(Mutex::new(Vec::new()));
    let hits = Arc::clone(&sink);
    let coordinator = Coordinator::open(config, overflow, Arc::new(MatchStats::new()))
        .unwrap()
        .with_hit_handler(move |hit| hits.lock().unwrap().push(hit.clone()));
    (coordinator, sink)
}

fn memory_coordinator(config: MatcherConfig) -> (Coordinator, Sink, Arc<SegmentedStore>) {
    let overflow = Arc::new(SegmentedStore::in_memory(1_000).unwrap());
    let (coordinator, sink) = coordinator_with(config, overflow.clone());
    (coordinator, sink, overflow)
}

fn pairs(sink: &Sink) -> Vec<(u64, u64)> {
    sink.lock()
        .unwrap()
        .iter()
        .map(|hit| (hit.record_one.id(), hit.record_two.id()))
        .collect()
}

#[test]
fn colliding_anagrams_emit_a_hit() {
    let (mut coordinator, sink, _) = memory_coordinator(MatcherConfig::default());
    assert_eq!(coordinator.handle_input(rec(1, "listen")).unwrap(), Outcome::Filed);
    assert_eq!(coordinator.handle_input(rec(2, "silent")).unwrap(), Outcome::Hit);

    assert_eq!(pairs(&sink), vec![(1, 2)]);
    assert_eq!(coordinator.cache_len(), 0);
    let hit = sink.lock().unwrap()[0].clone();
    assert_eq!(hit.status, HitStatus::Review);
    assert_eq!(hit.fingerprint, canonical::fingerprint("listen"));
    let stats = coordinator.stats().snapshot();
    assert_eq!(stats.inputs, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.cache_collisions, 1);
}

#[test]
fn duplicate_text_takes_over_the_slot() {
    let (mut coordinator, sink, _) = memory_coordinator(MatcherConfig::default());
    coordinator.handle_input(rec(3, "hello world")).unwrap();
    assert_eq!(
        coordinator.handle_input(rec(4, "hello world")).unwrap(),
        Outcome::Refiled
    );

    assert!(sink.lock().unwrap().is_empty());
    let entry = coordinator
        .cache()
        .entry(&canonical::fingerprint("hello world"))
        .unwrap();
    assert_eq!(entry.record.id(), 4);
    assert_eq!(entry.hit_count, 1);
}

#[test]
fn same_pair_is_emitted_at_most_once() {
    let (mut coordinator, sink, _) = memory_coordinator(MatcherConfig::default());
    for _ in 0..2 {
        coordinator.handle_input(rec(1, "listen")).unwrap();
        coordinator.handle_input(rec(2, "silent")).unwrap();
    }
    assert_eq!(pairs(&sink), vec![(1, 2)]);
    assert_eq!(coordinator.stats().snapshot().suppressed, 1);
}

#[test]
fn hit_ledger_forgets_the_oldest_pair() {
    let (mut coordinator, sink, _) =
        memory_coordinator(MatcherConfig::default().with_hit_ledger_capacity(1));
    for (id, text) in [
        (1, "listen"),
        (2, "silent"),
        (3, "Freight is so pathetic."),
        (4, "straight piece of shit"),
    ] {
        coordinator.handle_input(rec(id, text)).unwrap();
    }
    assert_eq!(pairs(&sink).len(), 2);
    assert_eq!(coordinator.emitted.len(), 1);
    assert_eq!(coordinator.emitted_order.len(), 1);
    assert!(coordinator.emitted.contains(&(3, 4)));
    assert!(!coordinator.emitted.contains(&(1, 2)));
}

#[test]
fn hit_ids_increase() {
    let (mut coordinator, sink, _) = memory_coordinator(MatcherConfig::default());
    for (id, text) in [
        (1, "listen"),
        (2, "silent"),
        (3, "Freight is so pathetic."),
        (4, "straight piece of shit"),
    ] {
        coordinator.handle_input(rec(id, text)).unwrap();
    }
    let hits = sink.lock().unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].id < hits[1].id);
}

#[test]
fn overflow_promotion_moves_one_batch() {
    let config = MatcherConfig::new().with_cache_capacity(10).with_trim_batch(3);
    let (mut coordinator, _, overflow) = memory_coordinator(config);
    for i in 0..11 {
        coordinator.handle_input(rec(i as u64 + 1, &filler(i))).unwrap();
    }

    assert_eq!(coordinator.cache_len(), 8);
    assert_eq!(overflow.len(), 3);
    assert_eq!(coordinator.stats().snapshot().evicted, 3);
    for i in 0..3 {
        let key = canonical::fingerprint(&filler(i));
        assert!(overflow.contains(&key).unwrap());
        assert_eq!(overflow.get(&key).unwrap().map(|r| r.id()), Some(i as u64 + 1));
    }
}

#[test]
fn eviction_preserves_total_count() {
    let config = MatcherConfig::new().with_cache_capacity(20).with_trim_batch(5);
    let (mut coordinator, _, overflow) = memory_coordinator(config);
    for i in 0..57 {
        coordinator.handle_input(rec(i as u64, &filler(i))).unwrap();
    }
    assert!(coordinator.cache_len() <= 20);
    assert_eq!(coordinator.cache_len() + overflow.len(), 57);
}

fn seed_overflow_with_listen(config: MatcherConfig) -> (Coordinator, Sink, Arc<SegmentedStore>) {
    let (mut coordinator, sink, overflow) =
        memory_coordinator(config.with_cache_capacity(2).with_trim_batch(1));
    coordinator.handle_input(rec(1, "listen")).unwrap();
    coordinator.handle_input(rec(2, &filler(10))).unwrap();
    coordinator.handle_input(rec(3, &filler(11))).unwrap();
    assert!(overflow.contains(&canonical::fingerprint("listen")).unwrap());
    (coordinator, sink, overflow)
}

#[test]
fn overflow_hits_retain_the_stored_entry_by_default() {
    let (mut coordinator, sink, overflow) = seed_overflow_with_listen(MatcherConfig::new());
    assert_eq!(coordinator.handle_input(rec(4, "silent")).unwrap(), Outcome::Hit);
    assert!(overflow.contains(&canonical::fingerprint("listen")).unwrap());
    assert_eq!(coordinator.handle_input(rec(5, "enlist")).unwrap(), Outcome::Hit);

    assert_eq!(pairs(&sink), vec![(1, 4), (1, 5)]);
    assert_eq!(coordinator.stats().snapshot().overflow_collisions, 2);
}

#[test]
fn consume_policy_deletes_matched_overflow_entries() {
    let config = MatcherConfig::new().with_overflow_match(OverflowMatchPolicy::Consume);
    let (mut coordinator, sink, overflow) = seed_overflow_with_listen(config);
    assert_eq!(coordinator.handle_input(rec(4, "silent")).unwrap(), Outcome::Hit);
    assert!(!overflow.contains(&canonical::fingerprint("listen")).unwrap());
    assert_eq!(coordinator.handle_input(rec(5, "enlist")).unwrap(), Outcome::Filed);
    assert_eq!(pairs(&sink), vec![(1, 4)]);
}

#[test]
fn consumed_entry_is_not_matched_again_within_one_drain() {
    let config = MatcherConfig::new()
        .with_overflow_match(OverflowMatchPolicy::Consume)
        .with_fetch_pool_size(2);
    let (mut coordinator, sink, overflow) = seed_overflow_with_listen(config);
    assert_eq!(coordinator.handle_input(rec(4, "silent")).unwrap(), Outcome::Deferred);
    assert_eq!(coordinator.handle_input(rec(5, "enlist")).unwrap(), Outcome::Deferred);

    assert_eq!(coordinator.pending_fetches(), 0);
    assert_eq!(pairs(&sink), vec![(1, 4)]);
    assert!(!overflow.contains(&canonical::fingerprint("listen")).unwrap());
    let cached = coordinator.cache().get(&canonical::fingerprint("enlist")).unwrap();
    assert_eq!(cached.id(), 5);
}

#[test]
fn boring_overflow_collision_refiles_into_the_working_set() {
    let (mut coordinator, sink, _) = seed_overflow_with_listen(MatcherConfig::new());
    assert_eq!(coordinator.handle_input(rec(4, "Listen!")).unwrap(), Outcome::Refiled);
    assert!(sink.lock().unwrap().is_empty());
    let cached = coordinator.cache().get(&canonical::fingerprint("listen")).unwrap();
    assert_eq!(cached.id(), 4);
}

#[test]
fn backlog_during_trim_requests_maintenance() {
    let config = MatcherConfig::new()
        .with_cache_capacity(2)
        .with_trim_batch(1)
        .with_buffer_threshold(5);
    let (mut coordinator, _, overflow) = memory_coordinator(config);
    coordinator.set_buffer_depth(10);
    coordinator.handle_input(rec(1, &filler(1))).unwrap();
    coordinator.handle_input(rec(2, &filler(2))).unwrap();

    let err = coordinator.handle_input(rec(3, &filler(3))).unwrap_err();
    assert!(matches!(
        err,
        MatchError::NeedsMaintenance(MaintenanceReason::Backlog {
            depth: 10,
            threshold: 5
        })
    ));
    // the record that triggered the trim was kept
    assert!(coordinator.cache().contains(&canonical::fingerprint(&filler(3))));
    assert_eq!(coordinator.cache_len() + overflow.len(), 3);

    let report = coordinator.perform_maintenance().unwrap();
    assert!(report.archived.is_some());
    assert_eq!(overflow.archived_ids().len(), 1);
    assert_eq!(coordinator.stats().snapshot().maintenance_requests, 1);
    assert_eq!(coordinator.stats().snapshot().archived_segments, 1);

    coordinator.set_buffer_depth(0);
    assert_eq!(coordinator.handle_input(rec(4, &filler(4))).unwrap(), Outcome::Filed);
}

#[test]
fn shallow_buffer_never_requests_maintenance() {
    let config = MatcherConfig::new().with_cache_capacity(2).with_trim_batch(1);
    let (mut coordinator, _, _) = memory_coordinator(config);
    coordinator.set_buffer_depth(3);
    for i in 0..20 {
        coordinator.handle_input(rec(i, &filler(i as usize))).unwrap();
    }
    assert_eq!(coordinator.stats().snapshot().maintenance_requests, 0);
}

#[test]
fn background_eviction_overlap_and_in_flight_matches() {
    let overflow = ScriptedStore::new();
    overflow.close_gate();
    let config = MatcherConfig::new()
        .with_cache_capacity(2)
        .with_trim_batch(1)
        .with_eviction(EvictionMode::Background);
    let (mut coordinator, sink) = coordinator_with(config, overflow.clone());

    coordinator.handle_input(rec(1, "listen")).unwrap();
    coordinator.handle_input(rec(2, &filler(1))).unwrap();
    coordinator.handle_input(rec(3, &filler(2))).unwrap();
    assert!(coordinator.eviction_in_flight());
    assert!(!coordinator.cache().contains(&canonical::fingerprint("listen")));

    // still findable while the write is held
    assert_eq!(coordinator.handle_input(rec(5, "silent")).unwrap(), Outcome::Hit);
    assert_eq!(pairs(&sink), vec![(1, 5)]);

    let err = coordinator.handle_input(rec(4, &filler(3))).unwrap_err();
    assert!(matches!(
        err,
        MatchError::NeedsMaintenance(MaintenanceReason::OverlappingEviction)
    ));

    overflow.open_gate();
    let report = coordinator.perform_maintenance().unwrap();
    assert_eq!(report.reaped, 2);
    assert_eq!(report.evicted, 1);
    assert!(!coordinator.eviction_in_flight());
    assert_eq!(coordinator.cache_len(), 2);
}

#[test]
fn failed_inline_eviction_keeps_records_cached() {
    let overflow = ScriptedStore::new();
    overflow.fail_writes.store(true, Ordering::SeqCst);
    let config = MatcherConfig::new().with_cache_capacity(2).with_trim_batch(1);
    let (mut coordinator, _) = coordinator_with(config, overflow.clone());
    for i in 0..3 {
        assert_eq!(
            coordinator.handle_input(rec(i, &filler(i as usize))).unwrap(),
            Outcome::Filed
        );
    }
    assert_eq!(coordinator.cache_len(), 3);
    assert_eq!(overflow.len(), 0);

    overflow.fail_writes.store(false, Ordering::SeqCst);
    coordinator.handle_input(rec(9, &filler(9))).unwrap();
    assert_eq!(coordinator.cache_len(), 3);
    assert_eq!(overflow.len(), 1);
}

#[test]
fn failed_background_eviction_restores_records() {
    let overflow = ScriptedStore::new();
    overflow.fail_writes.store(true, Ordering::SeqCst);
    let config = MatcherConfig::new()
        .with_cache_capacity(2)
        .with_trim_batch(1)
        .with_eviction(EvictionMode::Background);
    let (mut coordinator, _) = coordinator_with(config, overflow.clone());
    for i in 0..3 {
        coordinator.handle_input(rec(i, &filler(i as usize))).unwrap();
    }
    let report = coordinator.perform_maintenance().unwrap();
    assert_eq!(report.reaped, 0);
    assert_eq!(coordinator.cache_len() + overflow.len(), 3);
}

#[test]
fn undecodable_overflow_value_is_treated_as_absent() {
    let overflow = ScriptedStore::new();
    overflow.inner.set(&rec(1, "listen")).unwrap();
    overflow.corrupt_reads.store(true, Ordering::SeqCst);
    let (mut coordinator, sink) = coordinator_with(MatcherConfig::default(), overflow.clone());

    assert_eq!(coordinator.handle_input(rec(2, "silent")).unwrap(), Outcome::Refiled);
    assert!(sink.lock().unwrap().is_empty());
    assert!(coordinator.cache().contains(&canonical::fingerprint("silent")));
    assert_eq!(coordinator.stats().snapshot().decode_errors, 1);
}

#[test]
fn fetch_pool_batches_overflow_reads() {
    let config = MatcherConfig::new()
        .with_cache_capacity(2)
        .with_trim_batch(2)
        .with_fetch_pool_size(2);
    let (mut coordinator, sink, _) = memory_coordinator(config);
    coordinator.handle_input(rec(1, "listen")).unwrap();
    coordinator.handle_input(rec(2, &filler(1))).unwrap();
    coordinator.handle_input(rec(3, &filler(2))).unwrap();

    assert_eq!(coordinator.handle_input(rec(4, "silent")).unwrap(), Outcome::Deferred);
    assert_eq!(coordinator.pending_fetches(), 1);
    assert!(sink.lock().unwrap().is_empty());

    assert_eq!(coordinator.handle_input(rec(5, "enlist")).unwrap(), Outcome::Deferred);
    assert_eq!(coordinator.pending_fetches(), 0);
    assert_eq!(pairs(&sink), vec![(1, 4), (1, 5)]);
}

#[test]
fn maintenance_drains_the_fetch_pool() {
    let config = MatcherConfig::new()
        .with_cache_capacity(2)
        .with_trim_batch(2)
        .with_fetch_pool_size(8);
    let (mut coordinator, sink, _) = memory_coordinator(config);
    coordinator.handle_input(rec(1, "listen")).unwrap();
    coordinator.handle_input(rec(2, &filler(1))).unwrap();
    coordinator.handle_input(rec(3, &filler(2))).unwrap();
    coordinator.handle_input(rec(4, "silent")).unwrap();

    let report = coordinator.perform_maintenance().unwrap();
    assert_eq!(report.drained, 1);
    assert_eq!(pairs(&sink), vec![(1, 4)]);
}

#[test]
fn repeated_joke_is_suppressed_by_the_hit_store() {
    let hit_store = Arc::new(InMemoryHitStore::new());
    let (coordinator, sink, _) = memory_coordinator(MatcherConfig::default());
    let mut coordinator = coordinator.with_hit_store(hit_store.clone());

    coordinator.handle_input(rec(1, "listen")).unwrap();
    coordinator.handle_input(rec(2, "silent")).unwrap();
    coordinator.handle_input(rec(3, "listen")).unwrap();
    assert_eq!(
        coordinator.handle_input(rec(4, "silent")).unwrap(),
        Outcome::Suppressed
    );

    assert_eq!(pairs(&sink), vec![(1, 2)]);
    assert_eq!(hit_store.len(), 1);
    let stored = hit_store.with_status(HitStatus::Review).unwrap();
    assert_eq!(stored[0].pair_key(), (1, 2));
}

#[test]
fn unrelated_hits_are_all_persisted() {
    let hit_store = Arc::new(InMemoryHitStore::new());
    let (coordinator, _, _) = memory_coordinator(MatcherConfig::default());
    let mut coordinator = coordinator.with_hit_store(hit_store.clone());
    for (id, text) in [
        (1, "listen"),
        (2, "silent"),
        (3, "Freight is so pathetic."),
        (4, "straight piece of shit"),
    ] {
        coordinator.handle_input(rec(id, text)).unwrap();
    }
    assert_eq!(hit_store.len(), 2);
    assert_eq!(
        hit_store
            .by_fingerprint(&canonical::fingerprint("straight piece of shit"))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn close_right_after_open_is_safe_and_idempotent() {
    let dir = tempdir().unwrap();
    let config = MatcherConfig::new().with_snapshot_path(dir.path().join("cache.bin"));
    let (mut coordinator, _, _) = memory_coordinator(config);
    coordinator.close().unwrap();
    coordinator.close().unwrap();
    assert!(dir.path().join("cache.bin").exists());
}

#[test]
fn snapshot_carries_the_working_set_across_restarts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.bin");
    let overflow = Arc::new(SegmentedStore::in_memory(1_000).unwrap());
    let config = MatcherConfig::new().with_snapshot_path(&path);

    let (mut first, _) = coordinator_with(config.clone(), overflow.clone());
    first.handle_input(rec(1, "listen")).unwrap();
    first.handle_input(rec(2, "the eyes")).unwrap();
    first.close().unwrap();
    drop(first);
    assert_eq!(overflow.len(), 0);

    let (mut second, sink) = coordinator_with(config, overflow);
    assert_eq!(second.cache_len(), 2);
    assert_eq!(second.handle_input(rec(3, "silent")).unwrap(), Outcome::Hit);
    assert_eq!(pairs(&sink), vec![(1, 3)]);
}

#[test]
fn failed_snapshot_save_flushes_to_overflow() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let config = MatcherConfig::new().with_snapshot_path(blocker.join("cache.bin"));

    let (mut coordinator, _, overflow) = memory_coordinator(config);
    coordinator.handle_input(rec(1, "listen")).unwrap();
    coordinator.handle_input(rec(2, "the eyes")).unwrap();
    coordinator.close().unwrap();

    assert_eq!(coordinator.cache_len(), 0);
    assert_eq!(overflow.len(), 2);
    assert!(overflow.contains(&canonical::fingerprint("listen")).unwrap());
}

#[test]
fn close_without_snapshot_keeps_records_in_overflow() {
    let (mut coordinator, _, overflow) = memory_coordinator(MatcherConfig::default());
    coordinator.handle_input(rec(1, "listen")).unwrap();
    coordinator.close().unwrap();
    assert_eq!(overflow.len(), 1);
}

#[test]
fn absorb_merges_and_reports_hits() {
    let (mut coordinator, sink, overflow) = memory_coordinator(MatcherConfig::default());
    overflow.set(&rec(1, "listen")).unwrap();

    let source = SegmentedStore::in_memory(1_000).unwrap();
    source
        .set_batch(&[
            rec(10, "silent"),
            rec(11, "aaaa"),
            rec(12, "the quick brown fox"),
        ])
        .unwrap();

    let report = coordinator.absorb(&source, 5).unwrap();
    assert_eq!(
        report,
        AbsorbReport {
            scanned: 3,
            added: 1,
            hits: 1,
            duplicates: 0,
            skipped_short: 1,
        }
    );
    assert_eq!(pairs(&sink), vec![(1, 10)]);
    assert_eq!(overflow.len(), 2);
    assert_eq!(
        overflow
            .get(&canonical::fingerprint("listen"))
            .unwrap()
            .map(|r| r.id()),
        Some(1)
    );
}

#[test]
fn purge_short_drops_small_overflow_entries() {
    let (coordinator, _, overflow) = memory_coordinator(MatcherConfig::default());
    overflow
        .set_batch(&[rec(1, "abc"), rec(2, "a much longer sentence")])
        .unwrap();
    assert_eq!(coordinator.purge_short(5).unwrap(), 1);
    assert_eq!(overflow.len(), 1);
}

#[test]
fn maintenance_on_an_idle_coordinator() {
    let (mut coordinator, _, overflow) = memory_coordinator(MatcherConfig::default());
    let report = coordinator.perform_maintenance().unwrap();
    assert_eq!(
        MaintenanceReport {
            archived: None,
            ..report.clone()
        },
        MaintenanceReport::default()
    );
    assert_eq!(overflow.section_count(), 1);
}

#[test]
fn invalid_config_is_rejected_on_open() {
    let overflow = Arc::new(SegmentedStore::in_memory(10).unwrap());
    let result = Coordinator::open(
        MatcherConfig::new().with_cache_capacity(0),
        overflow,
        Arc::new(MatchStats::new()),
    );
    assert!(matches!(result, Err(MatchError::InvalidConfig(_))));
}
