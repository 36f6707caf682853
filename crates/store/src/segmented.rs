//! Segmented overflow store.
//!
//! Records live in an ordered list of segments, oldest first. Lookups fan out
//! across all active segments; new keys are written to the newest segment,
//! and a key that already exists is updated in whichever segment holds it.
//! When the newest segment reaches `segment_capacity` a fresh one is opened.
//!
//! A mutex serializes writers (upserts, deletes, rotation, archival). Readers
//! never take it: they copy the segment list under a short read lock and then
//! query segments without holding any store-level lock.
//!
//! # On-disk layout
//!
//! ```text
//! <dir>/seg-20261016T120000-0000.redb
//! <dir>/seg-20261016T134502-0001.redb
//! <dir>/meta.json
//! <dir>/archive/seg-20261015T090000-0000.redb
//! ```

use canonical::{letter_count, CandidateRecord, Fingerprint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::codec::RecordCodec;
use crate::config::{BackendConfig, StoreConfig};
use crate::overflow::{OverflowStore, SegmentId};
use crate::{MemorySegment, RedbSegment, SegmentBackend, StoreError};

/// Subdirectory that receives archived segment files.
pub const ARCHIVE_DIR: &str = "archive";
/// Metadata file name inside the store directory.
pub const META_FILE: &str = "meta.json";
const SEGMENT_PREFIX: &str = "seg-";
const SEGMENT_EXT: &str = "redb";
const META_VERSION: u16 = 1;

struct Segment {
    id: SegmentId,
    backend: Box<dyn SegmentBackend>,
    entries: AtomicUsize,
}

impl Segment {
    fn new(id: SegmentId, backend: Box<dyn SegmentBackend>) -> Result<Self, StoreError> {
        let entries = backend.len()?;
        Ok(Self {
            id,
            backend,
            entries: AtomicUsize::new(entries),
        })
    }

    fn len(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    fn refresh_len(&self) -> Result<usize, StoreError> {
        let len = self.backend.len()?;
        self.entries.store(len, Ordering::Relaxed);
        Ok(len)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreMeta {
    version: u16,
    segments: Vec<SegmentMeta>,
    #[serde(default)]
    archived: Vec<SegmentId>,
    total_entries: usize,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SegmentMeta {
    id: SegmentId,
    entries: usize,
}

enum Layout {
    Memory,
    Dir(PathBuf),
}

/// [`OverflowStore`] over a list of rotating segments.
pub struct SegmentedStore {
    layout: Layout,
    segments: RwLock<Vec<Arc<Segment>>>,
    archived: RwLock<Vec<SegmentId>>,
    write_lock: Mutex<()>,
    codec: RecordCodec,
    segment_capacity: usize,
    next_seq: AtomicU64,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::backend("poisoned lock")
}

impl SegmentedStore {
    /// Open (or create) a store as described by `cfg`.
    ///
    /// For the redb backend, existing segments are reloaded in the order
    /// recorded in `meta.json` (or by file name if the metadata is missing).
    /// A segment that fails to open is skipped with an error log.
    pub fn open(cfg: &StoreConfig) -> Result<Self, StoreError> {
        cfg.validate()?;
        let layout = match &cfg.backend {
            BackendConfig::InMemory => Layout::Memory,
            BackendConfig::Redb { dir } => {
                fs::create_dir_all(dir.join(ARCHIVE_DIR))?;
                Layout::Dir(dir.clone())
            }
        };

        let store = Self {
            layout,
            segments: RwLock::new(Vec::new()),
            archived: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
            codec: RecordCodec::new(cfg.compression.clone()),
            segment_capacity: cfg.segment_capacity,
            next_seq: AtomicU64::new(0),
        };

        if let Layout::Dir(root) = &store.layout {
            store.reload(root)?;
        }
        if store.section_count() == 0 {
            store.push_new_segment()?;
        }
        store.write_meta()?;
        info!(
            sections = store.section_count(),
            entries = store.len(),
            "overflow_store_opened"
        );
        Ok(store)
    }

    /// In-memory store with the given segment capacity.
    pub fn in_memory(segment_capacity: usize) -> Result<Self, StoreError> {
        Self::open(&StoreConfig::new().with_segment_capacity(segment_capacity))
    }

    /// Ids of the active segments, oldest first.
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.snapshot()
            .map(|segs| segs.iter().map(|s| s.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Ids of segments archived by this store, oldest first.
    pub fn archived_ids(&self) -> Vec<SegmentId> {
        self.archived
            .read()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    fn reload(&self, root: &Path) -> Result<(), StoreError> {
        let meta = match read_meta(root) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(error = %err, "overflow_meta_unreadable");
                None
            }
        };
        let (ids, archived) = match meta {
            Some(meta) => (
                meta.segments.into_iter().map(|s| s.id).collect::<Vec<_>>(),
                meta.archived,
            ),
            None => (list_segment_files(root)?, Vec::new()),
        };

        let mut loaded = Vec::with_capacity(ids.len());
        for id in ids {
            let path = segment_path(root, &id);
            let opened = RedbSegment::open(&path)
                .and_then(|backend| Segment::new(id.clone(), Box::new(backend)));
            match opened {
                Ok(segment) => {
                    debug!(segment = %id, entries = segment.len(), "overflow_segment_loaded");
                    loaded.push(Arc::new(segment));
                }
                Err(err) => {
                    error!(segment = %id, path = %path.display(), error = %err, "overflow_segment_skipped");
                }
            }
        }

        self.next_seq
            .store((loaded.len() + archived.len()) as u64, Ordering::Relaxed);
        *self.segments.write().map_err(poisoned)? = loaded;
        *self.archived.write().map_err(poisoned)? = archived;
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<Arc<Segment>>, StoreError> {
        Ok(self.segments.read().map_err(poisoned)?.clone())
    }

    fn next_segment_id(&self) -> SegmentId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        SegmentId::new(format!(
            "{SEGMENT_PREFIX}{}-{seq:04}",
            Utc::now().format("%Y%m%dT%H%M%S")
        ))
    }

    /// Open a new newest segment. Callers hold `write_lock` (or are `open`).
    fn push_new_segment(&self) -> Result<Arc<Segment>, StoreError> {
        let segment = match &self.layout {
            Layout::Memory => {
                Segment::new(self.next_segment_id(), Box::new(MemorySegment::new()))?
            }
            Layout::Dir(root) => {
                let mut id = self.next_segment_id();
                while segment_path(root, &id).exists()
                    || root.join(ARCHIVE_DIR).join(segment_file_name(&id)).exists()
                {
                    id = self.next_segment_id();
                }
                let backend = RedbSegment::open(segment_path(root, &id))?;
                Segment::new(id, Box::new(backend))?
            }
        };
        let segment = Arc::new(segment);
        self.segments
            .write()
            .map_err(poisoned)?
            .push(Arc::clone(&segment));
        info!(segment = %segment.id, sections = self.section_count(), "overflow_segment_opened");
        Ok(segment)
    }

    fn rotate(&self) -> Result<Arc<Segment>, StoreError> {
        let segment = self.push_new_segment()?;
        if let Err(err) = self.write_meta() {
            warn!(error = %err, "overflow_meta_write_failed");
        }
        Ok(segment)
    }

    fn write_meta(&self) -> Result<(), StoreError> {
        let Layout::Dir(root) = &self.layout else {
            return Ok(());
        };
        let segments = self.snapshot()?;
        let meta = StoreMeta {
            version: META_VERSION,
            total_entries: segments.iter().map(|s| s.len()).sum(),
            segments: segments
                .iter()
                .map(|s| SegmentMeta {
                    id: s.id.clone(),
                    entries: s.len(),
                })
                .collect(),
            archived: self.archived_ids(),
            updated_at: Utc::now(),
        };
        let tmp = root.join(format!("{META_FILE}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(&meta)?)?;
        fs::rename(&tmp, root.join(META_FILE))?;
        Ok(())
    }

    fn holder_of(segments: &[Arc<Segment>], key: &str) -> Result<Option<usize>, StoreError> {
        for (idx, segment) in segments.iter().enumerate() {
            if segment.backend.contains(key)? {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }
}

impl OverflowStore for SegmentedStore {
    fn contains(&self, key: &Fingerprint) -> Result<bool, StoreError> {
        for segment in self.snapshot()? {
            if segment.backend.contains(key.as_str())? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get(&self, key: &Fingerprint) -> Result<Option<CandidateRecord>, StoreError> {
        for segment in self.snapshot()? {
            if let Some(bytes) = segment.backend.get(key.as_str())? {
                return self.codec.decode_for(key, &bytes).map(Some);
            }
        }
        Ok(None)
    }

    fn get_many(&self, keys: &[Fingerprint]) -> Vec<Result<Option<CandidateRecord>, StoreError>> {
        let mut results: Vec<Option<Result<Option<CandidateRecord>, StoreError>>> =
            (0..keys.len()).map(|_| None).collect();
        let segments = match self.snapshot() {
            Ok(segments) => segments,
            Err(err) => return keys.iter().map(|_| Err(err.clone())).collect(),
        };

        let mut pending: Vec<usize> = (0..keys.len()).collect();
        for segment in segments {
            if pending.is_empty() {
                break;
            }
            let lookup: Vec<&str> = pending.iter().map(|&i| keys[i].as_str()).collect();
            match segment.backend.get_many(&lookup) {
                Ok(values) => {
                    let mut still_pending = Vec::with_capacity(pending.len());
                    for (idx, value) in pending.into_iter().zip(values) {
                        match value {
                            Some(bytes) => {
                                results[idx] = Some(self.codec.decode_for(&keys[idx], &bytes).map(Some))
                            }
                            None => still_pending.push(idx),
                        }
                    }
                    pending = still_pending;
                }
                Err(err) => {
                    for idx in pending.drain(..) {
                        results[idx] = Some(Err(err.clone()));
                    }
                }
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or(Ok(None)))
            .collect()
    }

    fn set(&self, record: &CandidateRecord) -> Result<(), StoreError> {
        self.set_batch(std::slice::from_ref(record))
    }

    fn set_batch(&self, records: &[CandidateRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let segments = self.snapshot()?;

        let mut in_place: Vec<Vec<(String, Vec<u8>)>> = vec![Vec::new(); segments.len()];
        let mut fresh: Vec<(String, Vec<u8>)> = Vec::new();
        let mut fresh_slot: hashbrown::HashMap<String, usize> = hashbrown::HashMap::new();

        for record in records {
            let key = record.fingerprint().as_str();
            let value = self.codec.encode(record)?;
            if let Some(&slot) = fresh_slot.get(key) {
                fresh[slot].1 = value;
                continue;
            }
            match Self::holder_of(&segments, key)? {
                Some(idx) => in_place[idx].push((key.to_string(), value)),
                None => {
                    fresh_slot.insert(key.to_string(), fresh.len());
                    fresh.push((key.to_string(), value));
                }
            }
        }

        for (segment, batch) in segments.iter().zip(in_place) {
            if !batch.is_empty() {
                segment.backend.batch_put(batch)?;
                segment.refresh_len()?;
            }
        }

        let mut fresh = fresh.into_iter().peekable();
        let mut target = match segments.last() {
            Some(segment) => Arc::clone(segment),
            None => self.rotate()?,
        };
        while fresh.peek().is_some() {
            let room = self.segment_capacity.saturating_sub(target.len());
            if room == 0 {
                target = self.rotate()?;
                continue;
            }
            let chunk: Vec<_> = fresh.by_ref().take(room).collect();
            target.backend.batch_put(chunk)?;
            target.refresh_len()?;
        }
        Ok(())
    }

    fn delete(&self, key: &Fingerprint) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        for segment in self.snapshot()? {
            if segment.backend.delete(key.as_str())? {
                segment.refresh_len()?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn archive(&self) -> Result<Option<SegmentId>, StoreError> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        match self.section_count() {
            0 => return Ok(None),
            // Keep a write target once the only segment is retired.
            1 => {
                self.rotate()?;
            }
            _ => {}
        }

        let oldest = self.segments.write().map_err(poisoned)?.remove(0);
        if let Layout::Dir(root) = &self.layout {
            let from = segment_path(root, &oldest.id);
            let to = root.join(ARCHIVE_DIR).join(segment_file_name(&oldest.id));
            if let Err(err) = fs::rename(&from, &to) {
                self.segments
                    .write()
                    .map_err(poisoned)?
                    .insert(0, Arc::clone(&oldest));
                return Err(err.into());
            }
        }
        self.archived
            .write()
            .map_err(poisoned)?
            .push(oldest.id.clone());
        if let Err(err) = self.write_meta() {
            warn!(error = %err, "overflow_meta_write_failed");
        }
        info!(
            segment = %oldest.id,
            archived_entries = oldest.len(),
            sections = self.section_count(),
            "overflow_segment_archived"
        );
        Ok(Some(oldest.id.clone()))
    }

    fn section_count(&self) -> usize {
        self.segments.read().map(|s| s.len()).unwrap_or(0)
    }

    fn len(&self) -> usize {
        self.snapshot()
            .map(|segs| segs.iter().map(|s| s.len()).sum())
            .unwrap_or(0)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(CandidateRecord) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        for segment in self.snapshot()? {
            segment.backend.scan(&mut |key, bytes| match self.codec.decode(bytes) {
                Ok(record) => visitor(record),
                Err(err) => {
                    warn!(segment = %segment.id, key, error = %err, "overflow_record_undecodable");
                    Ok(())
                }
            })?;
        }
        Ok(())
    }

    fn purge_short(&self, min_letters: usize) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().map_err(poisoned)?;
        let mut removed = 0;
        for segment in self.snapshot()? {
            let mut short = Vec::new();
            segment.backend.scan(&mut |key, _| {
                if letter_count(key) < min_letters {
                    short.push(key.to_string());
                }
                Ok(())
            })?;
            if !short.is_empty() {
                removed += segment.backend.batch_delete(&short)?;
                segment.refresh_len()?;
            }
        }
        info!(removed, min_letters, "overflow_short_entries_purged");
        Ok(removed)
    }

    fn flush(&self) -> Result<(), StoreError> {
        for segment in self.snapshot()? {
            segment.backend.flush()?;
        }
        self.write_meta()
    }
}

fn segment_file_name(id: &SegmentId) -> String {
    format!("{id}.{SEGMENT_EXT}")
}

fn segment_path(root: &Path, id: &SegmentId) -> PathBuf {
    root.join(segment_file_name(id))
}

fn read_meta(root: &Path) -> Result<Option<StoreMeta>, StoreError> {
    let path = root.join(META_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn list_segment_files(root: &Path) -> Result<Vec<SegmentId>, StoreError> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SEGMENT_EXT) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if stem.starts_with(SEGMENT_PREFIX) {
                ids.push(SegmentId::new(stem));
            }
        }
    }
    ids.sort();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompressionConfig;
    use tempfile::tempdir;

    fn rec(id: u64, text: &str) -> CandidateRecord {
        CandidateRecord::new(id, text)
    }

    fn distinct(n: usize) -> Vec<CandidateRecord> {
        // Every text has a different number of 'z's, so every fingerprint differs.
        (0..n)
            .map(|i| rec(i as u64, &format!("a{}", "z".repeat(i + 1))))
            .collect()
    }

    #[test]
    fn rotates_when_newest_segment_is_full() {
        let store = SegmentedStore::in_memory(3).unwrap();
        store.set_batch(&distinct(7)).unwrap();
        assert_eq!(store.section_count(), 3);
        assert_eq!(store.len(), 7);
        for record in distinct(7) {
            assert_eq!(store.get(record.fingerprint()).unwrap(), Some(record));
        }
    }

    #[test]
    fn upsert_updates_the_holding_segment() {
        let store = SegmentedStore::in_memory(2).unwrap();
        store.set_batch(&distinct(3)).unwrap();
        assert_eq!(store.section_count(), 2);

        // Same fingerprint as record 0, which lives in the oldest segment.
        let replacement = rec(100, "za");
        assert_eq!(replacement.fingerprint(), distinct(1)[0].fingerprint());
        store.set(&replacement).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.section_count(), 2);
        assert_eq!(store.get(replacement.fingerprint()).unwrap(), Some(replacement));
    }

    #[test]
    fn set_batch_is_idempotent() {
        let store = SegmentedStore::in_memory(4).unwrap();
        let batch = distinct(6);
        store.set_batch(&batch).unwrap();
        store.set_batch(&batch).unwrap();
        assert_eq!(store.len(), 6);
        assert_eq!(store.section_count(), 2);
    }

    #[test]
    fn duplicate_keys_in_one_batch_keep_the_last() {
        let store = SegmentedStore::in_memory(10).unwrap();
        store
            .set_batch(&[rec(1, "listen"), rec(2, "silent")])
            .unwrap();
        assert_eq!(store.len(), 1);
        let got = store.get(&canonical::fingerprint("enlist")).unwrap().unwrap();
        assert_eq!(got.id(), 2);
    }

    #[test]
    fn archive_retires_oldest_segment() {
        let store = SegmentedStore::in_memory(2).unwrap();
        let records = distinct(4);
        store.set_batch(&records).unwrap();
        let oldest = store.segment_ids()[0].clone();

        let archived = store.archive().unwrap();
        assert_eq!(archived, Some(oldest.clone()));
        assert_eq!(store.section_count(), 1);
        assert_eq!(store.archived_ids(), vec![oldest]);
        assert!(!store.contains(records[0].fingerprint()).unwrap());
        assert!(store.contains(records[3].fingerprint()).unwrap());
    }

    #[test]
    fn archiving_the_only_segment_keeps_a_write_target() {
        let store = SegmentedStore::in_memory(10).unwrap();
        store.set(&rec(1, "listen")).unwrap();
        assert!(store.archive().unwrap().is_some());
        assert_eq!(store.section_count(), 1);
        assert!(store.is_empty());
        store.set(&rec(2, "silent")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_and_purge_short() {
        let store = SegmentedStore::in_memory(10).unwrap();
        store
            .set_batch(&[
                rec(1, "tiny"),
                rec(2, "Saturday morning in bed"),
                rec(3, "cat"),
            ])
            .unwrap();
        assert!(store.delete(&canonical::fingerprint("cat")).unwrap());
        assert!(!store.delete(&canonical::fingerprint("cat")).unwrap());
        assert_eq!(store.purge_short(16).unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store
            .contains(&canonical::fingerprint("Saturday morning in bed"))
            .unwrap());
    }

    #[test]
    fn get_many_spans_segments() {
        let store = SegmentedStore::in_memory(2).unwrap();
        let records = distinct(5);
        store.set_batch(&records).unwrap();
        let keys = vec![
            records[4].fingerprint().clone(),
            canonical::fingerprint("absent"),
            records[0].fingerprint().clone(),
        ];
        let got = store.get_many(&keys);
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].as_ref().unwrap().as_ref(), Some(&records[4]));
        assert!(got[1].as_ref().unwrap().is_none());
        assert_eq!(got[2].as_ref().unwrap().as_ref(), Some(&records[0]));
    }

    #[test]
    fn corrupt_value_surfaces_as_decode_error_and_is_skipped_by_scan() {
        let store = SegmentedStore::in_memory(10).unwrap();
        store.set(&rec(1, "Moist as heck in here")).unwrap();
        let key = canonical::fingerprint("listen");
        store.snapshot().unwrap()[0]
            .backend
            .put(key.as_str(), b"\xff\xff")
            .unwrap();

        assert!(store.get(&key).unwrap_err().is_decode());
        let mut seen = Vec::new();
        store
            .scan(&mut |r| {
                seen.push(r.id());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn redb_store_reloads_segments_and_meta() {
        let dir = tempdir().unwrap();
        let cfg = StoreConfig::new()
            .with_backend(BackendConfig::redb(dir.path()))
            .with_segment_capacity(2)
            .with_compression(CompressionConfig::zstd());
        let records = distinct(5);
        let ids = {
            let store = SegmentedStore::open(&cfg).unwrap();
            store.set_batch(&records).unwrap();
            store.archive().unwrap();
            store.flush().unwrap();
            store.segment_ids()
        };
        assert!(dir.path().join(META_FILE).exists());
        assert_eq!(fs::read_dir(dir.path().join(ARCHIVE_DIR)).unwrap().count(), 1);

        let store = SegmentedStore::open(&cfg).unwrap();
        assert_eq!(store.segment_ids(), ids);
        assert_eq!(store.archived_ids().len(), 1);
        assert_eq!(store.len(), 3);
        assert_eq!(
            store.get(records[4].fingerprint()).unwrap(),
            Some(records[4].clone())
        );
    }

    #[test]
    fn unreadable_segment_is_skipped_on_open() {
        let dir = tempdir().unwrap();
        let cfg = StoreConfig::new()
            .with_backend(BackendConfig::redb(dir.path()))
            .with_segment_capacity(1);
        let ids = {
            let store = SegmentedStore::open(&cfg).unwrap();
            store.set_batch(&distinct(2)).unwrap();
            store.flush().unwrap();
            store.segment_ids()
        };
        assert_eq!(ids.len(), 2);
        fs::write(segment_path(dir.path(), &ids[0]), b"not a database").unwrap();

        let store = SegmentedStore::open(&cfg).unwrap();
        assert_eq!(store.segment_ids(), vec![ids[1].clone()]);
        assert_eq!(store.len(), 1);
    }
}
