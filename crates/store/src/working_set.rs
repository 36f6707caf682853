//! The in-memory working set.
//!
//! Holds at most one candidate per fingerprint: the most recent unmatched
//! record for that key, plus a count of how many collisions it has seen
//! without producing a hit. The matcher owns it exclusively, so it needs no
//! internal locking.

use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use canonical::{CandidateRecord, Fingerprint};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::StoreError;

/// Bump this value whenever the snapshot layout changes.
pub const SNAPSHOT_SCHEMA_VERSION: u16 = 1;

/// A cached candidate and its collision count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub record: CandidateRecord,
    /// Collisions that did not produce a hit. Session-local; not persisted.
    pub hit_count: u32,
}

#[derive(Serialize, Deserialize)]
struct CacheSnapshot {
    schema_version: u16,
    records: Vec<CandidateRecord>,
}

#[derive(Debug, Default)]
pub struct WorkingSet {
    entries: HashMap<Fingerprint, CacheEntry>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &Fingerprint) -> Option<&CandidateRecord> {
        self.entries.get(key).map(|e| &e.record)
    }

    pub fn entry(&self, key: &Fingerprint) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// File `record` under its fingerprint.
    ///
    /// A new key starts with `hit_count` 0. An existing key has its record
    /// replaced and its `hit_count` incremented. Returns the resulting count.
    pub fn put(&mut self, record: CandidateRecord) -> u32 {
        let key = record.fingerprint().clone();
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.record = record;
                entry.hit_count = entry.hit_count.saturating_add(1);
                entry.hit_count
            }
            None => {
                self.entries.insert(
                    key,
                    CacheEntry {
                        record,
                        hit_count: 0,
                    },
                );
                0
            }
        }
    }

    pub fn delete(&mut self, key: &Fingerprint) -> Option<CandidateRecord> {
        self.entries.remove(key).map(|e| e.record)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &CacheEntry)> {
        self.entries.iter()
    }

    /// Up to `n` keys ordered by `(record id, hit_count)` ascending: oldest
    /// records first, and among equally old ones the least contested.
    pub fn least_used(&self, n: usize) -> Vec<Fingerprint> {
        if n == 0 {
            return Vec::new();
        }
        let mut ranked: Vec<(u64, u32, &Fingerprint)> = self
            .entries
            .iter()
            .map(|(key, e)| (e.record.id(), e.hit_count, key))
            .collect();
        if n < ranked.len() {
            ranked.select_nth_unstable(n - 1);
            ranked.truncate(n);
        }
        ranked.sort_unstable();
        ranked.into_iter().map(|(_, _, key)| key.clone()).collect()
    }

    /// Remove and return every cached record.
    pub fn drain_all(&mut self) -> Vec<CandidateRecord> {
        self.entries.drain().map(|(_, e)| e.record).collect()
    }

    /// Write all records (not hit counts) to `path`.
    ///
    /// The snapshot is written to a sibling temp file and renamed into place,
    /// so a crash mid-write leaves the previous snapshot intact.
    pub fn save(&self, path: &Path) -> Result<usize, StoreError> {
        let snapshot = CacheSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            records: self.entries.values().map(|e| e.record.clone()).collect(),
        };
        let bytes = encode_to_vec(&snapshot, standard())?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, path)?;
        info!(
            path = %path.display(),
            records = snapshot.records.len(),
            "working_set_saved"
        );
        Ok(snapshot.records.len())
    }

    /// Read a snapshot written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path)?;
        let (snapshot, _): (CacheSnapshot, usize) = decode_from_slice(&bytes, standard())?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(StoreError::Decode(format!(
                "snapshot schema {} is not {SNAPSHOT_SCHEMA_VERSION}",
                snapshot.schema_version
            )));
        }
        let mut set = Self::with_capacity(snapshot.records.len());
        for record in snapshot.records {
            set.entries.insert(
                record.fingerprint().clone(),
                CacheEntry {
                    record,
                    hit_count: 0,
                },
            );
        }
        Ok(set)
    }

    /// [`load`](Self::load), falling back to an empty set. A missing file is
    /// a normal cold start; anything else is logged.
    pub fn load_or_empty(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }
        match Self::load(path) {
            Ok(set) => {
                info!(path = %path.display(), records = set.len(), "working_set_loaded");
                set
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "working_set_load_failed");
                Self::new()
            }
        }
    }
}
