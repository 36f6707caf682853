//! Hits and their review workflow.
//!
//! A [`Hit`] starts in [`HitStatus::Review`]. A reviewer marks it seen,
//! approves or rejects it; an approved hit is later posted or fails to post,
//! and a failed hit can be approved again for another attempt.

use canonical::{CandidateRecord, Fingerprint};
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;
use thiserror::Error;

/// Review state of a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitStatus {
    Review,
    Seen,
    Approved,
    Rejected,
    Posted,
    Failed,
}

impl HitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitStatus::Review => "review",
            HitStatus::Seen => "seen",
            HitStatus::Approved => "approved",
            HitStatus::Rejected => "rejected",
            HitStatus::Posted => "posted",
            HitStatus::Failed => "failed",
        }
    }

    /// Whether the workflow allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: HitStatus) -> bool {
        use HitStatus::*;
        matches!(
            (self, next),
            (Review, Seen | Approved | Rejected)
                | (Seen, Approved | Rejected)
                | (Approved, Posted | Failed)
                | (Failed, Approved)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, HitStatus::Rejected | HitStatus::Posted)
    }
}

impl fmt::Display for HitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed interesting pair.
///
/// `record_one` is the candidate that was already stored; `record_two` is the
/// input that collided with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    /// Millisecond timestamp, strictly increasing per coordinator.
    pub id: u64,
    pub fingerprint: Fingerprint,
    pub status: HitStatus,
    pub record_one: CandidateRecord,
    pub record_two: CandidateRecord,
    pub created_at: DateTime<Utc>,
}

impl Hit {
    pub fn new(id: u64, record_one: CandidateRecord, record_two: CandidateRecord) -> Self {
        Self {
            id,
            fingerprint: record_one.fingerprint().clone(),
            status: HitStatus::Review,
            record_one,
            record_two,
            created_at: Utc::now(),
        }
    }

    /// Record ids as an ordered pair, independent of arrival order.
    pub fn pair_key(&self) -> (u64, u64) {
        pair_key(self.record_one.id(), self.record_two.id())
    }

    pub fn texts(&self) -> [&str; 2] {
        [self.record_one.text(), self.record_two.text()]
    }
}

pub(crate) fn pair_key(a: u64, b: u64) -> (u64, u64) {
    (a.min(b), a.max(b))
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HitStoreError {
    #[error("hit {0} not found")]
    NotFound(u64),
    #[error("hit {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: HitStatus,
        to: HitStatus,
    },
    #[error("hit {0} already exists")]
    Duplicate(u64),
    #[error("hit store backend failure: {0}")]
    Backend(String),
}

/// Persistence for emitted hits, shared by the coordinator and reviewers.
pub trait HitStore: Send + Sync {
    fn insert(&self, hit: Hit) -> Result<(), HitStoreError>;

    fn get(&self, id: u64) -> Result<Option<Hit>, HitStoreError>;

    /// Every stored hit whose records share `fingerprint`.
    fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<Hit>, HitStoreError>;

    /// Hits in `status`, newest first.
    fn with_status(&self, status: HitStatus) -> Result<Vec<Hit>, HitStoreError>;

    /// Move a hit through the workflow. Illegal transitions are refused.
    fn set_status(&self, id: u64, status: HitStatus) -> Result<Hit, HitStoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct HitTables {
    hits: HashMap<u64, Hit>,
    by_fingerprint: HashMap<Fingerprint, Vec<u64>>,
}

/// [`HitStore`] backed by a pair of hash maps.
#[derive(Default)]
pub struct InMemoryHitStore {
    tables: RwLock<HitTables>,
}

impl InMemoryHitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> HitStoreError {
    HitStoreError::Backend("poisoned lock".into())
}

impl HitStore for InMemoryHitStore {
    fn insert(&self, hit: Hit) -> Result<(), HitStoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        if tables.hits.contains_key(&hit.id) {
            return Err(HitStoreError::Duplicate(hit.id));
        }
        tables
            .by_fingerprint
            .entry(hit.fingerprint.clone())
            .or_default()
            .push(hit.id);
        tables.hits.insert(hit.id, hit);
        Ok(())
    }

    fn get(&self, id: u64) -> Result<Option<Hit>, HitStoreError> {
        Ok(self.tables.read().map_err(poisoned)?.hits.get(&id).cloned())
    }

    fn by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Vec<Hit>, HitStoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .by_fingerprint
            .get(fingerprint)
            .map(|ids| ids.iter().filter_map(|id| tables.hits.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    fn with_status(&self, status: HitStatus) -> Result<Vec<Hit>, HitStoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut hits: Vec<Hit> = tables
            .hits
            .values()
            .filter(|hit| hit.status == status)
            .cloned()
            .collect();
        hits.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        Ok(hits)
    }

    fn set_status(&self, id: u64, status: HitStatus) -> Result<Hit, HitStoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let hit = tables.hits.get_mut(&id).ok_or(HitStoreError::NotFound(id))?;
        if !hit.status.can_transition_to(status) {
            return Err(HitStoreError::InvalidTransition {
                id,
                from: hit.status,
                to: status,
            });
        }
        hit.status = status;
        Ok(hit.clone())
    }

    fn len(&self) -> usize {
        self.tables.read().map(|t| t.hits.len()).unwrap_or(0)
    }
}
