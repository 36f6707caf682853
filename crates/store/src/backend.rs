use crate::StoreError;
use std::collections::HashMap;
use std::sync::RwLock;

/// Key-value storage for a single overflow segment.
///
/// Keys are fingerprint strings, values are encoded records. Implementations
/// must be safe to read from one thread while another writes.
pub trait SegmentBackend: Send + Sync {
    /// Insert or update a key-value pair.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    /// Retrieve a value by key.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
    /// Retrieve several values. Results line up with `keys`.
    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        keys.iter().map(|key| self.get(key)).collect()
    }
    /// Delete a key. Returns whether it was present.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
    /// Insert or update multiple key-value pairs in one transaction.
    fn batch_put(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StoreError>;
    /// Delete many keys in one transaction. Returns how many were present.
    fn batch_delete(&self, keys: &[String]) -> Result<usize, StoreError>;
    /// Visit every key-value pair.
    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
    fn len(&self) -> Result<usize, StoreError>;
    /// Flush any buffered writes to the backend.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// An in-memory segment using a `RwLock` around a `HashMap`.
#[derive(Default)]
pub struct MemorySegment {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySegment {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::backend("poisoned lock")
}

impl SegmentBackend for MemorySegment {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.records.read().map_err(poisoned)?;
        Ok(guard.get(key).cloned())
    }

    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.records.read().map_err(poisoned)?.contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .records
            .write()
            .map_err(poisoned)?
            .remove(key)
            .is_some())
    }

    fn batch_put(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
        // One write lock for the whole batch.
        let mut guard = self.records.write().map_err(poisoned)?;
        for (key, value) in entries {
            guard.insert(key, value);
        }
        Ok(())
    }

    fn batch_delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        let mut guard = self.records.write().map_err(poisoned)?;
        Ok(keys.iter().filter(|k| guard.remove(k.as_str()).is_some()).count())
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let guard = self.records.read().map_err(poisoned)?;
        for (key, value) in guard.iter() {
            visitor(key, value)?;
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}

/// Redb-backed segment file.
pub mod redb;

pub use self::redb::RedbSegment;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_segment_counts_and_deletes() {
        let seg = MemorySegment::new();
        seg.batch_put(vec![
            ("a".into(), b"1".to_vec()),
            ("b".into(), b"2".to_vec()),
        ])
        .unwrap();
        seg.put("a", b"3").unwrap();
        assert_eq!(seg.len().unwrap(), 2);
        assert_eq!(seg.get("a").unwrap(), Some(b"3".to_vec()));
        assert!(seg.delete("a").unwrap());
        assert!(!seg.delete("a").unwrap());
        assert_eq!(seg.batch_delete(&["b".into(), "zz".into()]).unwrap(), 1);
        assert_eq!(seg.len().unwrap(), 0);
    }
}
