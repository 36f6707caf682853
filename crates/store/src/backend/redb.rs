//! Redb segment files.
//!
//! Each overflow segment is its own redb database holding a single table of
//! `fingerprint -> encoded record`. Rotation opens a new file; archival
//! closes and moves an old one, so no table ever grows without bound.

use crate::{SegmentBackend, StoreError};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::{Path, PathBuf};

const CANDIDATES: TableDefinition<&str, &[u8]> = TableDefinition::new("candidates");

pub struct RedbSegment {
    db: Database,
    path: PathBuf,
}

impl RedbSegment {
    /// Open or create a segment file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(StoreError::backend)?;

        // Accessing the table creates it if it doesn't exist.
        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        {
            let _table = write_txn
                .open_table(CANDIDATES)
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SegmentBackend for RedbSegment {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn
                .open_table(CANDIDATES)
                .map_err(StoreError::backend)?;
            table.insert(key, value).map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(CANDIDATES)
            .map_err(StoreError::backend)?;
        let value = table.get(key).map_err(StoreError::backend)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        // One read transaction for the whole lookup batch.
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(CANDIDATES)
            .map_err(StoreError::backend)?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let value = table.get(*key).map_err(StoreError::backend)?;
            out.push(value.map(|v| v.value().to_vec()));
        }
        Ok(out)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let removed = {
            let mut table = write_txn
                .open_table(CANDIDATES)
                .map_err(StoreError::backend)?;
            let removed = table.remove(key).map_err(StoreError::backend)?.is_some();
            removed
        };
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(removed)
    }

    fn batch_put(&self, entries: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn
                .open_table(CANDIDATES)
                .map_err(StoreError::backend)?;
            for (key, value) in entries {
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(StoreError::backend)?;
            }
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    fn batch_delete(&self, keys: &[String]) -> Result<usize, StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let mut removed = 0;
        {
            let mut table = write_txn
                .open_table(CANDIDATES)
                .map_err(StoreError::backend)?;
            for key in keys {
                if table
                    .remove(key.as_str())
                    .map_err(StoreError::backend)?
                    .is_some()
                {
                    removed += 1;
                }
            }
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(removed)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(CANDIDATES)
            .map_err(StoreError::backend)?;

        for item in table.iter().map_err(StoreError::backend)? {
            let (key, value) = item.map_err(StoreError::backend)?;
            visitor(key.value(), value.value())?;
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(CANDIDATES)
            .map_err(StoreError::backend)?;
        let len = table.len().map_err(StoreError::backend)?;
        Ok(len as usize)
    }
}
