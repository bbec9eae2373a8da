//! Per-scope filing store backed by a single JSON file.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use covenant_core::FilingRecord;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{DatasetLayout, StoreError};

/// Outcome of [`ScopeStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    Unchanged,
}

/// All filing records known for one scope, keyed by uid.
///
/// Records keep the order in which they were first inserted, so saving an
/// unchanged store reproduces the file byte for byte.
#[derive(Debug)]
pub struct ScopeStore {
    scope: String,
    path: PathBuf,
    records: Vec<FilingRecord>,
    index: HashMap<String, usize>,
}

impl ScopeStore {
    /// Open the store for `scope` in `layout`. A missing file is an empty store.
    pub fn open(layout: &DatasetLayout, scope: &str) -> Result<Self, StoreError> {
        Self::open_path(layout.store_path(scope), scope)
    }

    /// Open a store file at an explicit path.
    ///
    /// A file that is not a JSON list of records is an error; the caller must
    /// not overwrite it. Duplicate uids keep the first occurrence.
    pub fn open_path(path: impl Into<PathBuf>, scope: &str) -> Result<Self, StoreError> {
        let path = path.into();
        let mut store = Self {
            scope: scope.to_string(),
            path,
            records: Vec::new(),
            index: HashMap::new(),
        };
        if !store.path.exists() {
            debug!(scope, path = %store.path.display(), "no existing store");
            return Ok(store);
        }

        let raw = std::fs::read_to_string(&store.path).map_err(|e| StoreError::io(&store.path, e))?;
        let records: Vec<FilingRecord> =
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: store.path.clone(),
                source,
            })?;
        for record in records {
            if store.index.contains_key(&record.uid) {
                warn!(scope, uid = %record.uid, "duplicate uid in store, keeping first");
                continue;
            }
            store.index.insert(record.uid.clone(), store.records.len());
            store.records.push(record);
        }
        debug!(scope, count = store.records.len(), "opened store");
        Ok(store)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.index.contains_key(uid)
    }

    pub fn get(&self, uid: &str) -> Option<&FilingRecord> {
        self.index.get(uid).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[FilingRecord] {
        &self.records
    }

    /// Insert a new record or replace the one with the same uid.
    pub fn upsert(&mut self, record: FilingRecord) -> Upsert {
        match self.index.get(&record.uid) {
            Some(&i) if self.records[i] == record => Upsert::Unchanged,
            Some(&i) => {
                self.records[i] = record;
                Upsert::Updated
            }
            None => {
                self.index.insert(record.uid.clone(), self.records.len());
                self.records.push(record);
                Upsert::Inserted
            }
        }
    }

    /// Upsert one record and persist the store if it changed.
    ///
    /// Each call is one all-or-nothing write: an interrupted run leaves the
    /// store as it was after the previous completed record.
    pub fn commit(&mut self, record: FilingRecord) -> Result<Upsert, StoreError> {
        let outcome = self.upsert(record);
        if outcome != Upsert::Unchanged {
            self.save()?;
        }
        Ok(outcome)
    }

    /// Write the whole store atomically.
    pub fn save(&self) -> Result<(), StoreError> {
        write_json_atomic(&self.path, &self.records)
    }
}

/// Serialise `value` as pretty JSON with a trailing newline and move it into
/// place with a rename, so readers never see a partial file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut body = serde_json::to_vec_pretty(value)?;
    body.push(b'\n');
    write_atomic(path, &body)
}

/// Write `bytes` to a temporary file next to `path`, sync it, and rename it
/// over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::io(path, e.error))?;
    Ok(())
}
