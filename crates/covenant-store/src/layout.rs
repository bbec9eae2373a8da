//! On-disk layout of a dataset directory.
//!
//! ```text
//! dataset/
//!   filings_<scope>.json   per-scope store
//!   filings.json           combined, normalized dataset
//!   files/<uid>.htm        admitted documents
//! ```

use std::path::{Path, PathBuf};

use crate::StoreError;
use crate::scope_store::write_atomic;

pub const FILES_DIR: &str = "files";
pub const COMBINED_FILE: &str = "filings.json";
const STORE_PREFIX: &str = "filings_";
const STORE_SUFFIX: &str = ".json";
const DOCUMENT_EXTENSIONS: &[&str] = &["htm", "html"];

/// Paths inside one dataset directory.
#[derive(Debug, Clone)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files_dir(&self) -> PathBuf {
        self.root.join(FILES_DIR)
    }

    /// Store file for `scope`: `filings_<scope>.json`.
    pub fn store_path(&self, scope: &str) -> PathBuf {
        self.root.join(format!("{STORE_PREFIX}{scope}{STORE_SUFFIX}"))
    }

    /// Default location of the combined dataset.
    pub fn combined_path(&self) -> PathBuf {
        self.root.join(COMBINED_FILE)
    }

    /// Path of a document relative to the dataset root, as stored in `local_path`.
    pub fn document_relpath(uid: &str, extension: &str) -> String {
        format!("{FILES_DIR}/{uid}.{extension}")
    }

    /// Resolve a `local_path` against the dataset root.
    pub fn resolve(&self, relpath: &str) -> PathBuf {
        self.root.join(relpath)
    }

    /// Relative path of an existing document for `uid`, trying `.htm` then `.html`.
    pub fn find_document(&self, uid: &str) -> Option<String> {
        DOCUMENT_EXTENSIONS
            .iter()
            .map(|ext| Self::document_relpath(uid, ext))
            .find(|rel| self.resolve(rel).is_file())
    }

    /// Write a document body atomically and return its relative path.
    ///
    /// An interrupted write leaves no file at the final path, so a document
    /// found by [`find_document`](Self::find_document) is always complete.
    pub fn write_document(&self, uid: &str, extension: &str, body: &str) -> Result<String, StoreError> {
        let rel = Self::document_relpath(uid, extension);
        write_atomic(&self.resolve(&rel), body.as_bytes())?;
        Ok(rel)
    }

    pub fn read_document(&self, relpath: &str) -> Result<String, StoreError> {
        let path = self.resolve(relpath);
        let bytes = std::fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Remove a document if present.
    pub fn remove_document(&self, relpath: &str) -> Result<(), StoreError> {
        let path = self.resolve(relpath);
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(StoreError::io(&path, e)),
            _ => Ok(()),
        }
    }

    /// Create the dataset root and the files directory.
    pub fn ensure_dirs(&self) -> Result<(), StoreError> {
        let files = self.files_dir();
        std::fs::create_dir_all(&files).map_err(|e| StoreError::io(&files, e))
    }

    /// Scope names of every store file in the directory, sorted.
    pub fn discover_scopes(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.is_dir() {
            return Err(StoreError::DatasetNotFound(self.root.clone()));
        }
        let entries = std::fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        let mut scopes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(scope) = name
                .strip_prefix(STORE_PREFIX)
                .and_then(|rest| rest.strip_suffix(STORE_SUFFIX))
                && !scope.is_empty()
            {
                scopes.push(scope.to_string());
            }
        }
        scopes.sort();
        Ok(scopes)
    }
}
