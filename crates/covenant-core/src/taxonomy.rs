//! Canonical contract-type taxonomy.
//!
//! The mapping file is a flat JSON object from the raw, model-proposed
//! `contract_category` label to a canonical contract type:
//!
//! ```json
//! { "Master Agreement": "isda_master", "Credit Support Annex": "isda_csa" }
//! ```
//!
//! Lookup is exact and case-sensitive. Labels absent from the table map to
//! [`FALLBACK_CONTRACT_TYPE`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Canonical type assigned to categories missing from the mapping table.
pub const FALLBACK_CONTRACT_TYPE: &str = "other";

/// Raw category → canonical contract type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryMapping {
    entries: BTreeMap<String, String>,
}

impl CategoryMapping {
    /// Parse and validate a mapping from JSON text.
    pub fn parse(json: &str, origin: &str) -> Result<Self, ConfigError> {
        let mapping: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        if let Some((raw, _)) = mapping.entries.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(ConfigError::InvalidMapping {
                origin: origin.to_string(),
                reason: format!("category {raw:?} maps to an empty contract type"),
            });
        }
        Ok(mapping)
    }

    /// Read and validate a mapping file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mapping = Self::parse(&text, &path.display().to_string())?;
        tracing::debug!(path = %path.display(), entries = mapping.len(), "loaded category mapping");
        Ok(mapping)
    }

    /// Exact lookup of a raw category.
    pub fn lookup(&self, raw: &str) -> Option<&str> {
        self.entries.get(raw).map(String::as_str)
    }

    /// Canonical type for `raw`, or the fallback label when unmapped.
    pub fn canonical(&self, raw: &str) -> &str {
        self.lookup(raw).unwrap_or(FALLBACK_CONTRACT_TYPE)
    }

    /// Every canonical type the table can produce (excluding the fallback).
    pub fn canonical_types(&self) -> BTreeSet<&str> {
        self.entries.values().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CategoryMapping {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}
