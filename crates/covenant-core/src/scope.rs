//! Search scope definitions.
//!
//! A scope file is an ordered JSON list of scopes. Each scope drives one
//! search query over a range of years and tags every filing it produces
//! with its `type` label, which also names the per-scope store file.
//!
//! ```json
//! [
//!   { "type": "derivatives", "search": "\"ISDA Master Agreement\"",
//!     "start": 2021, "end": 2023, "keywords": ["ISDA"] }
//! ]
//! ```

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;
use crate::keywords::KeywordFilter;

/// One named search configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scope {
    /// Canonical contract-type label. Names the store file `filings_<type>.json`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Full-text query expression passed verbatim to the search service.
    pub search: String,
    pub start: i32,
    pub end: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// On-disk shape. `search` may be a list (first element wins) and `end`
/// defaults to `start`.
#[derive(Deserialize)]
struct RawScope {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    search: Option<QueryField>,
    start: i32,
    #[serde(default)]
    end: Option<i32>,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryField {
    Single(String),
    List(Vec<String>),
}

impl QueryField {
    fn into_query(self) -> String {
        match self {
            Self::Single(s) => s,
            Self::List(list) => list.into_iter().next().unwrap_or_default(),
        }
    }
}

impl Scope {
    /// Calendar years covered by this scope, inclusive.
    pub fn years(&self) -> RangeInclusive<i32> {
        self.start..=self.end
    }

    /// Admission filter built from this scope's keywords.
    pub fn keyword_filter(&self) -> KeywordFilter {
        KeywordFilter::new(&self.keywords)
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidScope { index, reason };

        if self.kind.trim().is_empty() {
            return Err(invalid("`type` must be non-empty".into()));
        }
        if self.kind == "."
            || self.kind == ".."
            || self
                .kind
                .chars()
                .any(|c| c == '/' || c == '\\' || c.is_control())
        {
            return Err(invalid(format!(
                "`type` {:?} cannot be used as a file name",
                self.kind
            )));
        }
        if self.search.trim().is_empty() {
            return Err(invalid(format!("scope {:?} has an empty `search`", self.kind)));
        }
        if self.start > self.end {
            return Err(invalid(format!(
                "scope {:?}: start year {} is after end year {}",
                self.kind, self.start, self.end
            )));
        }
        Ok(())
    }
}

/// Parse and validate a scope list from JSON text.
///
/// `origin` names the source in error messages (usually the file path).
pub fn parse_scopes(json: &str, origin: &str) -> Result<Vec<Scope>, ConfigError> {
    let raw: Vec<RawScope> = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })?;

    let mut seen = HashSet::new();
    let mut scopes = Vec::with_capacity(raw.len());
    for (index, r) in raw.into_iter().enumerate() {
        let scope = Scope {
            kind: r.kind,
            search: r.search.map(QueryField::into_query).unwrap_or_default(),
            start: r.start,
            end: r.end.unwrap_or(r.start),
            keywords: r.keywords,
        };
        scope.validate(index)?;
        if !seen.insert(scope.kind.clone()) {
            return Err(ConfigError::DuplicateScope(scope.kind));
        }
        scopes.push(scope);
    }
    Ok(scopes)
}

/// Read and validate a scope file.
pub fn load_scopes(path: &Path) -> Result<Vec<Scope>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let scopes = parse_scopes(&text, &path.display().to_string())?;
    tracing::debug!(path = %path.display(), count = scopes.len(), "loaded scopes");
    Ok(scopes)
}
