//! Filing records and their pipeline state.
//!
//! A record is created when the search service first returns a candidate,
//! then updated in place by each stage: the collector sets fetch and
//! admission state, the extractor sets `doc_stats`, `metadata` and
//! `meta_source`. Records are never removed from a store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::ContractMetadata;
use crate::text::TruncationStrategy;
use crate::uid::filing_uid;

/// Words per page used for `pages_estimate`.
pub const WORDS_PER_PAGE: f64 = 500.0;

/// A candidate filing as returned by the search service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingHit {
    pub accession_no: String,
    pub form_type: String,
    /// Timestamp exactly as reported by the search service.
    pub filed_at: String,
    pub url: String,
    pub company: Option<String>,
    pub cik: Option<String>,
    pub description: Option<String>,
}

impl FilingHit {
    pub fn uid(&self) -> String {
        filing_uid(&self.accession_no, &self.url)
    }

    /// File extension for the primary document, or `None` when the URL
    /// does not point at an HTML document.
    pub fn document_extension(&self) -> Option<&'static str> {
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".htm") {
            Some("htm")
        } else if lower.ends_with(".html") {
            Some("html")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    #[default]
    Pending,
    Downloaded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    #[default]
    Pending,
    Admitted,
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    #[default]
    Pending,
    Succeeded,
    Failed,
    /// Document too short to be worth an LLM call.
    Skipped,
}

/// Per-filing pipeline state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingStatus {
    #[serde(default)]
    pub fetch: FetchState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fetch_attempts: u32,
    #[serde(default)]
    pub admission: Admission,
    /// Normalised keyword set the admission decision was made with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_keywords: Vec<String>,
    #[serde(default)]
    pub extraction: ExtractionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
    #[serde(default)]
    pub extraction_attempts: u32,
}

/// Size of the full document text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocStats {
    pub word_count: usize,
    pub pages_estimate: f64,
}

impl DocStats {
    pub fn from_word_count(word_count: usize) -> Self {
        Self {
            word_count,
            pages_estimate: word_count as f64 / WORDS_PER_PAGE,
        }
    }
}

/// Provenance of a record's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSource {
    pub model: String,
    pub truncation: TruncationStrategy,
    pub budget: usize,
    /// File name of the document the metadata was extracted from.
    pub document: String,
}

/// One filing in a per-scope store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingRecord {
    pub uid: String,
    pub scope: String,
    pub accession_no: String,
    pub form_type: String,
    pub filed_at: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cik: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Document path relative to the dataset directory; set only while admitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default)]
    pub status: FilingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_stats: Option<DocStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ContractMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_source: Option<MetaSource>,
}

impl FilingRecord {
    /// New record for a candidate surfaced under `scope`.
    pub fn from_hit(scope: &str, hit: &FilingHit) -> Self {
        Self {
            uid: hit.uid(),
            scope: scope.to_string(),
            accession_no: hit.accession_no.clone(),
            form_type: hit.form_type.clone(),
            filed_at: hit.filed_at.clone(),
            url: hit.url.clone(),
            company: hit.company.clone(),
            cik: hit.cik.clone(),
            description: hit.description.clone(),
            local_path: None,
            status: FilingStatus::default(),
            doc_stats: None,
            metadata: None,
            meta_source: None,
        }
    }

    /// Refresh the search-derived fields, leaving pipeline state untouched.
    pub fn refresh_from_hit(&mut self, hit: &FilingHit) {
        self.accession_no.clone_from(&hit.accession_no);
        self.form_type.clone_from(&hit.form_type);
        self.filed_at.clone_from(&hit.filed_at);
        self.url.clone_from(&hit.url);
        self.company.clone_from(&hit.company);
        self.cik.clone_from(&hit.cik);
        self.description.clone_from(&hit.description);
    }

    /// Drop everything stage 2 derived from the document, returning the
    /// record to `extraction = pending`.
    pub fn clear_extraction(&mut self) {
        self.doc_stats = None;
        self.metadata = None;
        self.meta_source = None;
        self.status.extraction = ExtractionState::Pending;
        self.status.extraction_error = None;
        self.status.extraction_attempts = 0;
    }

    pub fn is_admitted(&self) -> bool {
        self.status.admission == Admission::Admitted
    }

    /// True when the record holds metadata that passes validation.
    pub fn has_valid_metadata(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.validate().is_ok())
    }
}
