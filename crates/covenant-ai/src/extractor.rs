//! Stage 2: extract contract metadata for every admitted filing of a scope.

use std::path::Path;

use covenant_core::{
    ContractMetadata, DocStats, ExtractionState, MetaSource, RetryPolicy, Truncation,
    html_to_text, word_count,
};
use covenant_store::{DatasetLayout, ScopeStore, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{LlmError, MetadataExtractor};
use crate::schema::{ResponseError, parse_response};

/// Default truncation budget in words.
pub const DEFAULT_MAX_WORDS: usize = 900;

/// Errors that abort extraction. Everything else is recorded per filing.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Llm(LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub truncation: Truncation,
    /// Documents with fewer words are marked skipped without an LLM call.
    pub min_words: usize,
    /// Stop a scope after this many successful extractions.
    pub max_files: Option<usize>,
    /// Re-submit filings that already hold valid metadata.
    pub overwrite: bool,
    pub retry: RetryPolicy,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            truncation: Truncation::words(DEFAULT_MAX_WORDS),
            min_words: 0,
            max_files: None,
            overwrite: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-scope counts for one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub scope: String,
    /// Admitted filings considered.
    pub admitted: usize,
    pub extracted: usize,
    pub failed: usize,
    /// Below the minimum length, or no text at all.
    pub skipped: usize,
    /// Already held valid metadata.
    pub unchanged: usize,
    /// Admitted but the local document is gone.
    pub missing: usize,
}

enum Failure {
    Fatal(LlmError),
    Recorded(String),
}

impl From<LlmError> for Failure {
    fn from(e: LlmError) -> Self {
        if e.is_fatal() {
            Self::Fatal(e)
        } else {
            Self::Recorded(e.to_string())
        }
    }
}

impl From<ResponseError> for Failure {
    fn from(e: ResponseError) -> Self {
        Self::Recorded(e.to_string())
    }
}

/// Runs the extraction collaborator over the admitted filings of a scope.
pub struct Extractor<'a> {
    llm: &'a dyn MetadataExtractor,
    layout: &'a DatasetLayout,
    options: ExtractOptions,
}

impl<'a> Extractor<'a> {
    pub fn new(llm: &'a dyn MetadataExtractor, layout: &'a DatasetLayout, options: ExtractOptions) -> Self {
        Self {
            llm,
            layout,
            options,
        }
    }

    /// Extract metadata for one scope's store, saving after each filing.
    ///
    /// A failed re-extraction under `overwrite` keeps the previous metadata
    /// and sets `extraction = failed`; since that metadata is still valid,
    /// later runs leave the record alone unless `overwrite` is set again.
    pub async fn extract_scope(&self, scope: &str) -> Result<ExtractReport, ExtractError> {
        let mut store = ScopeStore::open(self.layout, scope)?;
        let mut report = ExtractReport {
            scope: scope.to_string(),
            ..Default::default()
        };
        if !store.path().exists() {
            info!(scope, "no store for scope, nothing to extract");
            return Ok(report);
        }

        let admitted: Vec<String> = store
            .records()
            .iter()
            .filter(|r| r.is_admitted())
            .map(|r| r.uid.clone())
            .collect();
        info!(scope, admitted = admitted.len(), model = self.llm.model(), "extracting scope");

        for uid in admitted {
            if self
                .options
                .max_files
                .is_some_and(|max| report.extracted >= max)
            {
                info!(scope, max_files = report.extracted, "max files reached");
                break;
            }
            report.admitted += 1;
            let Some(mut record) = store.get(&uid).cloned() else {
                continue;
            };
            if record.has_valid_metadata() && !self.options.overwrite {
                report.unchanged += 1;
                continue;
            }
            let Some(rel) = record
                .local_path
                .clone()
                .filter(|rel| self.layout.resolve(rel).is_file())
            else {
                warn!(scope, uid = %uid, "admitted filing has no local document");
                report.missing += 1;
                continue;
            };

            let html = match self.layout.read_document(&rel) {
                Ok(html) => html,
                Err(e) => {
                    warn!(scope, uid = %uid, error = %e, "cannot read document");
                    record.status.extraction = ExtractionState::Failed;
                    record.status.extraction_error = Some(e.to_string());
                    report.failed += 1;
                    store.commit(record)?;
                    continue;
                }
            };
            let text = html_to_text(&html);
            let words = word_count(&text);
            record.doc_stats = Some(DocStats::from_word_count(words));

            if words == 0 || words < self.options.min_words {
                debug!(scope, uid = %uid, words, "document too short, skipping");
                record.status.extraction = ExtractionState::Skipped;
                record.status.extraction_error = None;
                report.skipped += 1;
                store.commit(record)?;
                continue;
            }

            let snippet = self.options.truncation.apply(&text);
            record.status.extraction_attempts += 1;
            match self.submit(&snippet.text).await {
                Ok(metadata) => {
                    let document = Path::new(&rel)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| rel.clone());
                    record.metadata = Some(metadata);
                    record.meta_source = Some(MetaSource {
                        model: self.llm.model().to_string(),
                        truncation: self.options.truncation.strategy,
                        budget: self.options.truncation.budget,
                        document,
                    });
                    record.status.extraction = ExtractionState::Succeeded;
                    record.status.extraction_error = None;
                    report.extracted += 1;
                    debug!(scope, uid = %uid, words, truncated = snippet.truncated, "extracted");
                }
                Err(Failure::Fatal(e)) => return Err(ExtractError::Llm(e)),
                Err(Failure::Recorded(message)) => {
                    warn!(scope, uid = %uid, error = %message, "extraction failed");
                    record.status.extraction = ExtractionState::Failed;
                    record.status.extraction_error = Some(message);
                    report.failed += 1;
                }
            }
            store.commit(record)?;
        }

        info!(
            scope,
            extracted = report.extracted,
            failed = report.failed,
            skipped = report.skipped,
            unchanged = report.unchanged,
            "scope extracted"
        );
        Ok(report)
    }

    async fn submit(&self, snippet: &str) -> Result<ContractMetadata, Failure> {
        let llm = self.llm;
        let raw = self
            .options
            .retry
            .run("extract", move || llm.extract(snippet))
            .await?;
        Ok(parse_response(&raw)?)
    }
}
