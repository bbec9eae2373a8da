//! Stage 1: search, deduplicate, fetch, keyword-filter, and record.

use std::collections::HashSet;

use chrono::Utc;
use covenant_core::{
    Admission, ExtractionState, FetchState, FilingHit, FilingRecord, KeywordFilter, RetryPolicy,
    Scope, html_to_text,
};
use covenant_store::{DatasetLayout, ScopeStore, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::fetch::{FetchError, Fetcher};
use crate::search::{FilingSearch, ScopeSearch, SearchError, SearchGap};

/// Errors that abort collection. Per-filing failures are recorded in the
/// store instead.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Search(SearchError),

    #[error(transparent)]
    Fetch(FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Restrict the search to these form types; empty means all.
    pub form_types: Vec<String>,
    /// Re-download documents even when a local copy exists.
    pub overwrite: bool,
    pub retry: RetryPolicy,
}

/// Per-scope counts for one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeReport {
    pub scope: String,
    /// Hits returned by the search service.
    pub found: usize,
    /// Hits whose uid was already seen earlier in this run.
    pub duplicates: usize,
    /// Hits that do not point at an HTML document.
    pub skipped: usize,
    pub downloaded: usize,
    /// Decisions taken from a local file or an earlier run.
    pub reused: usize,
    pub admitted: usize,
    pub rejected: usize,
    pub fetch_failed: usize,
    pub gaps: Vec<SearchGap>,
}

/// Turns a scope into a store of admitted, locally saved documents.
pub struct Collector<'a> {
    search: &'a dyn FilingSearch,
    fetcher: Fetcher<'a>,
    layout: &'a DatasetLayout,
    options: CollectOptions,
}

impl<'a> Collector<'a> {
    pub fn new(
        search: &'a dyn FilingSearch,
        fetcher: Fetcher<'a>,
        layout: &'a DatasetLayout,
        options: CollectOptions,
    ) -> Self {
        Self {
            search,
            fetcher,
            layout,
            options,
        }
    }

    /// Run stage 1 for one scope.
    ///
    /// The store is written after every record that changes, so an
    /// interrupted run loses at most the record in flight.
    pub async fn collect_scope(&self, scope: &Scope) -> Result<ScopeReport, CollectError> {
        self.layout.ensure_dirs()?;
        let mut store = ScopeStore::open(self.layout, &scope.kind)?;
        let filter = scope.keyword_filter();
        let mut report = ScopeReport {
            scope: scope.kind.clone(),
            ..Default::default()
        };
        info!(
            scope = %scope.kind,
            query = %scope.search,
            start = scope.start,
            end = scope.end,
            keywords = filter.keywords().len(),
            "collecting scope"
        );

        let mut seen = HashSet::new();
        let mut pages = ScopeSearch::new(
            self.search,
            scope,
            &self.options.form_types,
            self.options.retry,
        );
        while let Some(hits) = pages.next_page().await.map_err(CollectError::Search)? {
            for hit in hits {
                report.found += 1;
                let uid = hit.uid();
                if !seen.insert(uid.clone()) {
                    report.duplicates += 1;
                    continue;
                }
                let Some(extension) = hit.document_extension() else {
                    debug!(uid = %uid, url = %hit.url, "not an HTML document, skipping");
                    report.skipped += 1;
                    continue;
                };

                let mut record = match store.get(&uid) {
                    Some(existing) => existing.clone(),
                    None => FilingRecord::from_hit(&scope.kind, &hit),
                };
                record.refresh_from_hit(&hit);
                self.process(&mut record, &hit, extension, &filter, &mut report)
                    .await?;
                store.commit(record)?;
            }
        }
        store.save()?;

        report.gaps = pages.into_gaps();
        info!(
            scope = %scope.kind,
            found = report.found,
            downloaded = report.downloaded,
            admitted = report.admitted,
            rejected = report.rejected,
            fetch_failed = report.fetch_failed,
            gaps = report.gaps.len(),
            "scope collected"
        );
        Ok(report)
    }

    async fn process(
        &self,
        record: &mut FilingRecord,
        hit: &FilingHit,
        extension: &str,
        filter: &KeywordFilter,
        report: &mut ScopeReport,
    ) -> Result<(), CollectError> {
        let local = self.layout.find_document(&record.uid);
        let decided = record.status.admission != Admission::Pending
            && filter.same_as(&record.status.filter_keywords);

        if decided && !self.options.overwrite {
            match (record.status.admission, &local) {
                (Admission::Rejected, _) => {
                    report.rejected += 1;
                    return Ok(());
                }
                (Admission::Admitted, Some(rel)) => {
                    record.local_path = Some(rel.clone());
                    report.reused += 1;
                    report.admitted += 1;
                    return Ok(());
                }
                _ => {}
            }
        }

        let (html, fetched) = match local {
            Some(rel) if !self.options.overwrite => {
                report.reused += 1;
                (self.layout.read_document(&rel)?, false)
            }
            _ => {
                record.status.fetch_attempts += 1;
                match self.fetcher.fetch(&hit.url).await {
                    Ok(body) => {
                        record.status.fetch = FetchState::Downloaded;
                        record.status.fetch_error = None;
                        record.status.fetched_at = Some(Utc::now());
                        report.downloaded += 1;
                        (body, true)
                    }
                    Err(e) if e.is_fatal() => return Err(CollectError::Fetch(e)),
                    Err(e) => {
                        warn!(uid = %record.uid, url = %hit.url, error = %e, "fetch failed");
                        record.status.fetch = FetchState::Failed;
                        record.status.fetch_error = Some(e.to_string());
                        report.fetch_failed += 1;
                        return Ok(());
                    }
                }
            }
        };

        let text = html_to_text(&html);
        record.status.filter_keywords = filter.keywords().to_vec();
        if filter.admits(&text) {
            let rel = if fetched {
                self.layout.write_document(&record.uid, extension, &html)?
            } else {
                match &record.local_path {
                    Some(p) if self.layout.resolve(p).is_file() => p.clone(),
                    _ => self
                        .layout
                        .find_document(&record.uid)
                        .unwrap_or_else(|| DatasetLayout::document_relpath(&record.uid, extension)),
                }
            };
            debug!(uid = %record.uid, keyword = filter.first_match(&text), "admitted");
            record.local_path = Some(rel);
            record.status.admission = Admission::Admitted;
            report.admitted += 1;
        } else {
            debug!(uid = %record.uid, "rejected, no keyword present");
            if record.metadata.is_some() || record.status.extraction != ExtractionState::Pending {
                info!(uid = %record.uid, "rejected filing loses its extracted metadata");
            }
            record.clear_extraction();
            if let Some(rel) = record.local_path.take() {
                self.layout.remove_document(&rel)?;
            }
            if let Some(rel) = self.layout.find_document(&record.uid) {
                self.layout.remove_document(&rel)?;
            }
            record.status.admission = Admission::Rejected;
            report.rejected += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use covenant_core::{ContractMetadata, DocStats, ExtractionState, Party, Scope};

    use super::*;
    use crate::fetch::tests::MockSource;
    use crate::search::tests::{MockSearch, hit};

    fn scope(keywords: &[&str]) -> Scope {
        Scope {
            kind: "derivatives".into(),
            search: "ISDA".into(),
            start: 2021,
            end: 2021,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn isda_fixture() -> (MockSearch, MockSource) {
        let search = MockSearch::default().hits(2021, 1, vec![hit(1), hit(2), hit(3)]);
        let source = MockSource::default()
            .body(&hit(1).url, "<html><body><p>ISDA 2002 Master Agreement</p></body></html>")
            .body(&hit(2).url, "<html><body><p>Loan and Security Agreement</p></body></html>")
            .body(&hit(3).url, "<html><body><p>Schedule to the isda Master</p></body></html>");
        (search, source)
    }

    async fn run(
        search: &MockSearch,
        source: &MockSource,
        layout: &DatasetLayout,
        scope: &Scope,
        overwrite: bool,
    ) -> ScopeReport {
        let fetcher = Fetcher::new(source, Duration::ZERO, RetryPolicy::none());
        let options = CollectOptions {
            overwrite,
            retry: RetryPolicy::none(),
            ..Default::default()
        };
        Collector::new(search, fetcher, layout, options)
            .collect_scope(scope)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn isda_scope_admits_two_of_three() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let (search, source) = isda_fixture();

        let report = run(&search, &source, &layout, &scope(&["ISDA"]), false).await;
        assert_eq!(report.found, 3);
        assert_eq!(report.downloaded, 3);
        assert_eq!(report.admitted, 2);
        assert_eq!(report.rejected, 1);

        let store = ScopeStore::open(&layout, "derivatives").unwrap();
        assert_eq!(store.len(), 3);
        let rejected = store.get(&hit(2).uid()).unwrap();
        assert_eq!(rejected.status.admission, Admission::Rejected);
        assert_eq!(rejected.status.filter_keywords, vec!["isda".to_string()]);
        assert!(rejected.local_path.is_none());
        assert!(layout.find_document(&hit(2).uid()).is_none());

        for n in [1, 3] {
            let r = store.get(&hit(n).uid()).unwrap();
            assert!(r.is_admitted());
            assert_eq!(r.status.extraction, ExtractionState::Pending);
            let rel = r.local_path.as_deref().unwrap();
            assert_eq!(rel, format!("files/{}.htm", r.uid));
            assert!(layout.resolve(rel).is_file());
        }
    }

    #[tokio::test]
    async fn rerun_is_byte_identical_and_offline() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let (search, source) = isda_fixture();
        run(&search, &source, &layout, &scope(&["ISDA"]), false).await;
        let first = std::fs::read(layout.store_path("derivatives")).unwrap();

        let report = run(&search, &source, &layout, &scope(&["isda"]), false).await;
        assert_eq!(source.call_count(), 3);
        assert_eq!(report.downloaded, 0);
        assert_eq!(report.admitted, 2);
        assert_eq!(report.rejected, 1);
        assert_eq!(std::fs::read(layout.store_path("derivatives")).unwrap(), first);
    }

    #[tokio::test]
    async fn changed_keywords_reevaluate() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let (search, source) = isda_fixture();
        run(&search, &source, &layout, &scope(&["ISDA"]), false).await;

        // admitted docs are re-read from disk; the rejected one is fetched again
        let report = run(&search, &source, &layout, &scope(&["loan"]), false).await;
        assert_eq!(source.calls_for(&hit(2).url), 2);
        assert_eq!(source.calls_for(&hit(1).url), 1);
        assert_eq!(report.admitted, 1);
        assert_eq!(report.rejected, 2);

        let store = ScopeStore::open(&layout, "derivatives").unwrap();
        assert!(store.get(&hit(2).uid()).unwrap().is_admitted());
        assert!(!store.get(&hit(1).uid()).unwrap().is_admitted());
        assert!(layout.find_document(&hit(1).uid()).is_none());
        assert!(layout.find_document(&hit(2).uid()).is_some());
    }

    #[tokio::test]
    async fn rejection_drops_extracted_metadata() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let (search, source) = isda_fixture();
        run(&search, &source, &layout, &scope(&["ISDA"]), false).await;

        let mut store = ScopeStore::open(&layout, "derivatives").unwrap();
        let mut extracted = store.get(&hit(1).uid()).unwrap().clone();
        extracted.doc_stats = Some(DocStats::from_word_count(4));
        extracted.metadata = Some(ContractMetadata {
            document_type: "contract".into(),
            contract_category: Some("Master Agreement".into()),
            contract_type: Some("ISDA".into()),
            version_type: Some("2002".into()),
            contract_date: None,
            is_amendment: false,
            amendment_date: None,
            amendment_number: None,
            party_1: Party::default(),
            party_2: Party::default(),
            summary: "ISDA 2002 Master Agreement".into(),
            explanation: "Heading".into(),
            confidence: 0.9,
        });
        extracted.status.extraction = ExtractionState::Succeeded;
        extracted.status.extraction_attempts = 1;
        store.commit(extracted).unwrap();

        run(&search, &source, &layout, &scope(&["loan"]), false).await;

        let store = ScopeStore::open(&layout, "derivatives").unwrap();
        let rejected = store.get(&hit(1).uid()).unwrap();
        assert_eq!(rejected.status.admission, Admission::Rejected);
        assert!(rejected.metadata.is_none());
        assert!(rejected.meta_source.is_none());
        assert!(rejected.doc_stats.is_none());
        assert_eq!(rejected.status.extraction, ExtractionState::Pending);
        assert!(rejected.local_path.is_none());
    }

    #[tokio::test]
    async fn entity_encoded_and_attribute_heavy_html_is_filtered_on_text() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let search = MockSearch::default().hits(2021, 1, vec![hit(1), hit(2), hit(3)]);
        let source = MockSource::default()
            .body(
                &hit(1).url,
                "<html><body><p>Soci&eacute;t&eacute; G&eacute;n&eacute;rale &mdash; Master</p></body></html>",
            )
            .body(
                &hit(2).url,
                r#"<html><body><table><tr><td title="Soci&eacute;t&eacute; G&eacute;n&eacute;rale > x">Loan</td></tr></table></body></html>"#,
            )
            .body(
                &hit(3).url,
                r#"<html><head><script>var s = "Société Générale";</script></head><body><div style="font-family: 'Times New Roman'">Schedule</div></body></html>"#,
            );

        let report = run(&search, &source, &layout, &scope(&["Société Générale"]), false).await;
        assert_eq!(report.admitted, 1);
        assert_eq!(report.rejected, 2);
        let store = ScopeStore::open(&layout, "derivatives").unwrap();
        assert!(store.get(&hit(1).uid()).unwrap().is_admitted());
        assert!(!store.get(&hit(2).uid()).unwrap().is_admitted());
        assert!(!store.get(&hit(3).uid()).unwrap().is_admitted());
    }

    #[tokio::test]
    async fn empty_keywords_admit_everything() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let (search, source) = isda_fixture();
        let report = run(&search, &source, &layout, &scope(&[]), false).await;
        assert_eq!(report.admitted, 3);
        assert_eq!(report.rejected, 0);
    }

    #[tokio::test]
    async fn fetch_failure_is_recorded_and_retried_next_run() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let search = MockSearch::default().hits(2021, 1, vec![hit(1), hit(2)]);
        let source = MockSource::default()
            .body(&hit(1).url, "<p>ISDA</p>")
            .body(&hit(2).url, "<p>ISDA</p>")
            .fail_once(&hit(1).url, FetchError::Http { status: 500 });

        let report = run(&search, &source, &layout, &scope(&["ISDA"]), false).await;
        assert_eq!(report.fetch_failed, 1);
        assert_eq!(report.admitted, 1);
        let store = ScopeStore::open(&layout, "derivatives").unwrap();
        let failed = store.get(&hit(1).uid()).unwrap();
        assert_eq!(failed.status.fetch, FetchState::Failed);
        assert!(failed.status.fetch_error.as_deref().unwrap().contains("500"));
        assert_eq!(failed.status.admission, Admission::Pending);

        let report = run(&search, &source, &layout, &scope(&["ISDA"]), false).await;
        assert_eq!(report.downloaded, 1);
        assert_eq!(report.admitted, 2);
        let store = ScopeStore::open(&layout, "derivatives").unwrap();
        let recovered = store.get(&hit(1).uid()).unwrap();
        assert_eq!(recovered.status.fetch, FetchState::Downloaded);
        assert!(recovered.status.fetch_error.is_none());
        assert_eq!(recovered.status.fetch_attempts, 2);
    }

    #[tokio::test]
    async fn fetch_auth_failure_aborts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let search = MockSearch::default().hits(2021, 1, vec![hit(1), hit(2)]);
        let source = MockSource::default().fail_once(&hit(1).url, FetchError::Unauthorized { status: 401 });
        let fetcher = Fetcher::new(&source, Duration::ZERO, RetryPolicy::none());
        let err = Collector::new(&search, fetcher, &layout, CollectOptions::default())
            .collect_scope(&scope(&["ISDA"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Fetch(FetchError::Unauthorized { .. })));
        assert_eq!(source.call_count(), 1);
    }

    #[tokio::test]
    async fn search_auth_failure_aborts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let search =
            MockSearch::default().respond(2021, 1, Err(SearchError::Unauthorized { status: 401 }));
        let source = MockSource::default();
        let fetcher = Fetcher::new(&source, Duration::ZERO, RetryPolicy::none());
        let err = Collector::new(&search, fetcher, &layout, CollectOptions::default())
            .collect_scope(&scope(&["ISDA"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::Search(_)));
    }

    #[tokio::test]
    async fn duplicates_and_non_html_are_counted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let mut pdf = hit(9);
        pdf.url = pdf.url.replace(".htm", ".pdf");
        let search = MockSearch::default().hits(2021, 1, vec![hit(1), hit(1), pdf]);
        let source = MockSource::default().body(&hit(1).url, "<p>ISDA</p>");
        let report = run(&search, &source, &layout, &scope(&["ISDA"]), false).await;
        assert_eq!(report.found, 3);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(ScopeStore::open(&layout, "derivatives").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn overwrite_refetches() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let (search, source) = isda_fixture();
        run(&search, &source, &layout, &scope(&["ISDA"]), false).await;
        let report = run(&search, &source, &layout, &scope(&["ISDA"]), true).await;
        assert_eq!(report.downloaded, 3);
        assert_eq!(source.call_count(), 6);
    }

    #[tokio::test]
    async fn empty_search_still_creates_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let search = MockSearch::default();
        let source = MockSource::default();
        let report = run(&search, &source, &layout, &scope(&["ISDA"]), false).await;
        assert_eq!(report.found, 0);
        assert_eq!(
            std::fs::read_to_string(layout.store_path("derivatives")).unwrap(),
            "[]\n"
        );
    }
}
