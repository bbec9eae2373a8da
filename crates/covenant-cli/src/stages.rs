//! Stage drivers: wire the HTTP clients to the library stages and run every scope.

use anyhow::Context;
use covenant_ai::{ExtractReport, Extractor, OpenAiExtractor};
use covenant_search::{CollectOptions, Collector, Fetcher, ScopeReport, SecApiSearch, SecArchive};
use covenant_store::MergeReport;
use covenant_store::merge::Normalizer;
use tracing::info;

use crate::config::{ExtractSettings, NormalizeSettings, SearchSettings};

/// Stage 1: search, download and keyword-filter every scope in order.
///
/// Fatal errors (rejected credentials, storage failures) stop the run; the
/// stores of scopes already processed stay on disk.
pub async fn run_search(settings: &SearchSettings) -> anyhow::Result<Vec<ScopeReport>> {
    let search = SecApiSearch::new(settings.api_key.clone())
        .context("building search client")?
        .with_url(&settings.search_url);
    let archive = SecArchive::new(settings.api_key.clone())
        .context("building archive client")?
        .with_base_url(&settings.archive_url);
    let fetcher = Fetcher::new(&archive, settings.delay, settings.retry);
    let collector = Collector::new(
        &search,
        fetcher,
        &settings.layout,
        CollectOptions {
            form_types: settings.form_types.clone(),
            overwrite: settings.overwrite,
            retry: settings.retry,
        },
    );

    let mut reports = Vec::with_capacity(settings.scopes.len());
    for scope in &settings.scopes {
        let report = collector
            .collect_scope(scope)
            .await
            .with_context(|| format!("scope {:?}", scope.kind))?;
        reports.push(report);
    }
    info!(scopes = reports.len(), "search stage complete");
    Ok(reports)
}

/// Stage 2: extract metadata for the admitted filings of every scope.
pub async fn run_extract(settings: &ExtractSettings) -> anyhow::Result<Vec<ExtractReport>> {
    let llm = OpenAiExtractor::new(settings.api_key.clone(), settings.model.clone())
        .context("building LLM client")?
        .with_base_url(&settings.base_url)
        .with_temperature(Some(settings.temperature));
    let extractor = Extractor::new(&llm, &settings.layout, settings.options.clone());

    let mut reports = Vec::with_capacity(settings.scopes.len());
    for scope in &settings.scopes {
        let report = extractor
            .extract_scope(&scope.kind)
            .await
            .with_context(|| format!("scope {:?}", scope.kind))?;
        reports.push(report);
    }
    info!(scopes = reports.len(), model = %settings.model, "extract stage complete");
    Ok(reports)
}

/// Stage 3: normalize categories and write the combined dataset.
pub fn run_normalize(settings: &NormalizeSettings) -> anyhow::Result<MergeReport> {
    info!(
        mapping = %settings.mapping_path.display(),
        entries = settings.mapping.len(),
        "normalizing"
    );
    let report = Normalizer::new(&settings.mapping)
        .run(&settings.layout, settings.scopes.as_deref(), &settings.output)
        .context("writing combined dataset")?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use covenant_core::CategoryMapping;
    use covenant_store::DatasetLayout;

    use super::*;

    fn settings(root: PathBuf, output: PathBuf) -> NormalizeSettings {
        NormalizeSettings {
            layout: DatasetLayout::new(root),
            scopes: None,
            mapping: CategoryMapping::parse(r#"{"Master Agreement": "isda_master"}"#, "test").unwrap(),
            mapping_path: PathBuf::from("mapping.json"),
            output,
        }
    }

    #[test]
    fn normalize_writes_empty_dataset_for_empty_stores() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("filings_derivatives.json"), "[]\n").unwrap();
        let output = tmp.path().join("filings.json");

        let report = run_normalize(&settings(tmp.path().into(), output.clone())).unwrap();
        assert_eq!(report.entries, 0);
        assert_eq!(report.scopes.len(), 1);
        assert_eq!(std::fs::read_to_string(output).unwrap(), "[]\n");
    }

    #[test]
    fn normalize_fails_without_dataset_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("missing");
        let err = run_normalize(&settings(root.clone(), root.join("filings.json"))).unwrap_err();
        assert!(format!("{err:#}").contains("missing"));
    }
}
