//! Normalizing merge of per-scope stores into one combined dataset.

use std::path::{Path, PathBuf};

use covenant_core::{CategoryMapping, FilingRecord};
use tracing::{info, warn};

use crate::{DatasetLayout, ScopeStore, StoreError, write_json_atomic};

/// Counts for one scope in a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeMergeStats {
    pub scope: String,
    /// Records in the scope store.
    pub total: usize,
    /// Records carried into the combined dataset.
    pub kept: usize,
    /// Kept records whose category had no mapping.
    pub unmapped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub output: PathBuf,
    pub scopes: Vec<ScopeMergeStats>,
    pub entries: usize,
}

/// Maps raw categories to canonical contract types and combines stores.
pub struct Normalizer<'a> {
    mapping: &'a CategoryMapping,
}

impl<'a> Normalizer<'a> {
    pub fn new(mapping: &'a CategoryMapping) -> Self {
        Self { mapping }
    }

    /// Normalized copies of every admitted record in `store` that has metadata.
    pub fn normalize_store(&self, store: &ScopeStore) -> (Vec<FilingRecord>, ScopeMergeStats) {
        let mut stats = ScopeMergeStats {
            scope: store.scope().to_string(),
            total: store.len(),
            ..Default::default()
        };
        let mut out = Vec::new();
        for record in store.records() {
            if !record.is_admitted() {
                continue;
            }
            let Some(metadata) = &record.metadata else {
                continue;
            };
            let mut entry = record.clone();
            if entry.scope.is_empty() {
                entry.scope = store.scope().to_string();
            }
            let mut metadata = metadata.clone();
            let category = metadata.contract_category.clone();
            if !metadata.normalize(self.mapping) {
                warn!(
                    scope = %entry.scope,
                    uid = %entry.uid,
                    category = category.as_deref().unwrap_or(""),
                    "unmapped contract category, using fallback type"
                );
                stats.unmapped += 1;
            }
            entry.metadata = Some(metadata);
            out.push(entry);
            stats.kept += 1;
        }
        (out, stats)
    }

    /// Combine stores into one list ordered by `(scope, uid)`.
    pub fn combine(&self, stores: &[ScopeStore]) -> (Vec<FilingRecord>, Vec<ScopeMergeStats>) {
        let mut entries = Vec::new();
        let mut stats = Vec::with_capacity(stores.len());
        for store in stores {
            let (records, s) = self.normalize_store(store);
            entries.extend(records);
            stats.push(s);
        }
        entries.sort_by(|a, b| (&a.scope, &a.uid).cmp(&(&b.scope, &b.uid)));
        (entries, stats)
    }

    /// Merge the stores of `scopes` (or every store found in the dataset
    /// directory) and write the combined dataset to `output`.
    pub fn run(
        &self,
        layout: &DatasetLayout,
        scopes: Option<&[String]>,
        output: &Path,
    ) -> Result<MergeReport, StoreError> {
        if !layout.root().is_dir() {
            return Err(StoreError::DatasetNotFound(layout.root().to_path_buf()));
        }
        let names = match scopes {
            Some(s) => s.to_vec(),
            None => layout.discover_scopes()?,
        };

        let mut stores = Vec::with_capacity(names.len());
        for name in &names {
            let store = ScopeStore::open(layout, name)?;
            if store.is_empty() && !store.path().exists() {
                warn!(scope = %name, "no store for scope, skipping");
                continue;
            }
            stores.push(store);
        }

        let (entries, stats) = self.combine(&stores);
        write_json_atomic(output, &entries)?;
        info!(
            output = %output.display(),
            scopes = stats.len(),
            entries = entries.len(),
            "wrote combined dataset"
        );
        Ok(MergeReport {
            output: output.to_path_buf(),
            scopes: stats,
            entries: entries.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::{Admission, ContractMetadata, FilingHit, Party};

    fn mapping() -> CategoryMapping {
        [
            ("Master Agreement", "isda_master"),
            ("Repurchase Agreement", "gmra"),
        ]
        .into_iter()
        .collect()
    }

    fn metadata(category: &str) -> ContractMetadata {
        ContractMetadata {
            document_type: "contract".into(),
            contract_category: Some(category.into()),
            contract_type: Some("ISDA".into()),
            version_type: Some("2002".into()),
            contract_date: Some("2021-03-15".into()),
            is_amendment: false,
            amendment_date: None,
            amendment_number: None,
            party_1: Party {
                name: Some("Acme Corp".into()),
                address: None,
            },
            party_2: Party::default(),
            summary: "Master agreement".into(),
            explanation: "Title".into(),
            confidence: 0.8,
        }
    }

    fn record(scope: &str, n: u32, category: Option<&str>) -> FilingRecord {
        let hit = FilingHit {
            accession_no: format!("0000000000-21-{n:06}"),
            form_type: "8-K".into(),
            filed_at: "2021-06-01".into(),
            url: format!("https://www.sec.gov/Archives/edgar/data/1/{n}/ex10.htm"),
            company: None,
            cik: None,
            description: None,
        };
        let mut r = FilingRecord::from_hit(scope, &hit);
        r.status.admission = Admission::Admitted;
        r.metadata = category.map(metadata);
        r
    }

    fn write_store(layout: &DatasetLayout, scope: &str, records: Vec<FilingRecord>) {
        let mut store = ScopeStore::open(layout, scope).unwrap();
        for r in records {
            store.upsert(r);
        }
        store.save().unwrap();
    }

    #[test]
    fn maps_category_to_canonical_type() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        write_store(&layout, "derivatives", vec![record("derivatives", 1, Some("Master Agreement"))]);

        let mapping = mapping();
        let report = Normalizer::new(&mapping)
            .run(&layout, None, &layout.combined_path())
            .unwrap();
        assert_eq!(report.entries, 1);

        let combined: Vec<serde_json::Value> =
            serde_json::from_str(&std::fs::read_to_string(layout.combined_path()).unwrap())
                .unwrap();
        assert_eq!(combined[0]["metadata"]["contract_type"], "isda_master");
        assert!(combined[0]["metadata"].get("contract_category").is_none());
        assert_eq!(combined[0]["scope"], "derivatives");
    }

    #[test]
    fn unmapped_falls_back_and_missing_metadata_dropped() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        write_store(
            &layout,
            "derivatives",
            vec![
                record("derivatives", 1, Some("Loan Agreement")),
                record("derivatives", 2, None),
            ],
        );

        let mapping = mapping();
        let report = Normalizer::new(&mapping)
            .run(&layout, None, &layout.combined_path())
            .unwrap();
        assert_eq!(
            report.scopes,
            vec![ScopeMergeStats {
                scope: "derivatives".into(),
                total: 2,
                kept: 1,
                unmapped: 1,
            }]
        );
        let combined: Vec<FilingRecord> =
            serde_json::from_str(&std::fs::read_to_string(layout.combined_path()).unwrap())
                .unwrap();
        assert_eq!(combined.len(), 1);
        assert_eq!(
            combined[0].metadata.as_ref().unwrap().contract_type.as_deref(),
            Some("other")
        );
    }

    #[test]
    fn rejected_records_are_excluded_even_with_metadata() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        let mut rejected = record("derivatives", 1, Some("Master Agreement"));
        rejected.status.admission = Admission::Rejected;
        let mut pending = record("derivatives", 2, Some("Master Agreement"));
        pending.status.admission = Admission::Pending;
        write_store(
            &layout,
            "derivatives",
            vec![rejected, pending, record("derivatives", 3, Some("Master Agreement"))],
        );

        let mapping = mapping();
        let report = Normalizer::new(&mapping)
            .run(&layout, None, &layout.combined_path())
            .unwrap();
        assert_eq!(report.entries, 1);
        assert_eq!(report.scopes[0].total, 3);
        assert_eq!(report.scopes[0].kept, 1);
        let combined: Vec<FilingRecord> =
            serde_json::from_str(&std::fs::read_to_string(layout.combined_path()).unwrap())
                .unwrap();
        assert!(combined.iter().all(FilingRecord::is_admitted));
        assert_eq!(combined[0].uid, record("derivatives", 3, None).uid);
    }

    #[test]
    fn combined_is_sorted_and_deterministic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        write_store(
            &layout,
            "repo",
            vec![
                record("repo", 5, Some("Repurchase Agreement")),
                record("repo", 4, Some("Repurchase Agreement")),
            ],
        );
        write_store(&layout, "derivatives", vec![record("derivatives", 1, Some("Master Agreement"))]);

        let mapping = mapping();
        let normalizer = Normalizer::new(&mapping);
        normalizer.run(&layout, None, &layout.combined_path()).unwrap();
        let first = std::fs::read(layout.combined_path()).unwrap();

        let combined: Vec<FilingRecord> = serde_json::from_slice(&first).unwrap();
        let keys: Vec<_> = combined.iter().map(|r| (r.scope.clone(), r.uid.clone())).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(combined[0].scope, "derivatives");

        // the combined file itself is not picked up as a scope store
        normalizer.run(&layout, None, &layout.combined_path()).unwrap();
        assert_eq!(std::fs::read(layout.combined_path()).unwrap(), first);
    }

    #[test]
    fn explicit_scopes_restrict_the_merge() {
        let tmp = tempfile::TempDir::new().unwrap();
        let layout = DatasetLayout::new(tmp.path());
        write_store(&layout, "repo", vec![record("repo", 4, Some("Repurchase Agreement"))]);
        write_store(&layout, "derivatives", vec![record("derivatives", 1, Some("Master Agreement"))]);

        let mapping = mapping();
        let out = tmp.path().join("only_repo.json");
        let report = Normalizer::new(&mapping)
            .run(&layout, Some(&["repo".to_string(), "missing".to_string()]), &out)
            .unwrap();
        assert_eq!(report.scopes.len(), 1);
        assert_eq!(report.entries, 1);
    }

    #[test]
    fn missing_dataset_dir_is_an_error() {
        let mapping = mapping();
        let layout = DatasetLayout::new("/nonexistent/dataset");
        let err = Normalizer::new(&mapping)
            .run(&layout, None, Path::new("/nonexistent/dataset/filings.json"))
            .unwrap_err();
        assert!(matches!(err, StoreError::DatasetNotFound(_)));
    }
}
