//! Structured contract metadata extracted from a filing exhibit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::taxonomy::CategoryMapping;

/// Allowed values of [`ContractMetadata::document_type`].
pub const DOCUMENT_TYPES: &[&str] = &["contract", "confirmation", "other"];

/// A contracting party as it appears in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// Metadata stored on a filing record.
///
/// Straight out of extraction, `contract_category` holds the raw label the
/// model proposed and `contract_type` its free-form instrument guess (ISDA,
/// GMRA, ...). After normalization `contract_category` is gone and
/// `contract_type` holds the canonical type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractMetadata {
    pub document_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_category: Option<String>,
    #[serde(default)]
    pub contract_type: Option<String>,
    #[serde(default)]
    pub version_type: Option<String>,
    /// Effective date, `YYYY-MM-DD`.
    #[serde(default)]
    pub contract_date: Option<String>,
    pub is_amendment: bool,
    #[serde(default)]
    pub amendment_date: Option<String>,
    #[serde(default)]
    pub amendment_number: Option<String>,
    #[serde(default)]
    pub party_1: Party,
    #[serde(default)]
    pub party_2: Party,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub explanation: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetadataError {
    #[error("missing required field `{0}`")]
    Missing(&'static str),

    #[error("field `{field}` has invalid value {value:?}: {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ContractMetadata {
    /// Validate freshly extracted metadata.
    ///
    /// Requires a non-empty `contract_category`, a known `document_type`, a
    /// finite confidence in `[0, 1]`, and ISO dates where dates are given.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if !DOCUMENT_TYPES.contains(&self.document_type.as_str()) {
            return Err(MetadataError::Invalid {
                field: "document_type",
                value: self.document_type.clone(),
                reason: "expected contract, confirmation or other",
            });
        }
        match self.contract_category.as_deref() {
            Some(c) if !c.trim().is_empty() => {}
            _ => return Err(MetadataError::Missing("contract_category")),
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(MetadataError::Invalid {
                field: "confidence",
                value: self.confidence.to_string(),
                reason: "expected a number between 0 and 1",
            });
        }
        for (field, value) in [
            ("contract_date", &self.contract_date),
            ("amendment_date", &self.amendment_date),
        ] {
            if let Some(v) = value
                && NaiveDate::parse_from_str(v, "%Y-%m-%d").is_err()
            {
                return Err(MetadataError::Invalid {
                    field,
                    value: v.clone(),
                    reason: "expected YYYY-MM-DD",
                });
            }
        }
        Ok(())
    }

    /// Replace the raw category with its canonical contract type.
    ///
    /// Returns `false` when the category was unmapped (or absent) and the
    /// fallback label was used.
    pub fn normalize(&mut self, mapping: &CategoryMapping) -> bool {
        let raw = self.contract_category.take();
        let mapped = raw.as_deref().and_then(|c| mapping.lookup(c));
        self.contract_type = Some(
            mapped
                .unwrap_or(crate::taxonomy::FALLBACK_CONTRACT_TYPE)
                .to_string(),
        );
        mapped.is_some()
    }
}
