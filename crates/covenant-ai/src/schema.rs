//! Response schema for metadata extraction.
//!
//! The schema sent to the model is generated from [`MetadataResponse`] and
//! rewritten for strict structured outputs: every object closed with
//! `additionalProperties: false`, every property required (optional values
//! are nullable instead), subschemas inlined, and `format` keywords removed.

use covenant_core::{ContractMetadata, MetadataError, Party};
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Contract,
    Confirmation,
    Other,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Confirmation => "confirmation",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PartyResponse {
    /// Legal name of the party if identifiable
    pub name: Option<String>,
    /// Postal address of the party as it appears in the document
    pub address: Option<String>,
}

/// What the model must return.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MetadataResponse {
    /// contract, confirmation or other. A contract is the agreement itself,
    /// not a letter or memo referring to one.
    pub document_type: DocumentType,
    /// Short label for the kind of agreement, e.g. Master Agreement,
    /// Credit Support Annex, Repurchase Agreement, Credit Facility
    pub contract_category: String,
    /// Instrument family, e.g. ISDA, GMRA, GMSLA, CSA, MRA, MSFTA
    pub contract_type: Option<String>,
    /// Version identifier if any, e.g. 2002, 1992, 2011
    pub version_type: Option<String>,
    /// Contract date as YYYY-MM-DD if determinable
    pub contract_date: Option<String>,
    /// True if the document amends or varies an earlier agreement
    pub is_amendment: bool,
    /// Amendment date as YYYY-MM-DD if applicable
    pub amendment_date: Option<String>,
    /// Amendment identifier or number if applicable
    pub amendment_number: Option<String>,
    /// Usually the first listed party
    pub party_1: PartyResponse,
    /// Usually the second listed party
    pub party_2: PartyResponse,
    /// One sentence describing the document
    pub summary: String,
    /// Phrases from the text that support the choices above
    pub explanation: String,
    /// Confidence in the extracted metadata, between 0.0 and 1.0
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is not valid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response failed validation: {0}")]
    Invalid(#[from] MetadataError),
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

impl PartyResponse {
    fn into_party(self) -> Party {
        Party {
            name: non_empty(self.name),
            address: non_empty(self.address),
        }
    }
}

impl MetadataResponse {
    /// Convert to stored metadata. Blank optional strings become `None`.
    pub fn into_metadata(self) -> ContractMetadata {
        ContractMetadata {
            document_type: self.document_type.as_str().to_string(),
            contract_category: Some(self.contract_category.trim().to_string()),
            contract_type: non_empty(self.contract_type),
            version_type: non_empty(self.version_type),
            contract_date: non_empty(self.contract_date),
            is_amendment: self.is_amendment,
            amendment_date: non_empty(self.amendment_date),
            amendment_number: non_empty(self.amendment_number),
            party_1: self.party_1.into_party(),
            party_2: self.party_2.into_party(),
            summary: self.summary.trim().to_string(),
            explanation: self.explanation.trim().to_string(),
            confidence: self.confidence,
        }
    }
}

/// Decode and validate a raw model response. Never returns partial metadata.
pub fn parse_response(raw: &str) -> Result<ContractMetadata, ResponseError> {
    let response: MetadataResponse = serde_json::from_str(raw.trim())?;
    let metadata = response.into_metadata();
    metadata.validate()?;
    Ok(metadata)
}

/// Strict JSON schema for [`MetadataResponse`].
pub fn metadata_schema() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.option_add_null_type = true;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<MetadataResponse>();
    let mut value = serde_json::to_value(root).unwrap_or_default();
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("definitions");
        map.remove("title");
    }
    make_strict(&mut value);
    value
}

fn make_strict(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("format");
            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".into(), Value::Bool(false));
                if let Some(Value::Object(props)) = map.get("properties") {
                    let required = props.keys().cloned().map(Value::String).collect();
                    map.insert("required".into(), Value::Array(required));
                }
            }
            for (key, v) in map.iter_mut() {
                // property names are data, not schema keywords
                if key == "properties" {
                    if let Value::Object(props) = v {
                        props.values_mut().for_each(make_strict);
                    }
                } else {
                    make_strict(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(make_strict),
        _ => {}
    }
}
