//! Shared types for the contract dataset pipeline.

pub mod error;
pub mod filing;
pub mod keywords;
pub mod metadata;
pub mod retry;
pub mod scope;
pub mod taxonomy;
pub mod text;
pub mod uid;

pub use error::ConfigError;
pub use filing::{
    Admission, DocStats, ExtractionState, FetchState, FilingHit, FilingRecord, FilingStatus,
    MetaSource,
};
pub use keywords::KeywordFilter;
pub use metadata::{ContractMetadata, MetadataError, Party};
pub use retry::{RetryPolicy, Transient};
pub use scope::{Scope, load_scopes, parse_scopes};
pub use taxonomy::{CategoryMapping, FALLBACK_CONTRACT_TYPE};
pub use text::{Truncated, Truncation, TruncationStrategy, html_to_text, word_count};
pub use uid::filing_uid;
