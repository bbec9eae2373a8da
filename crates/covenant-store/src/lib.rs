//! Storage layer: per-scope JSON filing stores and the combined dataset.

mod error;
pub use error::StoreError;

pub mod layout;
pub mod merge;
pub mod scope_store;

pub use layout::DatasetLayout;
pub use merge::{MergeReport, Normalizer, ScopeMergeStats};
pub use scope_store::{ScopeStore, Upsert, write_json_atomic};
