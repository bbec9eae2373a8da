use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading scope and mapping files.
///
/// All of these are fatal: a run never starts with a configuration it
/// could not read in full.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("scope #{index}: {reason}")]
    InvalidScope { index: usize, reason: String },

    #[error("duplicate scope type {0:?}")]
    DuplicateScope(String),

    #[error("invalid mapping in {origin}: {reason}")]
    InvalidMapping { origin: String, reason: String },
}
