//! Search layer: sec-api full-text search, archive document fetching, and the
//! collector that turns a scope into an admitted set of local documents.

pub mod collect;
pub mod fetch;
pub mod search;

pub use collect::{CollectError, CollectOptions, Collector, ScopeReport};
pub use fetch::{DocumentSource, FetchError, Fetcher};
pub use search::{Cursor, FilingSearch, ScopeSearch, SearchError, SearchGap, SearchPage, SearchQuery};

#[cfg(feature = "http")]
pub use fetch::SecArchive;
#[cfg(feature = "http")]
pub use search::SecApiSearch;
