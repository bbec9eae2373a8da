//! Paginated full-text search over EDGAR filings.
//!
//! [`FilingSearch`] is one page of one query; [`ScopeSearch`] walks a scope's
//! year range page by page, retrying transient failures and recording a gap
//! when a year cannot be completed.

use async_trait::async_trait;
use covenant_core::{FilingHit, RetryPolicy, Scope, Transient};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Hits per page returned by the search service.
pub const PAGE_SIZE: usize = 100;
/// Highest page number the service will serve for one query.
pub const MAX_PAGES: u32 = 100;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search service rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("search service returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("search request failed: {0}")]
    Transport(String),

    #[error("malformed search response: {0}")]
    Parse(String),
}

impl SearchError {
    /// Errors that must abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl Transient for SearchError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Server { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            Self::Unauthorized { .. } | Self::Parse(_) => false,
        }
    }
}

/// One full-text query over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub form_types: Vec<String>,
    pub start_date: String,
    pub end_date: String,
}

impl SearchQuery {
    /// Query covering calendar year `year`.
    pub fn for_year(query: &str, form_types: &[String], year: i32) -> Self {
        Self {
            query: query.to_string(),
            form_types: form_types.to_vec(),
            start_date: format!("{year:04}-01-01"),
            end_date: format!("{year:04}-12-31"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// Total hits for the query, when the service reports it.
    pub total: Option<u64>,
    pub hits: Vec<FilingHit>,
}

/// A full-text search service.
#[async_trait]
pub trait FilingSearch: Send + Sync {
    /// Fetch page `page` (1-based) of `query`.
    async fn search_page(&self, query: &SearchQuery, page: u32) -> Result<SearchPage, SearchError>;
}

/// Position of the next page to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub year: i32,
    pub page: u32,
}

/// A year whose remaining pages were abandoned after retries ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchGap {
    pub year: i32,
    pub page: u32,
    pub error: String,
}

/// Lazy page-by-page walk over every year of a scope.
pub struct ScopeSearch<'a> {
    search: &'a dyn FilingSearch,
    query: String,
    form_types: Vec<String>,
    end_year: i32,
    retry: RetryPolicy,
    cursor: Option<Cursor>,
    gaps: Vec<SearchGap>,
}

impl<'a> ScopeSearch<'a> {
    pub fn new(
        search: &'a dyn FilingSearch,
        scope: &Scope,
        form_types: &[String],
        retry: RetryPolicy,
    ) -> Self {
        Self {
            search,
            query: scope.search.clone(),
            form_types: form_types.to_vec(),
            end_year: scope.end,
            retry,
            cursor: Some(Cursor {
                year: scope.start,
                page: 1,
            }),
            gaps: Vec::new(),
        }
    }

    /// Restart the walk at `cursor`.
    pub fn resume_from(mut self, cursor: Cursor) -> Self {
        self.cursor = (cursor.year <= self.end_year).then_some(Cursor {
            page: cursor.page.max(1),
            ..cursor
        });
        self
    }

    /// Next page to be requested, or `None` once the walk is finished.
    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    pub fn gaps(&self) -> &[SearchGap] {
        &self.gaps
    }

    pub fn into_gaps(self) -> Vec<SearchGap> {
        self.gaps
    }

    fn next_year(&self, year: i32) -> Option<Cursor> {
        (year < self.end_year).then_some(Cursor {
            year: year + 1,
            page: 1,
        })
    }

    /// Hits of the next non-empty page, or `None` when the walk is done.
    ///
    /// Only fatal errors are returned; anything else ends the current year
    /// with a recorded gap.
    pub async fn next_page(&mut self) -> Result<Option<Vec<FilingHit>>, SearchError> {
        while let Some(cur) = self.cursor {
            let query = SearchQuery::for_year(&self.query, &self.form_types, cur.year);
            let search = self.search;
            let q = &query;
            let result = self
                .retry
                .run("search", move || search.search_page(q, cur.page))
                .await;

            match result {
                Ok(page) => {
                    let n = page.hits.len();
                    let seen = (cur.page as u64 - 1) * PAGE_SIZE as u64 + n as u64;
                    let exhausted = page.total.is_some_and(|t| seen >= t);
                    if cur.page >= MAX_PAGES && n == PAGE_SIZE && !exhausted {
                        warn!(
                            query = %self.query,
                            year = cur.year,
                            total = page.total,
                            "search page cap reached, remaining hits not reachable"
                        );
                    }
                    debug!(year = cur.year, page = cur.page, hits = n, total = page.total, "search page");
                    self.cursor = if n < PAGE_SIZE || exhausted || cur.page >= MAX_PAGES {
                        self.next_year(cur.year)
                    } else {
                        Some(Cursor {
                            page: cur.page + 1,
                            ..cur
                        })
                    };
                    if n > 0 {
                        return Ok(Some(page.hits));
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        query = %self.query,
                        year = cur.year,
                        page = cur.page,
                        error = %e,
                        "search failed, skipping rest of year"
                    );
                    self.gaps.push(SearchGap {
                        year: cur.year,
                        page: cur.page,
                        error: e.to_string(),
                    });
                    self.cursor = self.next_year(cur.year);
                }
            }
        }
        Ok(None)
    }
}

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};
    use tracing::info;

    use super::*;

    pub const DEFAULT_SEARCH_URL: &str = "https://api.sec-api.io/full-text-search";

    impl From<reqwest::Error> for SearchError {
        fn from(e: reqwest::Error) -> Self {
            if e.is_decode() {
                Self::Parse(e.to_string())
            } else {
                Self::Transport(e.to_string())
            }
        }
    }

    /// sec-api.io full-text search client.
    pub struct SecApiSearch {
        client: reqwest::Client,
        url: String,
        api_key: String,
    }

    #[derive(Serialize)]
    struct RequestBody<'a> {
        #[serde(flatten)]
        query: &'a SearchQuery,
        page: String,
    }

    #[derive(Deserialize)]
    struct ResponseBody {
        total: Option<Total>,
        #[serde(default)]
        filings: Vec<ApiFiling>,
    }

    #[derive(Deserialize)]
    struct Total {
        value: u64,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct ApiFiling {
        accession_no: String,
        #[serde(default, deserialize_with = "string_or_number")]
        cik: Option<String>,
        company_name_long: Option<String>,
        form_type: String,
        description: Option<String>,
        filing_url: String,
        filed_at: String,
    }

    fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<serde_json::Value>::deserialize(d)? {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    impl From<ApiFiling> for FilingHit {
        fn from(f: ApiFiling) -> Self {
            Self {
                accession_no: f.accession_no,
                form_type: f.form_type,
                filed_at: f.filed_at,
                url: f.filing_url,
                company: f.company_name_long,
                cik: f.cik,
                description: f.description,
            }
        }
    }

    impl SecApiSearch {
        pub fn new(api_key: String) -> Result<Self, SearchError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?;
            Ok(Self {
                client,
                url: DEFAULT_SEARCH_URL.to_string(),
                api_key,
            })
        }

        /// Point the client at a different endpoint.
        pub fn with_url(mut self, url: impl Into<String>) -> Self {
            self.url = url.into();
            self
        }
    }

    #[async_trait]
    impl FilingSearch for SecApiSearch {
        async fn search_page(&self, query: &SearchQuery, page: u32) -> Result<SearchPage, SearchError> {
            let body = RequestBody {
                query,
                page: page.to_string(),
            };
            let resp = self
                .client
                .post(&self.url)
                .header(reqwest::header::AUTHORIZATION, &self.api_key)
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return Err(SearchError::Unauthorized {
                    status: status.as_u16(),
                });
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(SearchError::Server {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: ResponseBody = resp.json().await?;
            let total = parsed.total.map(|t| t.value);
            info!(
                query = %query.query,
                start = %query.start_date,
                page,
                hits = parsed.filings.len(),
                total,
                "search page fetched"
            );
            Ok(SearchPage {
                total,
                hits: parsed.filings.into_iter().map(FilingHit::from).collect(),
            })
        }
    }
}

#[cfg(feature = "http")]
pub use http::{DEFAULT_SEARCH_URL, SecApiSearch};
