//! Paced retrieval of primary filing documents.

use std::time::Duration;

use async_trait::async_trait;
use covenant_core::{RetryPolicy, Transient};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;

/// Default minimum spacing between document requests.
pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("document service rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("document service returned HTTP {status}")]
    Http { status: u16 },

    #[error("document request failed: {0}")]
    Transport(String),

    #[error("not an EDGAR archive URL: {0}")]
    UnsupportedUrl(String),
}

impl FetchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl Transient for FetchError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http { status } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            Self::Unauthorized { .. } | Self::UnsupportedUrl(_) => false,
        }
    }
}

/// A service that returns the body of a filing document.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Wraps a [`DocumentSource`] with a minimum delay between network attempts
/// and bounded retries.
///
/// The delay applies to every attempt, including retries and attempts that
/// follow a failure.
pub struct Fetcher<'a> {
    source: &'a dyn DocumentSource,
    pacer: Option<DefaultDirectRateLimiter>,
    retry: RetryPolicy,
}

impl<'a> Fetcher<'a> {
    /// A zero `min_delay` disables pacing.
    pub fn new(source: &'a dyn DocumentSource, min_delay: Duration, retry: RetryPolicy) -> Self {
        Self {
            source,
            pacer: Quota::with_period(min_delay).map(RateLimiter::direct),
            retry,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let source = self.source;
        let pacer = self.pacer.as_ref();
        self.retry
            .run("fetch", move || async move {
                if let Some(p) = pacer {
                    p.until_ready().await;
                }
                source.fetch(url).await
            })
            .await
    }
}

#[cfg(feature = "http")]
mod http {
    use tracing::debug;

    use super::*;

    pub const DEFAULT_ARCHIVE_URL: &str = "https://archive.sec-api.io";
    const EDGAR_DATA_PREFIX: &str = "https://www.sec.gov/Archives/edgar/data";

    impl From<reqwest::Error> for FetchError {
        fn from(e: reqwest::Error) -> Self {
            Self::Transport(e.to_string())
        }
    }

    /// sec-api.io archive mirror of EDGAR documents.
    pub struct SecArchive {
        client: reqwest::Client,
        base_url: String,
        api_key: String,
    }

    impl SecArchive {
        pub fn new(api_key: String) -> Result<Self, FetchError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?;
            Ok(Self {
                client,
                base_url: DEFAULT_ARCHIVE_URL.to_string(),
                api_key,
            })
        }

        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into().trim_end_matches('/').to_string();
            self
        }

        /// Archive location of an EDGAR document URL.
        pub fn archive_url(&self, url: &str) -> Result<String, FetchError> {
            let rest = url
                .strip_prefix(EDGAR_DATA_PREFIX)
                .ok_or_else(|| FetchError::UnsupportedUrl(url.to_string()))?;
            Ok(format!("{}{}?token={}", self.base_url, rest, self.api_key))
        }
    }

    #[async_trait]
    impl DocumentSource for SecArchive {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            let target = self.archive_url(url)?;
            debug!(url, "fetching document");
            let resp = self.client.get(&target).send().await?;
            let status = resp.status();
            if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
                return Err(FetchError::Unauthorized {
                    status: status.as_u16(),
                });
            }
            if !status.is_success() {
                return Err(FetchError::Http {
                    status: status.as_u16(),
                });
            }
            Ok(resp.text().await?)
        }
    }
}

#[cfg(feature = "http")]
pub use http::{DEFAULT_ARCHIVE_URL, SecArchive};


#[cfg(all(test, feature = "http"))]
mod wire_tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const EDGAR_URL: &str =
        "https://www.sec.gov/Archives/edgar/data/1000/000119312521001234/d1ex101.htm";

    fn archive(server: &MockServer) -> SecArchive {
        SecArchive::new("tok".into()).unwrap().with_base_url(server.uri())
    }

    #[tokio::test]
    async fn rewrites_edgar_url_to_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/1000/000119312521001234/d1ex101.htm"))
            .and(query_param("token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ISDA</html>"))
            .expect(1)
            .mount(&server)
            .await;
        let body = archive(&server).fetch(EDGAR_URL).await.unwrap();
        assert_eq!(body, "<html>ISDA</html>");
    }

    #[tokio::test]
    async fn status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let err = archive(&server).fetch(EDGAR_URL).await.unwrap_err();
        assert!(err.is_fatal());

        server.reset().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let err = archive(&server).fetch(EDGAR_URL).await.unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 404 }));
    }

    #[tokio::test]
    async fn non_edgar_url_is_unsupported() {
        let server = MockServer::start().await;
        let err = archive(&server)
            .fetch("https://example.com/doc.htm")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedUrl(_)));
    }
}
