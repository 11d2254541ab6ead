// src/fetch/mod.rs

pub mod urls;

use reqwest::{Client, StatusCode};
use std::future::Future;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::SourceConfig;
use urls::PageUrls;

#[derive(Error, Debug)]
pub enum FetchError {
    /// The server answered, but there is no page at this index.
    #[error("page {index} not available (HTTP {status})")]
    NotFound { index: u64, status: u16 },

    /// Worth asking again: transport failure, timeout, 5xx or 429.
    #[error("transient failure fetching page {index}: {message}")]
    Transient { index: u64, message: String },

    #[error("bad page url: {0}")]
    Url(#[from] url::ParseError),

    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    /// Misconfiguration on our side; no later index can succeed either.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Url(_) | FetchError::Client(_))
    }
}

/// Anything that can hand back the raw document for a page index.
pub trait PageSource {
    fn fetch_page(&self, index: u64) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// HTTP page source for the Treasury daily yield feed.
#[derive(Clone, Debug)]
pub struct TreasuryClient {
    client: Client,
    urls: PageUrls,
}

impl TreasuryClient {
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self::with_client(client, PageUrls::new(&config.url_template)))
    }

    pub fn with_client(client: Client, urls: PageUrls) -> Self {
        Self { client, urls }
    }
}

impl PageSource for TreasuryClient {
    #[instrument(level = "debug", skip(self))]
    async fn fetch_page(&self, index: u64) -> Result<String, FetchError> {
        let url = self.urls.page(index)?;
        debug!(%url, "GET");

        let transient = |e: reqwest::Error| FetchError::Transient {
            index,
            message: e.to_string(),
        };

        let resp = self.client.get(url).send().await.map_err(transient)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(index, status));
        }
        resp.text().await.map_err(transient)
    }
}

/// Server errors and throttling are worth a retry; any other failure status
/// means the index is outside the published range.
pub fn classify_status(index: u64, status: StatusCode) -> FetchError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        FetchError::Transient {
            index,
            message: format!("HTTP {}", status),
        }
    } else {
        FetchError::NotFound {
            index,
            status: status.as_u16(),
        }
    }
}
