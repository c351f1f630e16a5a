//! Content shape shared by every crawl collaborator

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors a crawl attempt can end with
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Empty response body")]
    EmptyBody,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A cookie set by the target in its response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<String>,
}

/// A sub-resource the crawler requested while building the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequest {
    pub url: String,
    pub resource_type: String,
    /// None when the request itself failed
    pub status_code: Option<u16>,
}

/// Where the crawl spent its time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimingBreakdown {
    /// Time until response headers arrived
    pub response_ms: u64,
    /// Time spent reading the body
    pub download_ms: u64,
    /// Time spent fetching sub-resources (DEEP only)
    pub resources_ms: Option<u64>,
    pub total_ms: u64,
}

/// Result of crawling one target
///
/// Produced once per scan and shared read-only with every analyzer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlResult {
    /// The URL that was requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status_code: u16,
    pub html: String,
    /// Response headers with lower-cased names; repeated headers are joined with ", "
    pub response_headers: BTreeMap<String, String>,
    pub cookies: Vec<Cookie>,
    /// Inline script bodies, plus fetched external scripts for DEEP crawls
    pub scripts: Vec<String>,
    /// Absolute URLs of `<script src>` elements
    pub script_sources: Vec<String>,
    /// Sub-resource requests; only DEEP crawls record them
    pub network_requests: Option<Vec<NetworkRequest>>,
    pub timing: TimingBreakdown,
}

impl CrawlResult {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// True when the page was served over HTTPS after redirects
    pub fn is_https(&self) -> bool {
        self.final_url.starts_with("https://")
    }
}

/// A crawl collaborator
///
/// Implementations fetch the target and return the common content shape;
/// the strategy selector only cares whether they succeed.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Crawls `url`
    async fn crawl(&self, url: &str) -> Result<CrawlResult, CrawlError>;
}
