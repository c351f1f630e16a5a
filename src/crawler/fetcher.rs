//! HTTP fetcher implementation
//!
//! This module handles the FAST crawl strategy and the page fetch both strategies
//! share:
//! - Building the HTTP client with the configured user agent and limits
//! - A single GET with bounded redirects
//! - Header, cookie and script extraction
//! - Error classification

use crate::config::CrawlerConfig;
use crate::crawler::parser::parse_page_assets;
use crate::crawler::types::{Cookie, CrawlError, CrawlResult, Crawler, TimingBreakdown};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::{redirect::Policy, Client};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &CrawlerConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(config.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page and builds the common content shape
///
/// Any status outside 2xx/3xx, or an empty body, is a failure: the caller
/// cannot analyze an error page as if it were the target.
pub async fn fetch_page(client: &Client, url: &str) -> Result<CrawlResult, CrawlError> {
    let started = Instant::now();
    let response = client.get(url).send().await?;
    let response_ms = started.elapsed().as_millis() as u64;

    let status = response.status();
    let final_url = response.url().clone();
    let response_headers = collect_headers(response.headers());
    let cookies = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(parse_set_cookie)
        .collect::<Vec<_>>();

    if !(status.is_success() || status.is_redirection()) {
        return Err(CrawlError::Status(status.as_u16()));
    }

    let body_started = Instant::now();
    let html = response.text().await?;
    let download_ms = body_started.elapsed().as_millis() as u64;

    if html.trim().is_empty() {
        return Err(CrawlError::EmptyBody);
    }

    let assets = parse_page_assets(&html, &final_url);

    debug!(
        url,
        final_url = %final_url,
        status = status.as_u16(),
        bytes = html.len(),
        scripts = assets.script_sources.len(),
        "Fetched page"
    );

    Ok(CrawlResult {
        url: url.to_string(),
        final_url: final_url.to_string(),
        status_code: status.as_u16(),
        html,
        response_headers,
        cookies,
        scripts: assets.inline_scripts,
        script_sources: assets.script_sources,
        network_requests: None,
        timing: TimingBreakdown {
            response_ms,
            download_ms,
            resources_ms: None,
            total_ms: started.elapsed().as_millis() as u64,
        },
    })
}

/// Lower-cases header names and joins repeated values
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = match value.to_str() {
            Ok(s) => s.to_string(),
            Err(_) => "[Invalid UTF-8]".to_string(),
        };
        collected
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}

/// Parses one `Set-Cookie` header value
///
/// Returns None when the value has no `name=value` pair.
pub fn parse_set_cookie(header: &str) -> Option<Cookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        value: value.trim().to_string(),
        ..Cookie::default()
    };

    for attribute in parts {
        let (key, val) = match attribute.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attribute.trim(), None),
        };

        match key.to_ascii_lowercase().as_str() {
            "httponly" => cookie.http_only = true,
            "secure" => cookie.secure = true,
            "domain" => cookie.domain = val.map(str::to_string),
            "path" => cookie.path = val.map(str::to_string),
            "samesite" => cookie.same_site = val.map(str::to_string),
            _ => {}
        }
    }

    Some(cookie)
}

/// FAST crawl: one request, no sub-resources
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Crawler for HttpFetcher {
    fn name(&self) -> &'static str {
        "http-fetcher"
    }

    async fn crawl(&self, url: &str) -> Result<CrawlResult, CrawlError> {
        fetch_page(&self.client, url).await
    }
}
