//! Crawler module for fetching scan targets
//!
//! This module contains the crawl collaborators and the strategy that picks one:
//! - `HttpFetcher`: FAST crawl, a single page fetch
//! - `RenderingFetcher`: DEEP crawl, the page plus its script resources
//! - `StrategySelector`: FAST/DEEP decision and the one-shot fallback
//! - HTML parsing of the assets analyzers inspect

mod fetcher;
mod parser;
mod render;
mod strategy;
mod types;

pub use fetcher::{build_http_client, fetch_page, parse_set_cookie, HttpFetcher};
pub use parser::{parse_page_assets, PageAssets};
pub use render::RenderingFetcher;
pub use strategy::{CrawlOutcome, StrategyDecision, StrategySelector};
pub use types::{Cookie, CrawlError, CrawlResult, Crawler, NetworkRequest, TimingBreakdown};

use crate::config::CrawlerConfig;
use crate::SentinelError;
use std::sync::Arc;
use std::time::Duration;

/// Builds the FAST and DEEP crawlers from configuration
///
/// Both share one HTTP client.
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `crawl_timeout` - Hard limit for each crawl attempt
///
/// # Returns
///
/// * `Ok(StrategySelector)` - Selector over the built-in crawlers
/// * `Err(SentinelError)` - Failed to build the HTTP client
pub fn build_strategy(
    config: &CrawlerConfig,
    crawl_timeout: Duration,
) -> Result<StrategySelector, SentinelError> {
    let client = build_http_client(config)?;
    let fast = Arc::new(HttpFetcher::new(client.clone()));
    let deep = Arc::new(RenderingFetcher::new(client, config.max_script_fetches));

    Ok(StrategySelector::new(fast, deep, crawl_timeout).with_render_domains(&config.render_domains))
}
