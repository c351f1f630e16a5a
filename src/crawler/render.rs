//! DEEP crawl: page fetch plus script sub-resources
//!
//! Fetches the page the same way the FAST crawl does, then retrieves the page's
//! external scripts concurrently so analyzers see code a browser would load.

use crate::crawler::fetcher::fetch_page;
use crate::crawler::types::{CrawlError, CrawlResult, Crawler, NetworkRequest};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use std::time::Instant;
use tracing::debug;

/// DEEP crawler built on the shared page fetch
pub struct RenderingFetcher {
    client: Client,
    max_script_fetches: usize,
}

impl RenderingFetcher {
    /// Creates a renderer that fetches at most `max_script_fetches` scripts per page
    pub fn new(client: Client, max_script_fetches: usize) -> Self {
        Self {
            client,
            max_script_fetches,
        }
    }

    async fn fetch_script(&self, url: &str) -> (NetworkRequest, Option<String>) {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url, error = %e, "Script fetch failed");
                return (
                    NetworkRequest {
                        url: url.to_string(),
                        resource_type: "script".to_string(),
                        status_code: None,
                    },
                    None,
                );
            }
        };

        let status = response.status();
        let body = if status.is_success() {
            response.text().await.ok()
        } else {
            None
        };

        (
            NetworkRequest {
                url: url.to_string(),
                resource_type: "script".to_string(),
                status_code: Some(status.as_u16()),
            },
            body,
        )
    }
}

#[async_trait]
impl Crawler for RenderingFetcher {
    fn name(&self) -> &'static str {
        "rendering-fetcher"
    }

    async fn crawl(&self, url: &str) -> Result<CrawlResult, CrawlError> {
        let mut result = fetch_page(&self.client, url).await?;

        let started = Instant::now();
        let fetches = result
            .script_sources
            .iter()
            .take(self.max_script_fetches)
            .map(|src| self.fetch_script(src));
        let fetched = join_all(fetches).await;

        let mut requests = Vec::with_capacity(fetched.len());
        for (request, body) in fetched {
            if let Some(body) = body.filter(|b| !b.trim().is_empty()) {
                result.scripts.push(body);
            }
            requests.push(request);
        }

        let resources_ms = started.elapsed().as_millis() as u64;
        result.network_requests = Some(requests);
        result.timing.resources_ms = Some(resources_ms);
        result.timing.total_ms += resources_ms;

        Ok(result)
    }
}
