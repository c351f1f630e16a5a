//! Transport security checks

use crate::analysis::types::{Analyzer, AnalyzerError, AnalyzerOutput, Finding, Severity};
use crate::crawler::CrawlResult;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

// Sub-resource elements whose src/href points at plain HTTP
static RE_INSECURE_SUBRESOURCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<(?:script|iframe|img|link|audio|video|source)\b[^>]*?\b(?:src|href)\s*=\s*["']?(http://[^"'\s>]+)"#).unwrap()
});

/// Reports pages served without TLS and HTTPS pages loading HTTP resources
pub struct TransportAnalyzer;

#[async_trait]
impl Analyzer for TransportAnalyzer {
    fn name(&self) -> &'static str {
        "transport"
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
        Ok(AnalyzerOutput::with_findings(check_transport(crawl)))
    }
}

fn check_transport(crawl: &CrawlResult) -> Vec<Finding> {
    if !crawl.is_https() {
        return vec![Finding::new(
            "tls-not-enforced",
            Severity::High,
            "Site is served over plain HTTP",
        )
        .with_evidence(crawl.final_url.clone())
        .with_impact("Traffic can be read and modified in transit")
        .with_recommendation("Redirect all HTTP traffic to HTTPS")];
    }

    let mut insecure: Vec<&str> = RE_INSECURE_SUBRESOURCE
        .captures_iter(&crawl.html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    insecure.sort_unstable();
    insecure.dedup();

    match insecure.first() {
        Some(first) => vec![Finding::new(
            "transport-mixed-content",
            Severity::Medium,
            format!("HTTPS page loads {} resource(s) over HTTP", insecure.len()),
        )
        .with_evidence(first.to_string())
        .with_recommendation("Load every sub-resource over HTTPS")],
        None => Vec::new(),
    }
}
