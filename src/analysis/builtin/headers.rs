//! Security header checks

use crate::analysis::types::{Analyzer, AnalyzerError, AnalyzerOutput, Finding, Severity};
use crate::crawler::CrawlResult;
use async_trait::async_trait;

/// Reports missing or weak HTTP security headers
pub struct SecurityHeadersAnalyzer;

#[async_trait]
impl Analyzer for SecurityHeadersAnalyzer {
    fn name(&self) -> &'static str {
        "security-headers"
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
        Ok(AnalyzerOutput::with_findings(check_headers(crawl)))
    }
}

fn check_headers(crawl: &CrawlResult) -> Vec<Finding> {
    let mut findings = Vec::new();

    match crawl.header("content-security-policy") {
        None => findings.push(
            Finding::new(
                "header-missing-csp",
                Severity::Medium,
                "Content-Security-Policy header missing",
            )
            .with_impact("Injected scripts run without restriction")
            .with_recommendation("Define a Content-Security-Policy that restricts script sources"),
        ),
        Some(policy) if policy.contains("'unsafe-inline'") || policy.contains("'unsafe-eval'") => {
            findings.push(
                Finding::new(
                    "header-weak-csp",
                    Severity::Low,
                    "Content-Security-Policy allows unsafe script execution",
                )
                .with_evidence(policy.to_string())
                .with_recommendation("Remove 'unsafe-inline' and 'unsafe-eval' from script sources"),
            )
        }
        Some(_) => {}
    }

    if crawl.is_https() && crawl.header("strict-transport-security").is_none() {
        findings.push(
            Finding::new(
                "header-missing-hsts",
                Severity::Medium,
                "Strict-Transport-Security header missing",
            )
            .with_impact("Browsers may be downgraded to plain HTTP")
            .with_recommendation("Send Strict-Transport-Security with a max-age of at least one year"),
        );
    }

    let frame_protected = crawl.header("x-frame-options").is_some()
        || crawl
            .header("content-security-policy")
            .is_some_and(|p| p.contains("frame-ancestors"));
    if !frame_protected {
        findings.push(
            Finding::new(
                "header-missing-x-frame-options",
                Severity::Low,
                "Clickjacking protection missing",
            )
            .with_recommendation("Send X-Frame-Options: DENY or a CSP frame-ancestors directive"),
        );
    }

    if crawl
        .header("x-content-type-options")
        .map_or(true, |v| !v.eq_ignore_ascii_case("nosniff"))
    {
        findings.push(
            Finding::new(
                "header-missing-x-content-type-options",
                Severity::Low,
                "X-Content-Type-Options: nosniff missing",
            )
            .with_recommendation("Send X-Content-Type-Options: nosniff"),
        );
    }

    findings
}
