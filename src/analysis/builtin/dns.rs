//! DNS email-security enrichment
//!
//! Looks up SPF and DMARC records for the target's root domain. This is the slow
//! check that runs after the primary report is saved.

use crate::analysis::types::{Analyzer, AnalyzerError, AnalyzerOutput, Finding, Severity, Wave};
use crate::crawler::CrawlResult;
use crate::url::dns_root;
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use tracing::debug;
use url::Url;

/// SPF and DMARC lookups
pub struct DnsSecurityAnalyzer;

#[async_trait]
impl Analyzer for DnsSecurityAnalyzer {
    fn name(&self) -> &'static str {
        "dns-security"
    }

    fn wave(&self) -> Wave {
        Wave::Enrichment
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
        let url = Url::parse(&crawl.final_url)
            .or_else(|_| Url::parse(&crawl.url))
            .map_err(|e| AnalyzerError::Invalid(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| AnalyzerError::Invalid(format!("no host in {}", url)))?;
        let root = dns_root(host);

        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        let dmarc_name = format!("_dmarc.{}", root);
        let (spf, dmarc) = tokio::join!(
            lookup_txt(&resolver, root, "v=spf1"),
            lookup_txt(&resolver, &dmarc_name, "v=DMARC1"),
        );

        Ok(AnalyzerOutput::with_findings(analyze_records(
            spf?.as_deref(),
            dmarc?.as_deref(),
        )))
    }
}

/// Returns the first TXT record starting with `prefix`; `None` when there is none
async fn lookup_txt(
    resolver: &TokioAsyncResolver,
    name: &str,
    prefix: &str,
) -> Result<Option<String>, AnalyzerError> {
    debug!(name, "Looking up TXT records");
    match resolver.txt_lookup(name).await {
        Ok(records) => Ok(records
            .iter()
            .map(|r| r.to_string())
            .find(|r| r.starts_with(prefix))),
        Err(e) if is_no_records(&e) => Ok(None),
        Err(e) => Err(AnalyzerError::Lookup(format!("{}: {}", name, e))),
    }
}

fn is_no_records(error: &ResolveError) -> bool {
    matches!(error.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// Builds findings from the SPF and DMARC records
pub fn analyze_records(spf: Option<&str>, dmarc: Option<&str>) -> Vec<Finding> {
    let mut findings = Vec::new();

    match spf {
        None => findings.push(
            Finding::new("dns-spf-missing", Severity::Medium, "No SPF record")
                .with_impact("Anyone can send mail that claims to come from this domain")
                .with_recommendation("Publish an SPF record ending in -all"),
        ),
        Some(record) if record.trim_end().ends_with("+all") => findings.push(
            Finding::new("dns-spf-permissive", Severity::High, "SPF record allows any sender")
                .with_evidence(record.to_string()),
        ),
        Some(record) if record.trim_end().ends_with("?all") || record.trim_end().ends_with("~all") => {
            findings.push(
                Finding::new("dns-spf-softfail", Severity::Info, "SPF record does not hard-fail")
                    .with_evidence(record.to_string()),
            )
        }
        Some(_) => {}
    }

    match dmarc {
        None => findings.push(
            Finding::new("dns-dmarc-missing", Severity::Medium, "No DMARC record")
                .with_recommendation("Publish a DMARC record with p=quarantine or p=reject"),
        ),
        Some(record) => {
            let policy = record
                .split(';')
                .map(str::trim)
                .find_map(|tag| tag.strip_prefix("p="))
                .map(str::to_ascii_lowercase);
            if policy.as_deref().map_or(true, |p| p == "none") {
                findings.push(
                    Finding::new(
                        "dns-dmarc-policy-none",
                        Severity::Low,
                        "DMARC policy does not reject or quarantine spoofed mail",
                    )
                    .with_evidence(record.to_string()),
                );
            }
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardened_domain() {
        let findings = analyze_records(
            Some("v=spf1 include:_spf.google.com -all"),
            Some("v=DMARC1; p=reject; rua=mailto:d@example.com"),
        );
        assert!(findings.is_empty());
    }

    #[test]
    fn test_missing_records() {
        let kinds: Vec<String> = analyze_records(None, None).into_iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec!["dns-spf-missing", "dns-dmarc-missing"]);
    }

    #[test]
    fn test_weak_policies() {
        let findings = analyze_records(Some("v=spf1 ~all"), Some("v=DMARC1; p=none"));
        let kinds: Vec<&str> = findings.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, vec!["dns-spf-softfail", "dns-dmarc-policy-none"]);
        assert_eq!(findings[0].severity, Severity::Info);
    }

    #[test]
    fn test_plus_all_is_high() {
        let findings = analyze_records(Some("v=spf1 +all"), Some("v=DMARC1; p=quarantine"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
    }
}
