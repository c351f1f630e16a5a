//! Crawl strategy selection and the one-shot FAST to DEEP fallback
//!
//! `decide` picks a strategy from the request alone; `execute` runs it under the
//! crawl timeout and, when a FAST crawl fails, retries exactly once with DEEP.

use crate::crawler::types::{CrawlError, CrawlResult, Crawler};
use crate::state::ScanType;
use crate::SentinelError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Label keywords that suggest an AI product; matched against whole labels
const AI_KEYWORDS_EXACT: &[&str] = &["ai", "ml", "gpt", "bot", "llm"];

/// Longer AI keywords; matched anywhere inside a label
const AI_KEYWORDS_PARTIAL: &[&str] = &["chat", "assistant", "openai", "claude", "gemini"];

/// Hosting platforms that serve static markup
const STATIC_FRIENDLY_SUFFIXES: &[&str] = &[
    ".wordpress.com",
    ".shopify.com",
    ".wix.com",
    ".squarespace.com",
    ".gov",
    ".edu",
    ".org",
];

/// Subdomain prefixes that usually front a single-page application
const JS_HEAVY_PREFIXES: &[&str] = &["app.", "admin.", "dashboard.", "portal.", "console."];

/// Strategy chosen for one scan request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDecision {
    pub scan_type: ScanType,
    pub reason: String,
}

impl StrategyDecision {
    fn new(scan_type: ScanType, reason: impl Into<String>) -> Self {
        Self {
            scan_type,
            reason: reason.into(),
        }
    }
}

/// Result of running a decision
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub result: Arc<CrawlResult>,
    /// Strategy that produced `result`
    pub scan_type: ScanType,
    /// True when FAST failed and DEEP produced the result
    pub fell_back: bool,
    /// Why the FAST attempt failed, when it did
    pub fast_error: Option<String>,
    pub duration: Duration,
}

/// Chooses between the FAST and DEEP crawlers and runs the fallback
pub struct StrategySelector {
    fast: Arc<dyn Crawler>,
    deep: Arc<dyn Crawler>,
    crawl_timeout: Duration,
    render_domains: HashSet<String>,
    fast_failures: Mutex<HashSet<String>>,
}

impl StrategySelector {
    /// Creates a selector
    ///
    /// # Arguments
    ///
    /// * `fast` - The FAST crawl collaborator
    /// * `deep` - The DEEP crawl collaborator
    /// * `crawl_timeout` - Hard limit applied to each crawl attempt
    pub fn new(fast: Arc<dyn Crawler>, deep: Arc<dyn Crawler>, crawl_timeout: Duration) -> Self {
        Self {
            fast,
            deep,
            crawl_timeout,
            render_domains: HashSet::new(),
            fast_failures: Mutex::new(HashSet::new()),
        }
    }

    /// Domains known to require rendering
    pub fn with_render_domains<I, D>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: AsRef<str>,
    {
        self.render_domains = domains
            .into_iter()
            .map(|d| d.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Records that a FAST crawl of `domain` failed
    ///
    /// Later batch scans of the domain go straight to DEEP.
    pub fn remember_fast_failure(&self, domain: &str) {
        self.fast_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(domain.to_ascii_lowercase());
    }

    fn has_failed_fast(&self, domain: &str) -> bool {
        self.fast_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(domain)
    }

    /// Decides the crawl strategy for a request
    ///
    /// Interactive requests always use DEEP. Batch requests use FAST unless the
    /// domain is known to need rendering, has failed FAST before, looks like an
    /// AI product or fronts a JS-heavy application.
    pub fn decide(&self, domain: &str, is_batch: bool) -> StrategyDecision {
        if !is_batch {
            return StrategyDecision::new(ScanType::Deep, "User-initiated scan");
        }

        let domain = domain.to_ascii_lowercase();

        if self.render_domains.contains(&domain) {
            return StrategyDecision::new(ScanType::Deep, "Domain configured to require rendering");
        }

        if self.has_failed_fast(&domain) {
            return StrategyDecision::new(ScanType::Deep, "Previous fast crawl failed");
        }

        if let Some(keyword) = ai_keyword(&domain) {
            return StrategyDecision::new(
                ScanType::Deep,
                format!("Domain contains AI keyword \"{}\"", keyword),
            );
        }

        if STATIC_FRIENDLY_SUFFIXES.iter().any(|s| domain.ends_with(s)) {
            return StrategyDecision::new(ScanType::Fast, "Static-friendly hosting platform");
        }

        if JS_HEAVY_PREFIXES.iter().any(|p| domain.starts_with(p)) {
            return StrategyDecision::new(ScanType::Deep, "JS-heavy domain detected");
        }

        StrategyDecision::new(ScanType::Fast, "Batch scan with static content")
    }

    /// Runs `decision` with at most one fallback
    ///
    /// A FAST failure (timeout, error status, transport error) calls `on_fallback`
    /// with the DEEP decision and then runs DEEP under the same timeout. A DEEP
    /// failure is returned as-is; there is no second fallback.
    ///
    /// # Arguments
    ///
    /// * `url` - Target URL
    /// * `domain` - Target domain, remembered on FAST failure
    /// * `decision` - Output of `decide`
    /// * `on_fallback` - Called once, before the DEEP attempt, only when falling back
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOutcome)` - Content from whichever strategy succeeded
    /// * `Err(SentinelError)` - DEEP failed, or `on_fallback` failed
    pub async fn execute<F>(
        &self,
        url: &str,
        domain: &str,
        decision: &StrategyDecision,
        on_fallback: F,
    ) -> Result<CrawlOutcome, SentinelError>
    where
        F: FnOnce(&StrategyDecision) -> Result<(), SentinelError>,
    {
        let started = Instant::now();

        if decision.scan_type == ScanType::Fast {
            match self.attempt(self.fast.as_ref(), url).await {
                Ok(result) => {
                    return Ok(CrawlOutcome {
                        result: Arc::new(result),
                        scan_type: ScanType::Fast,
                        fell_back: false,
                        fast_error: None,
                        duration: started.elapsed(),
                    });
                }
                Err(failure) => {
                    let message = failure.to_string();
                    tracing::warn!(
                        url,
                        crawler = self.fast.name(),
                        error = %message,
                        "Fast crawl failed, falling back to deep crawl"
                    );
                    self.remember_fast_failure(domain);

                    let fallback = StrategyDecision::new(
                        ScanType::Deep,
                        format!("Fallback after fast crawl failure: {}", message),
                    );
                    on_fallback(&fallback)?;

                    let result = self
                        .attempt(self.deep.as_ref(), url)
                        .await
                        .map_err(|f| f.into_error(url))?;

                    return Ok(CrawlOutcome {
                        result: Arc::new(result),
                        scan_type: ScanType::Deep,
                        fell_back: true,
                        fast_error: Some(message),
                        duration: started.elapsed(),
                    });
                }
            }
        }

        let result = self
            .attempt(self.deep.as_ref(), url)
            .await
            .map_err(|f| f.into_error(url))?;

        Ok(CrawlOutcome {
            result: Arc::new(result),
            scan_type: ScanType::Deep,
            fell_back: false,
            fast_error: None,
            duration: started.elapsed(),
        })
    }

    async fn attempt(&self, crawler: &dyn Crawler, url: &str) -> Result<CrawlResult, AttemptFailure> {
        tracing::debug!(url, crawler = crawler.name(), "Starting crawl attempt");
        match timeout(self.crawl_timeout, crawler.crawl(url)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(AttemptFailure::Failed(e)),
            Err(_) => Err(AttemptFailure::TimedOut(self.crawl_timeout.as_millis() as u64)),
        }
    }
}

/// Why one crawl attempt failed
enum AttemptFailure {
    TimedOut(u64),
    Failed(CrawlError),
}

impl AttemptFailure {
    fn into_error(self, url: &str) -> SentinelError {
        match self {
            Self::TimedOut(timeout_ms) => SentinelError::CrawlTimeout {
                url: url.to_string(),
                timeout_ms,
            },
            Self::Failed(source) => SentinelError::Crawl {
                url: url.to_string(),
                source,
            },
        }
    }
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimedOut(ms) => write!(f, "Crawl timeout after {}ms", ms),
            Self::Failed(e) => write!(f, "Crawl failed: {}", e),
        }
    }
}

/// Returns the first AI keyword found among the domain's labels
fn ai_keyword(domain: &str) -> Option<&'static str> {
    let labels: Vec<&str> = domain
        .split(|c| c == '.' || c == '-')
        .filter(|l| !l.is_empty())
        .collect();

    if let Some(keyword) = AI_KEYWORDS_EXACT
        .iter()
        .find(|k| labels.iter().any(|l| l == *k))
    {
        return Some(*keyword);
    }

    AI_KEYWORDS_PARTIAL
        .iter()
        .find(|k| labels.iter().any(|l| l.contains(*k)))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Succeed(&'static str),
        Fail(u16),
        Hang,
    }

    struct FakeCrawler {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeCrawler {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Crawler for FakeCrawler {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn crawl(&self, url: &str) -> Result<CrawlResult, CrawlError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed(html) => Ok(CrawlResult {
                    url: url.to_string(),
                    final_url: url.to_string(),
                    status_code: 200,
                    html: html.to_string(),
                    ..CrawlResult::default()
                }),
                Behavior::Fail(status) => Err(CrawlError::Status(status)),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(CrawlError::EmptyBody)
                }
            }
        }
    }

    fn selector(fast: Arc<FakeCrawler>, deep: Arc<FakeCrawler>) -> StrategySelector {
        StrategySelector::new(fast, deep, Duration::from_millis(50))
    }

    fn idle_selector() -> StrategySelector {
        selector(
            FakeCrawler::new(Behavior::Succeed("fast")),
            FakeCrawler::new(Behavior::Succeed("deep")),
        )
    }

    #[test]
    fn test_interactive_always_deep() {
        let decision = idle_selector().decide("example.com", false);
        assert_eq!(decision.scan_type, ScanType::Deep);
        assert_eq!(decision.reason, "User-initiated scan");
    }

    #[test]
    fn test_batch_defaults_to_fast() {
        let decision = idle_selector().decide("example.com", true);
        assert_eq!(decision.scan_type, ScanType::Fast);
        assert_eq!(decision.reason, "Batch scan with static content");
    }

    #[test]
    fn test_batch_render_domain_is_deep() {
        let selector = idle_selector().with_render_domains(["Shop.Example.com"]);
        assert_eq!(selector.decide("shop.example.com", true).scan_type, ScanType::Deep);
    }

    #[test]
    fn test_batch_after_fast_failure_is_deep() {
        let selector = idle_selector();
        selector.remember_fast_failure("example.com");
        let decision = selector.decide("example.com", true);
        assert_eq!(decision.scan_type, ScanType::Deep);
        assert_eq!(decision.reason, "Previous fast crawl failed");
    }

    #[test]
    fn test_ai_keywords_match_labels() {
        let selector = idle_selector();
        assert_eq!(selector.decide("my-ai.dev", true).scan_type, ScanType::Deep);
        assert_eq!(selector.decide("supportchat.io", true).scan_type, ScanType::Deep);
        // "ai" inside a longer word is not an AI label
        assert_eq!(selector.decide("mail.example.com", true).scan_type, ScanType::Fast);
        assert_eq!(selector.decide("brainstorm.net", true).scan_type, ScanType::Fast);
    }

    #[test]
    fn test_static_friendly_and_js_heavy() {
        let selector = idle_selector();
        assert_eq!(selector.decide("app.example.org", true).scan_type, ScanType::Fast);
        let decision = selector.decide("dashboard.example.com", true);
        assert_eq!(decision.scan_type, ScanType::Deep);
        assert_eq!(decision.reason, "JS-heavy domain detected");
    }

    #[tokio::test]
    async fn test_fast_success_does_not_fall_back() {
        let fast = FakeCrawler::new(Behavior::Succeed("fast"));
        let deep = FakeCrawler::new(Behavior::Succeed("deep"));
        let selector = selector(fast.clone(), deep.clone());
        let decision = selector.decide("example.com", true);

        let mut hook_calls = 0;
        let outcome = selector
            .execute("https://example.com/", "example.com", &decision, |_| {
                hook_calls += 1;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(outcome.scan_type, ScanType::Fast);
        assert!(!outcome.fell_back);
        assert_eq!(outcome.result.html, "fast");
        assert_eq!(hook_calls, 0);
        assert_eq!(deep.calls(), 0);
    }

    #[tokio::test]
    async fn test_fast_timeout_falls_back_once() {
        let fast = FakeCrawler::new(Behavior::Hang);
        let deep = FakeCrawler::new(Behavior::Succeed("deep"));
        let selector = selector(fast.clone(), deep.clone());
        let decision = selector.decide("example.com", true);

        let mut seen = Vec::new();
        let outcome = selector
            .execute("https://example.com/", "example.com", &decision, |d| {
                seen.push(d.scan_type);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![ScanType::Deep]);
        assert_eq!(outcome.scan_type, ScanType::Deep);
        assert!(outcome.fell_back);
        assert_eq!(outcome.result.html, "deep");
        assert!(outcome.fast_error.unwrap().contains("timeout"));
        assert_eq!(fast.calls(), 1);
        assert_eq!(deep.calls(), 1);

        // The failure is remembered for later batch scans
        assert_eq!(selector.decide("example.com", true).scan_type, ScanType::Deep);
    }

    #[tokio::test]
    async fn test_deep_failure_after_fallback_is_terminal() {
        let fast = FakeCrawler::new(Behavior::Fail(500));
        let deep = FakeCrawler::new(Behavior::Hang);
        let selector = selector(fast.clone(), deep.clone());
        let decision = selector.decide("example.com", true);

        let result = selector
            .execute("https://example.com/", "example.com", &decision, |_| Ok(()))
            .await;

        assert!(matches!(result, Err(SentinelError::CrawlTimeout { timeout_ms: 50, .. })));
        assert_eq!(fast.calls(), 1);
        assert_eq!(deep.calls(), 1);
    }

    #[tokio::test]
    async fn test_deep_decision_never_tries_fast() {
        let fast = FakeCrawler::new(Behavior::Succeed("fast"));
        let deep = FakeCrawler::new(Behavior::Fail(502));
        let selector = selector(fast.clone(), deep.clone());
        let decision = selector.decide("example.com", false);

        let result = selector
            .execute("https://example.com/", "example.com", &decision, |_| Ok(()))
            .await;

        assert!(matches!(result, Err(SentinelError::Crawl { .. })));
        assert_eq!(fast.calls(), 0);
    }

    #[tokio::test]
    async fn test_fallback_hook_error_aborts() {
        let fast = FakeCrawler::new(Behavior::Fail(500));
        let deep = FakeCrawler::new(Behavior::Succeed("deep"));
        let selector = selector(fast, deep.clone());
        let decision = selector.decide("example.com", true);

        let result = selector
            .execute("https://example.com/", "example.com", &decision, |_| {
                Err(SentinelError::Invariant("store unavailable".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(deep.calls(), 0);
    }
}
