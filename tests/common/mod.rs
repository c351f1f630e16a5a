//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use site_sentinel::analysis::{
    AiDetection, Analyzer, AnalyzerError, AnalyzerOutput, FanOutExecutor, Finding, Wave,
};
use site_sentinel::config::{AnalyzerConfig, TimeoutConfig, WorkerConfig};
use site_sentinel::crawler::{CrawlError, CrawlResult, Crawler, HttpFetcher, RenderingFetcher, StrategySelector};
use site_sentinel::storage::SqliteStorage;
use site_sentinel::worker::ScanPipeline;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Test Site</title></head>
<body>
<h1>Hello</h1>
<script src="/static/app.js"></script>
</body>
</html>"#;

pub fn timeouts() -> TimeoutConfig {
    TimeoutConfig {
        crawl_ms: 2_000,
        analyzer_batch_ms: 3_000,
        total_scan_ms: 10_000,
        enrichment_ms: 500,
    }
}

pub fn analyzer_config(default_timeout_ms: u64) -> AnalyzerConfig {
    AnalyzerConfig {
        default_timeout_ms,
        timeouts: HashMap::new(),
    }
}

pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval_ms: 100,
        max_workers: 2,
        max_runtime_secs: 60,
        lease_stale_secs: 60,
        cleanup_after_days: 7,
    }
}

/// Serves `PAGE` at `/` and a small script at `/static/app.js`
pub async fn start_site() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(PAGE)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/static/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("console.log('app');"))
        .mount(&server)
        .await;

    server
}

pub fn http_crawlers() -> (Arc<dyn Crawler>, Arc<dyn Crawler>) {
    let client = reqwest::Client::new();
    (
        Arc::new(HttpFetcher::new(client.clone())),
        Arc::new(RenderingFetcher::new(client, 4)),
    )
}

pub fn in_memory_store() -> Arc<Mutex<SqliteStorage>> {
    Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()))
}

/// Builds a pipeline over `store` with the given crawlers and analyzers
pub fn pipeline(
    store: &Arc<Mutex<SqliteStorage>>,
    crawlers: (Arc<dyn Crawler>, Arc<dyn Crawler>),
    analyzers: Vec<Arc<dyn Analyzer>>,
    task_timeout_ms: u64,
) -> ScanPipeline<SqliteStorage> {
    pipeline_as(store, crawlers, analyzers, task_timeout_ms, "test-worker")
}

/// Same as `pipeline`, with a chosen worker identity
pub fn pipeline_as(
    store: &Arc<Mutex<SqliteStorage>>,
    crawlers: (Arc<dyn Crawler>, Arc<dyn Crawler>),
    analyzers: Vec<Arc<dyn Analyzer>>,
    task_timeout_ms: u64,
    worker_id: &str,
) -> ScanPipeline<SqliteStorage> {
    pipeline_with_timeouts(store, crawlers, analyzers, task_timeout_ms, timeouts(), worker_id)
}

/// Same as `pipeline_as`, with chosen scan-level timeouts
pub fn pipeline_with_timeouts(
    store: &Arc<Mutex<SqliteStorage>>,
    crawlers: (Arc<dyn Crawler>, Arc<dyn Crawler>),
    analyzers: Vec<Arc<dyn Analyzer>>,
    task_timeout_ms: u64,
    timeouts: TimeoutConfig,
    worker_id: &str,
) -> ScanPipeline<SqliteStorage> {
    let strategy = StrategySelector::new(crawlers.0, crawlers.1, timeouts.crawl());
    let executor = FanOutExecutor::new(
        analyzers,
        analyzer_config(task_timeout_ms),
        timeouts.analyzer_batch(),
    );
    ScanPipeline::new(Arc::clone(store), strategy, executor, &timeouts, worker_id)
}

/// A crawler that fails or hangs, counting its calls
pub struct BrokenCrawler {
    pub hang: bool,
    pub calls: AtomicUsize,
}

impl BrokenCrawler {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            hang: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            hang: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Crawler for BrokenCrawler {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn crawl(&self, _url: &str) -> Result<CrawlResult, CrawlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Err(CrawlError::Status(503))
    }
}

/// What a scripted analyzer does when called
pub enum Behavior {
    Findings(Vec<Finding>),
    /// Reports this many distinct AI signals
    AiSignals(usize),
    /// Emits an info finding only when the crawl recorded sub-resource requests
    DetectDeepCrawl,
    Sleep(Duration),
    Fail,
    Panic,
}

pub struct ScriptedAnalyzer {
    pub name: &'static str,
    pub wave: Wave,
    pub behavior: Behavior,
    pub calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Self::in_wave(name, Wave::Primary, behavior)
    }

    pub fn in_wave(name: &'static str, wave: Wave, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            wave,
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn wave(&self) -> Wave {
        self.wave
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Findings(findings) => Ok(AnalyzerOutput::with_findings(findings.clone())),
            Behavior::AiSignals(count) => Ok(AnalyzerOutput {
                ai_detection: Some(AiDetection::from_signals(
                    (0..*count).map(|i| format!("signal:{}", i)).collect(),
                    vec!["openai".to_string()],
                    vec![],
                )),
                ..AnalyzerOutput::default()
            }),
            Behavior::DetectDeepCrawl => {
                let findings = if crawl.network_requests.is_some() {
                    vec![Finding::new(
                        "crawl-rendered",
                        site_sentinel::analysis::Severity::Info,
                        "Page was rendered",
                    )]
                } else {
                    vec![]
                };
                Ok(AnalyzerOutput::with_findings(findings))
            }
            Behavior::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(AnalyzerOutput::default())
            }
            Behavior::Fail => Err(AnalyzerError::Invalid("scripted failure".to_string())),
            Behavior::Panic => panic!("scripted panic"),
        }
    }
}

/// Polls `check` until it returns true or `limit` passes
pub async fn wait_until<F: FnMut() -> bool>(mut check: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}
