use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for Site-Sentinel
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub analyzers: AnalyzerConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub database: DatabaseConfig,
}

/// Worker loop and pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Sleep between dequeue attempts when the queue is empty (milliseconds)
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of worker-pool slots, i.e. scans allowed to run at once
    #[serde(rename = "max-workers", default = "default_max_workers")]
    pub max_workers: usize,

    /// Age after which a pool slot is considered stale and reclaimable (seconds)
    #[serde(rename = "max-runtime-secs", default = "default_max_runtime_secs")]
    pub max_runtime_secs: u64,

    /// Age after which the single-instance lease is considered abandoned (seconds)
    #[serde(rename = "lease-stale-secs", default = "default_lease_stale_secs")]
    pub lease_stale_secs: u64,

    /// Finished jobs older than this are purged at start-up (days)
    #[serde(rename = "cleanup-after-days", default = "default_cleanup_after_days")]
    pub cleanup_after_days: u32,
}

/// Concentric timeouts for one scan
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    /// Hard timeout for each crawl attempt (FAST and DEEP)
    #[serde(rename = "crawl-ms", default = "default_crawl_ms")]
    pub crawl_ms: u64,

    /// Outer timeout for the whole analyzer fan-out
    #[serde(rename = "analyzer-batch-ms", default = "default_analyzer_batch_ms")]
    pub analyzer_batch_ms: u64,

    /// Timeout for everything from crawl to the primary save
    #[serde(rename = "total-scan-ms", default = "default_total_scan_ms")]
    pub total_scan_ms: u64,

    /// Timeout for the best-effort enrichment that runs after the save
    #[serde(rename = "enrichment-ms", default = "default_enrichment_ms")]
    pub enrichment_ms: u64,
}

/// Per-analyzer task settings
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Timeout applied to analyzers without an override
    #[serde(rename = "default-timeout-ms", default = "default_task_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Overrides keyed by analyzer name
    #[serde(default)]
    pub timeouts: HashMap<String, u64>,
}

/// HTTP crawl configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for a single HTTP request (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Number of external scripts the DEEP crawler retrieves per page
    #[serde(rename = "max-script-fetches", default = "default_max_script_fetches")]
    pub max_script_fetches: usize,

    /// Domains known to need a full render
    #[serde(rename = "render-domains", default)]
    pub render_domains: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: String,
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_runtime(&self) -> Duration {
        Duration::from_secs(self.max_runtime_secs)
    }

    pub fn lease_stale_after(&self) -> Duration {
        Duration::from_secs(self.lease_stale_secs)
    }
}

impl TimeoutConfig {
    pub fn crawl(&self) -> Duration {
        Duration::from_millis(self.crawl_ms)
    }

    pub fn analyzer_batch(&self) -> Duration {
        Duration::from_millis(self.analyzer_batch_ms)
    }

    pub fn total_scan(&self) -> Duration {
        Duration::from_millis(self.total_scan_ms)
    }

    pub fn enrichment(&self) -> Duration {
        Duration::from_millis(self.enrichment_ms)
    }
}

impl AnalyzerConfig {
    /// Returns the task timeout for the named analyzer
    pub fn timeout_for(&self, name: &str) -> Duration {
        let ms = self
            .timeouts
            .get(name)
            .copied()
            .unwrap_or(self.default_timeout_ms);
        Duration::from_millis(ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_workers: default_max_workers(),
            max_runtime_secs: default_max_runtime_secs(),
            lease_stale_secs: default_lease_stale_secs(),
            cleanup_after_days: default_cleanup_after_days(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            crawl_ms: default_crawl_ms(),
            analyzer_batch_ms: default_analyzer_batch_ms(),
            total_scan_ms: default_total_scan_ms(),
            enrichment_ms: default_enrichment_ms(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_task_timeout_ms(),
            timeouts: HashMap::new(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_ms: default_request_timeout_ms(),
            max_redirects: default_max_redirects(),
            max_script_fetches: default_max_script_fetches(),
            render_domains: Vec::new(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_max_workers() -> usize {
    5
}

fn default_max_runtime_secs() -> u64 {
    300
}

fn default_lease_stale_secs() -> u64 {
    300
}

fn default_cleanup_after_days() -> u32 {
    7
}

fn default_crawl_ms() -> u64 {
    60_000
}

fn default_analyzer_batch_ms() -> u64 {
    120_000
}

fn default_total_scan_ms() -> u64 {
    180_000
}

fn default_enrichment_ms() -> u64 {
    10_000
}

fn default_task_timeout_ms() -> u64 {
    15_000
}

fn default_user_agent() -> String {
    "SiteSentinel/1.0".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_redirects() -> usize {
    10
}

fn default_max_script_fetches() -> usize {
    8
}
