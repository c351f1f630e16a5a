//! One scan, end to end
//!
//! PENDING → SCANNING → crawl (with fallback) → fan-out → aggregate → score →
//! COMPLETED. Any failure on the way lands the scan in FAILED with a message.
//! Enrichment runs after the save and can only add to the stored report.

use crate::analysis::FanOutExecutor;
use crate::config::TimeoutConfig;
use crate::crawler::{CrawlOutcome, CrawlResult, StrategySelector};
use crate::report::{build_from_fan_out, AggregatedReport};
use crate::scoring::{score, Category, RiskLevel, ScoreBreakdown};
use crate::state::{ScanStatus, ScanType};
use crate::storage::{
    now_timestamp, JobRecord, ScanRecord, ScanUpdate, ScorecardRecord, StorageResult, Store,
};
use crate::SentinelError;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// What a finished scan reports back to the worker loop
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub scan_id: i64,
    pub scan_type: ScanType,
    pub fell_back: bool,
    pub overall_score: u8,
    pub grade: String,
    pub risk_level: RiskLevel,
    pub has_ai: bool,
    pub ai_wave_ran: bool,
    pub findings: usize,
    /// Analyzers that contributed their default output
    pub degraded: Vec<String>,
    /// True when enrichment findings were added to the stored report
    pub enriched: bool,
    pub duration: Duration,
}

/// Report document stored on the scan record
#[derive(Serialize)]
struct StoredReport<'a> {
    #[serde(flatten)]
    report: &'a AggregatedReport,
    score: &'a ScoreBreakdown,
}

/// State carried from the scored scan into enrichment
struct ScoredScan {
    crawl: Arc<CrawlResult>,
    report: AggregatedReport,
    breakdown: ScoreBreakdown,
    summary: ScanSummary,
}

/// Runs scans against a shared store
pub struct ScanPipeline<S> {
    store: Arc<Mutex<S>>,
    strategy: StrategySelector,
    executor: FanOutExecutor,
    total_scan: Duration,
    enrichment: Duration,
    worker_id: String,
}

impl<S: Store> ScanPipeline<S> {
    /// Creates a pipeline
    ///
    /// # Arguments
    ///
    /// * `store` - Shared scan store and job queue
    /// * `strategy` - Crawl strategy selector
    /// * `executor` - Analyzer fan-out
    /// * `timeouts` - Total-scan and enrichment limits
    /// * `worker_id` - Identity recorded on scans this pipeline starts
    pub fn new(
        store: Arc<Mutex<S>>,
        strategy: StrategySelector,
        executor: FanOutExecutor,
        timeouts: &TimeoutConfig,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            strategy,
            executor,
            total_scan: timeouts.total_scan(),
            enrichment: timeouts.enrichment(),
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut S) -> StorageResult<T>) -> Result<T, SentinelError> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut store)?)
    }

    /// Loads domains whose FAST crawl failed in earlier runs
    ///
    /// Returns the number of domains remembered.
    pub fn seed_fast_failures(&self) -> Result<usize, SentinelError> {
        let domains = self.with_store(|s| s.domains_with_fast_fallback())?;
        for domain in &domains {
            self.strategy.remember_fast_failure(domain);
        }
        Ok(domains.len())
    }

    /// Processes one dequeued job
    ///
    /// # Returns
    ///
    /// * `Ok(ScanSummary)` - The scan reached COMPLETED
    /// * `Err(SentinelError)` - The scan reached FAILED (or could not be started)
    pub async fn process(&self, job: &JobRecord) -> Result<ScanSummary, SentinelError> {
        let scan_id = job.scan_id;
        let scan = match self.start_scan(scan_id) {
            Ok(scan) => scan,
            Err(e) => {
                self.fail_scan(scan_id, &e.to_string());
                return Err(e);
            }
        };
        info!(scan_id, url = %job.target_url, domain = %scan.domain, "Scan started");

        let result = match timeout(
            self.total_scan,
            self.run_scan(scan_id, &job.target_url, &scan.domain, job.is_batch),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SentinelError::ScanTimeout {
                timeout_ms: self.total_scan.as_millis() as u64,
            }),
        };

        let scored = match result {
            Ok(scored) => scored,
            Err(e) => {
                self.fail_scan(scan_id, &e.to_string());
                return Err(e);
            }
        };

        self.upsert_scorecard(scan_id, &scan.domain, &scored);

        let ScoredScan {
            crawl,
            mut report,
            breakdown,
            mut summary,
        } = scored;
        summary.enriched = self.enrich(scan_id, crawl, &mut report, &breakdown).await;

        info!(
            scan_id,
            score = summary.overall_score,
            grade = %summary.grade,
            risk = %summary.risk_level,
            findings = summary.findings,
            duration_ms = summary.duration.as_millis() as u64,
            "Scan completed"
        );
        Ok(summary)
    }

    fn start_scan(&self, scan_id: i64) -> Result<ScanRecord, SentinelError> {
        let scan = self.with_store(|s| s.get_scan(scan_id))?;
        self.with_store(|s| {
            s.transition_scan(scan_id, ScanStatus::Scanning, &ScanUpdate::started_by(&self.worker_id))
        })?;
        Ok(scan)
    }

    /// Marks a scan FAILED, logging instead of returning storage errors
    ///
    /// A scan that already finished is left as it is.
    pub fn fail_scan(&self, scan_id: i64, message: &str) {
        let failed = self.with_store(|s| {
            if s.get_scan(scan_id)?.status.is_terminal() {
                return Ok(false);
            }
            s.transition_scan(scan_id, ScanStatus::Failed, &ScanUpdate::failed(message))?;
            Ok(true)
        });
        match failed {
            Ok(true) => warn!(scan_id, error = %message, "Scan failed"),
            Ok(false) => debug!(scan_id, "Scan already finished, not marking failed"),
            Err(e) => error!(scan_id, error = %e, "Could not mark scan failed"),
        }
    }

    async fn run_scan(
        &self,
        scan_id: i64,
        url: &str,
        domain: &str,
        is_batch: bool,
    ) -> Result<ScoredScan, SentinelError> {
        let started = Instant::now();

        let decision = self.strategy.decide(domain, is_batch);
        info!(scan_id, scan_type = ?decision.scan_type, reason = %decision.reason, "Crawl strategy selected");
        self.with_store(|s| s.update_scan_strategy(scan_id, decision.scan_type, false))?;

        let crawl: CrawlOutcome = self
            .strategy
            .execute(url, domain, &decision, |fallback| {
                self.with_store(|s| s.update_scan_strategy(scan_id, fallback.scan_type, true))
            })
            .await?;
        debug!(
            scan_id,
            status = crawl.result.status_code,
            crawl_ms = crawl.duration.as_millis() as u64,
            "Crawl finished"
        );

        let analysis_started = Instant::now();
        let fan_out = self.executor.run(Arc::clone(&crawl.result)).await?;
        let analysis_ms = analysis_started.elapsed().as_millis() as u64;

        let report = build_from_fan_out(&crawl.result, &fan_out);
        let breakdown = score(&report);

        let report_json = serde_json::to_string(&StoredReport {
            report: &report,
            score: &breakdown,
        })?;
        let metadata = serde_json::json!({
            "scan_type": crawl.scan_type.to_db_string(),
            "worker_type": crawl.scan_type.worker_type().to_db_string(),
            "strategy_reason": decision.reason,
            "fell_back": crawl.fell_back,
            "fast_error": crawl.fast_error,
            "crawl_ms": crawl.duration.as_millis() as u64,
            "analysis_ms": analysis_ms,
            "page_timing": {
                "response_ms": crawl.result.timing.response_ms,
                "download_ms": crawl.result.timing.download_ms,
                "resources_ms": crawl.result.timing.resources_ms,
                "total_ms": crawl.result.timing.total_ms,
            },
            "ai_wave": report.ai_wave,
            "degraded": report.degraded,
            "worker_id": self.worker_id,
        });

        self.with_store(|s| {
            s.transition_scan(
                scan_id,
                ScanStatus::Completed,
                &ScanUpdate {
                    risk_score: Some(breakdown.overall_score),
                    risk_level: Some(breakdown.risk_level.to_string()),
                    grade: Some(breakdown.grade.clone()),
                    has_ai: Some(report.has_ai()),
                    report_json: Some(report_json),
                    metadata_json: Some(metadata.to_string()),
                    ..ScanUpdate::default()
                },
            )
        })?;

        let summary = ScanSummary {
            scan_id,
            scan_type: crawl.scan_type,
            fell_back: crawl.fell_back,
            overall_score: breakdown.overall_score,
            grade: breakdown.grade.clone(),
            risk_level: breakdown.risk_level,
            has_ai: report.has_ai(),
            ai_wave_ran: report.ai_wave.ran,
            findings: report.findings.len(),
            degraded: report.degraded.clone(),
            enriched: false,
            duration: started.elapsed(),
        };

        Ok(ScoredScan {
            crawl: crawl.result,
            report,
            breakdown,
            summary,
        })
    }

    fn upsert_scorecard(&self, scan_id: i64, domain: &str, scored: &ScoredScan) {
        let detection = &scored.report.ai_detection;
        let scorecard = ScorecardRecord {
            scan_id,
            domain: domain.to_string(),
            has_ai: detection.has_ai,
            confidence: detection.confidence.as_str().to_string(),
            signals: detection.signals.clone(),
            ai_score: scored
                .breakdown
                .category(Category::AiSecurity)
                .filter(|c| c.applicable)
                .map(|c| c.score),
            updated_at: now_timestamp(),
        };

        if let Err(e) = self.with_store(|s| s.upsert_scorecard(&scorecard)) {
            warn!(scan_id, error = %e, "Failed to store AI scorecard");
        }
    }

    /// Runs enrichment and re-saves the report when it produced anything
    async fn enrich(
        &self,
        scan_id: i64,
        crawl: Arc<CrawlResult>,
        report: &mut AggregatedReport,
        breakdown: &ScoreBreakdown,
    ) -> bool {
        let outcomes = self.executor.enrich(crawl, self.enrichment).await;
        if !outcomes.iter().any(|o| !o.timed_out) {
            debug!(scan_id, "No enrichment results to save");
            return false;
        }

        let saved = report.attach_enrichment(&outcomes).and_then(|()| {
            let json = serde_json::to_string(&StoredReport {
                report: &*report,
                score: breakdown,
            })?;
            self.with_store(|s| s.save_report(scan_id, &json))
        });

        match saved {
            Ok(()) => {
                debug!(scan_id, "Enrichment saved");
                true
            }
            Err(e) => {
                warn!(scan_id, error = %e, "Failed to save enrichment");
                false
            }
        }
    }
}
