//! Analyzer fan-out with per-task isolation
//!
//! Every analyzer runs as its own task raced against its timeout. The primary
//! wave runs first; a `WaveGate` inspects its outcomes and decides whether the
//! AI deep-dive wave runs at all. The whole fan-out sits under the batch timeout.

use crate::analysis::types::{
    AiConfidence, AiDetection, Analyzer, AnalyzerError, AnalyzerOutcome, AnalyzerOutput, Wave,
};
use crate::config::AnalyzerConfig;
use crate::crawler::CrawlResult;
use crate::SentinelError;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Runs one analysis task in isolation
///
/// The task is spawned so a panic stays inside it. When the timer fires first
/// the task is detached and its eventual result discarded. A timeout, a
/// returned error and a panic all produce `default` with `timed_out = true`.
///
/// # Arguments
///
/// * `name` - Analyzer name recorded on the outcome
/// * `limit` - Time allowed for the task
/// * `default` - Output substituted on failure
/// * `task` - The analysis future
pub async fn run_isolated<F>(
    name: &str,
    limit: Duration,
    default: AnalyzerOutput,
    task: F,
) -> AnalyzerOutcome
where
    F: Future<Output = Result<AnalyzerOutput, AnalyzerError>> + Send + 'static,
{
    let started = Instant::now();
    let handle = tokio::spawn(task);

    let (output, failure) = match timeout(limit, handle).await {
        Ok(Ok(Ok(output))) => (output, None),
        Ok(Ok(Err(e))) => (default, Some(e.to_string())),
        Ok(Err(join_error)) if join_error.is_panic() => {
            (default, Some("Analyzer panicked".to_string()))
        }
        Ok(Err(_)) => (default, Some("Analyzer task was cancelled".to_string())),
        Err(_) => (default, Some(format!("Timeout after {}ms", limit.as_millis()))),
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    match &failure {
        Some(reason) => {
            warn!(analyzer = name, reason = %reason, duration_ms, "Analyzer degraded to default")
        }
        None => debug!(analyzer = name, duration_ms, "Analyzer finished"),
    }

    AnalyzerOutcome {
        name: name.to_string(),
        output,
        timed_out: failure.is_some(),
        failure,
        duration_ms,
    }
}

/// Decides whether the AI deep-dive wave runs
pub trait WaveGate: Send + Sync {
    /// AI confidence established by the primary wave
    fn confidence(&self, primary: &[AnalyzerOutcome]) -> AiConfidence;

    /// Whether the deep-dive wave runs at `confidence`
    fn opens(&self, confidence: AiConfidence) -> bool;
}

/// Opens the deep-dive wave once AI confidence reaches a threshold
#[derive(Debug, Clone, Copy)]
pub struct AiConfidenceGate {
    pub threshold: AiConfidence,
}

impl Default for AiConfidenceGate {
    fn default() -> Self {
        Self {
            threshold: AiConfidence::Medium,
        }
    }
}

impl WaveGate for AiConfidenceGate {
    /// Confidence of the merged detection, the same one the report carries
    fn confidence(&self, primary: &[AnalyzerOutcome]) -> AiConfidence {
        AiDetection::merge_all(
            primary
                .iter()
                .filter(|o| !o.timed_out)
                .filter_map(|o| o.output.ai_detection.as_ref()),
        )
        .confidence
    }

    fn opens(&self, confidence: AiConfidence) -> bool {
        confidence >= self.threshold
    }
}

/// Result of the gated deep-dive wave
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaveResult {
    Ran {
        confidence: AiConfidence,
        outcomes: Vec<AnalyzerOutcome>,
    },
    Skipped {
        confidence: AiConfidence,
    },
}

impl WaveResult {
    pub fn ran(&self) -> bool {
        matches!(self, Self::Ran { .. })
    }

    pub fn confidence(&self) -> AiConfidence {
        match self {
            Self::Ran { confidence, .. } | Self::Skipped { confidence } => *confidence,
        }
    }

    pub fn outcomes(&self) -> &[AnalyzerOutcome] {
        match self {
            Self::Ran { outcomes, .. } => outcomes,
            Self::Skipped { .. } => &[],
        }
    }
}

/// Outcomes of both scheduled waves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOut {
    pub primary: Vec<AnalyzerOutcome>,
    pub ai: WaveResult,
}

impl FanOut {
    pub fn outcomes(&self) -> impl Iterator<Item = &AnalyzerOutcome> {
        self.primary.iter().chain(self.ai.outcomes())
    }
}

/// Runs the analyzer registry against one crawl
pub struct FanOutExecutor {
    analyzers: Vec<Arc<dyn Analyzer>>,
    config: AnalyzerConfig,
    batch_timeout: Duration,
    gate: Box<dyn WaveGate>,
}

impl FanOutExecutor {
    /// Creates an executor gated by `AiConfidenceGate::default()`
    ///
    /// # Arguments
    ///
    /// * `analyzers` - The registry; names must be unique
    /// * `config` - Per-analyzer timeouts
    /// * `batch_timeout` - Outer limit for `run`
    pub fn new(
        analyzers: Vec<Arc<dyn Analyzer>>,
        config: AnalyzerConfig,
        batch_timeout: Duration,
    ) -> Self {
        Self {
            analyzers,
            config,
            batch_timeout,
            gate: Box::new(AiConfidenceGate::default()),
        }
    }

    pub fn with_gate(mut self, gate: impl WaveGate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    /// Names of the analyzers registered for `wave`
    pub fn analyzer_names(&self, wave: Wave) -> Vec<&'static str> {
        self.analyzers
            .iter()
            .filter(|a| a.wave() == wave)
            .map(|a| a.name())
            .collect()
    }

    /// Runs the primary wave and, if the gate opens, the AI deep-dive wave
    ///
    /// # Returns
    ///
    /// * `Ok(FanOut)` - Outcomes of every scheduled analyzer, degraded ones included
    /// * `Err(SentinelError::AnalyzerBatchTimeout)` - The batch timeout expired
    pub async fn run(&self, crawl: Arc<CrawlResult>) -> Result<FanOut, SentinelError> {
        timeout(self.batch_timeout, self.run_waves(crawl))
            .await
            .map_err(|_| SentinelError::AnalyzerBatchTimeout {
                timeout_ms: self.batch_timeout.as_millis() as u64,
            })
    }

    async fn run_waves(&self, crawl: Arc<CrawlResult>) -> FanOut {
        let primary = self.run_wave(Wave::Primary, &crawl).await;

        let confidence = self.gate.confidence(&primary);
        let ai = if self.gate.opens(confidence) {
            debug!(%confidence, "AI deep-dive wave opened");
            WaveResult::Ran {
                confidence,
                outcomes: self.run_wave(Wave::AiDeepDive, &crawl).await,
            }
        } else {
            debug!(%confidence, "AI deep-dive wave skipped");
            WaveResult::Skipped { confidence }
        };

        FanOut { primary, ai }
    }

    /// Runs the enrichment analyzers under `limit`
    ///
    /// Returns an empty list when `limit` expires.
    pub async fn enrich(&self, crawl: Arc<CrawlResult>, limit: Duration) -> Vec<AnalyzerOutcome> {
        match timeout(limit, self.run_wave(Wave::Enrichment, &crawl)).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "Enrichment timed out");
                Vec::new()
            }
        }
    }

    async fn run_wave(&self, wave: Wave, crawl: &Arc<CrawlResult>) -> Vec<AnalyzerOutcome> {
        let tasks = self
            .analyzers
            .iter()
            .filter(|a| a.wave() == wave)
            .map(|analyzer| {
                let analyzer = Arc::clone(analyzer);
                let crawl = Arc::clone(crawl);
                let name = analyzer.name();
                let limit = self.config.timeout_for(name);
                let default = analyzer.default_output();

                run_isolated(name, limit, default, async move {
                    analyzer.analyze(&crawl).await
                })
            });

        join_all(tasks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::types::{Finding, Severity};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Mode {
        Findings(usize),
        Ai(usize),
        Sleep(u64),
        Error,
        Panic,
    }

    struct TestAnalyzer {
        name: &'static str,
        wave: Wave,
        mode: Mode,
        calls: Arc<AtomicUsize>,
    }

    impl TestAnalyzer {
        fn arc(name: &'static str, wave: Wave, mode: Mode) -> Arc<dyn Analyzer> {
            Arc::new(Self {
                name,
                wave,
                mode,
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl Analyzer for TestAnalyzer {
        fn name(&self) -> &'static str {
            self.name
        }

        fn wave(&self) -> Wave {
            self.wave
        }

        fn default_output(&self) -> AnalyzerOutput {
            AnalyzerOutput {
                technologies: vec![format!("{}-default", self.name)],
                ..AnalyzerOutput::default()
            }
        }

        async fn analyze(&self, _crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.mode {
                Mode::Findings(n) => Ok(AnalyzerOutput::with_findings(
                    (0..n)
                        .map(|i| Finding::new("header-missing", Severity::Low, format!("f{}", i)))
                        .collect(),
                )),
                Mode::Ai(signals) => Ok(AnalyzerOutput {
                    ai_detection: Some(AiDetection::from_signals(
                        (0..signals).map(|i| format!("signal-{}", i)).collect(),
                        vec![],
                        vec![],
                    )),
                    ..AnalyzerOutput::default()
                }),
                Mode::Sleep(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(AnalyzerOutput::with_findings(vec![Finding::new(
                        "late",
                        Severity::High,
                        "late",
                    )]))
                }
                Mode::Error => Err(AnalyzerError::Invalid("bad content".to_string())),
                Mode::Panic => panic!("analyzer bug"),
            }
        }
    }

    fn config(task_ms: u64) -> AnalyzerConfig {
        AnalyzerConfig {
            default_timeout_ms: task_ms,
            timeouts: HashMap::new(),
        }
    }

    fn default_of(name: &str) -> AnalyzerOutput {
        AnalyzerOutput {
            technologies: vec![format!("{}-default", name)],
            ..AnalyzerOutput::default()
        }
    }

    #[tokio::test]
    async fn test_run_isolated_success() {
        let outcome = run_isolated("ok", Duration::from_secs(1), AnalyzerOutput::default(), async {
            Ok::<_, AnalyzerError>(AnalyzerOutput::with_findings(vec![Finding::new(
                "x",
                Severity::Low,
                "x",
            )]))
        })
        .await;

        assert!(!outcome.timed_out);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.findings().len(), 1);
    }

    #[tokio::test]
    async fn test_run_isolated_timeout_returns_default() {
        let default = default_of("slow");
        let outcome = run_isolated("slow", Duration::from_millis(20), default.clone(), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AnalyzerError>(AnalyzerOutput::default())
        })
        .await;

        assert!(outcome.timed_out);
        assert_eq!(outcome.output, default);
        assert!(outcome.failure.unwrap().contains("Timeout"));
    }

    #[tokio::test]
    async fn test_panic_is_handled_like_timeout() {
        let executor = FanOutExecutor::new(
            vec![
                TestAnalyzer::arc("panics", Wave::Primary, Mode::Panic),
                TestAnalyzer::arc("clean", Wave::Primary, Mode::Findings(0)),
            ],
            config(1000),
            Duration::from_secs(5),
        );

        let fan_out = executor.run(Arc::new(CrawlResult::default())).await.unwrap();
        let panicked = fan_out.primary.iter().find(|o| o.name == "panics").unwrap();

        assert!(panicked.timed_out);
        assert_eq!(panicked.output, default_of("panics"));
        assert!(!fan_out.primary.iter().find(|o| o.name == "clean").unwrap().timed_out);
    }

    #[tokio::test]
    async fn test_error_and_slow_analyzers_are_isolated() {
        let executor = FanOutExecutor::new(
            vec![
                TestAnalyzer::arc("errors", Wave::Primary, Mode::Error),
                TestAnalyzer::arc("slow", Wave::Primary, Mode::Sleep(5_000)),
                TestAnalyzer::arc("finds", Wave::Primary, Mode::Findings(2)),
            ],
            config(50),
            Duration::from_secs(5),
        );

        let fan_out = executor.run(Arc::new(CrawlResult::default())).await.unwrap();
        assert_eq!(fan_out.primary.len(), 3);

        for outcome in &fan_out.primary {
            match outcome.name.as_str() {
                "errors" | "slow" => {
                    assert!(outcome.timed_out);
                    assert_eq!(outcome.output, default_of(&outcome.name));
                }
                _ => assert_eq!(outcome.findings().len(), 2),
            }
        }
    }

    #[tokio::test]
    async fn test_low_confidence_skips_ai_wave() {
        let deep_dive = Arc::new(TestAnalyzer {
            name: "llm",
            wave: Wave::AiDeepDive,
            mode: Mode::Findings(1),
            calls: Arc::new(AtomicUsize::new(0)),
        });
        let calls = Arc::clone(&deep_dive.calls);
        let deep_dive: Arc<dyn Analyzer> = deep_dive;

        let executor = FanOutExecutor::new(
            vec![
                TestAnalyzer::arc("ai-indicator", Wave::Primary, Mode::Ai(1)),
                deep_dive,
            ],
            config(1000),
            Duration::from_secs(5),
        );

        let fan_out = executor.run(Arc::new(CrawlResult::default())).await.unwrap();
        assert_eq!(
            fan_out.ai,
            WaveResult::Skipped {
                confidence: AiConfidence::Low
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_medium_confidence_runs_ai_wave() {
        let executor = FanOutExecutor::new(
            vec![
                TestAnalyzer::arc("ai-indicator", Wave::Primary, Mode::Ai(2)),
                TestAnalyzer::arc("llm", Wave::AiDeepDive, Mode::Findings(1)),
                TestAnalyzer::arc("dns", Wave::Enrichment, Mode::Findings(1)),
            ],
            config(1000),
            Duration::from_secs(5),
        );

        let fan_out = executor.run(Arc::new(CrawlResult::default())).await.unwrap();
        assert!(fan_out.ai.ran());
        assert_eq!(fan_out.ai.confidence(), AiConfidence::Medium);
        assert_eq!(fan_out.ai.outcomes().len(), 1);
        // Enrichment never runs as part of the fan-out
        assert_eq!(fan_out.outcomes().count(), 2);
    }

    #[tokio::test]
    async fn test_batch_timeout_fails_fan_out() {
        let mut timeouts = HashMap::new();
        timeouts.insert("slow".to_string(), 5_000);
        let executor = FanOutExecutor::new(
            vec![TestAnalyzer::arc("slow", Wave::Primary, Mode::Sleep(5_000))],
            AnalyzerConfig {
                default_timeout_ms: 1000,
                timeouts,
            },
            Duration::from_millis(50),
        );

        let result = executor.run(Arc::new(CrawlResult::default())).await;
        assert!(matches!(
            result,
            Err(SentinelError::AnalyzerBatchTimeout { timeout_ms: 50 })
        ));
    }

    #[tokio::test]
    async fn test_enrich_runs_only_enrichment_wave() {
        let executor = FanOutExecutor::new(
            vec![
                TestAnalyzer::arc("headers", Wave::Primary, Mode::Findings(1)),
                TestAnalyzer::arc("dns", Wave::Enrichment, Mode::Findings(3)),
            ],
            config(1000),
            Duration::from_secs(5),
        );

        let outcomes = executor
            .enrich(Arc::new(CrawlResult::default()), Duration::from_secs(1))
            .await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].name, "dns");
        assert_eq!(outcomes[0].findings().len(), 3);
    }

    #[test]
    fn test_gate_counts_signals_across_analyzers() {
        let signalling = |name: &str, signal: &str| AnalyzerOutcome {
            name: name.to_string(),
            output: AnalyzerOutput {
                ai_detection: Some(AiDetection::from_signals(
                    vec![signal.to_string()],
                    vec![],
                    vec![],
                )),
                ..AnalyzerOutput::default()
            },
            timed_out: false,
            failure: None,
            duration_ms: 1,
        };
        let primary = vec![
            signalling("ai-indicator", "provider:openai"),
            signalling("tech-stack", "widget:intercom"),
        ];
        assert!(primary
            .iter()
            .all(|o| o.output.ai_detection.as_ref().unwrap().confidence == AiConfidence::Low));

        let gate = AiConfidenceGate::default();
        let confidence = gate.confidence(&primary);
        assert_eq!(confidence, AiConfidence::Medium);
        assert!(gate.opens(confidence));

        // Same signal twice is still one signal
        let repeated = vec![
            signalling("ai-indicator", "provider:openai"),
            signalling("tech-stack", "provider:openai"),
        ];
        assert_eq!(gate.confidence(&repeated), AiConfidence::Low);
    }

    #[test]
    fn test_gate_ignores_degraded_outcomes() {
        let degraded = AnalyzerOutcome {
            name: "ai-indicator".to_string(),
            output: AnalyzerOutput {
                ai_detection: Some(AiDetection::from_signals(
                    vec!["a".into(), "b".into(), "c".into()],
                    vec![],
                    vec![],
                )),
                ..AnalyzerOutput::default()
            },
            timed_out: true,
            failure: Some("Timeout after 10ms".to_string()),
            duration_ms: 10,
        };

        let gate = AiConfidenceGate::default();
        let confidence = gate.confidence(&[degraded]);
        assert_eq!(confidence, AiConfidence::None);
        assert!(!gate.opens(confidence));
        assert!(gate.opens(AiConfidence::High));
    }
}
