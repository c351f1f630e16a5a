//! Analyzer contract and the values analyzers produce

use crate::crawler::CrawlResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors an analyzer may return
///
/// These never fail a scan; the executor substitutes the analyzer's default.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("DNS lookup failed: {0}")]
    Lookup(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    Invalid(String),
}

/// Severity tier of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete issue reported by an analyzer
///
/// Ordered field by field, which gives duplicate reports a canonical order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl Finding {
    pub fn new(kind: impl Into<String>, severity: Severity, title: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            severity,
            title: title.into(),
            description: None,
            impact: None,
            recommendation: None,
            evidence: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_impact(mut self, impact: impl Into<String>) -> Self {
        self.impact = Some(impact.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// How sure the AI indicator is that the site ships an AI feature
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AiConfidence {
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl AiConfidence {
    /// Maps a count of independent signals to a confidence tier
    pub fn from_signal_count(count: usize) -> Self {
        match count {
            0 => Self::None,
            1 => Self::Low,
            2 => Self::Medium,
            _ => Self::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for AiConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AI implementation evidence found on a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiDetection {
    pub has_ai: bool,
    pub confidence: AiConfidence,
    pub signals: Vec<String>,
    pub providers: Vec<String>,
    pub chat_widgets: Vec<String>,
}

impl AiDetection {
    /// Builds a detection whose confidence follows the number of distinct signals
    pub fn from_signals(
        mut signals: Vec<String>,
        mut providers: Vec<String>,
        mut chat_widgets: Vec<String>,
    ) -> Self {
        for list in [&mut signals, &mut providers, &mut chat_widgets] {
            list.sort();
            list.dedup();
        }

        let confidence = AiConfidence::from_signal_count(signals.len());
        Self {
            has_ai: confidence != AiConfidence::None,
            confidence,
            signals,
            providers,
            chat_widgets,
        }
    }

    /// Union of two detections, with confidence recounted over the merged signals
    pub fn merge(&self, other: &AiDetection) -> Self {
        Self::from_signals(
            self.signals.iter().chain(&other.signals).cloned().collect(),
            self.providers.iter().chain(&other.providers).cloned().collect(),
            self.chat_widgets.iter().chain(&other.chat_widgets).cloned().collect(),
        )
    }

    /// Folds any number of detections into one; empty input gives the default
    pub fn merge_all<'a>(detections: impl IntoIterator<Item = &'a AiDetection>) -> Self {
        detections
            .into_iter()
            .fold(Self::default(), |merged, next| merged.merge(next))
    }
}

/// What one analyzer returns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerOutput {
    pub findings: Vec<Finding>,
    /// Technologies the analyzer identified
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_detection: Option<AiDetection>,
}

impl AnalyzerOutput {
    pub fn with_findings(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            ..Self::default()
        }
    }
}

/// One analyzer's result for one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerOutcome {
    pub name: String,
    pub output: AnalyzerOutput,
    /// True when `output` is the analyzer's default because it timed out, failed or panicked
    pub timed_out: bool,
    pub failure: Option<String>,
    pub duration_ms: u64,
}

impl AnalyzerOutcome {
    pub fn findings(&self) -> &[Finding] {
        &self.output.findings
    }
}

/// Scheduling phase an analyzer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wave {
    /// Independent detectors, always run
    Primary,
    /// AI deep-dive analyzers, run only when the primary wave found enough AI evidence
    AiDeepDive,
    /// Slow best-effort checks, run after the report is saved
    Enrichment,
}

/// An analysis task over crawled content
///
/// Implementations must be side-effect free: a timed-out task is detached,
/// not cancelled, and its late result is discarded.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Unique name; aggregation keys on it
    fn name(&self) -> &'static str;

    fn wave(&self) -> Wave {
        Wave::Primary
    }

    /// Output substituted when the analyzer times out or fails
    fn default_output(&self) -> AnalyzerOutput {
        AnalyzerOutput::default()
    }

    async fn analyze(&self, crawl: &CrawlResult) -> Result<AnalyzerOutput, AnalyzerError>;
}
