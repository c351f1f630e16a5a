//! Deterministic report aggregation
//!
//! Outcomes are merged by analyzer name, never by position, so any permutation
//! of the same outcomes produces an identical report.

use crate::analysis::{AiConfidence, AiDetection, AnalyzerOutcome, FanOut, Finding, Severity};
use crate::crawler::CrawlResult;
use crate::SentinelError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// A normalized finding tagged with its source analyzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFinding {
    /// Stable fingerprint of analyzer, kind, severity, title and evidence
    pub id: String,
    pub analyzer: String,
    #[serde(flatten)]
    pub finding: Finding,
}

/// Per-analyzer status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerSummary {
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub finding_count: usize,
    pub duration_ms: u64,
}

/// Number of findings per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
}

impl SeverityCounts {
    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

/// Technologies seen across all analyzers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedTech {
    pub technologies: BTreeSet<String>,
    pub ai_providers: BTreeSet<String>,
    pub chat_widgets: BTreeSet<String>,
}

/// Whether the AI deep-dive wave ran, and at what confidence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiWaveStatus {
    pub ran: bool,
    pub confidence: AiConfidence,
}

/// Post-save enrichment; reported but never scored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentSection {
    pub analyzers: BTreeMap<String, AnalyzerSummary>,
    pub findings: Vec<ReportFinding>,
}

/// Everything the analyzers said about one crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub url: String,
    pub final_url: String,
    pub status_code: u16,
    pub analyzers: BTreeMap<String, AnalyzerSummary>,
    pub findings: Vec<ReportFinding>,
    pub severity_counts: SeverityCounts,
    pub detected_tech: DetectedTech,
    pub ai_detection: AiDetection,
    pub ai_wave: AiWaveStatus,
    /// Analyzers whose output is their default
    pub degraded: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichmentSection>,
}

impl AggregatedReport {
    pub fn has_ai(&self) -> bool {
        self.ai_detection.has_ai
    }

    /// Appends the post-save enrichment outcomes
    ///
    /// Allowed once per report; the scored findings are left untouched.
    pub fn attach_enrichment(&mut self, outcomes: &[AnalyzerOutcome]) -> Result<(), SentinelError> {
        if self.enrichment.is_some() {
            return Err(SentinelError::Invariant(
                "enrichment already attached to report".to_string(),
            ));
        }

        let merged = merge_by_name(outcomes);
        let mut findings: Vec<ReportFinding> = merged
            .iter()
            .flat_map(|(name, outcome)| tag_findings(name, &outcome.findings))
            .collect();
        sort_findings(&mut findings);

        self.enrichment = Some(EnrichmentSection {
            analyzers: merged
                .iter()
                .map(|(name, outcome)| (name.clone(), outcome.summary()))
                .collect(),
            findings,
        });
        Ok(())
    }
}

/// Outcomes of one analyzer name folded together
#[derive(Default)]
struct MergedOutcome {
    findings: Vec<Finding>,
    technologies: BTreeSet<String>,
    detection: Option<AiDetection>,
    timed_out: bool,
    failures: BTreeSet<String>,
    duration_ms: u64,
}

impl MergedOutcome {
    fn absorb(&mut self, outcome: &AnalyzerOutcome) {
        self.findings.extend(outcome.output.findings.iter().map(normalize));
        self.technologies
            .extend(outcome.output.technologies.iter().map(|t| t.trim().to_string()));
        self.timed_out |= outcome.timed_out;
        if let Some(failure) = &outcome.failure {
            self.failures.insert(failure.clone());
        }
        self.duration_ms = self.duration_ms.max(outcome.duration_ms);

        if !outcome.timed_out {
            if let Some(detection) = &outcome.output.ai_detection {
                self.detection = Some(self.detection.take().unwrap_or_default().merge(detection));
            }
        }
    }

    fn summary(&self) -> AnalyzerSummary {
        AnalyzerSummary {
            timed_out: self.timed_out,
            failure: if self.failures.is_empty() {
                None
            } else {
                Some(self.failures.iter().cloned().collect::<Vec<_>>().join("; "))
            },
            finding_count: self.findings.len(),
            duration_ms: self.duration_ms,
        }
    }

    /// Drops repeated findings, keeping the least copy in `Finding` order
    fn dedup(&mut self, analyzer: &str) {
        self.findings.sort();
        let mut seen = BTreeSet::new();
        self.findings
            .retain(|finding| seen.insert(fingerprint(analyzer, finding)));
    }
}

fn merge_by_name(outcomes: &[AnalyzerOutcome]) -> BTreeMap<String, MergedOutcome> {
    let mut merged: BTreeMap<String, MergedOutcome> = BTreeMap::new();
    for outcome in outcomes {
        merged
            .entry(outcome.name.clone())
            .or_default()
            .absorb(outcome);
    }
    for (name, outcome) in merged.iter_mut() {
        outcome.dedup(name);
    }
    merged
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Brings a finding into the stable shape every report uses
///
/// The kind becomes lower-case kebab-case, text is trimmed and empty optional
/// text becomes `None`.
pub fn normalize(finding: &Finding) -> Finding {
    let mut kind = String::with_capacity(finding.kind.len());
    for c in finding.kind.trim().chars() {
        if c.is_ascii_alphanumeric() {
            kind.push(c.to_ascii_lowercase());
        } else if !kind.ends_with('-') && !kind.is_empty() {
            kind.push('-');
        }
    }
    while kind.ends_with('-') {
        kind.pop();
    }
    if kind.is_empty() {
        kind.push_str("unknown");
    }

    let title = finding.title.trim();
    Finding {
        title: if title.is_empty() { kind.clone() } else { title.to_string() },
        kind,
        severity: finding.severity,
        description: clean(&finding.description),
        impact: clean(&finding.impact),
        recommendation: clean(&finding.recommendation),
        evidence: clean(&finding.evidence),
    }
}

fn fingerprint(analyzer: &str, finding: &Finding) -> String {
    let mut hasher = Sha256::new();
    for part in [
        analyzer,
        finding.kind.as_str(),
        finding.severity.as_str(),
        finding.title.as_str(),
        finding.evidence.as_deref().unwrap_or(""),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..8])
}

fn tag_findings(analyzer: &str, findings: &[Finding]) -> Vec<ReportFinding> {
    findings
        .iter()
        .map(|finding| ReportFinding {
            id: fingerprint(analyzer, finding),
            analyzer: analyzer.to_string(),
            finding: finding.clone(),
        })
        .collect()
}

fn sort_findings(findings: &mut [ReportFinding]) {
    findings.sort_by(|a, b| {
        b.finding
            .severity
            .cmp(&a.finding.severity)
            .then_with(|| a.finding.kind.cmp(&b.finding.kind))
            .then_with(|| a.finding.title.cmp(&b.finding.title))
            .then_with(|| a.analyzer.cmp(&b.analyzer))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Builds the report for one crawl
///
/// Pure and order-independent. Degraded outcomes contribute their default
/// output and are listed in `degraded`.
///
/// # Arguments
///
/// * `crawl` - The content every analyzer saw
/// * `outcomes` - Outcomes in any order
/// * `ai_wave` - Whether the AI deep-dive wave ran
pub fn build(crawl: &CrawlResult, outcomes: &[AnalyzerOutcome], ai_wave: AiWaveStatus) -> AggregatedReport {
    let merged = merge_by_name(outcomes);

    let mut findings: Vec<ReportFinding> = merged
        .iter()
        .flat_map(|(name, outcome)| tag_findings(name, &outcome.findings))
        .collect();
    sort_findings(&mut findings);

    let mut severity_counts = SeverityCounts::default();
    for f in &findings {
        severity_counts.add(f.finding.severity);
    }

    let ai_detection = AiDetection::merge_all(merged.values().filter_map(|m| m.detection.as_ref()));

    let detected_tech = DetectedTech {
        technologies: merged
            .values()
            .flat_map(|m| m.technologies.iter().cloned())
            .filter(|t| !t.is_empty())
            .collect(),
        ai_providers: ai_detection.providers.iter().cloned().collect(),
        chat_widgets: ai_detection.chat_widgets.iter().cloned().collect(),
    };

    AggregatedReport {
        url: crawl.url.clone(),
        final_url: crawl.final_url.clone(),
        status_code: crawl.status_code,
        analyzers: merged
            .iter()
            .map(|(name, outcome)| (name.clone(), outcome.summary()))
            .collect(),
        degraded: merged
            .iter()
            .filter(|(_, m)| m.timed_out)
            .map(|(name, _)| name.clone())
            .collect(),
        findings,
        severity_counts,
        detected_tech,
        ai_detection,
        ai_wave,
        enrichment: None,
    }
}

/// Builds the report from both waves of a fan-out
pub fn build_from_fan_out(crawl: &CrawlResult, fan_out: &FanOut) -> AggregatedReport {
    let outcomes: Vec<AnalyzerOutcome> = fan_out.outcomes().cloned().collect();
    build(
        crawl,
        &outcomes,
        AiWaveStatus {
            ran: fan_out.ai.ran(),
            confidence: fan_out.ai.confidence(),
        },
    )
}
