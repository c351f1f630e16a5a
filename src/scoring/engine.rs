//! Weighted scoring engine
//!
//! Each category starts at 100 and loses points per finding with diminishing
//! returns and a per-severity cap, past which findings cost a small flat tail. Categories are combined into a weighted
//! average; the AI-security category is left out of the average entirely when
//! the AI deep-dive wave did not run.

use crate::analysis::Severity;
use crate::report::{AggregatedReport, SeverityCounts};
use crate::scoring::category::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Deduction schedule for one severity within one category
///
/// The first finding costs `first` and each further one `additional`, until the
/// running total reaches `cap`. Past the cap every finding still costs `tail`,
/// the first penalty of the next lower severity, so a worse finding never costs
/// less than a milder one in the same category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenaltyRule {
    pub first: u32,
    pub additional: u32,
    pub cap: u32,
    pub tail: u32,
}

impl PenaltyRule {
    pub fn for_severity(severity: Severity) -> Self {
        let (first, additional, cap, tail) = match severity {
            Severity::Critical => (25, 15, 60, 12),
            Severity::High => (12, 8, 50, 6),
            Severity::Medium => (6, 4, 30, 2),
            Severity::Low => (2, 1, 15, 0),
            Severity::Info => (0, 0, 0, 0),
        };
        Self {
            first,
            additional,
            cap,
            tail,
        }
    }

    /// Points deducted for `count` findings of this severity
    pub fn deduction(&self, count: u32) -> u32 {
        (1..=count).fold(0, |total, n| {
            let scheduled = self
                .first
                .saturating_add((n - 1).saturating_mul(self.additional))
                .min(self.cap);
            scheduled.max(total.saturating_add(self.tail))
        })
    }

    /// True when `count` findings run past the capped schedule
    pub fn is_capped(&self, count: u32) -> bool {
        count > 0
            && self
                .first
                .saturating_add((count - 1).saturating_mul(self.additional))
                > self.cap
    }
}

/// Coarse risk bucket derived from the score and the worst finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    fn from_score(score: u8) -> Self {
        if score >= 70 {
            Self::Low
        } else if score >= 50 {
            Self::Medium
        } else if score >= 30 {
            Self::High
        } else {
            Self::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const GRADES: [(u8, &str); 12] = [
    (95, "A+"),
    (90, "A"),
    (85, "A-"),
    (80, "B+"),
    (75, "B"),
    (70, "B-"),
    (65, "C+"),
    (60, "C"),
    (55, "C-"),
    (50, "D+"),
    (45, "D"),
    (40, "D-"),
];

/// Letter grade for an overall score
pub fn grade_for(score: u8) -> &'static str {
    GRADES
        .iter()
        .find(|(threshold, _)| score >= *threshold)
        .map(|(_, grade)| *grade)
        .unwrap_or("F")
}

/// The next grade up and how many points it takes to reach it
///
/// Returns `None` at A+.
pub fn next_grade(score: u8) -> Option<(&'static str, u8)> {
    GRADES
        .iter()
        .rev()
        .find(|(threshold, _)| *threshold > score)
        .map(|(threshold, grade)| (*grade, threshold - score))
}

/// Score of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: u8,
    pub weight: f64,
    pub deducted: u32,
    pub findings: usize,
    /// False when the category was left out of the weighted average
    pub applicable: bool,
}

/// One deduction applied while scoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Penalty {
    pub category: Category,
    pub severity: Severity,
    /// Number of findings the deduction covers
    pub count: u32,
    pub points: u32,
    pub capped: bool,
}

/// Result of scoring one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub overall_score: u8,
    pub grade: String,
    pub risk_level: RiskLevel,
    pub categories: BTreeMap<Category, CategoryScore>,
    pub penalties: Vec<Penalty>,
    pub severity_counts: SeverityCounts,
    pub ai_applicable: bool,
}

impl ScoreBreakdown {
    pub fn category(&self, category: Category) -> Option<&CategoryScore> {
        self.categories.get(&category)
    }
}

const SEVERITIES: [Severity; 4] = [
    Severity::Critical,
    Severity::High,
    Severity::Medium,
    Severity::Low,
];

/// Scores a report
///
/// Pure: depends only on the report's scored findings and whether the AI wave
/// ran, so finding order never changes the result. Enrichment findings are not
/// scored.
///
/// # Arguments
///
/// * `report` - The aggregated report
///
/// # Returns
///
/// The overall score, grade, risk level and per-category breakdown
pub fn score(report: &AggregatedReport) -> ScoreBreakdown {
    let ai_applicable = report.ai_wave.ran;

    let mut counts: BTreeMap<(Category, Severity), u32> = BTreeMap::new();
    let mut per_category: BTreeMap<Category, usize> = BTreeMap::new();
    let mut severity_counts = SeverityCounts::default();
    let mut any_critical = false;
    let mut any_high = false;

    for f in &report.findings {
        let category = Category::for_kind(&f.finding.kind);
        *counts.entry((category, f.finding.severity)).or_default() += 1;
        *per_category.entry(category).or_default() += 1;
        any_critical |= f.finding.severity == Severity::Critical;
        any_high |= f.finding.severity == Severity::High;
        match f.finding.severity {
            Severity::Critical => severity_counts.critical += 1,
            Severity::High => severity_counts.high += 1,
            Severity::Medium => severity_counts.medium += 1,
            Severity::Low => severity_counts.low += 1,
            Severity::Info => severity_counts.info += 1,
        }
    }

    let mut penalties = Vec::new();
    let mut categories = BTreeMap::new();

    for category in Category::ALL {
        let mut deducted = 0;
        for severity in SEVERITIES {
            let count = counts.get(&(category, severity)).copied().unwrap_or(0);
            if count == 0 {
                continue;
            }
            let rule = PenaltyRule::for_severity(severity);
            let points = rule.deduction(count);
            deducted += points;
            penalties.push(Penalty {
                category,
                severity,
                count,
                points,
                capped: rule.is_capped(count),
            });
        }

        categories.insert(
            category,
            CategoryScore {
                score: 100u32.saturating_sub(deducted) as u8,
                weight: category.weight(),
                deducted,
                findings: per_category.get(&category).copied().unwrap_or(0),
                applicable: category != Category::AiSecurity || ai_applicable,
            },
        );
    }

    let (weighted, total_weight) = categories
        .values()
        .filter(|c| c.applicable)
        .fold((0.0, 0.0), |(sum, weights), c| {
            (sum + f64::from(c.score) * c.weight, weights + c.weight)
        });
    let overall_score = if total_weight > 0.0 {
        (weighted / total_weight).round().clamp(0.0, 100.0) as u8
    } else {
        100
    };

    let mut risk_level = RiskLevel::from_score(overall_score);
    if any_critical {
        risk_level = risk_level.max(RiskLevel::High);
    } else if any_high {
        risk_level = risk_level.max(RiskLevel::Medium);
    }

    ScoreBreakdown {
        overall_score,
        grade: grade_for(overall_score).to_string(),
        risk_level,
        categories,
        penalties,
        severity_counts,
        ai_applicable,
    }
}
