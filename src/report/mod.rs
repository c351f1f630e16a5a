//! Report aggregation
//!
//! Turns the outcomes of a fan-out into one deterministic `AggregatedReport`.

mod aggregator;

pub use aggregator::{
    build, build_from_fan_out, normalize, AggregatedReport, AiWaveStatus, AnalyzerSummary,
    DetectedTech, EnrichmentSection, ReportFinding, SeverityCounts,
};
