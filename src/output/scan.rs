//! Human-readable view of one stored scan

use crate::report::AggregatedReport;
use crate::storage::ScanRecord;

/// Parses the report stored on a scan, if any
pub fn stored_report(scan: &ScanRecord) -> Result<Option<AggregatedReport>, serde_json::Error> {
    scan.report_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
}

/// Prints one scan's status, score and findings to stdout
pub fn print_scan(scan: &ScanRecord, report: Option<&AggregatedReport>) {
    println!("=== Scan {} ===\n", scan.id);
    println!("  Target: {}", scan.target_url);
    println!("  Domain: {}", scan.domain);
    println!("  Status: {}", scan.status);
    if let Some(scan_type) = scan.scan_type {
        let fallback = if scan.fell_back { " (after fast crawl failed)" } else { "" };
        println!("  Crawl: {}{}", scan_type.to_db_string(), fallback);
    }
    if let Some(error) = &scan.error_message {
        println!("  Error: {}", error);
    }
    if let (Some(score), Some(grade), Some(risk)) = (scan.risk_score, &scan.grade, &scan.risk_level) {
        println!("  Score: {} ({}), risk {}", score, grade, risk);
    }
    println!("  AI detected: {}", if scan.has_ai { "yes" } else { "no" });
    println!();

    let Some(report) = report else {
        return;
    };

    println!("Findings ({}):", report.findings.len());
    for f in &report.findings {
        println!(
            "  [{}] {} - {} ({})",
            f.finding.severity, f.finding.kind, f.finding.title, f.analyzer
        );
    }

    if !report.degraded.is_empty() {
        println!();
        println!("Degraded analyzers: {}", report.degraded.join(", "));
    }

    if let Some(enrichment) = &report.enrichment {
        println!();
        println!("Enrichment ({}):", enrichment.findings.len());
        for f in &enrichment.findings {
            println!("  [{}] {} - {}", f.finding.severity, f.finding.kind, f.finding.title);
        }
    }
}
