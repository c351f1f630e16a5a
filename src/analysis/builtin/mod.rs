//! Built-in analyzer registry
//!
//! Heuristics here are intentionally small; any `Analyzer` can be registered
//! alongside or instead of them.

mod ai_indicator;
mod cookies;
mod dns;
mod headers;
mod llm;
mod secrets;
mod tech;
mod transport;

pub use ai_indicator::AiIndicatorAnalyzer;
pub use cookies::CookieSecurityAnalyzer;
pub use dns::{analyze_records, DnsSecurityAnalyzer};
pub use headers::SecurityHeadersAnalyzer;
pub use llm::{PromptExposureAnalyzer, ProviderCallAnalyzer, UnsafeOutputAnalyzer};
pub use secrets::SecretExposureAnalyzer;
pub use tech::TechStackAnalyzer;
pub use transport::TransportAnalyzer;

use crate::analysis::types::Analyzer;
use std::sync::Arc;

/// Every built-in analyzer, across all waves
pub fn builtin_registry() -> Vec<Arc<dyn Analyzer>> {
    vec![
        Arc::new(SecurityHeadersAnalyzer),
        Arc::new(CookieSecurityAnalyzer),
        Arc::new(TransportAnalyzer),
        Arc::new(TechStackAnalyzer),
        Arc::new(SecretExposureAnalyzer),
        Arc::new(AiIndicatorAnalyzer),
        Arc::new(PromptExposureAnalyzer),
        Arc::new(ProviderCallAnalyzer),
        Arc::new(UnsafeOutputAnalyzer),
        Arc::new(DnsSecurityAnalyzer),
    ]
}
