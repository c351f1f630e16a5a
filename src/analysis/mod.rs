//! Analysis module: the analyzer registry and its fan-out executor
//!
//! # Components
//!
//! - `Analyzer`: one side-effect-free check over a `CrawlResult`
//! - `run_isolated`: races one analyzer against its timeout, substituting its default
//! - `FanOutExecutor`: runs the primary wave, the gated AI deep-dive wave and,
//!   separately, the post-save enrichment wave
//! - `builtin`: the analyzers shipped with the worker

pub mod builtin;
mod executor;
mod types;

pub use builtin::builtin_registry;
pub use executor::{run_isolated, AiConfidenceGate, FanOut, FanOutExecutor, WaveGate, WaveResult};
pub use types::{
    AiConfidence, AiDetection, Analyzer, AnalyzerError, AnalyzerOutcome, AnalyzerOutput, Finding,
    Severity, Wave,
};
