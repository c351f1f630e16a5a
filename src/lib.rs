//! Site-Sentinel: a website security scanning worker
//!
//! This crate implements the orchestration core of a website security scanner:
//! a SQLite-backed job queue feeding a single-instance worker, a crawl strategy
//! selector with a one-shot FAST to DEEP fallback, a two-wave analyzer fan-out with
//! per-task timeout isolation, a deterministic report aggregator and a weighted
//! scoring engine.

pub mod analysis;
pub mod config;
pub mod crawler;
pub mod output;
pub mod report;
pub mod scoring;
pub mod state;
pub mod storage;
pub mod url;
pub mod worker;

use thiserror::Error;

/// Main error type for Site-Sentinel operations
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Crawl failed for {url}: {source}")]
    Crawl {
        url: String,
        source: crawler::CrawlError,
    },

    #[error("Crawl timeout after {timeout_ms}ms: {url}")]
    CrawlTimeout { url: String, timeout_ms: u64 },

    #[error("Analyzers timeout after {timeout_ms}ms")]
    AnalyzerBatchTimeout { timeout_ms: u64 },

    #[error("Total scan timeout after {timeout_ms}ms")]
    ScanTimeout { timeout_ms: u64 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::ScanStatus,
        to: state::ScanStatus,
    },

    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Site-Sentinel operations
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{ScanStatus, ScanType, WorkerType};
pub use url::{extract_domain, parse_target};
