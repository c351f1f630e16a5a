//! Configuration module for Site-Sentinel
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section except `[database]` is optional and falls back to the defaults
//! used in production (2s polling, 5 worker slots, 60s crawl, 120s analyzer batch,
//! 180s total scan).
//!
//! # Example
//!
//! ```no_run
//! use site_sentinel::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sentinel.toml")).unwrap();
//! println!("Crawl timeout: {}ms", config.timeouts.crawl_ms);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AnalyzerConfig, Config, CrawlerConfig, DatabaseConfig, TimeoutConfig, WorkerConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
