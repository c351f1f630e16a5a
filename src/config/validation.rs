use crate::config::types::{
    AnalyzerConfig, Config, CrawlerConfig, DatabaseConfig, TimeoutConfig, WorkerConfig,
};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_worker_config(&config.worker)?;
    validate_timeout_config(&config.timeouts)?;
    validate_analyzer_config(&config.analyzers, &config.timeouts)?;
    validate_crawler_config(&config.crawler)?;
    validate_database_config(&config.database)?;
    Ok(())
}

/// Validates worker loop and pool configuration
fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    if config.poll_interval_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be >= 100ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    if config.max_workers < 1 || config.max_workers > 64 {
        return Err(ConfigError::Validation(format!(
            "max_workers must be between 1 and 64, got {}",
            config.max_workers
        )));
    }

    if config.max_runtime_secs < 1 {
        return Err(ConfigError::Validation(
            "max_runtime_secs must be >= 1".to_string(),
        ));
    }

    if config.lease_stale_secs < 1 {
        return Err(ConfigError::Validation(
            "lease_stale_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates that the phase timeouts nest inside the total scan timeout
fn validate_timeout_config(config: &TimeoutConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("crawl_ms", config.crawl_ms),
        ("analyzer_batch_ms", config.analyzer_batch_ms),
        ("total_scan_ms", config.total_scan_ms),
        ("enrichment_ms", config.enrichment_ms),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{} must be > 0", name)));
        }
    }

    if config.crawl_ms >= config.total_scan_ms {
        return Err(ConfigError::Validation(format!(
            "crawl_ms ({}) must be below total_scan_ms ({})",
            config.crawl_ms, config.total_scan_ms
        )));
    }

    if config.analyzer_batch_ms >= config.total_scan_ms {
        return Err(ConfigError::Validation(format!(
            "analyzer_batch_ms ({}) must be below total_scan_ms ({})",
            config.analyzer_batch_ms, config.total_scan_ms
        )));
    }

    Ok(())
}

/// Validates per-task timeouts against the batch timeout
fn validate_analyzer_config(
    config: &AnalyzerConfig,
    timeouts: &TimeoutConfig,
) -> Result<(), ConfigError> {
    let defaults = std::iter::once(("default", config.default_timeout_ms));
    let overrides = config.timeouts.iter().map(|(k, v)| (k.as_str(), *v));

    for (name, value) in defaults.chain(overrides) {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "analyzer timeout '{}' must be > 0",
                name
            )));
        }

        if value >= timeouts.analyzer_batch_ms {
            return Err(ConfigError::Validation(format!(
                "analyzer timeout '{}' ({}ms) must be below analyzer_batch_ms ({}ms)",
                name, value, timeouts.analyzer_batch_ms
            )));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max_redirects must be <= 20, got {}",
            config.max_redirects
        )));
    }

    for domain in &config.render_domains {
        validate_domain_string(domain)?;
    }

    Ok(())
}

/// Validates database configuration
fn validate_database_config(config: &DatabaseConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation(
            "database path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a bare domain string
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}
