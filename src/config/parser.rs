use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigResult;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads, parses and validates the worker configuration
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - A configuration whose timeouts nest correctly
/// * `Err(ConfigError)` - The file is unreadable, not TOML, or fails validation
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use site_sentinel::config::load_config;
///
/// let config = load_config(Path::new("sentinel.toml")).unwrap();
/// println!("Workers: {}", config.worker.max_workers);
/// ```
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex-encoded SHA-256 of the configuration file
///
/// Logged at worker start-up so operators can tell which configuration a worker runs with.
pub fn compute_config_hash(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Loads a configuration together with the hash of the text it was parsed from
///
/// The file is read once, so the hash always matches the loaded settings.
pub fn load_config_with_hash(path: &Path) -> ConfigResult<(Config, String)> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
[worker]
poll-interval-ms = 500
max-workers = 3

[timeouts]
crawl-ms = 30000

[analyzers]
default-timeout-ms = 8000

[analyzers.timeouts]
"dns-security" = 10000

[crawler]
user-agent = "TestSentinel/1.0"
render-domains = ["app.example.com"]

[database]
path = "./test.db"
"#,
        )
        .unwrap();

        assert_eq!(config.worker.poll_interval_ms, 500);
        assert_eq!(config.worker.max_workers, 3);
        assert_eq!(config.worker.max_runtime_secs, 300);
        assert_eq!(config.timeouts.crawl_ms, 30000);
        assert_eq!(config.timeouts.total_scan_ms, 180000);
        assert_eq!(config.crawler.user_agent, "TestSentinel/1.0");
        assert_eq!(config.crawler.render_domains, vec!["app.example.com"]);
        assert_eq!(
            config.analyzers.timeout_for("dns-security"),
            Duration::from_millis(10000)
        );
        assert_eq!(
            config.analyzers.timeout_for("security-headers"),
            Duration::from_millis(8000)
        );
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[database]\npath = \"./min.db\"\n").unwrap();

        assert_eq!(config.worker.max_workers, 5);
        assert_eq!(config.timeouts.analyzer_batch_ms, 120000);
        assert_eq!(config.timeouts.enrichment_ms, 10000);
        assert_eq!(config.crawler.max_redirects, 10);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config(Path::new("/nonexistent/sentinel.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_not_toml() {
        assert!(matches!(
            parse_config("this is not valid TOML {{{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_workers_fails_validation() {
        let result = parse_config("[worker]\nmax-workers = 0\n\n[database]\npath = \"./test.db\"\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_database_section_is_required() {
        assert!(matches!(
            parse_config("[worker]\nmax-workers = 2\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_hash_matches_loaded_file() {
        let file = write_config("[database]\npath = \"./hash.db\"\n");

        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.database.path, "./hash.db");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());

        let other = write_config("[database]\npath = \"./other.db\"\n");
        assert_ne!(hash, compute_config_hash(other.path()).unwrap());
    }
}
