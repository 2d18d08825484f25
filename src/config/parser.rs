use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub(crate) fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Each crawl session records this hash so sessions run under different
/// settings can be told apart later.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_CONFIG: &str = r#"
[crawler]
session-limit = 1000
batch-size = 100
min-item-delay = 1000
max-item-delay = 3000
min-feed-delay = 8000
max-feed-delay = 15000

[retry]
max-attempts = 3
base-delay = 30000

[client]
user-agent = "threadline/0.1 (research crawler)"

[output]
database-path = "./posts.db"

[[feed]]
name = "PoliticalDiscussion"

[[feed]]
name = "changemyview"
session-limit = 50
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.session_limit, 1000);
        assert_eq!(config.crawler.batch_size, 100);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feeds[0].name, "PoliticalDiscussion");
    }

    #[test]
    fn test_defaults_are_applied() {
        let config = parse_config(VALID_CONFIG).unwrap();

        assert_eq!(config.client.base_url, "https://www.reddit.com");
        assert_eq!(config.client.page_size, 100);
        assert_eq!(config.client.timeout, 30);
        assert_eq!(config.crawler.excluded_authors, vec!["AutoModerator"]);
    }

    #[test]
    fn test_per_feed_session_limit() {
        let config = parse_config(VALID_CONFIG).unwrap();

        assert_eq!(config.session_limit_for(&config.feeds[0]), 1000);
        assert_eq!(config.session_limit_for(&config.feeds[1]), 50);
    }

    #[test]
    fn test_retry_section_is_optional() {
        let content = VALID_CONFIG.replace("[retry]\nmax-attempts = 3\nbase-delay = 30000\n", "");
        let config = parse_config(&content).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, 30_000);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/threadline.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID_CONFIG.replace("batch-size = 100", "batch-size = 0");
        let file = create_temp_config(&content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex characters
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
