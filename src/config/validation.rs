use crate::config::types::{ClientConfig, Config, CrawlerConfig, FeedEntry, RetryConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_client_config(&config.client)?;

    if config.output.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    validate_feeds(&config.feeds)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.session_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "session_limit must be >= 1, got {}",
            config.session_limit
        )));
    }

    if config.batch_size < 1 || config.batch_size > 10_000 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be between 1 and 10000, got {}",
            config.batch_size
        )));
    }

    if config.min_item_delay > config.max_item_delay {
        return Err(ConfigError::Validation(format!(
            "min_item_delay ({}ms) must not exceed max_item_delay ({}ms)",
            config.min_item_delay, config.max_item_delay
        )));
    }

    if config.min_feed_delay > config.max_feed_delay {
        return Err(ConfigError::Validation(format!(
            "min_feed_delay ({}ms) must not exceed max_feed_delay ({}ms)",
            config.min_feed_delay, config.max_feed_delay
        )));
    }

    if config.excluded_authors.iter().any(|a| a.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "excluded_authors cannot contain empty names".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.base_delay < 1 {
        return Err(ConfigError::Validation(
            "base_delay must be >= 1ms".to_string(),
        ));
    }

    Ok(())
}

/// Validates feed API client configuration
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    if config.timeout < 1 {
        return Err(ConfigError::Validation(
            "timeout must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates the feed list
fn validate_feeds(feeds: &[FeedEntry]) -> Result<(), ConfigError> {
    if feeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[feed]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for feed in feeds {
        validate_feed_name(&feed.name)?;

        if !seen.insert(feed.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "feed '{}' is configured more than once",
                feed.name
            )));
        }

        if feed.session_limit == Some(0) {
            return Err(ConfigError::Validation(format!(
                "session_limit for feed '{}' must be >= 1",
                feed.name
            )));
        }
    }

    Ok(())
}

/// Validates a feed name: non-empty, alphanumeric + underscores only
fn validate_feed_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(
            "feed name cannot be empty".to_string(),
        ));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::Validation(format!(
            "feed name must contain only alphanumeric characters and underscores, got '{}'",
            name
        )));
    }

    Ok(())
}
