use serde::Deserialize;

/// Main configuration structure for Threadline
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub client: ClientConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "feed")]
    pub feeds: Vec<FeedEntry>,
}

/// Crawl session behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of items processed per feed and session
    #[serde(rename = "session-limit")]
    pub session_limit: usize,

    /// Number of buffered writes that triggers a commit
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Lower bound of the pause between processed items (milliseconds)
    #[serde(rename = "min-item-delay")]
    pub min_item_delay: u64,

    /// Upper bound of the pause between processed items (milliseconds)
    #[serde(rename = "max-item-delay")]
    pub max_item_delay: u64,

    /// Lower bound of the pause between feeds (milliseconds)
    #[serde(rename = "min-feed-delay", default)]
    pub min_feed_delay: u64,

    /// Upper bound of the pause between feeds (milliseconds)
    #[serde(rename = "max-feed-delay", default)]
    pub max_feed_delay: u64,

    /// Reply authors that are never stored (bots and the like)
    #[serde(rename = "excluded-authors", default = "default_excluded_authors")]
    pub excluded_authors: Vec<String>,
}

/// Backoff policy for remote calls
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per remote call, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds); doubles with each attempt
    #[serde(rename = "base-delay", default = "default_base_delay")]
    pub base_delay: u64,
}

/// Feed API client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Root URL of the feed API
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// User agent sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Items requested per feed page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout", default = "default_timeout")]
    pub timeout: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A feed to crawl
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    /// Feed name as understood by the API (e.g. a subreddit)
    pub name: String,

    /// Overrides `crawler.session-limit` for this feed
    #[serde(rename = "session-limit")]
    pub session_limit: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
        }
    }
}

impl Config {
    /// Session limit that applies to `feed`
    pub fn session_limit_for(&self, feed: &FeedEntry) -> usize {
        feed.session_limit.unwrap_or(self.crawler.session_limit)
    }
}

fn default_excluded_authors() -> Vec<String> {
    vec!["AutoModerator".to_string()]
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    30_000
}

fn default_base_url() -> String {
    "https://www.reddit.com".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_timeout() -> u64 {
    30
}
