//! Configuration module for Threadline
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use threadline::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("threadline.toml")).unwrap();
//! println!("Session limit: {}", config.crawler.session_limit);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ClientConfig, Config, CrawlerConfig, FeedEntry, OutputConfig, RetryConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
