//! Threadline main entry point
//!
//! This is the command-line interface for the Threadline feed crawler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use threadline::client::RedditClient;
use threadline::config::{load_config_with_hash, Config, FeedEntry};
use threadline::crawler::{run_crawl, shutdown_channel};
use threadline::output::stats::RECENT_SESSIONS;
use threadline::output::{
    describe_checkpoint, load_statistics, print_crawl_summary, print_statistics,
};
use threadline::storage::{open_storage, CheckpointStore};
use tracing_subscriber::EnvFilter;

/// Threadline: an incremental, checkpointed feed crawler
///
/// Threadline walks feeds newest-first, stores every new item together with
/// its complete reply tree, and remembers per feed where it stopped so the
/// next run only fetches what is new.
#[derive(Parser, Debug)]
#[command(name = "threadline")]
#[command(version)]
#[command(about = "An incremental, checkpointed feed crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show each feed's checkpoint without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Only crawl the named feed (repeatable)
    #[arg(long = "feed", value_name = "NAME")]
    feeds: Vec<String>,

    /// Override the per-session item limit for every feed
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    limit: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let feeds = select_feeds(&config, &cli.feeds, cli.limit)?;

    if cli.dry_run {
        handle_dry_run(&config, &feeds)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        handle_crawl(&config, &feeds, &config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("threadline=info,warn"),
            1 => EnvFilter::new("threadline=debug,info"),
            2 => EnvFilter::new("threadline=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies `--feed` and `--limit` to the configured feed list
fn select_feeds(
    config: &Config,
    names: &[String],
    limit: Option<u64>,
) -> anyhow::Result<Vec<FeedEntry>> {
    let mut feeds: Vec<FeedEntry> = if names.is_empty() {
        config.feeds.clone()
    } else {
        let mut selected = Vec::with_capacity(names.len());
        for name in names {
            match config
                .feeds
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(name))
            {
                Some(feed) => selected.push(feed.clone()),
                None => bail!("feed '{}' is not configured", name),
            }
        }
        selected
    };

    if let Some(limit) = limit {
        let limit = usize::try_from(limit).context("--limit is too large")?;
        for feed in &mut feeds {
            feed.session_limit = Some(limit);
        }
    }

    Ok(feeds)
}

/// Handles the --dry-run mode: shows configuration and current checkpoints
fn handle_dry_run(config: &Config, feeds: &[FeedEntry]) -> anyhow::Result<()> {
    println!("=== Threadline Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Session limit: {}", config.crawler.session_limit);
    println!("  Batch size: {}", config.crawler.batch_size);
    println!(
        "  Item delay: {}-{}ms",
        config.crawler.min_item_delay, config.crawler.max_item_delay
    );
    println!(
        "  Feed delay: {}-{}ms",
        config.crawler.min_feed_delay, config.crawler.max_feed_delay
    );
    println!(
        "  Excluded authors: {}",
        config.crawler.excluded_authors.join(", ")
    );

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!("  Base delay: {}ms", config.retry.base_delay);

    println!("\nClient:");
    println!("  Base URL: {}", config.client.base_url);
    println!("  User agent: {}", config.client.user_agent);
    println!("  Page size: {}", config.client.page_size);
    println!("  Timeout: {}s", config.client.timeout);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let database = Path::new(&config.output.database_path);
    let storage = if database.exists() {
        Some(open_storage(database, config.crawler.batch_size)?)
    } else {
        None
    };

    println!("\nFeeds ({}):", feeds.len());
    for feed in feeds {
        let checkpoint = match &storage {
            Some(storage) => describe_checkpoint(&storage.get_checkpoint(&feed.name)?),
            None => "never crawled".to_string(),
        };
        println!(
            "  - {} (limit {}): {}",
            feed.name,
            config.session_limit_for(feed),
            checkpoint
        );
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(
        Path::new(&config.output.database_path),
        config.crawler.batch_size,
    )?;
    let stats = load_statistics(&storage, RECENT_SESSIONS)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: &Config,
    feeds: &[FeedEntry],
    config_hash: &str,
) -> anyhow::Result<()> {
    let client = RedditClient::new(&config.client)?;
    let mut storage = open_storage(
        Path::new(&config.output.database_path),
        config.crawler.batch_size,
    )
    .context("failed to open database")?;

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing current item");
            trigger.trigger();
        }
    });

    tracing::info!("Crawling {} feeds", feeds.len());
    let outcomes = run_crawl(config, feeds, &client, &mut storage, shutdown, config_hash).await;
    print_crawl_summary(&outcomes);

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        bail!("{} of {} feeds failed", failed, outcomes.len());
    }

    tracing::info!("Crawl completed successfully");
    Ok(())
}
