//! Output module for crawl reports
//!
//! This module handles:
//! - Summaries of a finished crawl, one line per feed
//! - Database statistics for `--stats`

pub mod stats;

pub use stats::{
    describe_checkpoint, format_statistics, load_statistics, print_statistics, CrawlStatistics,
};

use crate::crawler::FeedOutcome;
use std::fmt::Write;

/// Renders the outcome of a crawl as plain text
pub fn format_crawl_summary(outcomes: &[FeedOutcome]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Crawl Summary ===\n");

    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                let _ = writeln!(
                    out,
                    "  {} [{}]: {} items ({} empty, {} failed), {} replies stored, {} filtered",
                    outcome.feed,
                    report.status.to_db_string(),
                    report.items_processed,
                    report.items_empty,
                    report.items_failed,
                    report.written.replies_written,
                    report.replies_filtered
                );
            }
            Err(e) => {
                let _ = writeln!(out, "  {} [failed]: {}", outcome.feed, e);
            }
        }
    }

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    let _ = writeln!(
        out,
        "\n{} feeds crawled, {} failed",
        outcomes.len(),
        failed
    );
    out
}

/// Prints the outcome of a crawl to stdout
pub fn print_crawl_summary(outcomes: &[FeedOutcome]) {
    print!("{}", format_crawl_summary(outcomes));
}
