//! Per-feed resume boundary
//!
//! A checkpoint records the newest item known to be fully processed for a feed.
//! When a session stops before reaching the previous boundary (session limit,
//! cancellation, fatal error), the checkpoint also remembers the backlog: the
//! window of older items the interrupted walk never got to.

use chrono::{DateTime, Utc};

/// Resume state of a single feed
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub feed: String,

    /// Newest item creation time known to be processed
    ///
    /// `DateTime::<Utc>::MIN_UTC` when the feed was never crawled.
    pub newest_processed_at: DateTime<Utc>,

    /// Unprocessed window left behind by an interrupted walk
    pub backlog: Option<Backlog>,
}

/// Window of items above `floor` and up to `ceiling` that may be unprocessed
///
/// Items in `(ceiling, newest_processed_at]` are processed, and so is
/// everything at or below `floor`. Items exactly at `ceiling` may be either:
/// several items can share the timestamp the interrupted walk stopped at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backlog {
    /// `None` when nothing below the window was ever processed
    pub floor: Option<DateTime<Utc>>,

    /// Oldest item processed by the interrupted walk
    pub ceiling: DateTime<Utc>,
}

/// How a walk treats an item given the current checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Newer than anything processed before
    Fresh,

    /// Already processed; skip it but keep walking towards the backlog
    Covered,

    /// Left over by an interrupted walk; process it
    Backlog,

    /// Everything from here on is processed; stop walking
    Done,
}

/// Contiguous stretch of a feed a session walked through and made durable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkSpan {
    pub newest: DateTime<Utc>,
    pub oldest: DateTime<Utc>,
}

impl WalkSpan {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            newest: at,
            oldest: at,
        }
    }

    /// Extends the span to cover `at`
    pub fn include(&mut self, at: DateTime<Utc>) {
        self.newest = self.newest.max(at);
        self.oldest = self.oldest.min(at);
    }
}

impl Checkpoint {
    /// Checkpoint of a feed that was never crawled: everything is fresh
    pub fn initial(feed: &str) -> Self {
        Self {
            feed: feed.to_string(),
            newest_processed_at: DateTime::<Utc>::MIN_UTC,
            backlog: None,
        }
    }

    /// Returns true if no session ever recorded progress for this feed
    pub fn is_initial(&self) -> bool {
        self.newest_processed_at == DateTime::<Utc>::MIN_UTC && self.backlog.is_none()
    }

    /// Classifies an item creation time against this checkpoint
    pub fn classify(&self, created_at: DateTime<Utc>) -> Region {
        if created_at > self.newest_processed_at {
            return Region::Fresh;
        }

        match self.backlog {
            None => Region::Done,
            Some(backlog) if created_at > backlog.ceiling => Region::Covered,
            Some(Backlog {
                floor: Some(floor), ..
            }) if created_at <= floor => Region::Done,
            Some(_) => Region::Backlog,
        }
    }

    /// Returns true if `created_at` ties with the backlog ceiling
    pub fn is_at_ceiling(&self, created_at: DateTime<Utc>) -> bool {
        self.backlog
            .is_some_and(|backlog| backlog.ceiling == created_at)
    }

    /// Computes the checkpoint that follows a session
    ///
    /// `walked` is the durable stretch the session walked through, newest-first
    /// and without gaps. `completed` is true when the walk reached the old
    /// boundary (or the end of the feed) and everything it touched is durable.
    pub fn advance(&self, walked: Option<WalkSpan>, completed: bool) -> Checkpoint {
        let newest_processed_at = walked
            .map(|span| span.newest.max(self.newest_processed_at))
            .unwrap_or(self.newest_processed_at);

        let backlog = match walked {
            _ if completed => None,
            None => self.backlog,
            Some(span) if span.oldest > self.newest_processed_at => {
                // Stopped inside the fresh region. An older backlog is merged by
                // keeping its floor, so its covered stretch is walked again.
                let floor = match self.backlog {
                    Some(previous) => previous.floor,
                    None if self.newest_processed_at == DateTime::<Utc>::MIN_UTC => None,
                    None => Some(self.newest_processed_at),
                };
                Some(Backlog {
                    floor,
                    ceiling: span.oldest,
                })
            }
            Some(span) => match self.backlog {
                Some(previous) if span.oldest < previous.ceiling => Some(Backlog {
                    floor: previous.floor,
                    ceiling: span.oldest,
                }),
                other => other,
            },
        };

        Checkpoint {
            feed: self.feed.clone(),
            newest_processed_at,
            backlog,
        }
    }
}
