//! Pacing and cancellation for the crawl loop
//!
//! This module handles:
//! - Randomized pauses between items and between feeds
//! - A shutdown signal that interrupts any pending pause

use crate::config::CrawlerConfig;
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;

/// Returned when a wait was interrupted by shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Receiving side of the shutdown signal
///
/// Cloning is cheap; every clone observes the same trigger.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Sending side of the shutdown signal
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Creates a connected trigger/receiver pair
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    /// Requests shutdown; pending and future waits return [`Cancelled`]
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_trigger, shutdown) = shutdown_channel();
        shutdown
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleeps for `duration` unless shutdown is requested first
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        if self.is_triggered() {
            return Err(Cancelled);
        }

        let mut rx = self.rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = wait_for_trigger(&mut rx) => Err(Cancelled),
        }
    }
}

async fn wait_for_trigger(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Trigger dropped without firing: nothing can cancel us anymore
            std::future::pending::<()>().await;
        }
    }
}

/// Inclusive range a randomized pause is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn from_millis(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min.min(max)),
            max: Duration::from_millis(max.max(min)),
        }
    }

    /// Pause between processed items
    pub fn between_items(config: &CrawlerConfig) -> Self {
        Self::from_millis(config.min_item_delay, config.max_item_delay)
    }

    /// Pause between feeds
    pub fn between_feeds(config: &CrawlerConfig) -> Self {
        Self::from_millis(config.min_feed_delay, config.max_feed_delay)
    }

    pub fn is_zero(&self) -> bool {
        self.max.is_zero()
    }

    /// Draws a delay uniformly from the range
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let millis = rand::thread_rng()
            .gen_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

/// Sleeps for a random delay from `range`, interruptible by `shutdown`
pub async fn pause(range: &DelayRange, shutdown: &Shutdown) -> Result<(), Cancelled> {
    if range.is_zero() {
        return if shutdown.is_triggered() {
            Err(Cancelled)
        } else {
            Ok(())
        };
    }

    let delay = range.sample();
    tracing::trace!("Pausing for {:?}", delay);
    shutdown.sleep(delay).await
}
