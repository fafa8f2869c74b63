//! Batch updates across many feeds.
//!
//! One failing feed never blocks the others: every feed is attempted and the
//! failures are collected into the [`UpdateReport`].

use tracing::{debug, warn};

use crate::{FeedError, PriceSource, UpdateOutcome};

/// Outcome of one [`FeedUpdater::update_all`] pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Feeds that recorded a new observation.
    pub recorded: Vec<String>,
    /// Feeds that keep their own history.
    pub skipped: Vec<String>,
    /// Feeds whose update failed, with the error.
    pub failed: Vec<(String, FeedError)>,
}

impl UpdateReport {
    /// Whether every feed updated without error.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives [`PriceSource::update`] across a list of feeds.
#[derive(Default)]
pub struct FeedUpdater {
    feeds: Vec<Box<dyn PriceSource>>,
}

impl std::fmt::Debug for FeedUpdater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedUpdater")
            .field("feeds", &self.names())
            .finish()
    }
}

impl FeedUpdater {
    /// Create an updater over `feeds`.
    pub fn new(feeds: Vec<Box<dyn PriceSource>>) -> Self {
        Self { feeds }
    }

    /// Add a feed.
    pub fn push(&mut self, feed: Box<dyn PriceSource>) {
        self.feeds.push(feed);
    }

    /// Replace the feed list, returning the previous one.
    pub fn set_feeds(&mut self, feeds: Vec<Box<dyn PriceSource>>) -> Vec<Box<dyn PriceSource>> {
        std::mem::replace(&mut self.feeds, feeds)
    }

    /// Names of the managed feeds, in update order.
    pub fn names(&self) -> Vec<&str> {
        self.feeds.iter().map(|feed| feed.name()).collect()
    }

    /// The managed feeds.
    pub fn feeds(&self) -> &[Box<dyn PriceSource>] {
        &self.feeds
    }

    /// Mutable access to the managed feeds.
    pub fn feeds_mut(&mut self) -> &mut [Box<dyn PriceSource>] {
        &mut self.feeds
    }

    /// Find a feed by name.
    pub fn feed_mut(&mut self, name: &str) -> Option<&mut Box<dyn PriceSource>> {
        self.feeds.iter_mut().find(|feed| feed.name() == name)
    }

    /// Update every feed once.
    pub fn update_all(&mut self, now: u64) -> UpdateReport {
        let mut report = UpdateReport::default();
        for feed in &mut self.feeds {
            let name = feed.name().to_string();
            match feed.update(now) {
                Ok(UpdateOutcome::Recorded { id, .. }) => {
                    debug!(feed = %name, id, "feed updated");
                    report.recorded.push(name);
                }
                Ok(UpdateOutcome::Skipped) => report.skipped.push(name),
                Err(e) => {
                    warn!(feed = %name, error = %e, "feed update failed");
                    report.failed.push((name, e));
                }
            }
        }
        report
    }
}
