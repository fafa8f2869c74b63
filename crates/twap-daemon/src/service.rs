//! Feed set driven by the poll loop.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};
use twap_feeds::{CircuitBreaker, FeedUpdater, ReferenceRateFeed, UpdateReport};
use twap_oracle::Clock;

use crate::config::DaemonConfig;
use crate::provider::FileReferenceProvider;
use crate::snapshot;

/// The daemon's feeds plus the interval each one reports.
#[derive(Debug)]
pub struct Service {
    updater: FeedUpdater,
    intervals: Vec<u64>,
    state_dir: PathBuf,
    snapshot_every_polls: u64,
    polls: u64,
}

impl Service {
    /// Build one reference-rate feed per configured entry, restoring saved
    /// state where a snapshot exists.
    ///
    /// Restored feeds take the configured history policy. Feeds whose
    /// newest observation is already past the staleness threshold at `now`
    /// are logged and will refuse reads until a fresh sample arrives.
    pub fn build(config: &DaemonConfig, now: u64) -> anyhow::Result<Self> {
        let state_dir = config.storage.state_dir.clone();
        let breaker = CircuitBreaker::new(config.updater.staleness_threshold_secs);
        let mut updater = FeedUpdater::default();
        let mut intervals = Vec::with_capacity(config.feeds.len());

        for feed in &config.feeds {
            let name = feed.name();
            let cache = match snapshot::load(&state_dir, &name)? {
                Some(mut cache) => {
                    let engine = cache.engine();
                    if engine.buffer().capacity() != config.engine.capacity {
                        warn!(
                            feed = %name,
                            saved = engine.buffer().capacity(),
                            configured = config.engine.capacity,
                            "snapshot capacity differs from config; keeping snapshot"
                        );
                    }
                    if engine.policy() != config.engine.history_policy {
                        warn!(
                            feed = %name,
                            saved = ?engine.policy(),
                            configured = ?config.engine.history_policy,
                            "snapshot history policy differs from config; using config"
                        );
                        cache.set_policy(config.engine.history_policy);
                    }
                    let latest = cache.latest().ok().map(|observation| observation.timestamp);
                    if breaker.is_stale(latest, now) {
                        warn!(feed = %name, latest = ?latest, now, "restored feed is stale");
                    }
                    info!(
                        feed = %name,
                        retained = cache.engine().buffer().len(),
                        "restored from snapshot"
                    );
                    cache
                }
                None => config.engine.build_cache()?,
            };

            let source = ReferenceRateFeed::new(
                FileReferenceProvider::new(&feed.source_file),
                feed.base.as_str(),
                feed.quote.as_str(),
                cache,
            )
            .with_circuit_breaker(breaker);

            updater.push(Box::new(source));
            intervals.push(feed.twap_interval);
        }

        Ok(Self {
            updater,
            intervals,
            state_dir,
            snapshot_every_polls: config.storage.snapshot_every_polls.max(1),
            polls: 0,
        })
    }

    /// Feed names in poll order.
    pub fn names(&self) -> Vec<&str> {
        self.updater.names()
    }

    /// Update every feed, then log each feed's TWAP.
    pub fn poll(&mut self, now: u64) -> UpdateReport {
        let report = self.updater.update_all(now);
        self.polls += 1;
        debug!(
            recorded = report.recorded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "poll complete"
        );

        for (feed, &interval) in self.updater.feeds_mut().iter_mut().zip(&self.intervals) {
            match feed.get_price(interval, now) {
                Ok(twap) => info!(feed = feed.name(), interval, %twap, "twap"),
                Err(e) => warn!(feed = feed.name(), interval, error = %e, "twap unavailable"),
            }
        }
        report
    }

    /// Write a snapshot for every feed that keeps state. Returns how many were written.
    pub fn save(&self) -> anyhow::Result<usize> {
        let mut saved = 0;
        for feed in self.updater.feeds() {
            if let Some(state) = feed.snapshot() {
                snapshot::save(&self.state_dir, feed.name(), &state)?;
                saved += 1;
            }
        }
        debug!(saved, state_dir = %self.state_dir.display(), "snapshots written");
        Ok(saved)
    }

    /// Poll every `period` until `shutdown` resolves, then write a final
    /// snapshot.
    ///
    /// Snapshots are also written after every `storage.snapshot_every_polls`
    /// polls; a failed periodic write is logged and the loop continues.
    pub async fn run_until<C: Clock>(
        &mut self,
        clock: &C,
        period: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(period);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll(clock.now());
                    if self.polls % self.snapshot_every_polls == 0 {
                        if let Err(e) = self.save() {
                            warn!(error = %e, "periodic snapshot failed");
                        }
                    }
                }
                () = &mut shutdown => break,
            }
        }

        let saved = self.save()?;
        info!(saved, polls = self.polls, "final snapshots written");
        Ok(())
    }
}
