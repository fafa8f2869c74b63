//! Read gate for adapters: staleness check plus emergency pause.
//!
//! The breaker keeps no clock of its own. Freshness is judged from the
//! timestamp of the feed's latest recorded observation, so a feed restored
//! from a snapshot is exactly as stale as its data.

use twap_oracle::TwapCache;

use crate::{FeedError, Result};

/// Default staleness threshold in seconds (1 hour).
pub const STALENESS_THRESHOLD: u64 = 3600;

/// Gates price reads on data age and a manual pause switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreaker {
    staleness_threshold: u64,
    paused: bool,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(STALENESS_THRESHOLD)
    }
}

impl CircuitBreaker {
    /// A breaker that trips once the latest observation is more than
    /// `staleness_threshold` seconds old.
    pub fn new(staleness_threshold: u64) -> Self {
        Self {
            staleness_threshold,
            paused: false,
        }
    }

    /// The configured staleness threshold.
    pub fn staleness_threshold(&self) -> u64 {
        self.staleness_threshold
    }

    /// Whether data last updated at `latest` is stale at `now`.
    ///
    /// A feed with no observations is never stale; the engine reports
    /// [`NoData`](twap_oracle::OracleError::NoData) for it instead.
    pub fn is_stale(&self, latest: Option<u64>, now: u64) -> bool {
        latest.is_some_and(|at| now.saturating_sub(at) > self.staleness_threshold)
    }

    /// Check a read at `now` against data last updated at `latest`.
    ///
    /// # Errors
    ///
    /// - [`FeedError::Paused`] if the breaker is paused
    /// - [`FeedError::StaleData`] if `latest` is older than the threshold
    pub fn check_operational(&self, latest: Option<u64>, now: u64) -> Result<()> {
        if self.paused {
            return Err(FeedError::Paused);
        }
        match latest {
            Some(last_update) if self.is_stale(latest, now) => Err(FeedError::StaleData {
                last_update,
                current: now,
                threshold: self.staleness_threshold,
            }),
            _ => Ok(()),
        }
    }

    /// [`check_operational`](Self::check_operational) against the newest
    /// observation recorded in `cache`.
    ///
    /// # Errors
    ///
    /// Same as [`check_operational`](Self::check_operational).
    pub fn check_cache(&self, cache: &TwapCache, now: u64) -> Result<()> {
        let latest = cache.latest().ok().map(|observation| observation.timestamp);
        self.check_operational(latest, now)
    }

    /// Refuse all reads until [`resume`](Self::resume).
    pub fn pause(&mut self) {
        tracing::warn!("circuit breaker: feed paused");
        self.paused = true;
    }

    /// Allow reads again.
    pub fn resume(&mut self) {
        tracing::info!("circuit breaker: feed resumed");
        self.paused = false;
    }

    /// Whether reads are currently refused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twap_oracle::{Price, TwapEngine};

    const T0: u64 = 1_700_000_000;

    #[test]
    fn test_default_threshold() {
        let cb = CircuitBreaker::default();
        assert!(!cb.is_paused());
        assert_eq!(cb.staleness_threshold(), STALENESS_THRESHOLD);
    }

    #[test]
    fn test_stale_only_after_threshold() {
        let cb = CircuitBreaker::new(60);
        assert!(!cb.is_stale(Some(T0), T0 + 60));
        assert!(cb.is_stale(Some(T0), T0 + 61));
        assert!(!cb.is_stale(None, T0 + 10_000));
        // Clock behind the data is not staleness
        assert!(!cb.is_stale(Some(T0), T0 - 5));
    }

    #[test]
    fn test_pause_takes_priority_over_staleness() {
        let mut cb = CircuitBreaker::new(60);
        cb.pause();
        assert_eq!(cb.check_operational(Some(T0), T0 + 5000), Err(FeedError::Paused));

        cb.resume();
        assert_eq!(
            cb.check_operational(Some(T0), T0 + 5000),
            Err(FeedError::StaleData {
                last_update: T0,
                current: T0 + 5000,
                threshold: 60
            })
        );
        cb.check_operational(Some(T0), T0 + 60).expect("fresh");
    }

    #[test]
    fn test_freshness_follows_recorded_data() {
        let cb = CircuitBreaker::new(60);
        let mut cache = TwapCache::new(TwapEngine::new(4).expect("engine"));
        cb.check_cache(&cache, T0).expect("empty feed is not stale");

        cache
            .record_observation(Price::from_integer(400), T0)
            .expect("record");
        assert!(matches!(
            cb.check_cache(&cache, T0 + 61),
            Err(FeedError::StaleData { last_update: T0, .. })
        ));

        cache
            .record_observation(Price::from_integer(405), T0 + 30)
            .expect("record");
        cb.check_cache(&cache, T0 + 61).expect("new sample refreshes the feed");
    }
}
