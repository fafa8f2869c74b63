//! Generic reference-rate source.
//!
//! The upstream publishes one rate per `(base, quote)` pair together with the
//! time each side was last refreshed. Every [`update`](ReferenceRateFeed::update)
//! records `(rate, last_updated_base)`; the same timestamp twice is a replay
//! and is rejected by the engine.
//!
//! Price queries fold in the upstream's current datum even when it has not
//! been recorded yet, so consumers see the freshest rate without waiting for
//! the next update.

use serde::{Deserialize, Serialize};
use tracing::info;

use twap_oracle::{CacheSnapshot, Price, Sample, TwapCache};

use crate::circuit_breaker::CircuitBreaker;
use crate::{FeedError, PriceSource, Result, UpdateOutcome};

/// One reference datum for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Base/quote rate.
    pub rate: Price,
    /// When the base side was last refreshed.
    pub last_updated_base: u64,
    /// When the quote side was last refreshed.
    pub last_updated_quote: u64,
}

/// Upstream access for [`ReferenceRateFeed`].
pub trait ReferenceProvider: Send {
    /// Current reference datum for `base/quote`.
    ///
    /// # Errors
    ///
    /// [`FeedError::Upstream`] when the upstream cannot be read.
    fn reference_data(&self, base: &str, quote: &str) -> Result<ReferenceData>;
}

/// A TWAP feed over a reference-rate upstream.
#[derive(Debug)]
pub struct ReferenceRateFeed<P> {
    name: String,
    base: String,
    quote: String,
    provider: P,
    cache: TwapCache,
    breaker: Option<CircuitBreaker>,
}

impl<P: ReferenceProvider> ReferenceRateFeed<P> {
    /// Create a feed for `base/quote` recording into `cache`.
    pub fn new(provider: P, base: impl Into<String>, quote: impl Into<String>, cache: TwapCache) -> Self {
        let base = base.into();
        let quote = quote.into();
        Self {
            name: format!("{base}/{quote}"),
            base,
            quote,
            provider,
            cache,
            breaker: None,
        }
    }

    /// Gate price queries behind a circuit breaker.
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// The upstream provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Mutable access to the upstream provider.
    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// The feed's cache and engine.
    pub fn cache(&self) -> &TwapCache {
        &self.cache
    }

    /// The circuit breaker, if configured.
    pub fn circuit_breaker_mut(&mut self) -> Option<&mut CircuitBreaker> {
        self.breaker.as_mut()
    }

    /// Record the upstream's current datum.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidPrice`] if the upstream rate is zero
    /// - [`FeedError::Oracle`] wrapping
    ///   [`NonMonotonicTimestamp`](twap_oracle::OracleError::NonMonotonicTimestamp)
    ///   if the datum is not newer than the latest recorded one
    pub fn update(&mut self) -> Result<UpdateOutcome> {
        let sample = self.fetch()?;
        let id = self.cache.record_observation(sample.price, sample.timestamp)?;
        info!(
            feed = %self.name,
            price = %sample.price,
            timestamp = sample.timestamp,
            "price updated"
        );
        Ok(UpdateOutcome::Recorded { id, sample })
    }

    /// TWAP including the upstream's unrecorded datum, without touching the cache.
    ///
    /// # Errors
    ///
    /// Circuit-breaker, upstream, or engine errors.
    pub fn peek_price(&self, interval: u64, now: u64) -> Result<Price> {
        self.check_operational(now)?;
        let sample = self.fetch()?;
        if interval == 0 {
            return Ok(sample.price);
        }
        Ok(self.cache.peek_with_pending(interval, now, Some(sample))?)
    }

    /// TWAP including the upstream's unrecorded datum, memoized per
    /// `(now, interval)`.
    ///
    /// An `interval` of zero returns the upstream rate and leaves the cache as
    /// it was.
    ///
    /// # Errors
    ///
    /// Circuit-breaker, upstream, or engine errors.
    pub fn cache_price(&mut self, interval: u64, now: u64) -> Result<Price> {
        self.check_operational(now)?;
        let sample = self.fetch()?;
        if interval == 0 {
            return Ok(sample.price);
        }
        Ok(self
            .cache
            .get_price_with_pending(interval, now, Some(sample))?)
    }

    fn fetch(&self) -> Result<Sample> {
        let data = self.provider.reference_data(&self.base, &self.quote)?;
        if data.rate.is_zero() {
            return Err(FeedError::InvalidPrice(0));
        }
        Ok(Sample::new(data.rate, data.last_updated_base))
    }

    fn check_operational(&self, now: u64) -> Result<()> {
        match &self.breaker {
            Some(breaker) => breaker.check_cache(&self.cache, now),
            None => Ok(()),
        }
    }
}

impl<P: ReferenceProvider> PriceSource for ReferenceRateFeed<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, _now: u64) -> Result<UpdateOutcome> {
        ReferenceRateFeed::update(self)
    }

    fn get_price(&mut self, interval: u64, now: u64) -> Result<Price> {
        self.cache_price(interval, now)
    }

    fn snapshot(&self) -> Option<CacheSnapshot> {
        Some(self.cache.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twap_oracle::{OracleError, TwapEngine};

    const T0: u64 = 1_700_000_000;

    /// Upstream double whose datum the test sets directly.
    #[derive(Debug, Default)]
    struct StaticReference {
        data: Option<ReferenceData>,
    }

    impl StaticReference {
        fn set(&mut self, rate: u64, timestamp: u64) {
            self.data = Some(ReferenceData {
                rate: Price::from_integer(rate),
                last_updated_base: timestamp,
                last_updated_quote: timestamp,
            });
        }
    }

    impl ReferenceProvider for StaticReference {
        fn reference_data(&self, base: &str, quote: &str) -> Result<ReferenceData> {
            self.data
                .ok_or_else(|| FeedError::Upstream(format!("no data for {base}/{quote}")))
        }
    }

    fn feed() -> ReferenceRateFeed<StaticReference> {
        let cache = TwapCache::new(TwapEngine::new(256).expect("engine"));
        ReferenceRateFeed::new(StaticReference::default(), "ETH", "USD", cache)
    }

    fn push(feed: &mut ReferenceRateFeed<StaticReference>, rate: u64, timestamp: u64) {
        feed.provider_mut().set(rate, timestamp);
        feed.update().expect("update");
    }

    /// 400 @ T0, 405 @ T0+15, 410 @ T0+30
    fn seeded_feed() -> ReferenceRateFeed<StaticReference> {
        let mut feed = feed();
        push(&mut feed, 400, T0);
        push(&mut feed, 405, T0 + 15);
        push(&mut feed, 410, T0 + 30);
        feed
    }

    #[test]
    fn test_update_once() {
        let mut feed = feed();
        feed.provider_mut().set(400, T0);
        let outcome = feed.update().expect("update");
        assert_eq!(
            outcome,
            UpdateOutcome::Recorded {
                id: 0,
                sample: Sample::new(Price::from_integer(400), T0),
            }
        );
        let observation = feed.cache().engine().buffer().slot(0).copied().expect("slot");
        assert_eq!(observation.price, Price::from_integer(400));
        assert_eq!(observation.timestamp, T0);
        assert_eq!(observation.cumulative_price, 0);
    }

    #[test]
    fn test_update_twice_accumulates() {
        let mut feed = feed();
        push(&mut feed, 400, T0);
        push(&mut feed, 440, T0 + 15);
        let observation = feed.cache().engine().buffer().slot(1).copied().expect("slot");
        assert_eq!(observation.price, Price::from_integer(440));
        assert_eq!(observation.cumulative_price, Price::from_integer(6_000).raw());
    }

    #[test]
    fn test_same_timestamp_update_rejected() {
        let mut feed = feed();
        push(&mut feed, 400, T0);
        feed.provider_mut().set(440, T0);
        assert_eq!(
            feed.update(),
            Err(FeedError::Oracle(OracleError::NonMonotonicTimestamp {
                new: T0,
                last: T0
            }))
        );
    }

    #[test]
    fn test_zero_rate_rejected() {
        let mut feed = feed();
        feed.provider_mut().set(0, T0);
        assert_eq!(feed.update(), Err(FeedError::InvalidPrice(0)));
    }

    #[test]
    fn test_upstream_failure_propagates() {
        let mut feed = feed();
        assert!(matches!(feed.update(), Err(FeedError::Upstream(_))));
    }

    #[test]
    fn test_get_price_scenarios() {
        let feed = seeded_feed();
        let now = T0 + 45;
        assert_eq!(feed.peek_price(0, now), Ok(Price::from_integer(410)));
        assert_eq!(feed.peek_price(45, now), Ok(Price::from_integer(405)));
        assert_eq!(feed.peek_price(46, now), Ok(Price::from_integer(405)));
        assert_eq!(
            feed.peek_price(44, now).map(Price::raw),
            Ok(405_113_636_363_636_363_636)
        );
        assert_eq!(feed.peek_price(14, now), Ok(Price::from_integer(410)));
        // Latest update long before the window
        assert_eq!(feed.peek_price(45, T0 + 145), Ok(Price::from_integer(410)));
    }

    #[test]
    fn test_unrecorded_upstream_datum_is_included() {
        let mut feed = seeded_feed();
        feed.provider_mut().set(415, T0 + 60);
        // (410 * 30 + 415 * 15) / 45
        assert_eq!(
            feed.peek_price(45, T0 + 75).map(Price::raw),
            Ok(411_666_666_666_666_666_666)
        );
    }

    #[test]
    fn test_variant_price_period() {
        let mut feed = seeded_feed();
        feed.provider_mut().set(420, T0 + 75);
        // (400 * 15 + 405 * 15 + 410 * 45 + 420 * 20) / 95
        assert_eq!(
            feed.peek_price(95, T0 + 95).map(Price::raw),
            Ok(409_736_842_105_263_157_894)
        );
    }

    #[test]
    fn test_cache_price() {
        let mut feed = seeded_feed();
        // (400 * 15 + 405 * 15 + 410 * 30) / 60
        let twap = feed.cache_price(900, T0 + 60).expect("cache");
        assert_eq!(twap.raw(), 406_250_000_000_000_000_000);
        let cached = feed.cache().cached().expect("populated");
        assert_eq!(cached.timestamp, T0 + 60);
        assert_eq!(cached.twap, twap);

        // Interval zero leaves the cache alone
        assert_eq!(feed.cache_price(0, T0 + 61), Ok(Price::from_integer(410)));
        assert_eq!(feed.cache().cached(), Some(cached));

        // (400 * 15 + 405 * 15 + 410 * 45) / 75
        assert_eq!(feed.cache_price(900, T0 + 75), Ok(Price::from_integer(407)));
        assert_eq!(feed.cache().cached().map(|c| c.timestamp), Some(T0 + 75));
    }

    #[test]
    fn test_circuit_breaker_gates_reads() {
        let mut feed = seeded_feed().with_circuit_breaker(CircuitBreaker::new(60));
        feed.provider_mut().set(415, T0 + 45);
        feed.update().expect("update");

        assert!(feed.peek_price(45, T0 + 100).is_ok());
        assert!(matches!(
            feed.peek_price(45, T0 + 200),
            Err(FeedError::StaleData { .. })
        ));

        if let Some(breaker) = feed.circuit_breaker_mut() {
            breaker.pause();
        }
        assert_eq!(feed.cache_price(45, T0 + 50), Err(FeedError::Paused));
    }

    #[test]
    fn test_price_source_impl() {
        let mut feed = seeded_feed();
        let source: &mut dyn PriceSource = &mut feed;
        assert_eq!(source.name(), "ETH/USD");
        assert_eq!(source.decimals(), 18);
        assert_eq!(source.get_price(45, T0 + 45), Ok(Price::from_integer(405)));
        let snapshot = source.snapshot().expect("reference feeds keep state");
        assert_eq!(snapshot.engine.buffer().len(), 3);
    }
}
