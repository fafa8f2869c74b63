//! Round-based aggregator source.
//!
//! Aggregators publish numbered rounds, each with a signed answer in the
//! aggregator's own decimals. Answers are validated and rescaled to 18
//! decimals before they reach the engine. Round ids pack a phase and a
//! per-phase round number, see [`compute_round_id`].

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use twap_oracle::{CacheSnapshot, Price, Sample, TwapCache};

use crate::circuit_breaker::CircuitBreaker;
use crate::{FeedError, PriceSource, Result, UpdateOutcome};

/// One aggregator round as reported upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundData {
    /// `(phase << 64) | round`.
    pub round_id: u128,
    /// Answer in the aggregator's decimals.
    pub answer: i128,
    /// When the round started.
    pub started_at: u64,
    /// When the round was answered; zero while the round is open.
    pub updated_at: u64,
    /// Round in which the answer was computed.
    pub answered_in_round: u128,
}

/// Upstream access for [`RoundAggregatorFeed`].
pub trait Aggregator: Send {
    /// Decimal places of `answer`.
    fn decimals(&self) -> u8;

    /// The most recent round.
    ///
    /// # Errors
    ///
    /// [`FeedError::Upstream`] when the aggregator cannot be read.
    fn latest_round_data(&self) -> Result<RoundData>;

    /// A specific round. Unknown rounds may come back zeroed.
    ///
    /// # Errors
    ///
    /// [`FeedError::Upstream`] when the aggregator cannot be read.
    fn round_data(&self, round_id: u128) -> Result<RoundData>;
}

/// Proxy round id for `round` within `phase`.
pub fn compute_round_id(phase: u16, round: u64) -> u128 {
    (u128::from(phase) << 64) | u128::from(round)
}

/// A TWAP feed over a round-based aggregator.
#[derive(Debug)]
pub struct RoundAggregatorFeed<A> {
    name: String,
    aggregator: A,
    twap_interval: u64,
    cache: TwapCache,
    breaker: Option<CircuitBreaker>,
}

impl<A: Aggregator> RoundAggregatorFeed<A> {
    /// Create a feed that warms the cache for `twap_interval` on every update.
    ///
    /// A `twap_interval` of zero disables warming.
    pub fn new(name: impl Into<String>, aggregator: A, twap_interval: u64, cache: TwapCache) -> Self {
        Self {
            name: name.into(),
            aggregator,
            twap_interval,
            cache,
            breaker: None,
        }
    }

    /// Gate price queries behind a circuit breaker.
    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// The upstream aggregator.
    pub fn aggregator(&self) -> &A {
        &self.aggregator
    }

    /// Mutable access to the upstream aggregator.
    pub fn aggregator_mut(&mut self) -> &mut A {
        &mut self.aggregator
    }

    /// Interval warmed on each update.
    pub fn twap_interval(&self) -> u64 {
        self.twap_interval
    }

    /// The feed's cache and engine.
    pub fn cache(&self) -> &TwapCache {
        &self.cache
    }

    /// Record the aggregator's latest round and warm the cache.
    ///
    /// Warming failures are logged and do not fail the update.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidPrice`] if the answer is zero or negative
    /// - [`FeedError::IncompleteRound`] if the round has no `updated_at`
    /// - [`FeedError::NotUpdated`] if the round carries the latest recorded timestamp
    /// - [`FeedError::Oracle`] if the round is older than the latest recorded one
    pub fn update(&mut self, now: u64) -> Result<UpdateOutcome> {
        let round = self.aggregator.latest_round_data()?;
        let sample = self.validate(&round)?;

        if let Ok(latest) = self.cache.latest() {
            if latest.timestamp == sample.timestamp {
                return Err(FeedError::NotUpdated {
                    timestamp: latest.timestamp,
                });
            }
        }
        let id = self.cache.record_observation(sample.price, sample.timestamp)?;
        info!(
            feed = %self.name,
            round_id = round.round_id,
            price = %sample.price,
            timestamp = sample.timestamp,
            "round recorded"
        );

        if self.twap_interval > 0 {
            if let Err(e) = self.cache.get_price(self.twap_interval, now) {
                warn!(feed = %self.name, interval = self.twap_interval, error = %e, "cache warm failed");
            }
        }
        Ok(UpdateOutcome::Recorded { id, sample })
    }

    /// Validated, rescaled `(price, updated_at)` for a specific round.
    ///
    /// # Errors
    ///
    /// - [`FeedError::InvalidPrice`] if the answer is zero or negative
    /// - [`FeedError::IncompleteRound`] if the round has no `updated_at`
    pub fn get_round_data(&self, round_id: u128) -> Result<(Price, u64)> {
        let round = self.aggregator.round_data(round_id)?;
        let sample = self.validate(&round)?;
        Ok((sample.price, sample.timestamp))
    }

    /// TWAP over the last `interval` seconds, including the aggregator's
    /// current round if it is valid and not yet recorded.
    ///
    /// An `interval` of zero returns the latest price without touching the cache.
    ///
    /// # Errors
    ///
    /// Circuit-breaker or engine errors.
    pub fn get_price(&mut self, interval: u64, now: u64) -> Result<Price> {
        if let Some(breaker) = &self.breaker {
            breaker.check_cache(&self.cache, now)?;
        }
        let pending = self.current_round();
        if interval == 0 {
            return Ok(self.cache.peek_with_pending(0, now, pending)?);
        }
        Ok(self.cache.get_price_with_pending(interval, now, pending)?)
    }

    /// The current round as a sample, or `None` if it is unusable.
    fn current_round(&self) -> Option<Sample> {
        let round = self.aggregator.latest_round_data().ok()?;
        self.validate(&round).ok()
    }

    fn validate(&self, round: &RoundData) -> Result<Sample> {
        if round.answer <= 0 {
            return Err(FeedError::InvalidPrice(round.answer));
        }
        if round.updated_at == 0 {
            return Err(FeedError::IncompleteRound {
                round_id: round.round_id,
            });
        }
        let answer = u128::try_from(round.answer).map_err(|_| FeedError::InvalidPrice(round.answer))?;
        let price = Price::from_scaled(answer, self.aggregator.decimals())?;
        Ok(Sample::new(price, round.updated_at))
    }
}

impl<A: Aggregator> PriceSource for RoundAggregatorFeed<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, now: u64) -> Result<UpdateOutcome> {
        RoundAggregatorFeed::update(self, now)
    }

    fn get_price(&mut self, interval: u64, now: u64) -> Result<Price> {
        RoundAggregatorFeed::get_price(self, interval, now)
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

    /// Aggregator double holding a list of rounds; the last one is latest.
    #[derive(Debug)]
    struct ScriptedAggregator {
        decimals: u8,
        rounds: Vec<RoundData>,
    }

    impl ScriptedAggregator {
        fn new(decimals: u8) -> Self {
            Self {
                decimals,
                rounds: Vec::new(),
            }
        }

        fn push(&mut self, round_id: u128, answer: i128, updated_at: u64) {
            self.rounds.push(RoundData {
                round_id,
                answer,
                started_at: updated_at,
                updated_at,
                answered_in_round: round_id,
            });
        }
    }

    impl Aggregator for ScriptedAggregator {
        fn decimals(&self) -> u8 {
            self.decimals
        }

        fn latest_round_data(&self) -> Result<RoundData> {
            self.rounds
                .last()
                .copied()
                .ok_or_else(|| FeedError::Upstream("no rounds".to_string()))
        }

        fn round_data(&self, round_id: u128) -> Result<RoundData> {
            Ok(self
                .rounds
                .iter()
                .find(|round| round.round_id == round_id)
                .copied()
                .unwrap_or_default())
        }
    }

    fn ether(units: i128) -> i128 {
        units * 1_000_000_000_000_000_000
    }

    fn feed(decimals: u8, twap_interval: u64) -> RoundAggregatorFeed<ScriptedAggregator> {
        let cache = TwapCache::new(TwapEngine::new(256).expect("engine"));
        RoundAggregatorFeed::new("ETH/USD", ScriptedAggregator::new(decimals), twap_interval, cache)
    }

    /// Rounds 400 @ T0, 405 @ T0+15, 410 @ T0+30, each recorded.
    fn seeded_feed() -> RoundAggregatorFeed<ScriptedAggregator> {
        let mut feed = feed(18, 0);
        for (i, (answer, at)) in [(400, T0), (405, T0 + 15), (410, T0 + 30)].into_iter().enumerate() {
            let round_id = compute_round_id(1, i as u64 + 1);
            feed.aggregator_mut().push(round_id, ether(answer), at);
            feed.update(at).expect("update");
        }
        feed
    }

    #[test]
    fn test_compute_round_id() {
        assert_eq!(compute_round_id(1, 1), (1u128 << 64) + 1);
        assert_eq!(compute_round_id(2, 10_000), (2u128 << 64) + 10_000);
        assert_eq!(compute_round_id(0, 123), 123);
    }

    #[test]
    fn test_twap_scenarios() {
        let mut feed = seeded_feed();
        let now = T0 + 45;
        assert_eq!(feed.get_price(45, now), Ok(Price::from_integer(405)));
        assert_eq!(feed.get_price(46, now), Ok(Price::from_integer(405)));
        assert_eq!(
            feed.get_price(44, now).map(Price::raw),
            Ok(405_113_636_363_636_363_636)
        );
        assert_eq!(feed.get_price(0, now), Ok(Price::from_integer(410)));
        assert_eq!(feed.get_price(45, T0 + 145), Ok(Price::from_integer(410)));
    }

    #[test]
    fn test_unrecorded_current_round_is_included() {
        let mut feed = seeded_feed();
        feed.aggregator_mut().push(compute_round_id(1, 4), ether(415), T0 + 60);
        // (410 * 30 + 415 * 15) / 45
        assert_eq!(
            feed.get_price(45, T0 + 75).map(Price::raw),
            Ok(411_666_666_666_666_666_666)
        );
    }

    #[test]
    fn test_negative_current_round_is_ignored() {
        let mut feed = seeded_feed();
        feed.aggregator_mut().push(compute_round_id(1, 4), -1, T0 + 40);
        assert_eq!(feed.get_price(45, T0 + 45), Ok(Price::from_integer(405)));
        assert_eq!(feed.update(T0 + 45), Err(FeedError::InvalidPrice(-1)));
    }

    #[test]
    fn test_same_timestamp_not_updated() {
        let mut feed = feed(18, 0);
        feed.aggregator_mut().push(0, ether(399), T0);
        feed.update(T0).expect("first update");
        feed.aggregator_mut().push(0, ether(400), T0);
        assert_eq!(feed.update(T0), Err(FeedError::NotUpdated { timestamp: T0 }));
    }

    #[test]
    fn test_older_round_rejected() {
        let mut feed = feed(18, 0);
        feed.aggregator_mut().push(1, ether(400), T0 + 10);
        feed.update(T0 + 10).expect("update");
        feed.aggregator_mut().push(2, ether(401), T0);
        assert_eq!(
            feed.update(T0 + 10),
            Err(FeedError::Oracle(OracleError::NonMonotonicTimestamp {
                new: T0,
                last: T0 + 10
            }))
        );
    }

    #[test]
    fn test_get_round_data() {
        let mut feed = feed(8, 0);
        let aggregator = feed.aggregator_mut();
        aggregator.push(compute_round_id(1, 1), 1_800_0000_0000, T0);
        aggregator.push(compute_round_id(1, 2), 1_900_0000_0000, T0 + 15);
        aggregator.push(compute_round_id(2, 10_000), 1_700_0000_0000, T0 + 30);
        aggregator.push(compute_round_id(2, 20_000), -1000_0000, 0);
        aggregator.push(compute_round_id(2, 20_001), 5_000_0000_0000, 0);

        assert_eq!(
            feed.get_round_data(compute_round_id(1, 1)),
            Ok((Price::from_integer(1_800), T0))
        );
        assert_eq!(
            feed.get_round_data(compute_round_id(1, 2)),
            Ok((Price::from_integer(1_900), T0 + 15))
        );
        assert_eq!(
            feed.get_round_data(compute_round_id(2, 10_000)),
            Ok((Price::from_integer(1_700), T0 + 30))
        );

        // Sign is checked before completeness
        assert_eq!(
            feed.get_round_data(compute_round_id(2, 20_000)),
            Err(FeedError::InvalidPrice(-1000_0000))
        );
        assert_eq!(feed.get_round_data(123), Err(FeedError::InvalidPrice(0)));
        assert_eq!(
            feed.get_round_data(compute_round_id(2, 20_001)),
            Err(FeedError::IncompleteRound {
                round_id: compute_round_id(2, 20_001)
            })
        );
    }

    #[test]
    fn test_update_warms_cache() {
        let mut feed = feed(18, 900);
        feed.aggregator_mut().push(1, ether(400), T0);
        feed.update(T0 + 5).expect("update");

        let cached = feed.cache().cached().expect("warmed");
        assert_eq!((cached.timestamp, cached.interval), (T0 + 5, 900));
        assert_eq!(cached.twap, Price::from_integer(400));
    }

    #[test]
    fn test_failed_warm_does_not_fail_update() {
        let mut feed = feed(18, 900);
        feed.aggregator_mut().push(1, ether(400), T0 + 10);
        // `now` behind the round: warming fails, the round is still recorded
        let outcome = feed.update(T0).expect("update");
        assert!(matches!(outcome, UpdateOutcome::Recorded { id: 0, .. }));
        assert_eq!(feed.cache().cached(), None);
    }

    #[test]
    fn test_circuit_breaker_uses_latest_round() {
        let mut feed = seeded_feed().with_circuit_breaker(CircuitBreaker::new(60));
        assert_eq!(feed.get_price(45, T0 + 90), Ok(Price::from_integer(410)));
        assert_eq!(
            feed.get_price(45, T0 + 91),
            Err(FeedError::StaleData {
                last_update: T0 + 30,
                current: T0 + 91,
                threshold: 60
            })
        );

        feed.aggregator_mut().push(compute_round_id(1, 4), ether(415), T0 + 90);
        feed.update(T0 + 90).expect("update");
        assert!(feed.get_price(45, T0 + 91).is_ok());
    }
}
