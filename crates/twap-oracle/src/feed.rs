//! A named, lock-guarded TWAP feed for concurrent callers.
//!
//! Writers (`record_observation`) and cache-populating readers
//! (`get_price`) take the write lock, so a reader never sees a half-advanced
//! cursor. Read-only probes (`peek`, `latest`, `status`) share the read lock.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::buffer::{Observation, ObservationId};
use crate::cache::{CacheSnapshot, CachedTwap, TwapCache};
use crate::clock::{Clock, SystemClock};
use crate::fixed_point::Price;
use crate::{OracleError, Result};

/// Introspection of a feed's state, for monitoring rather than correctness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    /// Feed name.
    pub name: String,
    /// Ring capacity.
    pub capacity: usize,
    /// Slot index of the latest observation.
    pub current_index: usize,
    /// Observations currently retained.
    pub retained: usize,
    /// Total observations ever recorded.
    pub total_appended: u64,
    /// The latest observation, if any.
    pub latest: Option<Observation>,
    /// The current cache slot, if any.
    pub cached: Option<CachedTwap>,
}

/// A [`TwapCache`] behind a [`RwLock`], queried against an injected [`Clock`].
#[derive(Debug)]
pub struct TwapFeed<C = SystemClock> {
    name: String,
    state: RwLock<TwapCache>,
    clock: C,
}

impl<C: Clock> TwapFeed<C> {
    /// Create a feed around an existing cache.
    pub fn new(name: impl Into<String>, cache: TwapCache, clock: C) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(cache),
            clock,
        }
    }

    /// Feed name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The feed's clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Record a sample.
    ///
    /// # Errors
    ///
    /// - [`OracleError::LockPoisoned`] if the lock is poisoned
    /// - any error from [`TwapCache::record_observation`]
    pub fn record_observation(&self, price: Price, timestamp: u64) -> Result<ObservationId> {
        self.write()?.record_observation(price, timestamp)
    }

    /// TWAP over the last `interval` seconds as of the clock's `now`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::LockPoisoned`] if the lock is poisoned
    /// - any error from [`TwapCache::get_price`]
    pub fn get_price(&self, interval: u64) -> Result<Price> {
        let now = self.clock.now();
        self.write()?.get_price(interval, now)
    }

    /// TWAP without populating the cache.
    ///
    /// # Errors
    ///
    /// - [`OracleError::LockPoisoned`] if the lock is poisoned
    /// - any error from [`TwapCache::peek`]
    pub fn peek(&self, interval: u64) -> Result<Price> {
        let now = self.clock.now();
        self.read()?.peek(interval, now)
    }

    /// Latest `(price, timestamp)`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::LockPoisoned`] if the lock is poisoned
    /// - [`OracleError::NoData`] if nothing has been recorded
    pub fn latest(&self) -> Result<(Price, u64)> {
        let latest = self.read()?.latest()?;
        Ok((latest.price, latest.timestamp))
    }

    /// Current introspection snapshot.
    ///
    /// # Errors
    ///
    /// - [`OracleError::LockPoisoned`] if the lock is poisoned
    pub fn status(&self) -> Result<FeedStatus> {
        let state = self.read()?;
        let buffer = state.engine().buffer();
        Ok(FeedStatus {
            name: self.name.clone(),
            capacity: buffer.capacity(),
            current_index: buffer.current_index(),
            retained: buffer.len(),
            total_appended: buffer.total_appended(),
            latest: buffer.latest().ok(),
            cached: state.cached(),
        })
    }

    /// Persistable state.
    ///
    /// # Errors
    ///
    /// - [`OracleError::LockPoisoned`] if the lock is poisoned
    pub fn snapshot(&self) -> Result<CacheSnapshot> {
        Ok(self.read()?.snapshot())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, TwapCache>> {
        self.state.read().map_err(|_| OracleError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TwapCache>> {
        self.state.write().map_err(|_| OracleError::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::TwapEngine;

    const T0: u64 = 1_700_000_000;

    fn feed(capacity: usize) -> TwapFeed<Arc<ManualClock>> {
        let cache = TwapCache::new(TwapEngine::new(capacity).expect("engine"));
        TwapFeed::new("ETH/USD", cache, Arc::new(ManualClock::new(T0)))
    }

    #[test]
    fn test_get_price_uses_clock() {
        let feed = feed(3);
        feed.record_observation(Price::from_integer(400), T0).expect("record");
        feed.record_observation(Price::from_integer(405), T0 + 15).expect("record");
        feed.record_observation(Price::from_integer(410), T0 + 30).expect("record");

        feed.clock().set(T0 + 45);
        assert_eq!(feed.get_price(45), Ok(Price::from_integer(405)));
        assert_eq!(feed.get_price(0), Ok(Price::from_integer(410)));
        assert_eq!(feed.latest(), Ok((Price::from_integer(410), T0 + 30)));
    }

    #[test]
    fn test_status() {
        let feed = feed(2);
        let status = feed.status().expect("status");
        assert_eq!(status.name, "ETH/USD");
        assert_eq!(status.capacity, 2);
        assert_eq!(status.latest, None);
        assert_eq!(status.cached, None);

        for i in 0..3u64 {
            feed.record_observation(Price::from_integer(1 + i), T0 + i).expect("record");
        }
        feed.clock().set(T0 + 10);
        feed.get_price(5).expect("twap");

        let status = feed.status().expect("status");
        assert_eq!(status.current_index, 0);
        assert_eq!(status.retained, 2);
        assert_eq!(status.total_appended, 3);
        assert_eq!(status.latest.map(|o| o.timestamp), Some(T0 + 2));
        assert_eq!(status.cached.map(|c| (c.timestamp, c.interval)), Some((T0 + 10, 5)));
    }

    #[test]
    fn test_peek_leaves_cache_empty() {
        let feed = feed(3);
        feed.record_observation(Price::from_integer(1), T0).expect("record");
        feed.clock().advance(10);
        assert_eq!(feed.peek(5), Ok(Price::from_integer(1)));
        assert_eq!(feed.status().expect("status").cached, None);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let feed = Arc::new(feed(64));
        feed.record_observation(Price::from_integer(100), T0).expect("seed");
        feed.clock().set(T0 + 10_000);

        let writer = {
            let feed = Arc::clone(&feed);
            thread::spawn(move || {
                for i in 1..=200u64 {
                    feed.record_observation(Price::from_integer(100 + i), T0 + i)
                        .expect("record");
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let feed = Arc::clone(&feed);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let status = feed.status().expect("status");
                        let latest = status.latest.expect("seeded");
                        // Cursor and slot contents always agree
                        assert_eq!(latest.price, Price::from_integer(100 + (latest.timestamp - T0)));
                        feed.get_price(60).expect("twap");
                    }
                })
            })
            .collect();

        writer.join().expect("writer");
        for reader in readers {
            reader.join().expect("reader");
        }
        assert_eq!(feed.latest(), Ok((Price::from_integer(300), T0 + 200)));
    }
}
