//! Single-slot TWAP result cache.
//!
//! Repeated queries for the same `(now, interval)` pair are answered from the
//! cache without touching the engine. Any other query recomputes and replaces
//! the slot. Recording a new observation clears the slot so a value computed
//! before the write is never served after it.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::buffer::{Observation, ObservationId, Sample};
use crate::engine::{HistoryPolicy, TwapEngine};
use crate::fixed_point::Price;
use crate::{OracleError, Result};

/// The memoized result of the last cache-populating query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTwap {
    /// Query time the result was computed for.
    pub timestamp: u64,
    /// Interval the result was computed for.
    pub interval: u64,
    /// The computed TWAP.
    pub twap: Price,
}

/// Everything needed to rebuild a [`TwapCache`] across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Engine state, including the observation ring and write cursor.
    pub engine: TwapEngine,
    /// Cache slot at the time of the snapshot.
    pub cached: Option<CachedTwap>,
}

/// A [`TwapEngine`] with a memoized last result.
#[derive(Debug, Clone)]
pub struct TwapCache {
    engine: TwapEngine,
    cached: Option<CachedTwap>,
    /// Number of engine computations performed by `get_price`.
    computations: u64,
}

impl TwapCache {
    /// Wrap an engine with an empty cache slot.
    pub fn new(engine: TwapEngine) -> Self {
        Self {
            engine,
            cached: None,
            computations: 0,
        }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &TwapEngine {
        &self.engine
    }

    /// The current cache slot, if populated.
    pub fn cached(&self) -> Option<CachedTwap> {
        self.cached
    }

    /// How many times `get_price` has delegated to the engine.
    pub fn computations(&self) -> u64 {
        self.computations
    }

    /// Record a sample through the engine and clear the cache slot.
    ///
    /// # Errors
    ///
    /// Propagates [`TwapEngine::record_observation`] errors; the cache slot
    /// is left intact when the write is rejected.
    pub fn record_observation(&mut self, price: Price, timestamp: u64) -> Result<ObservationId> {
        let id = self.engine.record_observation(price, timestamp)?;
        self.cached = None;
        Ok(id)
    }

    /// Switch the engine's history policy and clear the cache slot.
    pub fn set_policy(&mut self, policy: HistoryPolicy) {
        if self.engine.policy() != policy {
            self.engine.set_policy(policy);
            self.cached = None;
        }
    }

    /// The most recent observation.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoData`](crate::OracleError::NoData) if nothing has been recorded
    pub fn latest(&self) -> Result<Observation> {
        self.engine.latest()
    }

    /// TWAP over `interval` seconds as of `now`, served from the cache when
    /// both match the last populated slot.
    ///
    /// # Errors
    ///
    /// Propagates [`TwapEngine::compute_twap`] errors; a failed computation
    /// does not touch the cache slot.
    pub fn get_price(&mut self, interval: u64, now: u64) -> Result<Price> {
        self.get_price_with_pending(interval, now, None)
    }

    /// [`get_price`](Self::get_price) with an unrecorded newer upstream sample.
    ///
    /// # Errors
    ///
    /// Same as [`TwapEngine::compute_twap_with_pending`].
    pub fn get_price_with_pending(
        &mut self,
        interval: u64,
        now: u64,
        pending: Option<Sample>,
    ) -> Result<Price> {
        if let Some(hit) = self.lookup(interval, now) {
            trace!(interval, now, "twap cache hit");
            return Ok(hit);
        }

        self.computations += 1;
        let twap = self.engine.compute_twap_with_pending(interval, now, pending)?;
        self.cached = Some(CachedTwap {
            timestamp: now,
            interval,
            twap,
        });
        Ok(twap)
    }

    /// Same value as [`get_price`](Self::get_price) without updating the cache.
    ///
    /// # Errors
    ///
    /// Same as [`TwapEngine::compute_twap`].
    pub fn peek(&self, interval: u64, now: u64) -> Result<Price> {
        self.peek_with_pending(interval, now, None)
    }

    /// [`peek`](Self::peek) with an unrecorded newer upstream sample.
    ///
    /// # Errors
    ///
    /// Same as [`TwapEngine::compute_twap_with_pending`].
    pub fn peek_with_pending(&self, interval: u64, now: u64, pending: Option<Sample>) -> Result<Price> {
        match self.lookup(interval, now) {
            Some(hit) => Ok(hit),
            None => self.engine.compute_twap_with_pending(interval, now, pending),
        }
    }

    /// Capture the persisted state.
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            engine: self.engine.clone(),
            cached: self.cached,
        }
    }

    /// Rebuild a cache from a snapshot, validating the observation ring.
    ///
    /// # Errors
    ///
    /// - [`OracleError::CorruptSnapshot`](crate::OracleError::CorruptSnapshot)
    ///   if the ring violates its invariants or the cache slot predates the
    ///   latest observation
    pub fn restore(snapshot: CacheSnapshot) -> Result<Self> {
        snapshot.engine.buffer().validate()?;
        if let Some(slot) = snapshot.cached {
            match snapshot.engine.latest() {
                Ok(latest) if slot.timestamp >= latest.timestamp => {}
                Ok(latest) => {
                    return Err(OracleError::CorruptSnapshot(format!(
                        "cached twap at {} predates latest observation at {}",
                        slot.timestamp, latest.timestamp
                    )));
                }
                Err(_) => {
                    return Err(OracleError::CorruptSnapshot(
                        "cached twap without observations".to_string(),
                    ));
                }
            }
        }
        Ok(Self {
            engine: snapshot.engine,
            cached: snapshot.cached,
            computations: 0,
        })
    }

    fn lookup(&self, interval: u64, now: u64) -> Option<Price> {
        self.cached
            .filter(|slot| slot.timestamp == now && slot.interval == interval)
            .map(|slot| slot.twap)
    }
}
