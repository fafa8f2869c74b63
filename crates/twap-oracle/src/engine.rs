//! TWAP (Time-Weighted Average Price) query engine.
//!
//! Answers "what was the average price over the last `interval` seconds as of
//! `now`?" from the observations retained in an [`ObservationBuffer`]:
//!
//! ```text
//! TWAP = (cumulative(now) - cumulative(now - interval)) / interval
//! ```
//!
//! Both cumulative values are interpolated by holding each observation's
//! price constant until the next one, the same rule the buffer uses when it
//! accumulates. Requests that reach past the retained history are handled by
//! the engine's [`HistoryPolicy`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::buffer::{Lookup, Observation, ObservationBuffer, ObservationId, Sample};
use crate::fixed_point::Price;
use crate::{OracleError, Result};

/// What to do when the requested window starts before the oldest retained
/// observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryPolicy {
    /// Narrow the window to start at the oldest retained observation.
    #[default]
    Clamp,
    /// Fail with [`OracleError::IntervalExceedsHistory`].
    Reject,
}

/// TWAP engine over a fixed-capacity observation ring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapEngine {
    buffer: ObservationBuffer,
    #[serde(default)]
    policy: HistoryPolicy,
}

impl TwapEngine {
    /// Create an engine with the default [`HistoryPolicy::Clamp`].
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidCapacity`] if `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_policy(capacity, HistoryPolicy::default())
    }

    /// Create an engine with an explicit history policy.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidCapacity`] if `capacity` is zero
    pub fn with_policy(capacity: usize, policy: HistoryPolicy) -> Result<Self> {
        Ok(Self {
            buffer: ObservationBuffer::with_capacity(capacity)?,
            policy,
        })
    }

    /// The underlying observation ring.
    pub fn buffer(&self) -> &ObservationBuffer {
        &self.buffer
    }

    /// The configured history policy.
    pub fn policy(&self) -> HistoryPolicy {
        self.policy
    }

    /// Replace the history policy. Retained observations are unaffected.
    pub fn set_policy(&mut self, policy: HistoryPolicy) {
        self.policy = policy;
    }

    /// Record a new sample. This is the only way data enters the engine.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NonMonotonicTimestamp`] if `timestamp` is not newer
    ///   than the latest observation
    /// - [`OracleError::Overflow`] if the cumulative price exceeds `u128`
    pub fn record_observation(&mut self, price: Price, timestamp: u64) -> Result<ObservationId> {
        let id = self.buffer.append(price, timestamp)?;
        debug!(
            id,
            %price,
            timestamp,
            index = self.buffer.current_index(),
            "observation recorded"
        );
        Ok(id)
    }

    /// The most recent observation.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoData`] if nothing has been recorded
    pub fn latest(&self) -> Result<Observation> {
        self.buffer.latest()
    }

    /// Average price over `[now - interval, now]`.
    ///
    /// An `interval` of zero returns the spot price. If even the latest
    /// observation predates the window start, the latest price is returned
    /// instead of extrapolating.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoData`] if nothing has been recorded
    /// - [`OracleError::ClockBehindLatest`] if `now` precedes the latest observation
    /// - [`OracleError::IntervalExceedsHistory`] under [`HistoryPolicy::Reject`]
    /// - [`OracleError::Overflow`] on cumulative overflow
    ///
    /// # Examples
    ///
    /// ```
    /// use twap_oracle::{Price, TwapEngine};
    ///
    /// let mut engine = TwapEngine::new(3).unwrap();
    /// engine.record_observation(Price::from_integer(400), 1_000).unwrap();
    /// engine.record_observation(Price::from_integer(405), 1_015).unwrap();
    /// engine.record_observation(Price::from_integer(410), 1_030).unwrap();
    ///
    /// let twap = engine.compute_twap(45, 1_045).unwrap();
    /// assert_eq!(twap, Price::from_integer(405));
    /// ```
    pub fn compute_twap(&self, interval: u64, now: u64) -> Result<Price> {
        self.compute(interval, now, None)
    }

    /// Like [`compute_twap`](Self::compute_twap), treating `pending` as an
    /// extra observation recorded after the latest one.
    ///
    /// Adapters use this to include an upstream sample that is newer than
    /// anything recorded without committing it to the ring. A `pending`
    /// sample that is not strictly newer than the latest observation is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Same as [`compute_twap`](Self::compute_twap).
    pub fn compute_twap_with_pending(
        &self,
        interval: u64,
        now: u64,
        pending: Option<Sample>,
    ) -> Result<Price> {
        self.compute(interval, now, pending)
    }

    fn compute(&self, interval: u64, now: u64, pending: Option<Sample>) -> Result<Price> {
        let recorded = self.buffer.latest()?;
        let latest = match pending {
            Some(sample) if sample.timestamp > recorded.timestamp => recorded.successor(sample)?,
            _ => recorded,
        };

        if interval == 0 {
            return Ok(latest.price);
        }
        if now < latest.timestamp {
            return Err(OracleError::ClockBehindLatest {
                now,
                latest: latest.timestamp,
            });
        }

        let target = now.saturating_sub(interval);
        if latest.timestamp <= target {
            // The feed has nothing newer than the window start
            return Ok(latest.price);
        }

        // A virtual latest never needs to be searched: if it were at or
        // before `target` we would have returned above.
        let (start_cumulative, start_timestamp) = match self.buffer.find_at_or_before(target)? {
            Lookup::Found { observation, .. } => (observation.cumulative_at(target)?, target),
            Lookup::Exhausted { oldest } => match self.policy {
                HistoryPolicy::Clamp => {
                    debug!(
                        interval,
                        now,
                        oldest = oldest.timestamp,
                        "window clamped to retained history"
                    );
                    (oldest.cumulative_price, oldest.timestamp)
                }
                HistoryPolicy::Reject => {
                    return Err(OracleError::IntervalExceedsHistory {
                        requested: interval,
                        available: now - oldest.timestamp,
                    });
                }
            },
        };

        let end_cumulative = latest.cumulative_at(now)?;
        let delta = end_cumulative
            .checked_sub(start_cumulative)
            .ok_or(OracleError::Overflow)?;

        // Zero-width window: the only retained sample sits exactly at `now`
        Ok(Price::from_cumulative_delta(delta, now - start_timestamp).unwrap_or(latest.price))
    }
}
