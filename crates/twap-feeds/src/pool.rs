//! Concentrated-liquidity pool source.
//!
//! The pool keeps its own tick-cumulative history, so this adapter never
//! records into the TWAP engine. Short intervals read the pool's spot
//! square-root price; longer ones take the arithmetic mean tick over the
//! window (a geometric mean price) and convert it.

use ethnum::U256;
use tracing::debug;

use twap_oracle::Price;

use crate::tick_math::{price_at_tick, price_from_sqrt_x96};
use crate::{FeedError, PriceSource, Result, UpdateOutcome};

/// Intervals below this many seconds return the spot price.
pub const SPOT_INTERVAL_THRESHOLD: u64 = 10;

/// Read access to a pool's price oracle.
pub trait PoolOracle: Send {
    /// Current Q64.96 square-root price.
    ///
    /// # Errors
    ///
    /// [`FeedError::Upstream`] when the pool cannot be read.
    fn sqrt_price_x96(&self) -> Result<U256>;

    /// Tick cumulatives at each of `seconds_ago`, in the same order.
    ///
    /// # Errors
    ///
    /// [`FeedError::Upstream`] when the pool cannot be read or lacks history.
    fn observe(&self, seconds_ago: &[u32]) -> Result<Vec<i64>>;
}

/// A price feed reading a pool's built-in tick oracle.
#[derive(Debug)]
pub struct PoolTickFeed<O> {
    name: String,
    pool: O,
}

impl<O: PoolOracle> PoolTickFeed<O> {
    /// Create a feed over `pool`.
    pub fn new(name: impl Into<String>, pool: O) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &O {
        &self.pool
    }

    /// Time-weighted price over the last `interval` seconds.
    ///
    /// # Errors
    ///
    /// - [`FeedError::IntervalOutOfRange`] if `interval` does not fit `u32`
    /// - [`FeedError::TickOutOfRange`] if the mean tick is not a valid tick
    /// - upstream or conversion errors
    pub fn price(&self, interval: u64) -> Result<Price> {
        if interval < SPOT_INTERVAL_THRESHOLD {
            return price_from_sqrt_x96(self.pool.sqrt_price_x96()?);
        }
        let seconds_ago =
            u32::try_from(interval).map_err(|_| FeedError::IntervalOutOfRange(interval))?;

        let cumulatives = self.pool.observe(&[seconds_ago, 0])?;
        let [start, end] = cumulatives.as_slice() else {
            return Err(FeedError::Upstream(format!(
                "expected 2 tick cumulatives, got {}",
                cumulatives.len()
            )));
        };

        let tick = mean_tick(*start, *end, seconds_ago)?;
        debug!(feed = %self.name, interval, tick, "mean tick");
        price_at_tick(tick)
    }
}

/// Mean tick over `elapsed` seconds, rounded toward negative infinity.
fn mean_tick(start: i64, end: i64, elapsed: u32) -> Result<i32> {
    let delta = i128::from(end) - i128::from(start);
    let tick = delta.div_euclid(i128::from(elapsed));
    i32::try_from(tick).map_err(|_| FeedError::TickOutOfRange(tick))
}

impl<O: PoolOracle> PriceSource for PoolTickFeed<O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, _now: u64) -> Result<UpdateOutcome> {
        Ok(UpdateOutcome::Skipped)
    }

    fn get_price(&mut self, interval: u64, _now: u64) -> Result<Price> {
        self.price(interval)
    }
}
