//! # twap-feeds
//!
//! Price-source adapters that feed the [`twap_oracle`] engine.
//!
//! Each adapter wraps an upstream behind a small trait so the fetching side
//! can be a network client, a file, or a test double. The adapter applies
//! its own validity checks (sign, completeness, duplicate timestamps,
//! staleness) before anything reaches the engine.
//!
//! ## Modules
//!
//! - [`reference`]: generic reference-rate source
//! - [`round`]: round-based aggregator source
//! - [`pool`]: concentrated-liquidity pool tick source
//! - [`tick_math`]: Q64.96 tick to price conversion
//! - [`circuit_breaker`]: staleness detection and emergency pause
//! - [`updater`]: batch updates across many feeds

use twap_oracle::{CacheSnapshot, ObservationId, OracleError, Price, Sample};

pub mod circuit_breaker;
pub mod pool;
pub mod reference;
pub mod round;
pub mod tick_math;
pub mod updater;

pub use circuit_breaker::CircuitBreaker;
pub use pool::{PoolOracle, PoolTickFeed};
pub use reference::{ReferenceData, ReferenceProvider, ReferenceRateFeed};
pub use round::{compute_round_id, Aggregator, RoundAggregatorFeed, RoundData};
pub use updater::{FeedUpdater, UpdateReport};

/// Error types for price-source adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The engine rejected the operation.
    #[error(transparent)]
    Oracle(#[from] OracleError),

    /// Upstream reported a zero or negative price.
    #[error("invalid upstream price: {0}")]
    InvalidPrice(i128),

    /// Upstream round has not been completed (`updated_at == 0`).
    #[error("round {round_id} is incomplete")]
    IncompleteRound {
        /// The incomplete round.
        round_id: u128,
    },

    /// Upstream has no data newer than the latest recorded sample.
    #[error("upstream not updated since {timestamp}")]
    NotUpdated {
        /// Timestamp of the latest recorded sample.
        timestamp: u64,
    },

    /// A tick outside the representable range.
    #[error("tick {0} is outside the supported range")]
    TickOutOfRange(i128),

    /// A Q64.96 square-root price outside the representable range.
    #[error("sqrt price {0} is outside the supported range")]
    SqrtPriceOutOfRange(String),

    /// The requested interval cannot be expressed to the upstream.
    #[error("interval {0}s is out of range for this source")]
    IntervalOutOfRange(u64),

    /// The feed is paused via the circuit breaker.
    #[error("feed is paused")]
    Paused,

    /// Feed data is stale beyond the staleness threshold.
    #[error("feed data is stale: last update {last_update}, current {current}, threshold {threshold}")]
    StaleData {
        /// Timestamp of the last update.
        last_update: u64,
        /// Current timestamp.
        current: u64,
        /// Staleness threshold in seconds.
        threshold: u64,
    },

    /// The upstream could not be read.
    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Convenience result type for adapter operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// What an [`update`](PriceSource::update) call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new observation was recorded.
    Recorded {
        /// Sequence number assigned by the engine.
        id: ObservationId,
        /// The recorded sample.
        sample: Sample,
    },
    /// The source keeps its own history; nothing was recorded.
    Skipped,
}

/// A price feed driven by an upstream source.
pub trait PriceSource: Send {
    /// Feed name used in logs and reports.
    fn name(&self) -> &str;

    /// Decimal places of returned prices.
    fn decimals(&self) -> u8 {
        twap_oracle::fixed_point::DECIMALS
    }

    /// Pull the latest upstream sample and record it.
    ///
    /// # Errors
    ///
    /// Adapter-specific validation failures or engine rejections.
    fn update(&mut self, now: u64) -> Result<UpdateOutcome>;

    /// TWAP over the last `interval` seconds as of `now`.
    ///
    /// May populate the feed's cache.
    ///
    /// # Errors
    ///
    /// Adapter-specific failures or engine errors.
    fn get_price(&mut self, interval: u64, now: u64) -> Result<Price>;

    /// Persistable engine state, for sources that keep one.
    fn snapshot(&self) -> Option<CacheSnapshot> {
        None
    }
}
