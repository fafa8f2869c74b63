//! # twap-oracle
//!
//! Time-weighted average price (TWAP) accumulator and query engine.
//!
//! Upstream adapters push `(price, timestamp)` samples into a fixed-capacity
//! ring of observations. Each observation carries a running cumulative price
//! so the average over any retained window is a subtraction and a division.
//! A single-slot cache memoizes the most recent query per instant.
//!
//! ## Modules
//!
//! - [`fixed_point`]: 18-decimal fixed-point [`Price`](fixed_point::Price)
//! - [`buffer`]: circular observation buffer
//! - [`engine`]: interval lookup and interpolation
//! - [`cache`]: memoized TWAP results and state snapshots
//! - [`clock`]: injectable time sources
//! - [`feed`]: lock-guarded feed for concurrent callers
//! - [`config`]: serde-backed engine configuration

pub mod buffer;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod feed;
pub mod fixed_point;

pub use buffer::{Lookup, Observation, ObservationBuffer, ObservationId, Sample};
pub use cache::{CacheSnapshot, CachedTwap, TwapCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{HistoryPolicy, TwapEngine};
pub use feed::{FeedStatus, TwapFeed};
pub use fixed_point::Price;

/// Error types for oracle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// No observation has ever been recorded.
    #[error("no observations recorded")]
    NoData,

    /// Observation timestamp is not strictly greater than the latest one.
    #[error("non-monotonic timestamp: {new} <= {last}")]
    NonMonotonicTimestamp {
        /// The new timestamp that violated monotonicity.
        new: u64,
        /// The latest accepted timestamp.
        last: u64,
    },

    /// The requested interval reaches past the oldest retained observation.
    ///
    /// Only returned under [`HistoryPolicy::Reject`].
    #[error("interval {requested}s exceeds retained history of {available}s")]
    IntervalExceedsHistory {
        /// Interval asked for, in seconds.
        requested: u64,
        /// Span from the oldest retained observation to `now`, in seconds.
        available: u64,
    },

    /// The caller's clock is behind the latest recorded observation.
    #[error("query time {now} precedes latest observation at {latest}")]
    ClockBehindLatest {
        /// The query time supplied by the caller.
        now: u64,
        /// Timestamp of the latest observation.
        latest: u64,
    },

    /// Fixed-point arithmetic exceeded the `u128` range.
    #[error("fixed-point arithmetic overflow")]
    Overflow,

    /// The observation buffer cannot have zero capacity.
    #[error("invalid buffer capacity: {0}")]
    InvalidCapacity(usize),

    /// A price string could not be parsed.
    #[error("invalid price: {0}")]
    InvalidPrice(String),

    /// A persisted snapshot failed validation.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// A thread panicked while holding the feed lock.
    #[error("feed lock poisoned")]
    LockPoisoned,
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
