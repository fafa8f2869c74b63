//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::cache::TwapCache;
use crate::engine::{HistoryPolicy, TwapEngine};
use crate::{OracleError, Result};

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// Settings fixed for the life of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of observations retained before the oldest is evicted.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Behaviour for windows longer than the retained history.
    #[serde(default)]
    pub history_policy: HistoryPolicy,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            history_policy: HistoryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Check the configuration before building an engine.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidCapacity`] if `capacity` is zero
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(OracleError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }

    /// Build an engine from this configuration.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidCapacity`] if `capacity` is zero
    pub fn build_engine(&self) -> Result<TwapEngine> {
        self.validate()?;
        TwapEngine::with_policy(self.capacity, self.history_policy)
    }

    /// Build an engine wrapped in an empty [`TwapCache`].
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidCapacity`] if `capacity` is zero
    pub fn build_cache(&self) -> Result<TwapCache> {
        Ok(TwapCache::new(self.build_engine()?))
    }
}
