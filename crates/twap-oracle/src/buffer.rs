//! Fixed-capacity circular buffer of price observations.
//!
//! The buffer is preallocated at construction and never grows. The first
//! write lands in slot 0; every later write advances the cursor modulo the
//! capacity and overwrites that slot, silently evicting the oldest
//! observation once the ring is full.
//!
//! Each [`Observation`] carries the cumulative price up to its own timestamp:
//!
//! ```text
//! cumulative(n) = cumulative(n-1) + price(n-1) * (timestamp(n) - timestamp(n-1))
//! ```
//!
//! so the average between two retained timestamps is
//! `(cumulative(t2) - cumulative(t1)) / (t2 - t1)`.

use serde::{Deserialize, Serialize};

use crate::fixed_point::Price;
use crate::{OracleError, Result};

/// Zero-based sequence number of an appended observation.
pub type ObservationId = u64;

/// An unrecorded `(price, timestamp)` sample as produced by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Sampled price.
    pub price: Price,
    /// Sample time in seconds.
    pub timestamp: u64,
}

impl Sample {
    /// Create a sample.
    pub fn new(price: Price, timestamp: u64) -> Self {
        Self { price, timestamp }
    }
}

/// One recorded sample with its cumulative price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Price in effect from `timestamp` until the next observation.
    pub price: Price,
    /// Observation time in seconds.
    pub timestamp: u64,
    /// Sum of `price * elapsed` over all earlier observations (raw 18-decimal units).
    pub cumulative_price: u128,
}

impl Observation {
    /// Cumulative price extended forward to `timestamp`, holding `self.price`
    /// constant from `self.timestamp`.
    ///
    /// Timestamps earlier than `self.timestamp` are treated as `self.timestamp`.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Overflow`] if the cumulative exceeds `u128`
    pub fn cumulative_at(&self, timestamp: u64) -> Result<u128> {
        let elapsed = timestamp.saturating_sub(self.timestamp);
        self.cumulative_price
            .checked_add(self.price.mul_duration(elapsed)?)
            .ok_or(OracleError::Overflow)
    }

    /// The observation that would follow `self` if `sample` were recorded next.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NonMonotonicTimestamp`] if `sample` is not strictly newer
    /// - [`OracleError::Overflow`] if the cumulative exceeds `u128`
    pub fn successor(&self, sample: Sample) -> Result<Observation> {
        if sample.timestamp <= self.timestamp {
            return Err(OracleError::NonMonotonicTimestamp {
                new: sample.timestamp,
                last: self.timestamp,
            });
        }
        Ok(Observation {
            price: sample.price,
            timestamp: sample.timestamp,
            cumulative_price: self.cumulative_at(sample.timestamp)?,
        })
    }
}

/// Result of a backward search through the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The most recent observation at or before the target.
    Found {
        /// The matching observation.
        observation: Observation,
        /// Whether `observation.timestamp` equals the target exactly.
        exact: bool,
    },
    /// Every retained observation is newer than the target.
    Exhausted {
        /// The oldest observation still in the ring.
        oldest: Observation,
    },
}

/// A ring of [`Observation`]s with a fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationBuffer {
    /// Preallocated slots; unwritten slots are all-zero.
    slots: Box<[Observation]>,
    /// Slot holding the most recent observation (0 before any write).
    current_index: usize,
    /// Number of written slots, saturating at capacity.
    len: usize,
    /// Total appends over the buffer's lifetime.
    total_appended: u64,
}

impl ObservationBuffer {
    /// Create an empty buffer with `capacity` slots.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidCapacity`] if `capacity` is zero
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(OracleError::InvalidCapacity(capacity));
        }
        Ok(Self {
            slots: vec![Observation::default(); capacity].into_boxed_slice(),
            current_index: 0,
            len: 0,
            total_appended: 0,
        })
    }

    /// Number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot index of the most recent observation.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Number of observations currently retained.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has ever been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of appends since creation, including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    /// Raw slot access, in storage order rather than time order.
    pub fn slot(&self, index: usize) -> Option<&Observation> {
        self.slots.get(index)
    }

    /// Append a new observation.
    ///
    /// The cumulative price is extended from the previous latest observation
    /// using that observation's price over the gap.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NonMonotonicTimestamp`] if `timestamp` does not strictly
    ///   exceed the latest recorded timestamp
    /// - [`OracleError::Overflow`] if the cumulative price exceeds `u128`
    pub fn append(&mut self, price: Price, timestamp: u64) -> Result<ObservationId> {
        let sample = Sample::new(price, timestamp);

        if self.is_empty() {
            self.slots[0] = Observation {
                price,
                timestamp,
                cumulative_price: 0,
            };
            self.current_index = 0;
        } else {
            let next = self.slots[self.current_index].successor(sample)?;
            self.current_index = (self.current_index + 1) % self.capacity();
            self.slots[self.current_index] = next;
        }

        self.len = (self.len + 1).min(self.capacity());
        let id = self.total_appended;
        self.total_appended += 1;
        Ok(id)
    }

    /// The most recent observation.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoData`] if nothing has been written
    pub fn latest(&self) -> Result<Observation> {
        if self.is_empty() {
            return Err(OracleError::NoData);
        }
        Ok(self.slots[self.current_index])
    }

    /// The oldest observation still retained.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoData`] if nothing has been written
    pub fn oldest(&self) -> Result<Observation> {
        if self.is_empty() {
            return Err(OracleError::NoData);
        }
        Ok(self.slots[self.oldest_index()])
    }

    /// Seconds between the oldest and the latest retained observation.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoData`] if nothing has been written
    pub fn retained_span(&self) -> Result<u64> {
        Ok(self.latest()?.timestamp - self.oldest()?.timestamp)
    }

    /// Walk backward from the latest observation to the most recent one with
    /// `timestamp <= target`.
    ///
    /// At most [`len`](Self::len) probes, never more than the capacity.
    ///
    /// # Errors
    ///
    /// - [`OracleError::NoData`] if nothing has been written
    pub fn find_at_or_before(&self, target: u64) -> Result<Lookup> {
        if self.is_empty() {
            return Err(OracleError::NoData);
        }

        let capacity = self.capacity();
        let mut index = self.current_index;
        for _ in 0..self.len {
            let observation = self.slots[index];
            if observation.timestamp <= target {
                return Ok(Lookup::Found {
                    observation,
                    exact: observation.timestamp == target,
                });
            }
            index = (index + capacity - 1) % capacity;
        }

        Ok(Lookup::Exhausted {
            oldest: self.slots[self.oldest_index()],
        })
    }

    /// Retained observations in recording order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Observation> + '_ {
        let start = self.oldest_index();
        let capacity = self.capacity();
        (0..self.len).map(move |offset| &self.slots[(start + offset) % capacity])
    }

    /// Check the structural invariants of a deserialized buffer.
    ///
    /// # Errors
    ///
    /// - [`OracleError::CorruptSnapshot`] describing the first violation
    pub fn validate(&self) -> Result<()> {
        let corrupt = |msg: String| Err(OracleError::CorruptSnapshot(msg));
        let capacity = self.capacity();

        if capacity == 0 {
            return corrupt("zero capacity".to_string());
        }
        if self.current_index >= capacity {
            return corrupt(format!(
                "cursor {} outside capacity {capacity}",
                self.current_index
            ));
        }
        if self.len > capacity {
            return corrupt(format!("length {} above capacity {capacity}", self.len));
        }
        if self.len < capacity && self.len > 0 && self.current_index != self.len - 1 {
            return corrupt(format!(
                "cursor {} inconsistent with length {}",
                self.current_index, self.len
            ));
        }
        if (self.len as u64) > self.total_appended {
            return corrupt(format!(
                "length {} above total appends {}",
                self.len, self.total_appended
            ));
        }

        let retained: Vec<&Observation> = self.iter().collect();
        for pair in retained.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if next.timestamp <= prev.timestamp {
                return corrupt(format!(
                    "timestamps not increasing: {} then {}",
                    prev.timestamp, next.timestamp
                ));
            }
            if prev.cumulative_at(next.timestamp).ok() != Some(next.cumulative_price) {
                return corrupt(format!(
                    "cumulative price inconsistent at timestamp {}",
                    next.timestamp
                ));
            }
        }
        Ok(())
    }

    fn oldest_index(&self) -> usize {
        if self.len < self.capacity() {
            0
        } else {
            (self.current_index + 1) % self.capacity()
        }
    }
}
