//! Fixed-point price representation.
//!
//! A [`Price`] is an unsigned value with [`DECIMALS`] decimal places stored as
//! a raw `u128`, so `1.0` is `10^18`. There is no floating point anywhere in
//! the engine; products of price and elapsed seconds are checked and division
//! truncates toward zero.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{OracleError, Result};

/// Number of decimal places carried by [`Price`].
pub const DECIMALS: u8 = 18;

/// Raw value of one whole unit (`10^18`).
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// An 18-decimal unsigned fixed-point price.
///
/// Serializes as a decimal string (`"405.25"`) so snapshots and config stay
/// exact in formats without 128-bit integers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Price(u128);

impl Price {
    /// The zero price.
    pub const ZERO: Price = Price(0);

    /// Wrap a raw 18-decimal value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Return the raw 18-decimal value.
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Build a price from a whole number of units.
    pub fn from_integer(units: u64) -> Self {
        // u64::MAX * 10^18 < 2^124, cannot overflow
        Self(u128::from(units) * SCALE)
    }

    /// Whether the price is exactly zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Convert a raw value expressed with `decimals` places into a [`Price`].
    ///
    /// Scaling up is checked; scaling down truncates.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Overflow`] if the rescaled value does not fit
    pub fn from_scaled(value: u128, decimals: u8) -> Result<Self> {
        if decimals <= DECIMALS {
            let factor = pow10(DECIMALS - decimals)?;
            value
                .checked_mul(factor)
                .map(Self)
                .ok_or(OracleError::Overflow)
        } else {
            let factor = pow10(decimals - DECIMALS)?;
            Ok(Self(value / factor))
        }
    }

    /// Price multiplied by a duration in seconds, as a raw cumulative amount.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Overflow`] if the product exceeds `u128`
    pub fn mul_duration(self, seconds: u64) -> Result<u128> {
        self.0
            .checked_mul(u128::from(seconds))
            .ok_or(OracleError::Overflow)
    }

    /// Average price implied by a cumulative delta over `elapsed` seconds.
    ///
    /// Returns `None` when `elapsed` is zero.
    pub fn from_cumulative_delta(delta: u128, elapsed: u64) -> Option<Self> {
        if elapsed == 0 {
            return None;
        }
        Some(Self(delta / u128::from(elapsed)))
    }
}

fn pow10(exp: u8) -> Result<u128> {
    10u128
        .checked_pow(u32::from(exp))
        .ok_or(OracleError::Overflow)
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:018}");
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Price {
    type Err = OracleError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || OracleError::InvalidPrice(s.to_string());
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > usize::from(DECIMALS) {
            return Err(invalid());
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(invalid());
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac_raw: u128 = if frac.is_empty() {
            0
        } else {
            // Right-pad to 18 digits: "25" -> 250000000000000000
            let padded = format!("{frac:0<18}");
            padded.parse().map_err(|_| invalid())?
        };

        whole
            .checked_mul(SCALE)
            .and_then(|w| w.checked_add(frac_raw))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for Price {
    type Error = OracleError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Price> for String {
    fn from(price: Price) -> Self {
        price.to_string()
    }
}
