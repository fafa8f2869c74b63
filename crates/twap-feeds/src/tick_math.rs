//! Tick and Q64.96 square-root price conversions for concentrated-liquidity pools.
//!
//! A tick `t` denotes the price `1.0001^t`. Pools report prices as
//! `sqrt(price) * 2^96`; everything here is integer arithmetic so results
//! match the pool's own math bit for bit.

use ethnum::U256;
use twap_oracle::fixed_point::SCALE;
use twap_oracle::{OracleError, Price};

use crate::{FeedError, Result};

/// Lowest tick a pool can report.
pub const MIN_TICK: i32 = -887_272;

/// Highest tick a pool can report.
pub const MAX_TICK: i32 = 887_272;

const Q96_MASK: U256 = U256::new((1u128 << 96) - 1);

/// `2^128 / sqrt(1.0001^(2^i))` for bits 1..=19 of the absolute tick.
const RATIO_FACTORS: [u128; 19] = [
    0xfff97272373d413259a46990580e213a,
    0xfff2e50f5f656932ef12357cf3c7fdcc,
    0xffe5caca7e10e4e61c3624eaa0941cd0,
    0xffcb9843d60f6159c9db58835c926644,
    0xff973b41fa98c081472e6896dfb254c0,
    0xff2ea16466c96a3843ec78b326b52861,
    0xfe5dee046a99a2a811c461f1969c3053,
    0xfcbe86c7900a88aedcffc83b479aa3a4,
    0xf987a7253ac413176f2b074cf7815e54,
    0xf3392b0822b70005940c7a398e4b70f3,
    0xe7159475a2c29b7443b29c7fa6e889d9,
    0xd097f3bdfd2022b8845ad8f792aa5825,
    0xa9f746462d870fdf8a65dc1f90e061e5,
    0x70d869a156d2a1b890bb3df62baf32f7,
    0x31be135f97d08fd981231505542fcfa6,
    0x9aa508b5b7a84e1c677de54f3e99bc9,
    0x5d6af8dedb81196699c329225ee604,
    0x2216e584f5fa1ea926041bedfe98,
    0x48a170391f7dc42444e8fa2,
];

/// Factor for bit 0 of the absolute tick.
const RATIO_BIT0: u128 = 0xfffcb933bd6fad37aa2d162d1a594001;

/// `sqrt(1.0001^tick) * 2^96`, rounded up.
///
/// # Errors
///
/// - [`FeedError::TickOutOfRange`] if `tick` is outside `MIN_TICK..=MAX_TICK`
pub fn sqrt_ratio_at_tick(tick: i32) -> Result<U256> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(FeedError::TickOutOfRange(i128::from(tick)));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 1 != 0 {
        U256::new(RATIO_BIT0)
    } else {
        U256::from_words(1, 0)
    };
    for (bit, factor) in RATIO_FACTORS.iter().enumerate() {
        if abs_tick & (2 << bit) != 0 {
            ratio = (ratio * U256::new(*factor)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 down to Q64.96, rounding up
    let round_up = if ratio & U256::new(u128::from(u32::MAX)) == U256::ZERO {
        U256::ZERO
    } else {
        U256::ONE
    };
    Ok((ratio >> 32) + round_up)
}

/// 18-decimal price from a Q64.96 square-root price.
///
/// Computes `sqrt_price_x96^2 * 10^18 / 2^192` exactly, splitting each
/// product so no intermediate exceeds 256 bits.
///
/// # Errors
///
/// - [`FeedError::SqrtPriceOutOfRange`] if the input needs more than 160 bits
/// - [`FeedError::Oracle`] wrapping [`OracleError::Overflow`] if the price
///   does not fit a [`Price`]
pub fn price_from_sqrt_x96(sqrt_price_x96: U256) -> Result<Price> {
    if sqrt_price_x96 >> 160 != U256::ZERO {
        return Err(FeedError::SqrtPriceOutOfRange(sqrt_price_x96.to_string()));
    }
    let price_x96 = mul_shift_96(sqrt_price_x96, sqrt_price_x96);
    let scaled = mul_shift_96(price_x96, U256::new(SCALE));

    let (high, low) = scaled.into_words();
    if high != 0 {
        return Err(OracleError::Overflow.into());
    }
    Ok(Price::from_raw(low))
}

/// 18-decimal price for a tick.
///
/// # Errors
///
/// Same as [`sqrt_ratio_at_tick`] and [`price_from_sqrt_x96`].
pub fn price_at_tick(tick: i32) -> Result<Price> {
    price_from_sqrt_x96(sqrt_ratio_at_tick(tick)?)
}

/// `floor(a * b / 2^96)` for `a < 2^224` and `b < 2^160`.
fn mul_shift_96(a: U256, b: U256) -> U256 {
    (a >> 96) * b + (((a & Q96_MASK) * b) >> 96)
}
