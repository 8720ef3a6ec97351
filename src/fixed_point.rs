///! Fixed-point integer arithmetic: Q64.96 sqrt-prices, Q128.128 fee-growth
///! counters, and the `mulDiv` primitives both are built from.
///!
///! Growth counters are intentionally modulo 2^256 (see `wrapping_add` /
///! `wrapping_sub`); liquidity deltas use checked arithmetic and fail loudly.
use uint::construct_uint;

use crate::error::EngineError;

construct_uint! {
    pub struct U256(4);
}

construct_uint! {
    pub struct U512(8);
}

/// Q64.96 fixed point resolution used for `sqrtPriceX96`.
pub const RESOLUTION_96: u8 = 96;
pub const Q96: U256 = U256([0, 0x1_0000_0000, 0, 0]);

/// Q128.128 fee-growth resolution.
pub const Q128: U256 = U256([0, 0, 1, 0]);

fn widen(x: U256) -> U512 {
    let mut limbs = [0u64; 8];
    limbs[..4].copy_from_slice(&x.0);
    U512(limbs)
}

fn narrow(x: U512) -> Option<U256> {
    if x.0[4..].iter().any(|&limb| limb != 0) {
        None
    } else {
        let mut limbs = [0u64; 4];
        limbs.copy_from_slice(&x.0[..4]);
        Some(U256(limbs))
    }
}

/// `floor(a * b / denom)`, computed with a full 512-bit intermediate product
/// so that the only failure mode is an out-of-range quotient or a zero
/// denominator.
pub fn mul_div(a: U256, b: U256, denom: U256) -> Result<U256, EngineError> {
    if denom.is_zero() {
        return Err(EngineError::Overflow);
    }
    let product = widen(a) * widen(b);
    let denom = widen(denom);
    narrow(product / denom).ok_or(EngineError::Overflow)
}

/// `ceil(a * b / denom)`.
pub fn mul_div_rounding_up(a: U256, b: U256, denom: U256) -> Result<U256, EngineError> {
    let result = mul_div(a, b, denom)?;
    let remainder = (widen(a) * widen(b)) % widen(denom);
    if remainder.is_zero() {
        Ok(result)
    } else {
        result.checked_add(U256::one()).ok_or(EngineError::Overflow)
    }
}

/// Wrapping addition for Q128.128 growth counters — these are allowed, by
/// design, to overflow modulo 2^256. Never use this for liquidity.
pub fn wrapping_add(a: U256, b: U256) -> U256 {
    a.overflowing_add(b).0
}

/// Wrapping subtraction for Q128.128 growth counters.
pub fn wrapping_sub(a: U256, b: U256) -> U256 {
    a.overflowing_sub(b).0
}

/// `addDelta`: apply a signed liquidity delta to an unsigned liquidity
/// amount, failing with `LS`/`LA` on under/overflow rather than wrapping.
pub fn add_delta(x: u128, delta: i128) -> Result<u128, EngineError> {
    if delta < 0 {
        x.checked_sub(delta.unsigned_abs()).ok_or(EngineError::LiquiditySub)
    } else {
        x.checked_add(delta as u128).ok_or(EngineError::LiquidityAdd)
    }
}

/// Minimal signed 256-bit wrapper over [`U256`], used only by `tick_math`'s
/// `log2`-based inverse. Addition, subtraction and multiplication reuse the
/// unsigned wrapping ops directly: two's-complement arithmetic on a fixed
/// width is bit-identical whether the operands are read as signed or
/// unsigned. Only shifting and comparison need the sign bit.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct I256(pub U256);

impl I256 {
    pub const ZERO: I256 = I256(U256([0, 0, 0, 0]));

    pub fn from_i128(v: i128) -> Self {
        if v >= 0 {
            I256(U256::from(v as u128))
        } else {
            let magnitude = U256::from(v.unsigned_abs());
            I256(U256::zero().overflowing_sub(magnitude).0)
        }
    }

    pub fn from_u256(v: U256) -> Self {
        I256(v)
    }

    pub fn is_negative(self) -> bool {
        (self.0 >> 255) & U256::one() == U256::one()
    }

    pub fn wrapping_add(self, other: Self) -> Self {
        I256(self.0.overflowing_add(other.0).0)
    }

    pub fn wrapping_sub(self, other: Self) -> Self {
        I256(self.0.overflowing_sub(other.0).0)
    }

    pub fn wrapping_mul(self, other: Self) -> Self {
        I256(self.0.overflowing_mul(other.0).0)
    }

    pub fn shl(self, n: u32) -> Self {
        I256(self.0 << n as usize)
    }

    /// Arithmetic (sign-extending) right shift.
    pub fn sar(self, n: u32) -> Self {
        if self.is_negative() {
            I256(!((!self.0) >> n as usize))
        } else {
            I256(self.0 >> n as usize)
        }
    }

    pub fn bitor(self, other: Self) -> Self {
        I256(self.0 | other.0)
    }

    /// Truncates to the low 32 bits, reinterpreted as a signed `i32` (the
    /// two's-complement bit pattern is preserved across the cast).
    pub fn low_i32(self) -> i32 {
        self.0.low_u32() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_exact() {
        assert_eq!(mul_div(U256::from(10u64), U256::from(3u64), U256::from(2u64)).unwrap(), U256::from(15u64));
    }

    #[test]
    fn mul_div_floors() {
        assert_eq!(mul_div(U256::from(10u64), U256::from(3u64), U256::from(4u64)).unwrap(), U256::from(7u64));
    }

    #[test]
    fn mul_div_rounding_up_ceils() {
        assert_eq!(mul_div_rounding_up(U256::from(10u64), U256::from(3u64), U256::from(4u64)).unwrap(), U256::from(8u64));
    }

    #[test]
    fn mul_div_rejects_zero_denominator() {
        assert!(mul_div(U256::one(), U256::one(), U256::zero()).is_err());
    }

    #[test]
    fn mul_div_rejects_overflowing_quotient() {
        assert!(mul_div(U256::max_value(), U256::max_value(), U256::one()).is_err());
    }

    #[test]
    fn add_delta_positive() {
        assert_eq!(add_delta(1, 2).unwrap(), 3);
    }

    #[test]
    fn add_delta_negative() {
        assert_eq!(add_delta(2, -1).unwrap(), 1);
    }

    #[test]
    fn add_delta_underflow_fails() {
        assert!(add_delta(0, -1).is_err());
    }

    #[test]
    fn add_delta_overflow_fails() {
        assert!(add_delta(u128::MAX, 1).is_err());
    }

    #[test]
    fn wrapping_sub_is_modular() {
        let a = U256::zero();
        let b = U256::one();
        // 0 - 1 wraps to U256::max_value(), not a panic.
        assert_eq!(wrapping_sub(a, b), U256::max_value());
    }

    #[test]
    fn i256_sar_sign_extends() {
        let neg_one = I256::from_i128(-1);
        assert_eq!(neg_one.sar(4), neg_one);
    }

    #[test]
    fn i256_roundtrip_low_i32() {
        assert_eq!(I256::from_i128(-42).wrapping_add(I256::from_i128(42)), I256::ZERO);
    }

    #[quickcheck_macros::quickcheck]
    fn mul_div_matches_u128_arithmetic(a: u64, b: u64, denom: u64) -> bool {
        if denom == 0 {
            return mul_div(U256::from(a), U256::from(b), U256::from(denom)).is_err();
        }
        let expected = (a as u128 * b as u128) / denom as u128;
        mul_div(U256::from(a), U256::from(b), U256::from(denom)).unwrap() == U256::from(expected)
    }

    #[quickcheck_macros::quickcheck]
    fn mul_div_rounding_up_never_undershoots_mul_div(a: u64, b: u64, denom: u64) -> bool {
        if denom == 0 {
            return true;
        }
        let floor = mul_div(U256::from(a), U256::from(b), U256::from(denom)).unwrap();
        let ceil = mul_div_rounding_up(U256::from(a), U256::from(b), U256::from(denom)).unwrap();
        ceil >= floor && ceil - floor <= U256::one()
    }

    #[quickcheck_macros::quickcheck]
    fn add_delta_round_trips_through_its_inverse(x: u64, delta: i64) -> bool {
        let x = x as u128;
        let delta = delta as i128;
        match add_delta(x, delta) {
            Ok(sum) => add_delta(sum, -delta) == Ok(x),
            Err(_) => delta < 0 && (delta.unsigned_abs()) > x,
        }
    }
}
