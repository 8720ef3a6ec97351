///! Price-step arithmetic: given a starting `√P`, liquidity, and a signed
///! token delta, find the next `√P`. Mirrors the teacher's
///! `libraries/sqrt_price_math.rs`, upgraded from its Q32.32/`u64` precision
///! (bounded by the `muldiv` crate's 64-bit `MulDiv` trait) to Q64.96/`U256`,
///! using this crate's own 512-bit-widening `mul_div`/`mul_div_rounding_up`
///! in place of `muldiv::MulDiv`.
use crate::error::EngineError;
use crate::fixed_point::{self, U256};

/// `√P' = √P * L / (L + Δx * √P)`, or the overflow-safe alternate form
/// `√P' = L / (L/√P + Δx)`. Always rounds up (see module doc on the teacher's
/// original for the rounding rationale, which carries over unchanged).
pub fn get_next_sqrt_price_from_amount_0_rounding_up(
    sqrt_p_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, EngineError> {
    if amount.is_zero() {
        return Ok(sqrt_p_x96);
    }
    let numerator_1 = U256::from(liquidity) << fixed_point::RESOLUTION_96 as usize;

    if add {
        let product = amount.checked_mul(sqrt_p_x96);
        if let Some(product) = product {
            let denominator = numerator_1 + product;
            if denominator >= numerator_1 {
                return fixed_point::mul_div_rounding_up(numerator_1, sqrt_p_x96, denominator);
            }
        }
        let denom = (numerator_1 / sqrt_p_x96)
            .checked_add(amount)
            .ok_or(EngineError::Overflow)?;
        div_rounding_up(numerator_1, denom)
    } else {
        let product = amount.checked_mul(sqrt_p_x96).ok_or(EngineError::Overflow)?;
        if numerator_1 <= product {
            return Err(EngineError::Overflow);
        }
        let denominator = numerator_1 - product;
        fixed_point::mul_div_rounding_up(numerator_1, sqrt_p_x96, denominator)
    }
}

/// `√P' = √P ± Δy / L`. Always rounds down.
pub fn get_next_sqrt_price_from_amount_1_rounding_down(
    sqrt_p_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, EngineError> {
    let liquidity = U256::from(liquidity);
    if add {
        let quotient = fixed_point::mul_div(amount, fixed_point::Q96, liquidity)?;
        sqrt_p_x96.checked_add(quotient).ok_or(EngineError::Overflow)
    } else {
        let quotient = fixed_point::mul_div_rounding_up(amount, fixed_point::Q96, liquidity)?;
        if sqrt_p_x96 <= quotient {
            return Err(EngineError::Overflow);
        }
        Ok(sqrt_p_x96 - quotient)
    }
}

fn div_rounding_up(a: U256, b: U256) -> Result<U256, EngineError> {
    if b.is_zero() {
        return Err(EngineError::Overflow);
    }
    let quotient = a / b;
    if (a % b).is_zero() {
        Ok(quotient)
    } else {
        quotient.checked_add(U256::one()).ok_or(EngineError::Overflow)
    }
}

/// Next `√P` given an input amount of token0 or token1. Rounds so the price
/// never overshoots past what the input amount can support.
pub fn get_next_sqrt_price_from_input(
    sqrt_p_x96: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Result<U256, EngineError> {
    if sqrt_p_x96.is_zero() || liquidity == 0 {
        return Err(EngineError::Overflow);
    }
    if zero_for_one {
        get_next_sqrt_price_from_amount_0_rounding_up(sqrt_p_x96, liquidity, amount_in, true)
    } else {
        get_next_sqrt_price_from_amount_1_rounding_down(sqrt_p_x96, liquidity, amount_in, true)
    }
}

/// Next `√P` given an output amount of token0 or token1.
pub fn get_next_sqrt_price_from_output(
    sqrt_p_x96: U256,
    liquidity: u128,
    amount_out: U256,
    zero_for_one: bool,
) -> Result<U256, EngineError> {
    if sqrt_p_x96.is_zero() || liquidity == 0 {
        return Err(EngineError::Overflow);
    }
    if zero_for_one {
        get_next_sqrt_price_from_amount_1_rounding_down(sqrt_p_x96, liquidity, amount_out, false)
    } else {
        get_next_sqrt_price_from_amount_0_rounding_up(sqrt_p_x96, liquidity, amount_out, false)
    }
}

/// `Δx = L * (1/√P_lower - 1/√P_upper) = L * (√P_upper - √P_lower) / (√P_upper * √P_lower)`.
pub fn get_amount_0_delta_unsigned(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, EngineError> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        std::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }
    if sqrt_ratio_a_x96.is_zero() {
        return Err(EngineError::Overflow);
    }

    let numerator_1 = U256::from(liquidity) << fixed_point::RESOLUTION_96 as usize;
    let numerator_2 = sqrt_ratio_b_x96 - sqrt_ratio_a_x96;

    if round_up {
        let intermediate = fixed_point::mul_div_rounding_up(numerator_1, numerator_2, sqrt_ratio_b_x96)?;
        div_rounding_up(intermediate, sqrt_ratio_a_x96)
    } else {
        let intermediate = fixed_point::mul_div(numerator_1, numerator_2, sqrt_ratio_b_x96)?;
        Ok(intermediate / sqrt_ratio_a_x96)
    }
}

/// `Δy = L * (√P_upper - √P_lower)`.
pub fn get_amount_1_delta_unsigned(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, EngineError> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        std::mem::swap(&mut sqrt_ratio_a_x96, &mut sqrt_ratio_b_x96);
    }
    let diff = sqrt_ratio_b_x96 - sqrt_ratio_a_x96;
    if round_up {
        fixed_point::mul_div_rounding_up(U256::from(liquidity), diff, fixed_point::Q96)
    } else {
        fixed_point::mul_div(U256::from(liquidity), diff, fixed_point::Q96)
    }
}

/// Signed token0 delta for a change in liquidity between two prices.
pub fn get_amount_0_delta_signed(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> Result<i128, EngineError> {
    if liquidity < 0 {
        let unsigned =
            get_amount_0_delta_unsigned(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity.unsigned_abs(), false)?;
        Ok(-u256_to_i128(unsigned)?)
    } else {
        let unsigned =
            get_amount_0_delta_unsigned(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity as u128, true)?;
        u256_to_i128(unsigned)
    }
}

/// Signed token1 delta for a change in liquidity between two prices.
pub fn get_amount_1_delta_signed(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> Result<i128, EngineError> {
    if liquidity < 0 {
        let unsigned =
            get_amount_1_delta_unsigned(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity.unsigned_abs(), false)?;
        Ok(-u256_to_i128(unsigned)?)
    } else {
        let unsigned =
            get_amount_1_delta_unsigned(sqrt_ratio_a_x96, sqrt_ratio_b_x96, liquidity as u128, true)?;
        u256_to_i128(unsigned)
    }
}

fn u256_to_i128(x: U256) -> Result<i128, EngineError> {
    if x > U256::from(i128::MAX as u128) {
        return Err(EngineError::Overflow);
    }
    Ok(x.as_u128() as i128)
}
