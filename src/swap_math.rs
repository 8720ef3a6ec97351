///! Single-step swap computation: given a current and a bounding target
///! price, find how far the price actually moves, and the in/out/fee amounts
///! for that step. Grounded on `khaidarkairbek-amm-voyage`'s
///! `src/uniswap_v3/math/swap_math.rs::compute_swap_step`, adapted onto this
///! crate's `fixed_point`/`sqrt_price_math` types and `EngineError`.
use crate::error::EngineError;
use crate::fixed_point::{self, U256};
use crate::sqrt_price_math;

/// One step of the swap loop.
pub struct SwapStep {
    /// The price after this step (never past `sqrt_ratio_target_x96`).
    pub sqrt_ratio_next_x96: U256,
    /// Token amount consumed from `amount_remaining`, excluding the fee.
    pub amount_in: U256,
    /// Token amount produced by this step.
    pub amount_out: U256,
    /// Fee charged on `amount_in` (or imputed, for a full-range exact-in step).
    pub fee_amount: U256,
}

const FEE_DENOMINATOR: u32 = 1_000_000;

/// Computes one step of a swap: given `sqrtRatioCurrent`, the bounding
/// `sqrtRatioTarget` (the next initialized tick's price, or the caller's
/// slippage limit, whichever is closer), the active liquidity, the signed
/// amount still to be filled (positive = exact-in, negative = exact-out),
/// and the pool's fee in hundredths of a bip.
pub fn compute_swap_step(
    sqrt_ratio_current_x96: U256,
    sqrt_ratio_target_x96: U256,
    liquidity: u128,
    amount_remaining: i128,
    fee_pips: u32,
) -> Result<SwapStep, EngineError> {
    let zero_for_one = sqrt_ratio_current_x96 >= sqrt_ratio_target_x96;
    let exact_in = amount_remaining >= 0;

    let mut amount_in = U256::zero();
    let mut amount_out = U256::zero();

    let sqrt_ratio_next_x96 = if exact_in {
        let amount_remaining_less_fee = fixed_point::mul_div(
            U256::from(amount_remaining as u128),
            U256::from((FEE_DENOMINATOR - fee_pips) as u64),
            U256::from(FEE_DENOMINATOR as u64),
        )?;
        amount_in = if zero_for_one {
            sqrt_price_math::get_amount_0_delta_unsigned(
                sqrt_ratio_target_x96,
                sqrt_ratio_current_x96,
                liquidity,
                true,
            )?
        } else {
            sqrt_price_math::get_amount_1_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_target_x96,
                liquidity,
                true,
            )?
        };

        if amount_remaining_less_fee >= amount_in {
            sqrt_ratio_target_x96
        } else {
            sqrt_price_math::get_next_sqrt_price_from_input(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining_less_fee,
                zero_for_one,
            )?
        }
    } else {
        let amount_remaining_abs = U256::from(amount_remaining.unsigned_abs());
        amount_out = if zero_for_one {
            sqrt_price_math::get_amount_1_delta_unsigned(
                sqrt_ratio_target_x96,
                sqrt_ratio_current_x96,
                liquidity,
                false,
            )?
        } else {
            sqrt_price_math::get_amount_0_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_target_x96,
                liquidity,
                false,
            )?
        };

        if amount_remaining_abs >= amount_out {
            sqrt_ratio_target_x96
        } else {
            sqrt_price_math::get_next_sqrt_price_from_output(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining_abs,
                zero_for_one,
            )?
        }
    };

    let max = sqrt_ratio_target_x96 == sqrt_ratio_next_x96;

    if zero_for_one {
        if !(max && exact_in) {
            amount_in = sqrt_price_math::get_amount_0_delta_unsigned(
                sqrt_ratio_next_x96,
                sqrt_ratio_current_x96,
                liquidity,
                true,
            )?;
        }
        if !(max && !exact_in) {
            amount_out = sqrt_price_math::get_amount_1_delta_unsigned(
                sqrt_ratio_next_x96,
                sqrt_ratio_current_x96,
                liquidity,
                false,
            )?;
        }
    } else {
        if !(max && exact_in) {
            amount_in = sqrt_price_math::get_amount_1_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_next_x96,
                liquidity,
                true,
            )?;
        }
        if !(max && !exact_in) {
            amount_out = sqrt_price_math::get_amount_0_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_next_x96,
                liquidity,
                false,
            )?;
        }
    }

    if !exact_in {
        let amount_remaining_abs = U256::from(amount_remaining.unsigned_abs());
        if amount_out > amount_remaining_abs {
            amount_out = amount_remaining_abs;
        }
    }

    let fee_amount = if exact_in && sqrt_ratio_next_x96 != sqrt_ratio_target_x96 {
        // Swap consumed the whole remaining amount before reaching the
        // target: whatever wasn't spent on amount_in is fee.
        U256::from(amount_remaining as u128) - amount_in
    } else {
        fixed_point::mul_div_rounding_up(
            amount_in,
            U256::from(fee_pips as u64),
            U256::from((FEE_DENOMINATOR - fee_pips) as u64),
        )?
    };

    Ok(SwapStep {
        sqrt_ratio_next_x96,
        amount_in,
        amount_out,
        fee_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tick_math;

    fn price_at(tick: i32) -> U256 {
        tick_math::get_sqrt_ratio_at_tick(tick).unwrap()
    }

    #[test]
    fn exact_in_zero_for_one_consumes_full_amount_below_target() {
        let current = price_at(0);
        let target = price_at(-1000);
        let step = compute_swap_step(current, target, 1_000_000_000, 1_000, 3000).unwrap();
        assert!(step.amount_in <= U256::from(1_000u64));
        assert!(step.sqrt_ratio_next_x96 <= current);
    }

    #[test]
    fn reaching_target_leaves_remainder_unspent_as_non_fee() {
        let current = price_at(0);
        let target = price_at(-1);
        // Tiny gap: a huge input amount will blow through to the target
        // price rather than being fully consumed.
        let step = compute_swap_step(current, target, 1_000_000_000, 1_000_000_000, 3000).unwrap();
        assert_eq!(step.sqrt_ratio_next_x96, target);
    }

    #[test]
    fn exact_out_never_exceeds_requested_output() {
        let current = price_at(0);
        let target = price_at(1000);
        let step = compute_swap_step(current, target, 1_000_000_000, -500, 3000).unwrap();
        assert!(step.amount_out <= U256::from(500u64));
    }

    #[test]
    fn fee_is_proportional_to_amount_in_when_target_not_reached() {
        let current = price_at(0);
        let target = price_at(-100000);
        let step = compute_swap_step(current, target, 1_000_000_000_000, 10_000, 3000).unwrap();
        // fee_pips = 3000 -> 0.3%
        let expected = fixed_point::mul_div_rounding_up(
            step.amount_in,
            U256::from(3000u64),
            U256::from(997000u64),
        )
        .unwrap();
        assert_eq!(step.fee_amount, expected);
    }
}
