///! Per-tick bookkeeping: gross/net liquidity and the outside-growth
///! snapshots that make inside-range fee accounting possible. Generalizes
///! the teacher's `states/tick.rs` `TickState` (an Anchor zero-copy account
///! keyed by a PDA) into a plain struct held in a `BTreeMap<i32, TickInfo>`
///! owned by the engine — same update/cross/clear algebra, widened from
///! `i64`/`u64` to the `i128`/`u128` widths this crate uses throughout, and
///! with fee growth upgraded from Q32.32 (`u64`) to Q128.128 (`U256`).
use crate::error::EngineError;
use crate::fixed_point::{self, U256};
use crate::tick_math;

/// State attached to an initialized tick. A tick is initialized iff
/// `liquidity_gross > 0`; when it drops back to zero the engine clears it
/// from the table entirely rather than leaving a zeroed entry behind.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickInfo {
    pub liquidity_gross: u128,
    pub liquidity_net: i128,
    pub fee_growth_outside_0_x128: U256,
    pub fee_growth_outside_1_x128: U256,
    pub seconds_outside: u32,
}

impl TickInfo {
    /// `f_inside = f_global - f_below(lower) - f_above(upper)`, all modulo
    /// 2^256. `tick_lower`/`tick_upper` are the endpoint ticks' own stored
    /// state; `tick_current` is the pool's current tick.
    pub fn get_fee_growth_inside(
        tick_lower: &TickInfo,
        tick_lower_index: i32,
        tick_upper: &TickInfo,
        tick_upper_index: i32,
        tick_current: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
    ) -> (U256, U256) {
        let (fee_growth_below_0, fee_growth_below_1) = if tick_current >= tick_lower_index {
            (
                tick_lower.fee_growth_outside_0_x128,
                tick_lower.fee_growth_outside_1_x128,
            )
        } else {
            (
                fixed_point::wrapping_sub(fee_growth_global_0_x128, tick_lower.fee_growth_outside_0_x128),
                fixed_point::wrapping_sub(fee_growth_global_1_x128, tick_lower.fee_growth_outside_1_x128),
            )
        };

        let (fee_growth_above_0, fee_growth_above_1) = if tick_current < tick_upper_index {
            (
                tick_upper.fee_growth_outside_0_x128,
                tick_upper.fee_growth_outside_1_x128,
            )
        } else {
            (
                fixed_point::wrapping_sub(fee_growth_global_0_x128, tick_upper.fee_growth_outside_0_x128),
                fixed_point::wrapping_sub(fee_growth_global_1_x128, tick_upper.fee_growth_outside_1_x128),
            )
        };

        let fee_growth_inside_0 = fixed_point::wrapping_sub(
            fixed_point::wrapping_sub(fee_growth_global_0_x128, fee_growth_below_0),
            fee_growth_above_0,
        );
        let fee_growth_inside_1 = fixed_point::wrapping_sub(
            fixed_point::wrapping_sub(fee_growth_global_1_x128, fee_growth_below_1),
            fee_growth_above_1,
        );

        (fee_growth_inside_0, fee_growth_inside_1)
    }

    /// Applies `liquidity_delta` to this tick. Returns whether the tick's
    /// initialized/uninitialized state flipped. `upper` distinguishes a
    /// position's upper endpoint (net liquidity subtracts) from its lower
    /// (net liquidity adds).
    pub fn update(
        &mut self,
        tick_index: i32,
        tick_current: i32,
        liquidity_delta: i128,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        seconds_now: u32,
        upper: bool,
        max_liquidity_per_tick: u128,
    ) -> Result<bool, EngineError> {
        let liquidity_gross_before = self.liquidity_gross;
        let liquidity_gross_after = fixed_point::add_delta(liquidity_gross_before, liquidity_delta)?;

        if liquidity_gross_after > max_liquidity_per_tick {
            return Err(EngineError::LiquidityOverflow);
        }

        let flipped = (liquidity_gross_after == 0) != (liquidity_gross_before == 0);

        if liquidity_gross_before == 0 {
            // By convention, growth accrued before a tick was initialized is
            // treated as having all happened below it.
            if tick_index <= tick_current {
                self.fee_growth_outside_0_x128 = fee_growth_global_0_x128;
                self.fee_growth_outside_1_x128 = fee_growth_global_1_x128;
                self.seconds_outside = seconds_now;
            }
        }

        self.liquidity_gross = liquidity_gross_after;
        self.liquidity_net = if upper {
            self.liquidity_net
                .checked_sub(liquidity_delta)
                .ok_or(EngineError::LiquidityAdd)?
        } else {
            self.liquidity_net
                .checked_add(liquidity_delta)
                .ok_or(EngineError::LiquidityAdd)?
        };

        Ok(flipped)
    }

    /// Flips the outside snapshots as price crosses this tick; returns
    /// `liquidity_net` so the caller can adjust active liquidity.
    pub fn cross(
        &mut self,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        seconds_now: u32,
    ) -> i128 {
        self.fee_growth_outside_0_x128 =
            fixed_point::wrapping_sub(fee_growth_global_0_x128, self.fee_growth_outside_0_x128);
        self.fee_growth_outside_1_x128 =
            fixed_point::wrapping_sub(fee_growth_global_1_x128, self.fee_growth_outside_1_x128);
        self.seconds_outside = seconds_now.wrapping_sub(self.seconds_outside);

        self.liquidity_net
    }
}

fn floor_div(a: i32, b: i32) -> i32 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

/// The widest usable tick range for a given `tick_spacing`:
/// `minTick = floor(MIN_TICK / tick_spacing) * tick_spacing`, `maxTick = -minTick`.
pub fn usable_tick_bounds(tick_spacing: i32) -> (i32, i32) {
    let min_tick = floor_div(tick_math::MIN_TICK, tick_spacing) * tick_spacing;
    (min_tick, -min_tick)
}

/// `floor((2^128 - 1) / numTicks)`, the per-tick cap implied by a given
/// `tick_spacing` over the full usable range.
pub fn tick_spacing_to_max_liquidity_per_tick(tick_spacing: i32) -> u128 {
    let (min_tick, max_tick) = usable_tick_bounds(tick_spacing);
    let num_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;
    u128::MAX / num_ticks
}
