///! The orchestrator: owns all pair-wide state and wires the other modules
///! together into `initialize`/`mint`/`burn`/`collect`/`swap`/`flash`.
///! Generalizes the teacher's `states/pool.rs` `PoolState` plus the handler
///! bodies in `instructions/` (there split across one file per entrypoint,
///! each holding an Anchor `Context`) into a single struct whose methods are
///! the entrypoints, driven by plain parameters and collaborator traits
///! instead of accounts.
use std::collections::BTreeMap;

use crate::address::{Address, TokenId};
use crate::callbacks::{Clock, FlashCallback, MintCallback, SwapCallback, TokenLedger};
use crate::error::EngineError;
use crate::events::PairEvent;
use crate::fixed_point::{self, U256};
use crate::position::{PositionKey, PositionLedger};
use crate::sqrt_price_math;
use crate::swap_math;
use crate::tick::{self, TickInfo};
use crate::tick_discovery::{LinearTickDiscovery, TickDiscovery};
use crate::tick_math;

/// Oracle-relevant slot read/written once per call. `tick_cumulative_last`
/// is `i56` on the teacher (wraps); represented here as `i64`, still
/// `wrapping_add`ed rather than relied on never overflowing.
#[derive(Clone, Copy, Debug)]
pub struct Slot0 {
    pub sqrt_price_x96: U256,
    pub tick_current: i32,
    pub block_timestamp_last: u32,
    pub tick_cumulative_last: i64,
    pub unlocked: bool,
}

impl Default for Slot0 {
    fn default() -> Self {
        Slot0 {
            sqrt_price_x96: U256::zero(),
            tick_current: 0,
            block_timestamp_last: 0,
            tick_cumulative_last: 0,
            unlocked: true,
        }
    }
}

/// A single concentrated-liquidity pair. `D` is the tick-discovery strategy;
/// defaults to [`LinearTickDiscovery`], the sorted-map walk that needs no
/// auxiliary index kept in sync.
pub struct PairEngine<D: TickDiscovery = LinearTickDiscovery> {
    pub pair_address: Address,
    pub token_0: TokenId,
    pub token_1: TokenId,
    pub tick_spacing: i32,
    pub fee: u32,
    max_liquidity_per_tick: u128,

    initialized: bool,
    slot0: Slot0,
    liquidity: u128,
    fee_growth_global_0_x128: U256,
    fee_growth_global_1_x128: U256,
    fee_to_fees_0: u128,
    fee_to_fees_1: u128,
    fee_to: Option<Address>,

    ticks: BTreeMap<i32, TickInfo>,
    positions: PositionLedger,
    discovery: D,
}

/// Fixed protocol-fee skim applied whenever `feeTo` is set: one sixth of
/// every step's fee, floor-divided. The teacher instead stores a
/// configurable 4-10 fraction per token; this engine's external surface
/// never exposes that knob, so the skim is simply a constant.
const PROTOCOL_FEE_DENOMINATOR: u64 = 6;

impl<D: TickDiscovery> PairEngine<D> {
    pub fn new(
        pair_address: Address,
        token_0: TokenId,
        token_1: TokenId,
        tick_spacing: i32,
        fee: u32,
        discovery: D,
    ) -> Self {
        PairEngine {
            pair_address,
            token_0,
            token_1,
            tick_spacing,
            fee,
            max_liquidity_per_tick: tick::tick_spacing_to_max_liquidity_per_tick(tick_spacing),
            initialized: false,
            slot0: Slot0::default(),
            liquidity: 0,
            fee_growth_global_0_x128: U256::zero(),
            fee_growth_global_1_x128: U256::zero(),
            fee_to_fees_0: 0,
            fee_to_fees_1: 0,
            fee_to: None,
            ticks: BTreeMap::new(),
            positions: PositionLedger::new(),
            discovery,
        }
    }

    pub fn slot0(&self) -> Slot0 {
        self.slot0
    }

    pub fn liquidity(&self) -> u128 {
        self.liquidity
    }

    pub fn fee_growth_global(&self) -> (U256, U256) {
        (self.fee_growth_global_0_x128, self.fee_growth_global_1_x128)
    }

    pub fn protocol_fees(&self) -> (u128, u128) {
        (self.fee_to_fees_0, self.fee_to_fees_1)
    }

    pub fn fee_to(&self) -> Option<Address> {
        self.fee_to
    }

    pub fn position(&self, owner: Address, tick_lower: i32, tick_upper: i32) -> Option<&crate::position::Position> {
        self.positions.get(&PositionKey { owner, tick_lower, tick_upper })
    }

    pub fn tick(&self, index: i32) -> Option<&TickInfo> {
        self.ticks.get(&index)
    }

    /// Re-entrancy guard: fails `LOK` if already unlocked-false, otherwise
    /// locks, runs `f`, and unlocks again regardless of `f`'s outcome — no
    /// early-return branch inside `f` can leave the pair permanently locked.
    fn with_lock<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R, EngineError>) -> Result<R, EngineError> {
        if !self.initialized || !self.slot0.unlocked {
            return Err(EngineError::Locked);
        }
        self.slot0.unlocked = false;
        let result = f(self);
        self.slot0.unlocked = true;
        result
    }

    fn check_ticks(&self, tick_lower: i32, tick_upper: i32) -> Result<(), EngineError> {
        if tick_lower >= tick_upper {
            return Err(EngineError::TicksMisordered);
        }
        let (min_tick, max_tick) = tick::usable_tick_bounds(self.tick_spacing);
        if tick_lower < min_tick {
            return Err(EngineError::TickLowerTooLow);
        }
        if tick_upper > max_tick {
            return Err(EngineError::TickUpperTooHigh);
        }
        Ok(())
    }

    /// Sets the initial price, then mints a single-wei "dead" position
    /// spanning the pair's whole usable range so later divisions by total
    /// liquidity never hit zero. Debits the caller for the dead unit the
    /// same way any other mint would (the amounts are returned via the
    /// `Initialized` event rather than a callback, since there is no owner
    /// to invoke one on).
    pub fn initialize(&mut self, sqrt_price_x96: U256, clock: &dyn Clock) -> Result<Vec<PairEvent>, EngineError> {
        log::debug!("initialize: sqrt_price_x96={}", sqrt_price_x96);
        let result = self.try_initialize(sqrt_price_x96, clock);
        if let Err(err) = &result {
            log::warn!("initialize aborted: {}", err);
        }
        result
    }

    fn try_initialize(&mut self, sqrt_price_x96: U256, clock: &dyn Clock) -> Result<Vec<PairEvent>, EngineError> {
        if self.initialized {
            return Err(EngineError::AlreadyInitialized);
        }
        let tick = tick_math::get_tick_at_sqrt_ratio(sqrt_price_x96)?;
        let (min_tick, max_tick) = tick::usable_tick_bounds(self.tick_spacing);
        if tick < min_tick {
            return Err(EngineError::BelowMinTick);
        }
        if tick >= max_tick {
            return Err(EngineError::AboveMaxTick);
        }

        self.slot0 = Slot0 {
            sqrt_price_x96,
            tick_current: tick,
            block_timestamp_last: clock.now(),
            tick_cumulative_last: 0,
            unlocked: true,
        };
        self.initialized = true;

        self.modify_position(Address::default(), min_tick, max_tick, 1, clock)?;

        Ok(vec![PairEvent::Initialized { sqrt_price_x96, tick }])
    }

    /// Test/admin hook for advancing the oracle clock without a swap.
    pub fn set_time(&mut self, timestamp: u32) {
        self.slot0.block_timestamp_last = timestamp;
    }

    pub fn set_fee_to(&mut self, new_fee_to: Option<Address>) -> Vec<PairEvent> {
        log::debug!("set_fee_to: {:?}", new_fee_to);
        let old = self.fee_to;
        self.fee_to = new_fee_to;
        vec![PairEvent::SetFeeTo { old, new: new_fee_to }]
    }

    /// Refuses to hand out the pair's own reserves; any other token sitting
    /// in the pair's account by accident (an airdrop, a stray transfer) is
    /// fair game for the host to sweep — the actual transfer is the host's
    /// job since this engine never holds a `TokenLedger` of its own.
    pub fn recover(&self, token: TokenId, _to: Address, _amount: u128) -> Result<(), EngineError> {
        if token == self.token_0 || token == self.token_1 {
            return Err(EngineError::CannotRecoverPoolToken);
        }
        Ok(())
    }

    /// Core mint/burn primitive. `liquidity_delta` is signed: positive for a
    /// mint, negative for a burn, zero for a poke (pure fee reconciliation).
    /// Returns the signed token0/token1 deltas the caller owes (mint,
    /// positive) or is owed (burn, negative).
    fn modify_position(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
        clock: &dyn Clock,
    ) -> Result<(i128, i128), EngineError> {
        self.check_ticks(tick_lower, tick_upper)?;
        if tick_lower % self.tick_spacing != 0 || tick_upper % self.tick_spacing != 0 {
            return Err(EngineError::TickMisaligned);
        }

        let slot0 = self.slot0;
        let seconds_now = clock.now();

        // Everything below stages its result into a local until the very
        // end: `TickInfo::update` can fail `LO`, `Position::update` can fail
        // `NP`, and the amount math can fail `Overflow`, and none of those
        // should leave a half-applied tick or a phantom zeroed position
        // behind. `self` is only touched once every fallible step below has
        // already succeeded.
        let mut lower_info = self.ticks.get(&tick_lower).copied().unwrap_or_default();
        let mut upper_info = self.ticks.get(&tick_upper).copied().unwrap_or_default();

        let mut flipped_lower = false;
        let mut flipped_upper = false;

        if liquidity_delta != 0 {
            flipped_lower = lower_info.update(
                tick_lower,
                slot0.tick_current,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_now,
                false,
                self.max_liquidity_per_tick,
            )?;
            flipped_upper = upper_info.update(
                tick_upper,
                slot0.tick_current,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_now,
                true,
                self.max_liquidity_per_tick,
            )?;
        }

        let (fee_growth_inside_0, fee_growth_inside_1) = TickInfo::get_fee_growth_inside(
            &lower_info,
            tick_lower,
            &upper_info,
            tick_upper,
            slot0.tick_current,
            self.fee_growth_global_0_x128,
            self.fee_growth_global_1_x128,
        );

        let key = PositionKey { owner, tick_lower, tick_upper };
        let mut position = self.positions.get(&key).copied().unwrap_or_default();
        position.update(liquidity_delta, fee_growth_inside_0, fee_growth_inside_1)?;

        let sqrt_ratio_lower = tick_math::get_sqrt_ratio_at_tick(tick_lower)?;
        let sqrt_ratio_upper = tick_math::get_sqrt_ratio_at_tick(tick_upper)?;

        let (amount_0, amount_1, liquidity_next) = if slot0.tick_current < tick_lower {
            (
                sqrt_price_math::get_amount_0_delta_signed(sqrt_ratio_lower, sqrt_ratio_upper, liquidity_delta)?,
                0i128,
                self.liquidity,
            )
        } else if slot0.tick_current < tick_upper {
            let amount_0 =
                sqrt_price_math::get_amount_0_delta_signed(slot0.sqrt_price_x96, sqrt_ratio_upper, liquidity_delta)?;
            let amount_1 =
                sqrt_price_math::get_amount_1_delta_signed(sqrt_ratio_lower, slot0.sqrt_price_x96, liquidity_delta)?;
            let liquidity_next = fixed_point::add_delta(self.liquidity, liquidity_delta)?;
            (amount_0, amount_1, liquidity_next)
        } else {
            (
                0i128,
                sqrt_price_math::get_amount_1_delta_signed(sqrt_ratio_lower, sqrt_ratio_upper, liquidity_delta)?,
                self.liquidity,
            )
        };

        // Every fallible step above succeeded — commit.
        if liquidity_delta != 0 {
            if liquidity_delta < 0 && flipped_lower {
                self.ticks.remove(&tick_lower);
            } else {
                self.ticks.insert(tick_lower, lower_info);
            }
            if liquidity_delta < 0 && flipped_upper {
                self.ticks.remove(&tick_upper);
            } else {
                self.ticks.insert(tick_upper, upper_info);
            }
            if flipped_lower {
                self.discovery.on_flip(self.tick_spacing, tick_lower);
            }
            if flipped_upper {
                self.discovery.on_flip(self.tick_spacing, tick_upper);
            }
        }
        *self.positions.get_or_insert(key) = position;
        self.liquidity = liquidity_next;

        Ok((amount_0, amount_1))
    }

    /// `amount == 0` is a poke: it runs the same fee-reconciliation path as
    /// a real mint with no liquidity change, and fails `NP` rather than `LA`
    /// when the position doesn't exist yet (see [`Self::modify_position`]).
    pub fn mint(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        callback: &mut dyn MintCallback,
        data: &[u8],
        clock: &dyn Clock,
    ) -> Result<(u128, u128, Vec<PairEvent>), EngineError> {
        log::debug!("mint: owner={:?} range=[{}, {}] amount={}", owner, tick_lower, tick_upper, amount);
        let result = self.with_lock(|engine| {
            let liquidity_delta = i128::try_from(amount).map_err(|_| EngineError::Overflow)?;
            let (amount_0, amount_1) = engine.modify_position(owner, tick_lower, tick_upper, liquidity_delta, clock)?;
            let amount_0 = amount_0 as u128;
            let amount_1 = amount_1 as u128;

            if amount_0 > 0 || amount_1 > 0 {
                callback.on_mint(owner, amount_0, amount_1, data)?;
            }

            Ok((
                amount_0,
                amount_1,
                vec![PairEvent::Mint {
                    sender: owner,
                    owner,
                    tick_lower,
                    tick_upper,
                    amount,
                    amount_0,
                    amount_1,
                }],
            ))
        });
        if let Err(err) = &result {
            log::warn!("mint aborted: {}", err);
        }
        result
    }

    pub fn burn(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        clock: &dyn Clock,
    ) -> Result<(u128, u128, Vec<PairEvent>), EngineError> {
        log::debug!("burn: owner={:?} range=[{}, {}] amount={}", owner, tick_lower, tick_upper, amount);
        let result = self.with_lock(|engine| {
            let key = PositionKey { owner, tick_lower, tick_upper };
            let held = engine.positions.get(&key).map(|p| p.liquidity).unwrap_or(0);
            if amount > held {
                return Err(EngineError::CannotBurnMoreThanPosition);
            }

            let liquidity_delta = -(i128::try_from(amount).map_err(|_| EngineError::Overflow)?);
            let (amount_0, amount_1) = engine.modify_position(owner, tick_lower, tick_upper, liquidity_delta, clock)?;
            let amount_0 = (-amount_0) as u128;
            let amount_1 = (-amount_1) as u128;

            if amount_0 > 0 || amount_1 > 0 {
                let position = engine.positions.get_or_insert(key);
                position.tokens_owed_0 = position.tokens_owed_0.wrapping_add(amount_0);
                position.tokens_owed_1 = position.tokens_owed_1.wrapping_add(amount_1);
            }

            Ok((
                amount_0,
                amount_1,
                vec![PairEvent::Burn { owner, tick_lower, tick_upper, amount, amount_0, amount_1 }],
            ))
        });
        if let Err(err) = &result {
            log::warn!("burn aborted: {}", err);
        }
        result
    }

    pub fn collect(
        &mut self,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount_0_requested: u128,
        amount_1_requested: u128,
    ) -> Result<(u128, u128, Vec<PairEvent>), EngineError> {
        log::debug!(
            "collect: owner={:?} range=[{}, {}] requested=({}, {})",
            owner, tick_lower, tick_upper, amount_0_requested, amount_1_requested
        );
        let result = self.with_lock(|engine| {
            let key = PositionKey { owner, tick_lower, tick_upper };
            let (owed_0, owed_1) = {
                let position = engine.positions.get(&key).ok_or(EngineError::NoPosition)?;
                (position.tokens_owed_0, position.tokens_owed_1)
            };
            let amount_0 = amount_0_requested.min(owed_0);
            let amount_1 = amount_1_requested.min(owed_1);

            if amount_0 > 0 || amount_1 > 0 {
                let position = engine.positions.get_or_insert(key);
                position.tokens_owed_0 -= amount_0;
                position.tokens_owed_1 -= amount_1;
            }

            Ok((amount_0, amount_1, vec![PairEvent::Collect { owner, tick_lower, tick_upper, amount_0, amount_1 }]))
        });
        if let Err(err) = &result {
            log::warn!("collect aborted: {}", err);
        }
        result
    }

    pub fn collect_protocol(
        &mut self,
        amount_0_requested: u128,
        amount_1_requested: u128,
    ) -> Result<(u128, u128, Vec<PairEvent>), EngineError> {
        log::debug!("collect_protocol: requested=({}, {})", amount_0_requested, amount_1_requested);
        let result = self.with_lock(|engine| {
            let amount_0 = amount_0_requested.min(engine.fee_to_fees_0);
            let amount_1 = amount_1_requested.min(engine.fee_to_fees_1);
            engine.fee_to_fees_0 -= amount_0;
            engine.fee_to_fees_1 -= amount_1;
            Ok((amount_0, amount_1, vec![PairEvent::CollectProtocol { amount_0, amount_1 }]))
        });
        if let Err(err) = &result {
            log::warn!("collect_protocol aborted: {}", err);
        }
        result
    }

    /// The swap state machine (spec §4.6): walk from tick to tick, filling
    /// `amount_specified` a step at a time, until either the full amount is
    /// filled or the price hits `sqrt_price_limit_x96`. `zero_for_one`
    /// selects the direction; the sign of `amount_specified` (positive =
    /// exact input, negative = exact output) selects which leg is fixed —
    /// together these four combinations are the "four swap flavors" the
    /// public surface reduces to this one entrypoint.
    #[allow(clippy::too_many_arguments)]
    pub fn swap(
        &mut self,
        recipient: Address,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
        ledger: &dyn TokenLedger,
        callback: &mut dyn SwapCallback,
        data: &[u8],
        clock: &dyn Clock,
    ) -> Result<(i128, i128, Vec<PairEvent>), EngineError> {
        log::debug!(
            "swap: recipient={:?} zero_for_one={} amount_specified={}",
            recipient, zero_for_one, amount_specified
        );
        let result = self.try_swap(recipient, zero_for_one, amount_specified, sqrt_price_limit_x96, ledger, callback, data, clock);
        if let Err(err) = &result {
            log::warn!("swap aborted: {}", err);
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn try_swap(
        &mut self,
        recipient: Address,
        zero_for_one: bool,
        amount_specified: i128,
        sqrt_price_limit_x96: U256,
        ledger: &dyn TokenLedger,
        callback: &mut dyn SwapCallback,
        data: &[u8],
        clock: &dyn Clock,
    ) -> Result<(i128, i128, Vec<PairEvent>), EngineError> {
        {
            let current = self.slot0.sqrt_price_x96;
            let in_range = if zero_for_one {
                sqrt_price_limit_x96 < current && sqrt_price_limit_x96 > tick_math::MIN_SQRT_RATIO
            } else {
                sqrt_price_limit_x96 > current && sqrt_price_limit_x96 < tick_math::MAX_SQRT_RATIO
            };
            if !in_range {
                return Err(EngineError::PriceOutOfRange);
            }
        }

        self.with_lock(|engine| {
            let slot0_start = engine.slot0;
            let exact_input = amount_specified > 0;
            let seconds_now = clock.now();

            let mut amount_specified_remaining = amount_specified;
            let mut amount_calculated: i128 = 0;
            let mut price = slot0_start.sqrt_price_x96;
            let mut current_tick = slot0_start.tick_current;
            let mut fee_growth_global_x128 = if zero_for_one {
                engine.fee_growth_global_0_x128
            } else {
                engine.fee_growth_global_1_x128
            };
            let mut active_liquidity = engine.liquidity;

            let elapsed = seconds_now.wrapping_sub(slot0_start.block_timestamp_last) as i64;
            let tick_cumulative =
                slot0_start.tick_cumulative_last.wrapping_add(elapsed.wrapping_mul(slot0_start.tick_current as i64));

            while amount_specified_remaining != 0 && price != sqrt_price_limit_x96 {
                let found = engine.discovery.next_initialized(&engine.ticks, engine.tick_spacing, current_tick, zero_for_one);
                let (tick_next, tick_next_initialized) = match found {
                    Some(t) => (t.clamp(tick_math::MIN_TICK, tick_math::MAX_TICK), true),
                    None => (if zero_for_one { tick_math::MIN_TICK } else { tick_math::MAX_TICK }, false),
                };

                let sqrt_price_next_x96 = tick_math::get_sqrt_ratio_at_tick(tick_next)?;
                let step_target = if zero_for_one {
                    std::cmp::max(sqrt_price_next_x96, sqrt_price_limit_x96)
                } else {
                    std::cmp::min(sqrt_price_next_x96, sqrt_price_limit_x96)
                };

                let step = swap_math::compute_swap_step(
                    price,
                    step_target,
                    active_liquidity,
                    amount_specified_remaining,
                    engine.fee,
                )?;

                if exact_input {
                    amount_specified_remaining -= u256_to_i128(step.amount_in)? + u256_to_i128(step.fee_amount)?;
                    amount_calculated =
                        amount_calculated.checked_sub(u256_to_i128(step.amount_out)?).ok_or(EngineError::Overflow)?;
                } else {
                    amount_specified_remaining += u256_to_i128(step.amount_out)?;
                    amount_calculated = amount_calculated
                        .checked_add(u256_to_i128(step.amount_in)? + u256_to_i128(step.fee_amount)?)
                        .ok_or(EngineError::Overflow)?;
                }

                let mut lp_fee_amount = step.fee_amount;
                if engine.fee_to.is_some() {
                    let protocol_share = lp_fee_amount / U256::from(PROTOCOL_FEE_DENOMINATOR);
                    lp_fee_amount -= protocol_share;
                    if zero_for_one {
                        engine.fee_to_fees_0 = engine.fee_to_fees_0.wrapping_add(protocol_share.as_u128());
                    } else {
                        engine.fee_to_fees_1 = engine.fee_to_fees_1.wrapping_add(protocol_share.as_u128());
                    }
                }

                if active_liquidity > 0 {
                    fee_growth_global_x128 = fixed_point::wrapping_add(
                        fee_growth_global_x128,
                        fixed_point::mul_div(lp_fee_amount, fixed_point::Q128, U256::from(active_liquidity))?,
                    );
                }

                let step_start_price = price;
                price = step.sqrt_ratio_next_x96;

                if price == sqrt_price_next_x96 {
                    if tick_next_initialized {
                        if let Some(tick_info) = engine.ticks.get_mut(&tick_next) {
                            let (growth_0, growth_1) = if zero_for_one {
                                (fee_growth_global_x128, engine.fee_growth_global_1_x128)
                            } else {
                                (engine.fee_growth_global_0_x128, fee_growth_global_x128)
                            };
                            let mut liquidity_net = tick_info.cross(growth_0, growth_1, seconds_now);
                            if zero_for_one {
                                liquidity_net = -liquidity_net;
                            }
                            active_liquidity = fixed_point::add_delta(active_liquidity, liquidity_net)?;
                        }
                    }
                    current_tick = if zero_for_one { tick_next - 1 } else { tick_next };
                } else if price != step_start_price {
                    current_tick = tick_math::get_tick_at_sqrt_ratio(price)?;
                }
            }

            engine.slot0.sqrt_price_x96 = price;
            engine.slot0.tick_current = current_tick;
            engine.slot0.block_timestamp_last = seconds_now;
            engine.slot0.tick_cumulative_last = tick_cumulative;
            engine.liquidity = active_liquidity;
            if zero_for_one {
                engine.fee_growth_global_0_x128 = fee_growth_global_x128;
            } else {
                engine.fee_growth_global_1_x128 = fee_growth_global_x128;
            }

            let (amount_0, amount_1) = if zero_for_one == exact_input {
                (amount_specified - amount_specified_remaining, amount_calculated)
            } else {
                (amount_calculated, amount_specified - amount_specified_remaining)
            };

            let (owed_token, owed_amount) = if zero_for_one { (engine.token_0, amount_0) } else { (engine.token_1, amount_1) };

            if owed_amount > 0 {
                let balance_before = ledger.balance_of(owed_token, engine.pair_address);
                callback.on_swap(recipient, amount_0, amount_1, data)?;
                let balance_after = ledger.balance_of(owed_token, engine.pair_address);
                let paid = balance_after.saturating_sub(balance_before);
                if paid < owed_amount as u128 {
                    return Err(if zero_for_one { EngineError::CallbackUnderpaidToken0 } else { EngineError::CallbackUnderpaidToken1 });
                }
            } else {
                callback.on_swap(recipient, amount_0, amount_1, data)?;
            }

            Ok((
                amount_0,
                amount_1,
                vec![PairEvent::Swap {
                    sender: recipient,
                    recipient,
                    amount_0,
                    amount_1,
                    sqrt_price_x96: price,
                    tick: current_tick,
                }],
            ))
        })
    }

    /// Lends `amount_0`/`amount_1` out for the duration of `callback`, then
    /// requires repayment plus a fee computed at the pair's own swap fee
    /// rate. The fee splits the same way a swap's does: one sixth to
    /// `feeTo` when set, the rest folded into `feeGrowthGlobal`.
    pub fn flash(
        &mut self,
        recipient: Address,
        amount_0: u128,
        amount_1: u128,
        ledger: &dyn TokenLedger,
        callback: &mut dyn FlashCallback,
        data: &[u8],
    ) -> Result<(u128, u128, Vec<PairEvent>), EngineError> {
        log::debug!("flash: recipient={:?} amount_0={} amount_1={}", recipient, amount_0, amount_1);
        let result = self.with_lock(|engine| {
            let fee_0 = fixed_point::mul_div_rounding_up(
                U256::from(amount_0),
                U256::from(engine.fee as u64),
                U256::from(1_000_000u64),
            )?
            .as_u128();
            let fee_1 = fixed_point::mul_div_rounding_up(
                U256::from(amount_1),
                U256::from(engine.fee as u64),
                U256::from(1_000_000u64),
            )?
            .as_u128();

            let balance_0_before = ledger.balance_of(engine.token_0, engine.pair_address);
            let balance_1_before = ledger.balance_of(engine.token_1, engine.pair_address);

            callback.on_flash(recipient, fee_0, fee_1, data)?;

            let balance_0_after = ledger.balance_of(engine.token_0, engine.pair_address);
            let balance_1_after = ledger.balance_of(engine.token_1, engine.pair_address);

            let paid_0 = balance_0_after.saturating_sub(balance_0_before.saturating_sub(amount_0));
            let paid_1 = balance_1_after.saturating_sub(balance_1_before.saturating_sub(amount_1));

            if paid_0 < fee_0 {
                return Err(EngineError::CallbackUnderpaidToken0);
            }
            if paid_1 < fee_1 {
                return Err(EngineError::CallbackUnderpaidToken1);
            }

            if engine.liquidity > 0 {
                let (protocol_0, lp_0) = split_protocol_fee(paid_0, engine.fee_to.is_some());
                let (protocol_1, lp_1) = split_protocol_fee(paid_1, engine.fee_to.is_some());
                engine.fee_to_fees_0 = engine.fee_to_fees_0.wrapping_add(protocol_0);
                engine.fee_to_fees_1 = engine.fee_to_fees_1.wrapping_add(protocol_1);
                engine.fee_growth_global_0_x128 = fixed_point::wrapping_add(
                    engine.fee_growth_global_0_x128,
                    fixed_point::mul_div(U256::from(lp_0), fixed_point::Q128, U256::from(engine.liquidity))?,
                );
                engine.fee_growth_global_1_x128 = fixed_point::wrapping_add(
                    engine.fee_growth_global_1_x128,
                    fixed_point::mul_div(U256::from(lp_1), fixed_point::Q128, U256::from(engine.liquidity))?,
                );
            }

            Ok((
                paid_0,
                paid_1,
                vec![PairEvent::Flash { sender: recipient, recipient, amount_0, amount_1, paid_0, paid_1 }],
            ))
        });
        if let Err(err) = &result {
            log::warn!("flash aborted: {}", err);
        }
        result
    }
}

fn split_protocol_fee(paid: u128, protocol_on: bool) -> (u128, u128) {
    if !protocol_on {
        return (0, paid);
    }
    let protocol = paid / PROTOCOL_FEE_DENOMINATOR as u128;
    (protocol, paid - protocol)
}

fn u256_to_i128(x: U256) -> Result<i128, EngineError> {
    if x > U256::from(i128::MAX as u128) {
        return Err(EngineError::Overflow);
    }
    Ok(x.as_u128() as i128)
}
