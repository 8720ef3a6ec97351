///! Per-`(owner, lowerTick, upperTick)` bookkeeping: owed-token balances and
///! the inside-growth snapshots a poke reconciles against. Generalizes the
///! teacher's `states/position.rs` `PositionState` (an Anchor zero-copy
///! account, `u64`-denominated Q32.32) to a plain struct in a `HashMap`
///! keyed by the full position key, widened to `u128`/Q128.128 `U256`, using
///! this crate's own `fixed_point::mul_div` in place of the teacher's
///! `muldiv::MulDiv` (which only supports 64-bit operands).
use std::collections::HashMap;

use crate::address::Address;
use crate::error::EngineError;
use crate::fixed_point::{self, U256};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PositionKey {
    pub owner: Address,
    pub tick_lower: i32,
    pub tick_upper: i32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Position {
    pub liquidity: u128,
    pub fee_growth_inside_0_last_x128: U256,
    pub fee_growth_inside_1_last_x128: U256,
    pub tokens_owed_0: u128,
    pub tokens_owed_1: u128,
}

impl Position {
    /// Reconciles this position against freshly computed inside-growth
    /// snapshots and applies `liquidity_delta`.
    ///
    /// A poke (`liquidity_delta == 0`) on a position that has never held
    /// liquidity fails `NP` — positions are created lazily on the first
    /// mint and a poke cannot resurrect one that never existed.
    pub fn update(
        &mut self,
        liquidity_delta: i128,
        fee_growth_inside_0_x128: U256,
        fee_growth_inside_1_x128: U256,
    ) -> Result<(), EngineError> {
        let liquidity_next = if liquidity_delta == 0 {
            if self.liquidity == 0 {
                return Err(EngineError::NoPosition);
            }
            self.liquidity
        } else {
            fixed_point::add_delta(self.liquidity, liquidity_delta)?
        };

        let growth_delta_0 =
            fixed_point::wrapping_sub(fee_growth_inside_0_x128, self.fee_growth_inside_0_last_x128);
        let growth_delta_1 =
            fixed_point::wrapping_sub(fee_growth_inside_1_x128, self.fee_growth_inside_1_last_x128);

        let tokens_owed_0 = fixed_point::mul_div(growth_delta_0, U256::from(self.liquidity), fixed_point::Q128)?;
        let tokens_owed_1 = fixed_point::mul_div(growth_delta_1, U256::from(self.liquidity), fixed_point::Q128)?;

        self.liquidity = liquidity_next;
        self.fee_growth_inside_0_last_x128 = fee_growth_inside_0_x128;
        self.fee_growth_inside_1_last_x128 = fee_growth_inside_1_x128;

        // Wrapping add: fee accrual is allowed to grow without bound until
        // withdrawn via `collect`, same tradeoff the teacher's own comment
        // calls out ("have to withdraw before you hit the max").
        if !tokens_owed_0.is_zero() || !tokens_owed_1.is_zero() {
            self.tokens_owed_0 = self
                .tokens_owed_0
                .wrapping_add(tokens_owed_0.as_u128());
            self.tokens_owed_1 = self
                .tokens_owed_1
                .wrapping_add(tokens_owed_1.as_u128());
        }

        Ok(())
    }
}

/// The engine's position table: one `Position` per `(owner, lo, hi)` ever
/// touched by a mint. Plain `HashMap`, per the spec's "plain maps, no
/// pointers into TickTable" design note.
#[derive(Default)]
pub struct PositionLedger {
    positions: HashMap<PositionKey, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the position at `key`, creating a zeroed entry if this is a
    /// genuine mint (`allow_create`). A poke (`allow_create = false`) on a
    /// key with no entry fails `NP` at the call site via `Position::update`
    /// running against a freshly defaulted (zero-liquidity) position.
    pub fn get_or_insert(&mut self, key: PositionKey) -> &mut Position {
        self.positions.entry(key).or_insert_with(Position::default)
    }

    pub fn get(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    /// Removes a position whose liquidity and owed tokens have both been
    /// fully drained. Not required by the spec (positions persist at zero
    /// liquidity) but keeps the ledger from growing without bound for hosts
    /// that want to reclaim dead entries; engine code does not call this.
    pub fn remove_if_empty(&mut self, key: &PositionKey) {
        if let Some(pos) = self.positions.get(key) {
            if pos.liquidity == 0 && pos.tokens_owed_0 == 0 && pos.tokens_owed_1 == 0 {
                self.positions.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address([1u8; 20])
    }

    #[test]
    fn poke_on_unknown_position_fails_np() {
        let mut pos = Position::default();
        let err = pos.update(0, U256::zero(), U256::zero()).unwrap_err();
        assert_eq!(err.tag(), "NP");
    }

    #[test]
    fn mint_then_poke_accrues_fees() {
        let mut pos = Position::default();
        pos.update(1_000, U256::zero(), U256::zero()).unwrap();
        // growth advances by Q128 (i.e. 1.0 per unit liquidity)
        pos.update(0, fixed_point::Q128, U256::zero()).unwrap();
        assert_eq!(pos.tokens_owed_0, 1_000);
    }

    #[test]
    fn burn_below_held_liquidity_succeeds() {
        let mut pos = Position::default();
        pos.update(1_000, U256::zero(), U256::zero()).unwrap();
        pos.update(-400, U256::zero(), U256::zero()).unwrap();
        assert_eq!(pos.liquidity, 600);
    }

    #[test]
    fn ledger_creates_lazily_and_reuses_entry() {
        let mut ledger = PositionLedger::new();
        let key = PositionKey {
            owner: owner(),
            tick_lower: -60,
            tick_upper: 60,
        };
        ledger.get_or_insert(key).update(500, U256::zero(), U256::zero()).unwrap();
        assert_eq!(ledger.get(&key).unwrap().liquidity, 500);
    }
}
