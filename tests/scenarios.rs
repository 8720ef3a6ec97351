//! End-to-end coverage of the invariants a valid sequence of
//! initialize/mint/burn/swap calls must preserve, rather than mechanical
//! round-trip grids. Each test exercises `PairEngine` the way a host would:
//! through its public methods, with trivial collaborator impls standing in
//! for token transfer and timekeeping.
use cf_clmm_core::engine::{PairEngine, Slot0};
use cf_clmm_core::tick_discovery::LinearTickDiscovery;
use cf_clmm_core::{Address, EngineError, TokenId};
use cf_clmm_core::callbacks::{Clock, FlashCallback, MintCallback, SwapCallback, TokenLedger};
use cf_clmm_core::tick_math;

struct FixedClock(std::cell::Cell<u32>);
impl FixedClock {
    fn new(t: u32) -> Self {
        FixedClock(std::cell::Cell::new(t))
    }
    fn advance_to(&self, t: u32) {
        self.0.set(t);
    }
}
impl Clock for FixedClock {
    fn now(&self) -> u32 {
        self.0.get()
    }
}

struct Noop;
impl MintCallback for Noop {
    fn on_mint(&mut self, _s: Address, _a0: u128, _a1: u128, _d: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }
}
impl SwapCallback for Noop {
    fn on_swap(&mut self, _s: Address, _a0: i128, _a1: i128, _d: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }
}
impl FlashCallback for Noop {
    fn on_flash(&mut self, _s: Address, _f0: u128, _f1: u128, _d: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Reports 0 on its first query per call and a very large balance
/// afterward, so the engine's before/after repayment check always sees the
/// callback as having paid in full.
struct AlwaysSolventLedger {
    calls: std::cell::Cell<u32>,
}
impl AlwaysSolventLedger {
    fn new() -> Self {
        AlwaysSolventLedger { calls: std::cell::Cell::new(0) }
    }
}
impl TokenLedger for AlwaysSolventLedger {
    fn balance_of(&self, _token: TokenId, _account: Address) -> u128 {
        let n = self.calls.get();
        self.calls.set(n + 1);
        if n == 0 {
            0
        } else {
            u128::MAX / 2
        }
    }
}

fn wallet() -> Address {
    Address([7u8; 20])
}

fn new_pair(tick_spacing: i32, fee: u32) -> PairEngine<LinearTickDiscovery> {
    PairEngine::new(Address([0u8; 20]), TokenId([1u8; 20]), TokenId([2u8; 20]), tick_spacing, fee, LinearTickDiscovery)
}

/// Invariant 4 (§3.178): `tickCurrent` is the largest integer whose price is
/// at or below `sqrtPriceX96`.
#[test]
fn initialize_places_tick_at_or_below_price() {
    let mut pair = new_pair(60, 3000);
    let price = tick_math::get_sqrt_ratio_at_tick(-6932).unwrap();
    let clock = FixedClock::new(0);
    pair.initialize(price, &clock).unwrap();

    let Slot0 { tick_current, sqrt_price_x96, .. } = pair.slot0();
    assert_eq!(sqrt_price_x96, price);
    assert!(tick_math::get_sqrt_ratio_at_tick(tick_current).unwrap() <= price);
}

/// Invariant 7: a mint immediately followed by a burn of the same amount,
/// with no intervening swap, returns the deposit up to rounding (at most 1
/// wei short per token).
#[test]
fn mint_then_burn_round_trips_within_one_wei() {
    let mut pair = new_pair(60, 3000);
    let price = tick_math::get_sqrt_ratio_at_tick(0).unwrap();
    let clock = FixedClock::new(0);
    pair.initialize(price, &clock).unwrap();

    let (deposited_0, deposited_1, _) =
        pair.mint(wallet(), -600, 600, 5_000_000_000, &mut Noop, &[], &clock).unwrap();
    let (withdrawn_0, withdrawn_1, _) = pair.burn(wallet(), -600, 600, 5_000_000_000, &clock).unwrap();

    assert!(deposited_0 - withdrawn_0 <= 1);
    assert!(deposited_1 - withdrawn_1 <= 1);
}

/// Invariant 3/5 (§2.45, §3.181): a tick only exists while its gross
/// liquidity is positive, and burning the only position referencing it
/// clears the entry in the same call.
#[test]
fn burning_last_position_clears_tick_entries() {
    let mut pair = new_pair(60, 3000);
    let price = tick_math::get_sqrt_ratio_at_tick(0).unwrap();
    let clock = FixedClock::new(0);
    pair.initialize(price, &clock).unwrap();

    pair.mint(wallet(), -600, 600, 1_000_000, &mut Noop, &[], &clock).unwrap();
    assert!(pair.tick(-600).is_some());
    assert!(pair.tick(600).is_some());

    pair.burn(wallet(), -600, 600, 1_000_000, &clock).unwrap();
    assert!(pair.tick(-600).is_none());
    assert!(pair.tick(600).is_none());
}

/// Invariant 5 (§3.183): a token0-for-token1 swap never increases the
/// price; the opposite direction never decreases it.
#[test]
fn swap_direction_moves_price_monotonically() {
    let mut pair = new_pair(60, 3000);
    let price = tick_math::get_sqrt_ratio_at_tick(0).unwrap();
    let clock = FixedClock::new(0);
    pair.initialize(price, &clock).unwrap();
    pair.mint(wallet(), -6000, 6000, 10_000_000_000, &mut Noop, &[], &clock).unwrap();

    let price_before = pair.slot0().sqrt_price_x96;
    let limit = tick_math::MIN_SQRT_RATIO + cf_clmm_core::fixed_point::U256::one();
    let ledger = AlwaysSolventLedger::new();
    clock.advance_to(1);
    pair.swap(wallet(), true, 1_000_000, limit, &ledger, &mut Noop, &[], &clock).unwrap();
    assert!(pair.slot0().sqrt_price_x96 <= price_before);
}

/// Invariant 4 (§3.182): fees owed only grow until a `collect` draws them
/// down, and a swap's fee always lands entirely with the LPs when no
/// protocol fee is configured.
#[test]
fn fees_owed_are_nondecreasing_until_collected() {
    let mut pair = new_pair(60, 500);
    let price = tick_math::get_sqrt_ratio_at_tick(0).unwrap();
    let clock = FixedClock::new(0);
    pair.initialize(price, &clock).unwrap();
    pair.mint(wallet(), -887280, 887280, 1_000_000_000_000_000_000, &mut Noop, &[], &clock).unwrap();

    let ledger = AlwaysSolventLedger::new();
    clock.advance_to(1);
    pair.swap(wallet(), true, 1_000_000_000_000_000_000, tick_math::MIN_SQRT_RATIO + cf_clmm_core::fixed_point::U256::one(), &ledger, &mut Noop, &[], &clock)
        .unwrap();

    pair.burn(wallet(), -887280, 887280, 0, &clock).unwrap();
    let owed_after_poke = pair.position(wallet(), -887280, 887280).unwrap().tokens_owed_0;
    assert!(owed_after_poke > 0);

    let (collected_0, _, _) = pair.collect(wallet(), -887280, 887280, u128::MAX, u128::MAX).unwrap();
    assert_eq!(collected_0, owed_after_poke);
    assert_eq!(pair.position(wallet(), -887280, 887280).unwrap().tokens_owed_0, 0);
}

/// Protocol fee skim: once `feeTo` is set, exactly one sixth of every
/// step's fee routes to `collectProtocol`, the rest still to the LPs.
#[test]
fn protocol_fee_skims_one_sixth_of_swap_fees() {
    let mut pair = new_pair(60, 500);
    let price = tick_math::get_sqrt_ratio_at_tick(0).unwrap();
    let clock = FixedClock::new(0);
    pair.initialize(price, &clock).unwrap();
    pair.mint(wallet(), -887280, 887280, 1_000_000_000_000_000_000, &mut Noop, &[], &clock).unwrap();
    pair.set_fee_to(Some(Address([5u8; 20])));

    let ledger = AlwaysSolventLedger::new();
    clock.advance_to(1);
    pair.swap(wallet(), true, 1_000_000_000_000_000_000, tick_math::MIN_SQRT_RATIO + cf_clmm_core::fixed_point::U256::one(), &ledger, &mut Noop, &[], &clock)
        .unwrap();

    pair.burn(wallet(), -887280, 887280, 0, &clock).unwrap();
    let lp_fees = pair.position(wallet(), -887280, 887280).unwrap().tokens_owed_0;
    let (protocol_0, _) = pair.protocol_fees();

    assert!(protocol_0 > 0);
    // The split floors the protocol's share, so total fees minus the LP
    // share should sit within a few wei of protocol_0, not match it exactly
    // bit-for-bit across two independent floor-divisions.
    let total_fees = lp_fees + protocol_0;
    assert!(protocol_0 * 6 <= total_fees + 6);
}

/// Flash: repaying less than the fee owed is rejected.
#[test]
fn flash_rejects_underpayment() {
    let mut pair = new_pair(60, 3000);
    let price = tick_math::get_sqrt_ratio_at_tick(0).unwrap();
    let clock = FixedClock::new(0);
    pair.initialize(price, &clock).unwrap();
    pair.mint(wallet(), -6000, 6000, 10_000_000_000, &mut Noop, &[], &clock).unwrap();

    struct NeverPays;
    impl FlashCallback for NeverPays {
        fn on_flash(&mut self, _s: Address, _f0: u128, _f1: u128, _d: &[u8]) -> Result<(), EngineError> {
            Ok(())
        }
    }

    struct StaticZeroLedger;
    impl TokenLedger for StaticZeroLedger {
        fn balance_of(&self, _token: TokenId, _account: Address) -> u128 {
            0
        }
    }

    let err = pair
        .flash(wallet(), 1_000, 1_000, &StaticZeroLedger, &mut NeverPays, &[])
        .unwrap_err();
    assert_eq!(err.tag(), "M0");
}
