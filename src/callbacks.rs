///! Collaborator traits the host application implements: token balance
///! queries, the swap/mint/flash "pay by callback" pattern, and an
///! injectable clock. None of these are owned by the engine — per the
///! spec's scope, token transfer mechanics are an oracle-driven
///! debit/credit interface, and timestamps come from outside.
use crate::address::{Address, TokenId};
use crate::error::EngineError;

/// Balance queries the engine uses to verify a callback actually paid.
/// Transfers themselves are not modeled here: they happen inside the
/// callback implementations below.
pub trait TokenLedger {
    fn balance_of(&self, token: TokenId, account: Address) -> u128;
}

/// The "flash pattern" callback invoked after a swap computes its net
/// deltas. Negative deltas are owed *to* the caller (the engine already
/// paid out); positive deltas are owed *by* the caller and must be repaid
/// before this call returns — the engine re-checks balances afterward and
/// fails `M0`/`M1` if underpaid.
pub trait SwapCallback {
    fn on_swap(
        &mut self,
        sender: Address,
        amount_0_delta: i128,
        amount_1_delta: i128,
        data: &[u8],
    ) -> Result<(), EngineError>;
}

/// Invoked by `mint` so the caller can pay the amounts `_modifyPosition`
/// computed. Both amounts are the minter's debt to the pool (≥ 0).
pub trait MintCallback {
    fn on_mint(
        &mut self,
        sender: Address,
        amount_0_owed: u128,
        amount_1_owed: u128,
        data: &[u8],
    ) -> Result<(), EngineError>;
}

/// Invoked by `flash` after the requested amounts have been paid out, so
/// the caller can do whatever it wants with them before repaying plus fee.
pub trait FlashCallback {
    fn on_flash(
        &mut self,
        sender: Address,
        fee_0: u128,
        fee_1: u128,
        data: &[u8],
    ) -> Result<(), EngineError>;
}

/// Injectable time source, read at most once per public `PairEngine` call.
pub trait Clock {
    fn now(&self) -> u32;
}
