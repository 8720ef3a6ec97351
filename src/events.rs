///! Observable side effects, modeled as data rather than emitted onto a
///! chain log. `PairEngine` returns a `Vec<PairEvent>` alongside the primary
///! result of each call, mirroring the teacher's `emit!(...)` calls but
///! surfacing them to the caller instead of a log topic stream.
use crate::address::Address;
use crate::fixed_point::U256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairEvent {
    Initialized {
        sqrt_price_x96: U256,
        tick: i32,
    },
    Mint {
        sender: Address,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        amount_0: u128,
        amount_1: u128,
    },
    Burn {
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        amount_0: u128,
        amount_1: u128,
    },
    Collect {
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount_0: u128,
        amount_1: u128,
    },
    Swap {
        sender: Address,
        recipient: Address,
        amount_0: i128,
        amount_1: i128,
        sqrt_price_x96: U256,
        tick: i32,
    },
    SetFeeTo {
        old: Option<Address>,
        new: Option<Address>,
    },
    CollectProtocol {
        amount_0: u128,
        amount_1: u128,
    },
    Flash {
        sender: Address,
        recipient: Address,
        amount_0: u128,
        amount_1: u128,
        paid_0: u128,
        paid_1: u128,
    },
}
