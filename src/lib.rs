///! A concentrated-liquidity constant-function market maker engine: ticks,
///! sqrt-price bookkeeping, fee accrual, and the swap state machine, as a
///! plain Rust library with no chain runtime underneath it. Hosts plug in
///! token movement and timekeeping via the traits in [`callbacks`].
pub mod address;
pub mod callbacks;
pub mod engine;
pub mod error;
pub mod events;
pub mod fixed_point;
pub mod position;
pub mod sqrt_price_math;
pub mod swap_math;
pub mod tick;
pub mod tick_discovery;
pub mod tick_math;

pub use address::{Address, TokenId};
pub use engine::{PairEngine, Slot0};
pub use error::EngineError;
pub use events::PairEvent;
